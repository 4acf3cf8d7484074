use std::collections::VecDeque;
use std::sync::Arc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};
use crate::config::CoordinatorConfig;
use crate::errors::{Result, UploadError};
use crate::notify::Notifier;
use crate::status::{SettleOutcome, StatusStore, UploadStatus};
use crate::transport::{ProgressFn, UploadTransport};
use crate::types::{CoordinatorCommand, UploadEvent, UploadRequest};
use crate::worker::{TransferWorker, join_path};

/// A deferred start function: nothing runs until the queue spawns it.
struct StartTask {
    folder_id: String,
    file_name: String,
    start: BoxFuture<'static, Result<String>>,
}

/// Settlement of one file's transfer, routed back to the aggregator.
struct Settlement {
    folder_id: String,
    file_name: String,
    result: Result<()>,
}

/// The coordinator actor. Owns the global FIFO, the per-folder status map
/// and the notifier; everything mutates on this single task.
pub(crate) struct CoordinatorWorker {
    max_concurrent: usize,
    size_limit: Option<u64>,
    transport: Arc<dyn UploadTransport>,
    notifier: Notifier,
    status: StatusStore,
    queue: VecDeque<StartTask>,
    active: usize,
    event_tx: broadcast::Sender<UploadEvent>,
    settle_tx: mpsc::UnboundedSender<Settlement>,
}

impl CoordinatorWorker {
    pub(crate) async fn run(
        config: CoordinatorConfig,
        transport: Arc<dyn UploadTransport>,
        notifier: Notifier,
        mut command_rx: mpsc::Receiver<CoordinatorCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (settle_tx, mut settle_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            max_concurrent: config.max_concurrent.max(1),
            size_limit: config.upload_size_limit(),
            transport,
            notifier,
            status: StatusStore::new(),
            queue: VecDeque::new(),
            active: 0,
            event_tx,
            settle_tx,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => worker.handle_command(command),
                        // All handles dropped; queued work is abandoned.
                        None => break,
                    }
                }
                Some(settlement) = settle_rx.recv() => {
                    worker.handle_settlement(settlement);
                }
            }

            worker.process_queue();
        }
    }

    fn handle_command(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Submit { request, reply } => {
                let result = self.handle_submit(request);
                let _ = reply.send(result);
            }
            CoordinatorCommand::GetStatus { folder_id, reply } => {
                let _ = reply.send(self.status.get(&folder_id));
            }
            CoordinatorCommand::SetStatus {
                folder_id,
                status,
                reply,
            } => {
                self.status.set(&folder_id, status);
                let _ = reply.send(());
            }
        }
    }

    /// Intake: admission validation, pending bookkeeping, task creation.
    /// Returns after registration; transfers run later off the queue.
    fn handle_submit(&mut self, request: UploadRequest) -> Result<()> {
        if request.files.is_empty() {
            return Err(UploadError::InvalidRequest("empty file list".to_string()));
        }

        if let Some(limit) = self.size_limit {
            if let Some(oversized) = request.files.iter().find(|file| file.size > limit) {
                // The whole batch is rejected before any task exists.
                log::warn!(
                    "upload request {} rejected: '{}' is {} bytes, limit {}",
                    request.id,
                    oversized.name,
                    oversized.size,
                    limit
                );
                self.notifier.payload_too_large(
                    &request.folder_id,
                    &request.folder_name,
                    &oversized.name,
                    limit,
                );
                return Err(UploadError::PayloadTooLarge {
                    file: oversized.name.clone(),
                    size: oversized.size,
                    limit,
                });
            }
        }

        self.status.merge_pending(
            &request.folder_id,
            &request.folder_name,
            request.files.iter().map(|file| file.name.clone()),
        );

        log::info!(
            "upload request {} accepted: {} file(s) for folder '{}'",
            request.id,
            request.files.len(),
            request.folder_id
        );
        let _ = self.event_tx.send(UploadEvent::RequestAccepted {
            request_id: request.id,
            folder_id: request.folder_id.clone(),
            file_count: request.files.len(),
        });

        for file in request.files {
            let worker = TransferWorker {
                transport: self.transport.clone(),
            };
            let dest_path = join_path(&request.current_path, &file.name);
            let progress = self.progress_fn(&request.folder_id, &request.folder_name);

            self.queue.push_back(StartTask {
                folder_id: request.folder_id.clone(),
                file_name: file.name.clone(),
                start: worker
                    .run(request.folder_id.clone(), dest_path, file, progress)
                    .boxed(),
            });
        }

        Ok(())
    }

    /// Progress goes straight to the notification registry; it never
    /// touches the status map.
    fn progress_fn(&self, folder_id: &str, folder_name: &str) -> ProgressFn {
        let notifier = self.notifier.clone();
        let folder_id = folder_id.to_string();
        let folder_name = folder_name.to_string();

        Arc::new(move |bytes_uploaded, bytes_total, file_name| {
            notifier.progress(&folder_id, &folder_name, file_name, bytes_uploaded, bytes_total);
        })
    }

    /// Drain the FIFO head while capacity allows. At the default limit of 1
    /// this is strictly sequential across all folders.
    fn process_queue(&mut self) {
        while self.active < self.max_concurrent && !self.queue.is_empty() {
            if let Some(task) = self.queue.pop_front() {
                self.start_task(task);
            }
        }
    }

    fn start_task(&mut self, task: StartTask) {
        self.active += 1;

        log::debug!("starting upload of '{}' to '{}'", task.file_name, task.folder_id);
        let _ = self.event_tx.send(UploadEvent::FileStarted {
            folder_id: task.folder_id.clone(),
            file_name: task.file_name.clone(),
        });

        let settle_tx = self.settle_tx.clone();
        let StartTask {
            folder_id,
            file_name,
            start,
        } = task;

        tokio::spawn(async move {
            // Errors settle the file; they never escape this task, so a
            // failed transfer cannot stall the queue.
            let result = start.await.map(|_| ());
            let _ = settle_tx.send(Settlement {
                folder_id,
                file_name,
                result,
            });
        });
    }

    fn handle_settlement(&mut self, settlement: Settlement) {
        self.active = self.active.saturating_sub(1);

        let outcome = match &settlement.result {
            Ok(()) => {
                let _ = self.event_tx.send(UploadEvent::FileCompleted {
                    folder_id: settlement.folder_id.clone(),
                    file_name: settlement.file_name.clone(),
                });
                SettleOutcome::Completed
            }
            Err(err) => {
                log::warn!(
                    "upload of '{}' to '{}' failed: {}",
                    settlement.file_name,
                    settlement.folder_id,
                    err
                );
                let _ = self.event_tx.send(UploadEvent::FileFailed {
                    folder_id: settlement.folder_id.clone(),
                    file_name: settlement.file_name.clone(),
                    error: err.to_string(),
                });
                SettleOutcome::Failed
            }
        };

        let snapshot =
            self.status
                .settle(&settlement.folder_id, &settlement.file_name, outcome);

        if let Some(status) = snapshot {
            if status.is_drained() {
                self.report_drained(&settlement.folder_id, status);
            }
        }
    }

    fn report_drained(&mut self, folder_id: &str, status: Arc<UploadStatus>) {
        if self.notifier.terminal(folder_id, &status) {
            log::info!(
                "folder '{}' drained: {} completed, {} failed",
                folder_id,
                status.completed.len(),
                status.failed.len()
            );
        }

        let _ = self.event_tx.send(UploadEvent::FolderSettled {
            folder_id: folder_id.to_string(),
            status,
        });
    }
}
