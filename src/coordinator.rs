use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::config::CoordinatorConfig;
use crate::coordinator_worker::CoordinatorWorker;
use crate::errors::{Result, UploadError};
use crate::notify::{NotificationRegistry, Notifier};
use crate::status::UploadStatus;
use crate::transport::UploadTransport;
use crate::types::{CoordinatorCommand, FileSpec, UploadEvent, UploadRequest};

/// Handle to the upload coordinator actor. Cheap to clone; every clone
/// talks to the same queue, status map and notifier.
#[derive(Clone)]
pub struct UploadCoordinator {
    command_tx: mpsc::Sender<CoordinatorCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// Coordinator plus the worker task it spawned.
pub struct CoordinatorHandle {
    pub coordinator: UploadCoordinator,
    pub worker_handle: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub async fn shutdown(self) -> Result<()> {
        drop(self.coordinator);
        self.worker_handle
            .await
            .map_err(|err| UploadError::Other(anyhow::anyhow!("worker panic: {}", err)))
    }
}

impl UploadCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        transport: Arc<dyn UploadTransport>,
        registry: Arc<dyn NotificationRegistry>,
    ) -> CoordinatorHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let worker_handle = tokio::spawn(CoordinatorWorker::run(
            config,
            transport,
            Notifier::new(registry),
            command_rx,
            event_tx.clone(),
        ));

        CoordinatorHandle {
            coordinator: Self {
                command_tx,
                event_tx,
            },
            worker_handle,
        }
    }

    /// Submit a batch of files for one destination folder.
    ///
    /// Returns once the batch is admitted and its start tasks are queued;
    /// it doesn't wait for any transfer. A batch containing a file over the
    /// configured size limit is rejected whole, with nothing queued.
    pub async fn submit_upload(
        &self,
        files: Vec<FileSpec>,
        folder_id: impl Into<String>,
        current_path: impl Into<String>,
        folder_name: impl Into<String>,
    ) -> Result<()> {
        let request = UploadRequest::new(files, folder_id, current_path, folder_name);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::Submit {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::Shutdown)?;

        reply_rx.await.map_err(|_| UploadError::Shutdown)?
    }

    /// Snapshot of a folder's aggregate upload status.
    pub async fn upload_status(&self, folder_id: &str) -> Result<Option<Arc<UploadStatus>>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::GetStatus {
                folder_id: folder_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::Shutdown)?;

        reply_rx.await.map_err(|_| UploadError::Shutdown)
    }

    /// Reset or override a folder's status. `None` clears the entry.
    pub async fn set_upload_status(
        &self,
        folder_id: &str,
        status: Option<UploadStatus>,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CoordinatorCommand::SetStatus {
                folder_id: folder_id.to_string(),
                status,
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::Shutdown)?;

        reply_rx.await.map_err(|_| UploadError::Shutdown)
    }

    /// Subscribe to coordinator events.
    ///
    /// Slow subscribers can lag and lose events; each subscriber gets its
    /// own copy of the stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }
}
