use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::broadcast;
use conveyor::{
    CoordinatorConfig, CoordinatorHandle, FileSpec, InMemoryRegistry, ProgressFn, Result,
    TaskStatus, UploadCoordinator, UploadError, UploadEvent, UploadStatus, UploadTransport,
};

const MIB: u64 = 1024 * 1024;

/// Transport double: no network, observable scheduling.
#[derive(Default)]
struct MockTransport {
    /// File names whose transfer rejects.
    fail: HashSet<String>,
    /// Simulated per-file transfer time.
    transfer_delay: Duration,
    sessions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl MockTransport {
    fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(|s| s.to_string()).collect(),
            transfer_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn create_session(&self, folder_id: &str, path: &str, _file: &FileSpec) -> Result<String> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock://{}/{}", folder_id, path))
    }

    async fn transfer(
        &self,
        _session_url: &str,
        file: &FileSpec,
        progress: ProgressFn,
    ) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(file.name.clone());

        progress(file.size / 2, file.size, &file.name);
        tokio::time::sleep(self.transfer_delay).await;
        progress(file.size, file.size, &file.name);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.contains(&file.name) {
            Err(UploadError::server_error(500, "mock transfer failure"))
        } else {
            Ok(())
        }
    }
}

struct Fixture {
    handle: CoordinatorHandle,
    transport: Arc<MockTransport>,
    registry: Arc<InMemoryRegistry>,
    events: broadcast::Receiver<UploadEvent>,
}

fn fixture(config: CoordinatorConfig, transport: MockTransport) -> Fixture {
    let transport = Arc::new(transport);
    let registry = Arc::new(InMemoryRegistry::new());
    let handle = UploadCoordinator::new(config, transport.clone(), registry.clone());
    let events = handle.coordinator.subscribe_events();

    Fixture {
        handle,
        transport,
        registry,
        events,
    }
}

fn files(specs: &[(&str, u64)]) -> Vec<FileSpec> {
    specs
        .iter()
        .map(|(name, size)| FileSpec::new(*name, *size, format!("/tmp/{}", name)))
        .collect()
}

async fn wait_for_drain(
    events: &mut broadcast::Receiver<UploadEvent>,
    folder_id: &str,
) -> Arc<UploadStatus> {
    loop {
        match events.recv().await.expect("event stream closed") {
            UploadEvent::FolderSettled {
                folder_id: id,
                status,
            } if id == folder_id => return status,
            _ => {}
        }
    }
}

fn terminal_upserts(registry: &InMemoryRegistry, key: &str) -> Vec<TaskStatus> {
    registry
        .log()
        .into_iter()
        .filter(|record| record.key == key)
        .map(|record| record.background_task.status)
        .filter(|status| *status != TaskStatus::Pending)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_all_files_succeed() {
    let mut fx = fixture(
        CoordinatorConfig {
            max_file_upload_size: 0, // unlimited
            ..Default::default()
        },
        MockTransport {
            transfer_delay: Duration::from_millis(50),
            ..Default::default()
        },
    );

    fx.handle
        .coordinator
        .submit_upload(
            files(&[("a", 10 * MIB), ("b", 10 * MIB), ("c", 10 * MIB)]),
            "f1",
            "",
            "Dataset",
        )
        .await
        .unwrap();

    let status = wait_for_drain(&mut fx.events, "f1").await;
    assert!(status.pending.is_empty());
    assert_eq!(
        status.completed,
        ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
    );
    assert!(status.failed.is_empty());

    // strictly sequential, in submission order
    assert_eq!(fx.transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(fx.transport.started(), vec!["a", "b", "c"]);
    assert_eq!(fx.transport.sessions.load(Ordering::SeqCst), 3);

    let record = fx.registry.get("upload:f1").unwrap();
    assert_eq!(record.background_task.status, TaskStatus::Resolved);
    assert_eq!(record.background_task.percent, 100);
    assert!(record.message.contains("Dataset"));

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_mixed_outcome_reports_rejected_with_failed_names() {
    let mut fx = fixture(
        CoordinatorConfig::default(),
        MockTransport::failing(&["b"]),
    );

    fx.handle
        .coordinator
        .submit_upload(files(&[("a", MIB), ("b", MIB)]), "f2", "", "Archive")
        .await
        .unwrap();

    let status = wait_for_drain(&mut fx.events, "f2").await;
    assert!(status.completed.contains("a"));
    assert!(status.failed.contains("b"));

    let record = fx.registry.get("upload:f2").unwrap();
    assert_eq!(record.background_task.status, TaskStatus::Rejected);
    assert_eq!(record.description.as_deref(), Some("b"));

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_oversized_batch_rejected_at_intake() {
    let mut fx = fixture(
        CoordinatorConfig {
            max_file_upload_size: (1024 * MIB) as i64, // 1 GB ceiling
            ..Default::default()
        },
        MockTransport::default(),
    );

    let result = fx
        .handle
        .coordinator
        .submit_upload(files(&[("huge.bin", 5 * 1024 * MIB)]), "f3", "", "Backups")
        .await;

    assert!(matches!(
        result,
        Err(UploadError::PayloadTooLarge { size, limit, .. })
            if size == 5 * 1024 * MIB && limit == 1024 * MIB
    ));

    // nothing queued, no network calls, status untouched
    assert_eq!(fx.transport.sessions.load(Ordering::SeqCst), 0);
    assert!(fx.transport.started().is_empty());
    assert!(
        fx.handle
            .coordinator
            .upload_status("f3")
            .await
            .unwrap()
            .is_none()
    );

    let record = fx.registry.get("upload:f3").unwrap();
    assert_eq!(record.background_task.status, TaskStatus::Rejected);
    assert!(record.description.unwrap().contains("huge.bin"));
    assert_eq!(terminal_upserts(&fx.registry, "upload:f3").len(), 1);

    // the events channel saw no activity for this folder
    assert!(matches!(
        fx.events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_global_queue_serializes_across_folders() {
    let mut fx = fixture(
        CoordinatorConfig::default(),
        MockTransport {
            transfer_delay: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let coordinator = &fx.handle.coordinator;

    coordinator
        .submit_upload(files(&[("a1", MIB), ("a2", MIB)]), "fa", "", "A")
        .await
        .unwrap();
    coordinator
        .submit_upload(files(&[("b1", MIB)]), "fb", "", "B")
        .await
        .unwrap();

    wait_for_drain(&mut fx.events, "fb").await;

    // registration order, one transfer in flight at any time
    assert_eq!(fx.transport.started(), vec!["a1", "a2", "b1"]);
    assert_eq!(fx.transport.max_in_flight.load(Ordering::SeqCst), 1);

    let status_a = coordinator.upload_status("fa").await.unwrap().unwrap();
    assert!(status_a.is_drained());
    assert_eq!(status_a.completed.len(), 2);

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_terminal_notification_emitted_once() {
    let mut fx = fixture(
        CoordinatorConfig::default(),
        MockTransport {
            transfer_delay: Duration::from_millis(10),
            ..Default::default()
        },
    );

    fx.handle
        .coordinator
        .submit_upload(files(&[("a", MIB), ("b", MIB)]), "f1", "", "Dataset")
        .await
        .unwrap();

    wait_for_drain(&mut fx.events, "f1").await;

    // re-reading status afterwards must not re-notify
    let _ = fx.handle.coordinator.upload_status("f1").await.unwrap();

    let terminals = terminal_upserts(&fx.registry, "upload:f1");
    assert_eq!(terminals, vec![TaskStatus::Resolved]);

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_second_request_merges_into_pending() {
    let mut fx = fixture(
        CoordinatorConfig::default(),
        MockTransport {
            transfer_delay: Duration::from_millis(50),
            ..Default::default()
        },
    );
    let coordinator = &fx.handle.coordinator;

    coordinator
        .submit_upload(files(&[("a", MIB)]), "f1", "", "Dataset")
        .await
        .unwrap();
    coordinator
        .submit_upload(files(&[("b", MIB)]), "f1", "", "Dataset")
        .await
        .unwrap();

    let status = wait_for_drain(&mut fx.events, "f1").await;
    assert_eq!(status.completed.len(), 2);
    assert_eq!(terminal_upserts(&fx.registry, "upload:f1").len(), 1);

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_stall_queue() {
    let mut fx = fixture(
        CoordinatorConfig::default(),
        MockTransport::failing(&["bad"]),
    );

    fx.handle
        .coordinator
        .submit_upload(
            files(&[("bad", MIB), ("good", MIB)]),
            "f1",
            "",
            "Dataset",
        )
        .await
        .unwrap();

    let status = wait_for_drain(&mut fx.events, "f1").await;
    assert!(status.failed.contains("bad"));
    assert!(status.completed.contains("good"));
    assert_eq!(fx.transport.started(), vec!["bad", "good"]);

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_progress_notifications_stay_under_100() {
    let mut fx = fixture(
        CoordinatorConfig::default(),
        MockTransport {
            transfer_delay: Duration::from_millis(10),
            ..Default::default()
        },
    );

    fx.handle
        .coordinator
        .submit_upload(files(&[("a", 100)]), "f1", "", "Dataset")
        .await
        .unwrap();
    wait_for_drain(&mut fx.events, "f1").await;

    let pending: Vec<u8> = fx
        .registry
        .log()
        .into_iter()
        .filter(|record| record.background_task.status == TaskStatus::Pending)
        .map(|record| record.background_task.percent)
        .collect();

    // 50/100 -> 49, 100/100 held at 99 until the aggregator confirms
    assert_eq!(pending, vec![49, 99]);

    fx.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_batch_is_invalid() {
    let fx = fixture(CoordinatorConfig::default(), MockTransport::default());

    let result = fx
        .handle
        .coordinator
        .submit_upload(Vec::new(), "f1", "", "Dataset")
        .await;

    assert!(matches!(result, Err(UploadError::InvalidRequest(_))));
    fx.handle.shutdown().await.unwrap();
}
