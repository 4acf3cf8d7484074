use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::status::UploadStatus;

pub const NOTIFICATION_KEY_PREFIX: &str = "upload:";

/// Background-task state carried by a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Resolved,
    Rejected,
}

/// Human-readable text per status, shown by whichever status is current.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusText {
    pub pending: Option<String>,
    pub resolved: Option<String>,
    pub rejected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub status: TaskStatus,
    pub percent: u8,
    pub on_change: StatusText,
}

/// One notification record per folder upload lifecycle, upserted by key.
/// Display is someone else's job; the coordinator only ever writes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub key: String,
    pub message: String,
    pub description: Option<String>,
    pub background_task: BackgroundTask,
    pub created_at: DateTime<Utc>,
}

/// Sink for notification records. Upserting an existing key replaces the
/// record in place.
pub trait NotificationRegistry: Send + Sync {
    fn upsert(&self, record: Notification);
}

/// Registry suitable for tests and headless embedding: keeps the latest
/// record per key plus the full upsert log.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: Mutex<HashMap<String, Notification>>,
    log: Mutex<Vec<Notification>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Notification> {
        self.records.lock().unwrap().get(key).cloned()
    }

    pub fn log(&self) -> Vec<Notification> {
        self.log.lock().unwrap().clone()
    }
}

impl NotificationRegistry for InMemoryRegistry {
    fn upsert(&self, record: Notification) {
        self.log.lock().unwrap().push(record.clone());
        self.records
            .lock()
            .unwrap()
            .insert(record.key.clone(), record);
    }
}

/// Progress percentage intentionally capped just under 100 so a folder never
/// reads 100% before the aggregator confirms completion.
pub fn progress_percent(bytes_uploaded: u64, bytes_total: u64) -> u8 {
    if bytes_total == 0 {
        return 0;
    }
    let rounded = (bytes_uploaded as f64 / bytes_total as f64 * 100.0).round() as i64;
    (rounded - 1).clamp(0, 99) as u8
}

pub fn notification_key(folder_id: &str) -> String {
    format!("{}{}", NOTIFICATION_KEY_PREFIX, folder_id)
}

/// Derives notification records from upload state transitions and pushes
/// them into the registry.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<dyn NotificationRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<dyn NotificationRegistry>) -> Self {
        Self { registry }
    }

    /// Byte-level progress for the file currently in flight.
    pub fn progress(
        &self,
        folder_id: &str,
        folder_name: &str,
        file_name: &str,
        bytes_uploaded: u64,
        bytes_total: u64,
    ) {
        self.registry.upsert(Notification {
            key: notification_key(folder_id),
            message: format!("Uploading files to {}", folder_name),
            description: None,
            background_task: BackgroundTask {
                status: TaskStatus::Pending,
                percent: progress_percent(bytes_uploaded, bytes_total),
                on_change: StatusText {
                    pending: Some(format!("Uploading {}", file_name)),
                    ..Default::default()
                },
            },
            created_at: Utc::now(),
        });
    }

    /// Batch rejected at intake: one record, no tasks were created.
    pub fn payload_too_large(&self, folder_id: &str, folder_name: &str, file: &str, limit: u64) {
        self.registry.upsert(Notification {
            key: notification_key(folder_id),
            message: format!("Failed to upload to {}", folder_name),
            description: Some(format!(
                "{} exceeds the maximum upload size of {} bytes",
                file, limit
            )),
            background_task: BackgroundTask {
                status: TaskStatus::Rejected,
                percent: 0,
                on_change: StatusText {
                    rejected: Some("Upload failed".to_string()),
                    ..Default::default()
                },
            },
            created_at: Utc::now(),
        });
    }

    /// Terminal evaluation for a drained folder, driven purely by the
    /// status snapshot so re-running it is harmless. Failures win: a mixed
    /// outcome is reported as rejected with the failed names enumerated.
    /// Returns false when there is nothing to report.
    pub fn terminal(&self, folder_id: &str, status: &UploadStatus) -> bool {
        debug_assert!(status.is_drained());

        let record = if !status.failed.is_empty() {
            let failed: Vec<&str> = status.failed.iter().map(String::as_str).collect();
            Notification {
                key: notification_key(folder_id),
                message: format!("Failed to upload to {}", status.folder_name),
                description: Some(failed.join(", ")),
                background_task: BackgroundTask {
                    status: TaskStatus::Rejected,
                    percent: 0,
                    on_change: StatusText {
                        rejected: Some("Upload failed".to_string()),
                        ..Default::default()
                    },
                },
                created_at: Utc::now(),
            }
        } else if !status.completed.is_empty() {
            Notification {
                key: notification_key(folder_id),
                message: format!("Successfully uploaded to {}", status.folder_name),
                description: None,
                background_task: BackgroundTask {
                    status: TaskStatus::Resolved,
                    percent: 100,
                    on_change: StatusText {
                        resolved: Some("Upload complete".to_string()),
                        ..Default::default()
                    },
                },
                created_at: Utc::now(),
            }
        } else {
            return false;
        };

        self.registry.upsert(record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_progress_percent_capped_under_100() {
        assert_eq!(progress_percent(0, 100), 0);
        assert_eq!(progress_percent(50, 100), 49);
        assert_eq!(progress_percent(100, 100), 99);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn test_progress_upsert_replaces_by_key() {
        let registry = Arc::new(InMemoryRegistry::new());
        let notifier = Notifier::new(registry.clone());

        notifier.progress("f1", "Dataset", "a", 10, 100);
        notifier.progress("f1", "Dataset", "a", 50, 100);

        assert_eq!(registry.log().len(), 2);
        let record = registry.get("upload:f1").unwrap();
        assert_eq!(record.background_task.percent, 49);
        assert_eq!(
            record.background_task.on_change.pending.as_deref(),
            Some("Uploading a")
        );
    }

    #[test]
    fn test_terminal_failures_win() {
        let registry = Arc::new(InMemoryRegistry::new());
        let notifier = Notifier::new(registry.clone());

        let status = UploadStatus {
            folder_name: "Dataset".to_string(),
            pending: BTreeSet::new(),
            completed: set(&["a"]),
            failed: set(&["b", "c"]),
        };
        assert!(notifier.terminal("f1", &status));

        let record = registry.get("upload:f1").unwrap();
        assert_eq!(record.background_task.status, TaskStatus::Rejected);
        assert_eq!(record.description.as_deref(), Some("b, c"));
        assert!(record.message.contains("Dataset"));
    }

    #[test]
    fn test_terminal_all_completed() {
        let registry = Arc::new(InMemoryRegistry::new());
        let notifier = Notifier::new(registry.clone());

        let status = UploadStatus {
            folder_name: "Dataset".to_string(),
            pending: BTreeSet::new(),
            completed: set(&["a"]),
            failed: BTreeSet::new(),
        };
        assert!(notifier.terminal("f1", &status));

        let record = registry.get("upload:f1").unwrap();
        assert_eq!(record.background_task.status, TaskStatus::Resolved);
        assert_eq!(record.background_task.percent, 100);
    }

    #[test]
    fn test_terminal_nothing_to_report() {
        let registry = Arc::new(InMemoryRegistry::new());
        let notifier = Notifier::new(registry.clone());

        assert!(!notifier.terminal("f1", &UploadStatus::default()));
        assert!(registry.get("upload:f1").is_none());
    }
}
