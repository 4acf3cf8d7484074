use std::path::PathBuf;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;
use crate::errors::Result;
use crate::status::UploadStatus;

/// Upload request unique identifier, used for logging and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One file in a batch. `name` is the path relative to the destination,
/// sub-directories included for folder drops. Files are tracked by name,
/// not by a generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    pub name: String,
    pub size: u64,
    pub source: PathBuf,
}

impl FileSpec {
    pub fn new(name: impl Into<String>, size: u64, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            size,
            source: source.into(),
        }
    }
}

/// One submission of files to a single destination folder. Consumed exactly
/// once by the execution queue, then discarded.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub id: RequestId,
    pub folder_id: String,
    pub folder_name: String,
    pub current_path: String,
    pub files: Vec<FileSpec>,
    pub created_at: DateTime<Utc>,
}

impl UploadRequest {
    pub fn new(
        files: Vec<FileSpec>,
        folder_id: impl Into<String>,
        current_path: impl Into<String>,
        folder_name: impl Into<String>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            folder_id: folder_id.into(),
            folder_name: folder_name.into(),
            current_path: current_path.into(),
            files,
            created_at: Utc::now(),
        }
    }
}

/// Coordinator commands
pub(crate) enum CoordinatorCommand {
    Submit {
        request: UploadRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    GetStatus {
        folder_id: String,
        reply: oneshot::Sender<Option<Arc<UploadStatus>>>,
    },
    SetStatus {
        folder_id: String,
        status: Option<UploadStatus>,
        reply: oneshot::Sender<()>,
    },
}

/// Coordinator events
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A batch passed admission and its files were queued.
    RequestAccepted {
        request_id: RequestId,
        folder_id: String,
        file_count: usize,
    },
    /// A file's transfer left the queue and started.
    FileStarted {
        folder_id: String,
        file_name: String,
    },
    /// A file's transfer settled successfully.
    FileCompleted {
        folder_id: String,
        file_name: String,
    },
    /// A file's transfer settled with an error.
    FileFailed {
        folder_id: String,
        file_name: String,
        error: String,
    },
    /// The folder's pending set drained; `status` is the terminal snapshot.
    FolderSettled {
        folder_id: String,
        status: Arc<UploadStatus>,
    },
}
