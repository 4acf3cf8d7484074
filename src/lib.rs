pub mod chunk;
pub mod client;
pub mod config;
mod coordinator;
mod coordinator_worker;
pub mod errors;
pub mod notify;
pub mod retry;
pub mod status;
pub mod transport;
pub mod types;
mod worker;

pub use chunk::{CHUNK_RETRY_DELAYS, chunk_size_for};
pub use client::{ChunkClient, ChunkClientConfig};
pub use config::CoordinatorConfig;
pub use coordinator::{CoordinatorHandle, UploadCoordinator};
pub use errors::{Result, UploadError};
pub use notify::{
    BackgroundTask, InMemoryRegistry, Notification, NotificationRegistry, Notifier, TaskStatus,
};
pub use status::{SettleOutcome, StatusStore, UploadStatus};
pub use transport::{ProgressFn, UploadTransport};
pub use types::{FileSpec, RequestId, UploadEvent, UploadRequest};
