use std::sync::Arc;
use async_trait::async_trait;
use crate::chunk::chunk_size_for;
use crate::errors::Result;
use crate::types::FileSpec;

/// Byte-level progress callback: `(bytes_uploaded, bytes_total, file_name)`,
/// invoked at every chunk boundary.
pub type ProgressFn = Arc<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Storage-backend seam the execution queue drives. [`crate::ChunkClient`]
/// is the HTTP implementation; tests substitute their own.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Negotiate an upload session for `path` inside the destination
    /// folder, returning the session URL the chunks go to.
    async fn create_session(&self, folder_id: &str, path: &str, file: &FileSpec) -> Result<String>;

    /// Perform the resumable chunked transfer of the file's bytes.
    async fn transfer(&self, session_url: &str, file: &FileSpec, progress: ProgressFn)
    -> Result<()>;

    fn chunk_size(&self, total_bytes: u64) -> u64 {
        chunk_size_for(total_bytes)
    }
}
