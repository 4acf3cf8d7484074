use std::sync::Arc;
use crate::errors::Result;
use crate::transport::{ProgressFn, UploadTransport};
use crate::types::FileSpec;

/// Runs one file's full transfer: session negotiation, then the chunked
/// upload. Resolves with the file's relative name so settlement can be
/// keyed by name.
pub(crate) struct TransferWorker {
    pub transport: Arc<dyn UploadTransport>,
}

impl TransferWorker {
    pub async fn run(
        self,
        folder_id: String,
        dest_path: String,
        file: FileSpec,
        progress: ProgressFn,
    ) -> Result<String> {
        let session_url = self
            .transport
            .create_session(&folder_id, &dest_path, &file)
            .await?;

        self.transport.transfer(&session_url, &file, progress).await?;

        Ok(file.name)
    }
}

/// Join the browse path with a file's relative name into the destination
/// path the session is negotiated for.
pub(crate) fn join_path(current_path: &str, name: &str) -> String {
    let base = current_path.trim_matches('/');
    let name = name.trim_start_matches('/');

    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}
