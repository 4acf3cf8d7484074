use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("File '{file}' is {size} bytes, exceeding the upload limit of {limit} bytes")]
    PayloadTooLarge { file: String, size: u64, limit: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server { status_code: u16, message: String },

    #[error("Upload incomplete expected: {expected}, actual: {actual}")]
    UploadIncomplete { expected: u64, actual: u64 },

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Header '{header_name}' parse error: {message}")]
    HeaderParse {
        header_name: String,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Coordinator shut down")]
    Shutdown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    /// Whether a chunk-level retry may recover from this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Io(_) | Self::Server { .. } | Self::UploadIncomplete { .. }
        )
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
