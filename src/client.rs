use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use url::Url;
use crate::chunk::{CHUNK_RETRY_DELAYS, chunk_size_for};
use crate::errors::{Result, UploadError};
use crate::transport::{ProgressFn, UploadTransport};
use crate::types::FileSpec;

const UPLOAD_PROTOCOL_VERSION: &str = "1.0.0";
const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ChunkClientConfig {
    /// Storage proxy base endpoint, e.g. `https://storage.example.com`.
    pub endpoint: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub tcp_nodelay: bool,
}

impl Default for ChunkClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: None,
            timeout: Duration::from_secs(300),
            tcp_nodelay: true,
        }
    }
}

/// Resumable chunked-upload client against a tus-style storage proxy.
///
/// Session state lives entirely on the server; nothing is persisted here,
/// so a process restart loses in-flight progress.
#[derive(Debug, Clone)]
pub struct ChunkClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl ChunkClient {
    pub fn new(config: ChunkClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .tcp_nodelay(config.tcp_nodelay)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            token: config.token,
        })
    }

    fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Tus-Resumable",
            HeaderValue::from_static(UPLOAD_PROTOCOL_VERSION),
        );
        if let Some(token) = &self.token {
            headers.insert("Authorization", HeaderValue::from_str(token)?);
        }

        Ok(headers)
    }

    fn session_endpoint(&self, folder_id: &str) -> String {
        format!(
            "{}/folders/{}/upload",
            self.endpoint.trim_end_matches('/'),
            folder_id
        )
    }

    /// `Location` headers may be origin-relative; resolve them against the
    /// configured endpoint.
    fn resolve_location(&self, location: &str) -> Result<String> {
        if location.starts_with("http") {
            return Ok(location.to_string());
        }

        let url = Url::parse(&self.endpoint)
            .map_err(|_| UploadError::Config(format!("invalid endpoint: {:?}", self.endpoint)))?;
        let origin = url.origin().ascii_serialization();

        Ok(format!("{}{}", origin, location))
    }

    fn parse_offset_header(status: u16, headers: &HeaderMap) -> Result<u64> {
        match headers.get("Upload-Offset") {
            Some(value) => {
                let offset = value
                    .to_str()
                    .map_err(|err| UploadError::HeaderParse {
                        header_name: "Upload-Offset".to_string(),
                        message: err.to_string(),
                    })?
                    .parse::<u64>()
                    .map_err(|err| UploadError::HeaderParse {
                        header_name: "Upload-Offset".to_string(),
                        message: err.to_string(),
                    })?;

                Ok(offset)
            }
            None => Err(UploadError::server_error(
                status,
                "No 'Upload-Offset' header in response",
            )),
        }
    }

    /// Pull a human-readable message out of an error body, which the proxy
    /// usually serves as `{"msg": "..."}`.
    async fn error_body(response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("msg")?.as_str().map(str::to_string))
            .unwrap_or(body)
    }

    async fn upload_offset(&self, session_url: &str) -> Result<u64> {
        let headers = self.base_headers()?;
        let response = self.client.head(session_url).headers(headers).send().await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            return Err(UploadError::server_error(
                status.as_u16(),
                "Failed to get upload offset",
            ));
        }

        Self::parse_offset_header(status.as_u16(), response.headers())
    }

    async fn send_chunk(
        &self,
        session_url: &str,
        source: &Path,
        offset: u64,
        len: u64,
    ) -> Result<u64> {
        let mut file = File::open(source)
            .await
            .with_context(|| format!("Failed to open file: {}", source.display()))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let stream = ReaderStream::with_capacity(file.take(len), READ_BUFFER_SIZE);

        let mut headers = self.base_headers()?;
        headers.insert("Upload-Offset", HeaderValue::from_str(&offset.to_string())?);
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/offset+octet-stream"),
        );
        headers.insert("Content-Length", HeaderValue::from_str(&len.to_string())?);

        let response = self
            .client
            .patch(session_url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let message = Self::error_body(response).await;
            return Err(UploadError::server_error(status.as_u16(), message));
        }

        Self::parse_offset_header(status.as_u16(), response.headers())
    }
}

#[async_trait]
impl UploadTransport for ChunkClient {
    async fn create_session(&self, folder_id: &str, path: &str, file: &FileSpec) -> Result<String> {
        let mut headers = self.base_headers()?;
        headers.insert(
            "Upload-Length",
            HeaderValue::from_str(&file.size.to_string())?,
        );
        headers.insert(
            "Upload-Metadata",
            HeaderValue::from_str(&format!("filename {}", BASE64_STANDARD.encode(path)))?,
        );

        let response = self
            .client
            .post(self.session_endpoint(folder_id))
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let message = Self::error_body(response).await;
            return Err(UploadError::server_error(status.as_u16(), message));
        }

        let location = match response.headers().get("location") {
            Some(location) => location
                .to_str()
                .map_err(|err| UploadError::HeaderParse {
                    header_name: "Location".to_string(),
                    message: err.to_string(),
                })?
                .to_string(),
            None => {
                return Err(UploadError::server_error(
                    status.as_u16(),
                    "No 'Location' header in response",
                ));
            }
        };

        self.resolve_location(&location)
    }

    async fn transfer(
        &self,
        session_url: &str,
        file: &FileSpec,
        progress: ProgressFn,
    ) -> Result<()> {
        let file_size = file.size;
        let chunk_size = self.chunk_size(file_size);

        let mut offset = self.upload_offset(session_url).await?;
        if offset >= file_size {
            progress(file_size, file_size, &file.name);
            return Ok(());
        }

        while offset < file_size {
            // Each attempt re-checks the server offset so a chunk retry
            // resumes from whatever the server actually received.
            let next = crate::retry::retry_with_schedule(&CHUNK_RETRY_DELAYS, || async move {
                let offset = self.upload_offset(session_url).await?;
                if offset >= file_size {
                    return Ok(file_size);
                }
                let len = chunk_size.min(file_size - offset);
                self.send_chunk(session_url, &file.source, offset, len).await
            })
            .await?;

            if next <= offset {
                return Err(UploadError::UploadIncomplete {
                    expected: file_size,
                    actual: next,
                });
            }

            offset = next;
            progress(offset, file_size, &file.name);
        }

        Ok(())
    }

    fn chunk_size(&self, total_bytes: u64) -> u64 {
        chunk_size_for(total_bytes)
    }
}
