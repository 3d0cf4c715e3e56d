//! Uploader capability: hands produced files to the destination platform.
//!
//! Implementations must be safe to repeat for the same file. The controller
//! re-uploads every path of an item whose ledger write failed, so a
//! non-idempotent destination would see duplicates.

pub mod error;

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;

use crate::types::Platform;

pub use error::UploadError;

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<(), UploadError>;
}

/// Stand-in uploader that only logs the hand-off.
#[derive(Debug, Clone)]
pub struct LogUploader {
    platform: Platform,
}

impl LogUploader {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl Uploader for LogUploader {
    async fn upload(&self, path: &Path) -> Result<(), UploadError> {
        tracing::info!(platform = %self.platform, path = %path.display(), "Stub upload");
        Ok(())
    }
}

/// Posts the raw file bytes to an HTTP endpoint.
///
/// The endpoint receives the platform in `X-Platform` and the file name in
/// `X-File-Name`. Any non-2xx response is an error.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    platform: Platform,
}

impl HttpUploader {
    pub fn new(client: Client, endpoint: impl Into<String>, platform: Platform) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            platform,
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, path: &Path) -> Result<(), UploadError> {
        let shown = path.display().to_string();
        let body = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::Read {
                path: shown.clone(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Titles may carry characters a header value can't hold.
        let file_name = HeaderValue::from_str(&file_name)
            .unwrap_or_else(|_| HeaderValue::from_static("upload.bin"));

        tracing::debug!(path = %shown, bytes = body.len(), endpoint = %self.endpoint, "Uploading");
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("X-Platform", self.platform.as_str())
            .header("X-File-Name", file_name)
            .body(body)
            .send()
            .await
            .map_err(|source| UploadError::Http {
                path: shown.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::HttpStatus {
                status: status.as_u16(),
                path: shown,
            });
        }
        tracing::info!(platform = %self.platform, path = %shown, "Uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;

    type Seen = Arc<Mutex<Vec<(String, String, usize)>>>;

    async fn receive(State(seen): State<Seen>, headers: HeaderMap, body: axum::body::Bytes) -> StatusCode {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        seen.lock()
            .unwrap()
            .push((header("x-platform"), header("x-file-name"), body.len()));
        StatusCode::CREATED
    }

    async fn spawn_receiver(seen: Seen) -> String {
        let app = Router::new()
            .route("/upload", post(receive))
            .route("/broken", post(|| async { StatusCode::BAD_GATEWAY }))
            .with_state(seen);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_log_uploader_succeeds() {
        let up = LogUploader::new(Platform::Tiktok);
        up.upload(Path::new("/nowhere/a.mp4")).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_uploader_sends_file() {
        let seen: Seen = Arc::default();
        let base = spawn_receiver(seen.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"0123456789").unwrap();

        let up = HttpUploader::new(Client::new(), format!("{base}/upload"), Platform::Bilibili);
        up.upload(&file).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![("bilibili".to_string(), "clip.mp4".to_string(), 10)]);
    }

    #[tokio::test]
    async fn test_http_uploader_rejects_non_success() {
        let base = spawn_receiver(Arc::default()).await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"x").unwrap();

        let up = HttpUploader::new(Client::new(), format!("{base}/broken"), Platform::Bilibili);
        let err = up.upload(&file).await.unwrap_err();
        assert!(matches!(err, UploadError::HttpStatus { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_http_uploader_missing_file() {
        let up = HttpUploader::new(Client::new(), "http://127.0.0.1:9/upload", Platform::Tiktok);
        let err = up.upload(Path::new("/nonexistent/clip.mp4")).await.unwrap_err();
        match err {
            UploadError::Read { path, .. } => assert_eq!(path, "/nonexistent/clip.mp4"),
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
