use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Upload of {path} rejected with HTTP {status}")]
    HttpStatus { status: u16, path: String },

    #[error("Upload of {path} failed: {source}")]
    Http {
        path: String,
        source: reqwest::Error,
    },
}
