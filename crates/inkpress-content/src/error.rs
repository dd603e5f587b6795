use std::path::PathBuf;

/// Errors raised while fetching or persisting content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Missing CMS setting: {0}")]
    MissingSetting(&'static str),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("CMS returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Unexpected CMS response from {url}: {message}")]
    Payload { url: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
