use std::path::PathBuf;

/// Errors raised while publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Missing publish setting: {0}")]
    MissingSetting(&'static str),

    #[error("Output directory not found: {0}")]
    MissingOutput(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk output directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Push to {branch} was rejected: {message}")]
    PushRejected { branch: String, message: String },
}
