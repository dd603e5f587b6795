//! Object-storage upload of an output tree.

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use futures_util::{stream, StreamExt, TryStreamExt};
use walkdir::WalkDir;

use crate::error::PublishError;

/// A bucket-like destination accepting whole objects.
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` with the given content type.
    fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Summary of an upload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files: usize,
    pub bytes: u64,
}

/// Content type for a file, inferred from its extension.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Upload every regular file under `root`, keyed by its path relative to
/// `root` with `/` separators. At most `concurrency` uploads are in flight.
pub async fn upload_tree<T: ObjectStore>(
    store: &T,
    root: &Path,
    concurrency: usize,
) -> Result<UploadReport, PublishError> {
    if !root.is_dir() {
        return Err(PublishError::MissingOutput(root.to_path_buf()));
    }

    let files = collect_files(root)?;
    tracing::info!("Uploading {} files from {}", files.len(), root.display());

    let sizes: Vec<u64> = stream::iter(files)
        .map(|(path, key)| async move {
            let body = tokio::fs::read(&path)
                .await
                .map_err(|source| PublishError::Io {
                    path: path.clone(),
                    source,
                })?;
            let size = body.len() as u64;
            let content_type = content_type_for(&path);

            store.put_object(&key, body, &content_type).await?;
            tracing::debug!("Uploaded {} ({}, {} bytes)", key, content_type, size);
            Ok::<_, PublishError>(size)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(UploadReport {
        files: sizes.len(),
        bytes: sizes.iter().sum(),
    })
}

/// Regular files under `root` paired with their object keys.
fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>, PublishError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push((entry.path().to_path_buf(), object_key(relative)));
    }
    Ok(files)
}

fn object_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
