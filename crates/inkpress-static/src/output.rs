//! Output path derivation.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Output file for an entry whose URL field is `url`.
///
/// `/blog/first-post` maps to `<output>/blog/first-post.html`. Returns `None`
/// if the URL would escape the output directory.
pub fn entry_output_path(output_dir: &Path, url: &str) -> Option<PathBuf> {
    let trimmed = url.trim_matches('/');
    let relative = if trimmed.is_empty() { "index" } else { trimmed };

    let is_safe = Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !is_safe {
        return None;
    }

    Some(output_dir.join(format!("{relative}.html")))
}

/// Output file for a page template, given its path relative to the pages
/// directory: the template extension is replaced by `.html`.
pub fn page_output_path(output_dir: &Path, relative: &Path, extension: &str) -> PathBuf {
    let file_name = relative
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(&format!(".{extension}"))
        .unwrap_or(file_name);

    output_dir
        .join(relative)
        .with_file_name(format!("{stem}.html"))
}

/// Absolute form of `path` with `.` and `..` removed lexically.
pub fn normalize_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Template name for a path relative to the templates directory, using `/`
/// separators as the template loader expects.
pub fn template_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
