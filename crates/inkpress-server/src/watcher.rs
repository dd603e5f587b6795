//! File watching for rebuilds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tokio::sync::mpsc;

use crate::server::ServerError;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Source files were created, modified, renamed or removed
    Changed(Vec<PathBuf>),

    /// The watcher backend reported an error
    Error(String),
}

/// Watches source directories and forwards debounced changes.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Watch `paths` recursively, skipping anything under `ignored`.
    ///
    /// Returns the watcher and a channel to receive events. Events stop when
    /// the watcher is dropped.
    pub fn new(
        paths: &[PathBuf],
        ignored: &[PathBuf],
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>), ServerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let ignored: Vec<PathBuf> = ignored
            .iter()
            .map(|p| {
                p.canonicalize()
                    .or_else(|_| std::path::absolute(p))
                    .unwrap_or_else(|_| p.clone())
            })
            .collect();

        let callback = move |result: DebounceEventResult| match result {
            Ok(events) => {
                let mut changed: Vec<PathBuf> = events
                    .iter()
                    .filter(|event| is_relevant_event(&event.kind))
                    .flat_map(|event| event.paths.iter())
                    .filter(|path| !is_ignored(path, &ignored))
                    .cloned()
                    .collect();
                changed.sort();
                changed.dedup();

                if !changed.is_empty() {
                    let _ = tx.send(WatchEvent::Changed(changed));
                }
            }
            Err(errors) => {
                for e in errors {
                    let _ = tx.send(WatchEvent::Error(e.to_string()));
                }
            }
        };

        let mut debouncer = new_debouncer(debounce, None, callback)
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        for path in paths {
            if path.exists() {
                debouncer
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(|e| ServerError::WatchError(e.to_string()))?;
                tracing::debug!("Watching {}", path.display());
            } else {
                tracing::warn!("Not watching missing directory {}", path.display());
            }
        }

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}

fn is_ignored(path: &Path, ignored: &[PathBuf]) -> bool {
    let hidden = path
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'));
    if hidden {
        return true;
    }
    ignored.iter().any(|prefix| path.starts_with(prefix))
}

fn is_relevant_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
    )
}
