//! The rebuild loop: the single consumer of watch events.

use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::watcher::WatchEvent;

/// Wait for the next change and collect everything that follows it until the
/// channel has been quiet for `quiet`.
///
/// Returns `None` once the channel is closed and drained.
pub async fn next_batch(
    rx: &mut UnboundedReceiver<WatchEvent>,
    quiet: Duration,
) -> Option<Vec<PathBuf>> {
    let mut batch = Vec::new();

    loop {
        match rx.recv().await? {
            WatchEvent::Changed(paths) => {
                batch.extend(paths);
                break;
            }
            WatchEvent::Error(message) => tracing::warn!("Watch error: {}", message),
        }
    }

    loop {
        match tokio::time::timeout(quiet, rx.recv()).await {
            Ok(Some(WatchEvent::Changed(paths))) => batch.extend(paths),
            Ok(Some(WatchEvent::Error(message))) => tracing::warn!("Watch error: {}", message),
            Ok(None) | Err(_) => break,
        }
    }

    batch.sort();
    batch.dedup();
    Some(batch)
}

/// Run `rebuild` once per coalesced batch of changes until the channel
/// closes. Rebuilds never overlap; failures are logged and the loop keeps
/// going. Returns the number of rebuilds attempted.
pub async fn rebuild_loop<F, Fut, E>(
    mut rx: UnboundedReceiver<WatchEvent>,
    quiet: Duration,
    mut rebuild: F,
) -> usize
where
    F: FnMut(Vec<PathBuf>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut rebuilds = 0;

    while let Some(changed) = next_batch(&mut rx, quiet).await {
        tracing::info!("{} file(s) changed, rebuilding", changed.len());
        rebuilds += 1;

        if let Err(e) = rebuild(changed).await {
            tracing::error!("Rebuild failed: {}", e);
        }
    }

    rebuilds
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn changed(name: &str) -> WatchEvent {
        WatchEvent::Changed(vec![PathBuf::from(name)])
    }

    #[tokio::test]
    async fn coalesces_bursts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["a", "b", "a", "c"] {
            tx.send(changed(name)).unwrap();
        }
        tx.send(WatchEvent::Error("overflow".to_string())).unwrap();
        drop(tx);

        let batch = next_batch(&mut rx, Duration::from_millis(50)).await;

        assert_eq!(
            batch,
            Some(vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")])
        );
        assert_eq!(next_batch(&mut rx, Duration::from_millis(50)).await, None);
    }

    #[tokio::test]
    async fn rebuilds_once_per_quiet_window() {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tx.send(changed("a")).unwrap();
            tx.send(changed("b")).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            tx.send(changed("c")).unwrap();
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let rebuilds = rebuild_loop(rx, Duration::from_millis(50), move |paths| {
            record.lock().unwrap().push(paths.len());
            async { Ok::<_, String>(()) }
        })
        .await;

        assert_eq!(rebuilds, 2);
        assert_eq!(*seen.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn keeps_running_after_failed_rebuild() {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tx.send(changed("broken.css")).unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            tx.send(changed("fixed.css")).unwrap();
        });

        let mut attempts = 0;
        let rebuilds = rebuild_loop(rx, Duration::from_millis(50), |_| {
            attempts += 1;
            let result = if attempts == 1 {
                Err("stylesheet failed to compile")
            } else {
                Ok(())
            };
            async move { result }
        })
        .await;

        assert_eq!(rebuilds, 2);
        assert_eq!(attempts, 2);
    }
}
