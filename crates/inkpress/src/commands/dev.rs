//! Development server command.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use inkpress_content::ContentSource;
use inkpress_server::{rebuild_loop, DevServer, FileWatcher};
use inkpress_static::StaticBuilder;

use crate::commands::build::report;
use crate::config::Settings;

/// Build once, serve the output and rebuild whenever the source tree changes.
pub async fn run<S: ContentSource>(settings: &Settings, source: S) -> Result<()> {
    let builder = Arc::new(Mutex::new(StaticBuilder::new(settings.build.clone(), source)));

    // failures are logged; the server starts regardless
    match builder.lock().await.build().await {
        Ok(result) => report(&result),
        Err(e) => tracing::error!("Initial build failed: {}", e),
    }

    let server = DevServer::new(settings.dev.clone()).bind().await?;
    let server = tokio::spawn(server.serve(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    }));

    let ignored = [settings.build.output_dir.clone(), settings.pages.workdir.clone()];
    let (watcher, rx) = FileWatcher::new(
        std::slice::from_ref(&settings.build.src_dir),
        &ignored,
        settings.debounce,
    )?;

    let rebuilds = rebuild_loop(rx, settings.debounce, |_changed| {
        let builder = Arc::clone(&builder);
        async move {
            let result = builder.lock().await.build().await?;
            report(&result);
            Ok::<_, inkpress_static::BuildError>(())
        }
    });

    tokio::select! {
        served = server => served??,
        _ = rebuilds => tracing::warn!("File watcher stopped"),
    }

    drop(watcher);
    Ok(())
}
