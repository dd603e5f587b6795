//! Build and push to the static-pages branch.

use anyhow::{Context, Result};

use inkpress_content::ContentSource;
use inkpress_publish::{PagesConfig, PagesPublisher};

use crate::config::Settings;

/// Run the deploy command.
pub async fn run<S: ContentSource>(settings: &Settings, source: S) -> Result<()> {
    let mut pages = settings.pages.clone();
    if pages.remote.is_empty() {
        let project = std::env::current_dir().context("Failed to read working directory")?;
        pages.remote = PagesConfig::origin_url(&project)
            .context("No pages.remote configured and no origin remote found")?;
    }

    let result = super::build::run(settings, source).await?;

    let output = result.output_dir.clone();
    let branch = pages.branch.clone();
    let commit = tokio::task::spawn_blocking(move || PagesPublisher::new(pages).publish(&output))
        .await??;

    tracing::info!("Deployed {} to {} as {}", result.output_dir.display(), branch, commit);
    Ok(())
}
