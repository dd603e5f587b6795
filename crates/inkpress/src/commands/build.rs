//! Static site build command.

use anyhow::Result;
use inkpress_content::ContentSource;
use inkpress_static::{BuildResult, StaticBuilder};

use crate::config::Settings;

/// Run the build command.
pub async fn run<S: ContentSource>(settings: &Settings, source: S) -> Result<BuildResult> {
    tracing::info!("Building site from {}", settings.build.src_dir.display());

    let result = StaticBuilder::new(settings.build.clone(), source)
        .build()
        .await?;
    report(&result);

    Ok(result)
}

/// Log a build summary.
pub fn report(result: &BuildResult) {
    tracing::info!(
        "Built {} entries, {} pages and {} stylesheets in {}ms",
        result.entries,
        result.pages,
        result.stylesheets,
        result.duration_ms
    );
    tracing::info!("Output: {}", result.output_dir.display());
}
