//! Build and upload to S3.

use anyhow::Result;

use inkpress_content::ContentSource;
use inkpress_publish::{upload_tree, S3Store};

use crate::config::Settings;

/// Run the release command.
pub async fn run<S: ContentSource>(settings: &Settings, source: S) -> Result<()> {
    // bucket settings are checked before building
    let store = S3Store::connect(&settings.s3).await?;

    let result = super::build::run(settings, source).await?;

    let report = upload_tree(&store, &result.output_dir, settings.s3_concurrency).await?;
    tracing::info!(
        "Uploaded {} files ({} bytes) to {}",
        report.files,
        report.bytes,
        settings.s3.bucket
    );

    Ok(())
}
