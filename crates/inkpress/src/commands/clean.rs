//! Remove build output.

use std::io;

use anyhow::{Context, Result};

use crate::config::Settings;

/// Run the clean command.
pub async fn run(settings: &Settings) -> Result<()> {
    settings.build.check_output_dir()?;
    let output = &settings.build.output_dir;

    match tokio::fs::remove_dir_all(output).await {
        Ok(()) => tracing::info!("Removed {}", output.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("Nothing to clean at {}", output.display())
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", output.display())),
    }

    Ok(())
}
