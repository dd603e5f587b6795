//! inkpress CLI - static sites from headless-CMS content.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;
mod source;

use config::Settings;
use source::SiteSource;

#[derive(Parser)]
#[command(name = "inkpress")]
#[command(about = "Static sites from headless-CMS content")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to inkpress.toml config file
    #[arg(short, long, global = true, default_value = "inkpress.toml")]
    config: PathBuf,

    /// Build from a saved content document instead of the CMS
    #[arg(long, global = true)]
    content_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site (default)
    Build {
        /// Output directory (defaults to config or "dist")
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build, serve and rebuild on change
    Dev {
        /// Port to listen on (defaults to config or 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open the site in a browser
        #[arg(long)]
        open: bool,
    },

    /// Build and upload the output to S3
    Release,

    /// Build and push the output to the pages branch
    Deploy,

    /// Remove the output directory
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    config::load_dotenv()?;
    let mut settings = Settings::load(&cli.config)?;

    let command = cli.command.unwrap_or(Commands::Build { output: None });

    match command {
        Commands::Build { output } => {
            if let Some(output) = output {
                settings.set_output_dir(output);
            }
            let source = SiteSource::open(&settings, cli.content_file.as_deref()).await?;
            commands::build::run(&settings, source).await?;
        }
        Commands::Dev { port, open } => {
            if let Some(port) = port {
                settings.dev.port = port;
            }
            settings.dev.open |= open;
            let source = SiteSource::open(&settings, cli.content_file.as_deref()).await?;
            commands::dev::run(&settings, source).await?;
        }
        Commands::Release => {
            let source = SiteSource::open(&settings, cli.content_file.as_deref()).await?;
            commands::release::run(&settings, source).await?;
        }
        Commands::Deploy => {
            let source = SiteSource::open(&settings, cli.content_file.as_deref()).await?;
            commands::deploy::run(&settings, source).await?;
        }
        Commands::Clean => {
            commands::clean::run(&settings).await?;
        }
    }

    Ok(())
}
