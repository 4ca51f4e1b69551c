//! `streamgate` CLI - Inspect, download and relay streams

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamgate")]
#[command(about = "Negotiate, keep alive and download streams from video, live and radio sites")]
#[command(version)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/streamgate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cookie header to send, e.g. "user_session=..."
    #[arg(long, global = true)]
    cookies: Option<String>,

    /// Extra session-creation attempts on HTTP 500/503/404
    #[arg(long, global = true)]
    retries: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata and formats as JSON
    Info {
        /// Page URL (or nico:<id>)
        url: String,
    },

    /// Download one format to a file, or every video of a playlist
    Download {
        /// Page URL (or nico:<id>)
        url: String,

        /// Output file (a directory for playlists)
        #[arg(short, long)]
        output: PathBuf,

        /// Format id to download (default: best)
        #[arg(short = 'f', long)]
        format: Option<String>,
    },

    /// Resolve a live broadcast's playlist URL
    LiveUrl {
        /// Live page URL (or nico:lv<id>)
        url: String,

        /// Live quality (abr, super_low, low, normal, high, super_high)
        #[arg(short, long)]
        quality: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "streamgate=debug" } else { "streamgate=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = match &cli.config {
        Some(path) => streamgate::config::load_from(path)?,
        None => streamgate::config::load()?,
    };
    if let Some(cookies) = cli.cookies {
        config.cookies = Some(cookies);
    }
    if let Some(retries) = cli.retries {
        config.extractor_retries = retries;
    }

    let ctx = cmd::Context::new(config)?;

    match cli.command {
        Commands::Info { url } => cmd::info::cmd_info(&ctx, &url).await?,
        Commands::Download {
            url,
            output,
            format,
        } => cmd::download::cmd_download(&ctx, &url, &output, format.as_deref()).await?,
        Commands::LiveUrl { url, quality } => {
            cmd::live_url::cmd_live_url(&ctx, &url, quality.as_deref()).await?;
        }
    }

    Ok(())
}
