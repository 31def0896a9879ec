//! `loopcast` CLI - run and inspect the looping live stream

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loopcast::{AppConfig, OverlayOverrides};

#[derive(Parser)]
#[command(name = "loopcast")]
#[command(about = "Keep a looping video+audio stream on air with timed overlays and chat engagement")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/loopcast/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control surface
    Serve {
        /// Listen port (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Start streaming right away instead of waiting for POST /stream/start
        #[arg(long)]
        autostart: bool,
    },

    /// Print the compiled filter graph and encoder command line
    Graph {
        /// Track title shown in the overlay
        #[arg(long)]
        title: Option<String>,

        /// Track artist shown in the overlay
        #[arg(long)]
        artist: Option<String>,

        /// Leave out the call-to-action overlay
        #[arg(long)]
        no_cta: bool,
    },

    /// Validate media paths, destination and ffmpeg availability
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, autostart } => {
            if let Some(port) = port {
                config.port = port;
            }
            cmd::serve::cmd_serve(config, autostart).await?;
        }
        Commands::Graph { title, artist, no_cta } => {
            let overrides = OverlayOverrides {
                title,
                artist,
                show_cta: no_cta.then_some(false),
                ..OverlayOverrides::default()
            };
            cmd::graph::cmd_graph(&config, &overrides)?;
        }
        Commands::Check => {
            cmd::check::cmd_check(&config).await?;
        }
    }

    Ok(())
}
