//! VK Video CLI - find a video and resolve a playable stream URL
//!
//! Searches the VK video catalogue, extracts stream URLs from embed player
//! pages and picks one for the preferred quality.

mod api;
mod auth;
mod commands;
mod config;
mod error;
mod models;
mod singleflight;
mod source;
mod stream;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "vkvideo-cli")]
#[command(about = "Search VK Video and resolve playable stream URLs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with VK (prints the authorization URL, then consumes the redirect)
    Login {
        /// Authorization code from the redirect
        #[arg(long)]
        code: Option<String>,

        /// State parameter from the redirect
        #[arg(long)]
        state: Option<String>,

        /// Full redirect URL (carries code and state)
        #[arg(long, conflicts_with_all = ["code", "state"])]
        redirect: Option<String>,

        /// Start a new login even if the stored token is valid
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Refresh the access token now
    Refresh,

    /// Search videos by title
    Search {
        /// Title to look for
        title: String,

        /// Release year appended to the query
        #[arg(short, long)]
        year: Option<u32>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = api::DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Resolve the stream of result N (1-based) instead of listing
        #[arg(short, long)]
        play: Option<usize>,

        /// Print results as JSON
        #[arg(long, conflicts_with = "play")]
        json: bool,
    },

    /// List the streams found on a player page
    Streams {
        /// Player page URL (from `search` output)
        player_url: String,

        /// Content id used as cache key (default: derived from the URL)
        #[arg(long)]
        id: Option<String>,

        /// Print the stream map as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the stream URL to play
    Play {
        /// Player page URL (from `search` output)
        player_url: String,

        /// Content id used as cache key (default: derived from the URL)
        #[arg(long)]
        id: Option<String>,

        /// Quality for this call only (default: stored preference)
        #[arg(short, long)]
        quality: Option<String>,
    },

    /// Show or change the preferred quality
    Quality {
        #[command(subcommand)]
        action: Option<QualityAction>,
    },
}

#[derive(Subcommand)]
enum QualityAction {
    /// Show the stored preference
    Show,
    /// Store a new preference (auto, 1080p, 720p, 480p, 360p or any label)
    Set { label: String },
    /// Go back to auto
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Login {
            code,
            state,
            redirect,
            force,
        } => {
            auth::login(code, state, redirect, force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Refresh => {
            auth::refresh().await?;
        }
        Commands::Search {
            title,
            year,
            limit,
            play,
            json,
        } => {
            commands::search(&title, year, limit, play, json).await?;
        }
        Commands::Streams {
            player_url,
            id,
            json,
        } => {
            commands::streams(&player_url, id, json).await?;
        }
        Commands::Play {
            player_url,
            id,
            quality,
        } => {
            commands::play(&player_url, id, quality).await?;
        }
        Commands::Quality { action } => match action.unwrap_or(QualityAction::Show) {
            QualityAction::Show => commands::quality_show().await?,
            QualityAction::Set { label } => {
                commands::quality_set(&label).await?;
            }
            QualityAction::Reset => commands::quality_reset().await?,
        },
    }

    Ok(())
}
