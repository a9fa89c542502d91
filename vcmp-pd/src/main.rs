//! Program Director (vcmp-pd) - debugging CLI
//!
//! Runs single resolution and recommendation requests against the configured
//! audio server and AI providers, printing the results as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use vcmp_common::config::TomlConfig;
use vcmp_common::logging::init_tracing;
use vcmp_common::{CanonicalTrackDescriptor, Requester};
use vcmp_pd::recommendation::RecommendationOptions;
use vcmp_pd::Engine;

/// Command-line arguments for vcmp-pd
#[derive(Parser, Debug)]
#[command(name = "vcmp-pd")]
#[command(about = "Program Director for VCMP: resolution and autoplay engine")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a link or free-text query into playable tracks
    Resolve {
        /// Query as a user would type it after /play
        query: Vec<String>,
    },

    /// Ask the recommendation providers for tracks similar to a seed
    Recommend {
        #[arg(long)]
        artist: String,

        #[arg(long)]
        title: String,

        /// Number of recommendations (defaults to the configured count)
        #[arg(long)]
        count: Option<usize>,
    },

    /// Print the health of every configured recommendation provider
    Providers,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize tracing")?;

    // Cooperative scheduling on a single thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(args.command, config))
}

async fn run(command: Command, config: TomlConfig) -> Result<()> {
    let engine = Engine::from_config(&config).context("Failed to initialize program director")?;

    match command {
        Command::Resolve { query } => {
            let query = query.join(" ");
            info!(query = %query, "Resolving");

            let result = engine
                .resolver
                .resolve(&query, Requester::User("cli".to_string()))
                .await;

            if result.is_empty() {
                println!("No playable match found for '{}'", query);
                return Ok(());
            }

            let output = json!({
                "kind": format!("{:?}", result.kind),
                "playlist_name": result.playlist_name,
                "tracks": result.tracks,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Recommend {
            artist,
            title,
            count,
        } => {
            let seed = CanonicalTrackDescriptor::new(artist, title);
            let options = RecommendationOptions {
                count: count.unwrap_or(config.recommendations.count),
            };

            let recommendations = engine
                .recommendations
                .try_get_recommendations(&seed, &[], options)
                .await
                .context("No provider produced recommendations")?;

            println!("{}", serde_json::to_string_pretty(&recommendations)?);
        }

        Command::Providers => {
            let snapshot = engine.recommendations.health_snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
