//! Notes Bridge - Main Server
//!
//! Keeps a document database and a note store mirrored in both directions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notes_bridge::{AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notes-bridge")]
#[command(about = "Bidirectional document/note sync")]
struct Cli {
    /// YAML config file (defaults to ./config.yaml)
    #[arg(long, global = true, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server and the background poll loop
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep mappings in memory only (development)
        #[arg(long)]
        memory: bool,
    },

    /// Run one poll cycle against the note store and exit
    Poll,

    /// Reconcile a single document from the document store
    Push {
        /// Document id on the left side
        left_id: String,
    },

    /// Inspect or repair stored mappings
    Mappings {
        #[command(subcommand)]
        command: MappingCommands,
    },
}

#[derive(Subcommand)]
enum MappingCommands {
    /// Print every mapping as JSON lines
    List,
    /// Forget the mapping for a left document
    Delete { left_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notes_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, memory } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            notes_bridge::start_server(config, memory).await
        }
        Commands::Poll => run_poll(config).await,
        Commands::Push { left_id } => run_push(config, &left_id).await,
        Commands::Mappings { command } => run_mappings(config, command).await,
    }
}

async fn run_poll(config: Config) -> Result<()> {
    let state = AppState::new(config).await?;
    let summary = state
        .poller
        .run_cycle()
        .await
        .context("Poll cycle failed")?;

    tracing::info!(
        "Poll complete: {} processed ({} created, {} updated, {} skipped), {} errors",
        summary.processed_count,
        summary.created_count,
        summary.updated_count,
        summary.skipped_count,
        summary.errors.len()
    );
    for err in &summary.errors {
        tracing::warn!(note_id = %err.id, "{}", err.message);
    }

    Ok(())
}

async fn run_push(config: Config, left_id: &str) -> Result<()> {
    let state = AppState::new(config).await?;
    let outcome = state
        .pusher
        .push_document(left_id)
        .await
        .with_context(|| format!("Failed to push {}", left_id))?;
    tracing::info!(left_id, "Push result: {:?}", outcome);
    Ok(())
}

async fn run_mappings(config: Config, command: MappingCommands) -> Result<()> {
    let state = AppState::new(config).await?;
    match command {
        MappingCommands::List => {
            let mut mappings = state.store.list_all().await?;
            mappings.sort_by(|a, b| a.left_id.cmp(&b.left_id));
            for mapping in mappings {
                println!("{}", serde_json::to_string(&mapping)?);
            }
        }
        MappingCommands::Delete { left_id } => {
            if state.store.get(&left_id).await?.is_none() {
                anyhow::bail!("No mapping for {}", left_id);
            }
            state.store.delete(&left_id).await?;
            tracing::info!(left_id = %left_id, "Deleted mapping");
        }
    }
    Ok(())
}
