//! Notes Bridge
//!
//! Bidirectional sync between an event-sourced document store (webhooks)
//! and a poll-only note store:
//! - Durable left/right mapping store (SQLite)
//! - Cooldown guard against echo loops
//! - Reconciler driven by webhook pushes and periodic polls
//! - HTTP surface for webhooks, manual triggers and mapping repair

pub mod api;
pub mod error;
pub mod http;
pub mod keep;
pub mod mapping;
pub mod notion;
pub mod sync;
pub mod translate;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use keep::{KeepClient, NoteApi};
use mapping::{MappingStore, MemoryMappingStore, SqliteMappingStore};
use notion::{DocumentApi, NotionClient};
use sync::{PollDriver, PushDriver, Reconciler, ReconcilerSettings};
use translate::DefaultTranslator;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub left: LeftYamlConfig,
    pub right: RightYamlConfig,
    pub sync: SyncYamlConfig,
    pub store: StoreYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Document store (push side) section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeftYamlConfig {
    pub api_url: String,
    pub token: String,
    pub api_version: String,
    /// Database new documents are created under; also scopes webhooks
    pub parent_id: Option<String>,
    pub title_property: String,
    pub body_property: String,
    /// Shared secret for webhook signatures; unsigned deliveries are accepted when absent
    pub webhook_secret: Option<String>,
}

impl Default for LeftYamlConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.notion.com".into(),
            token: String::new(),
            api_version: "2022-06-28".into(),
            parent_id: None,
            title_property: "Name".into(),
            body_property: "Content".into(),
            webhook_secret: None,
        }
    }
}

/// Note store (poll side) section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RightYamlConfig {
    pub api_url: String,
    pub token: String,
}

impl Default for RightYamlConfig {
    fn default() -> Self {
        Self {
            api_url: "https://keep.googleapis.com".into(),
            token: String::new(),
        }
    }
}

/// Sync tuning section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncYamlConfig {
    pub cooldown_ms: u64,
    pub poll_interval_secs: u64,
    pub poll_concurrency: usize,
    pub request_timeout_secs: u64,
}

impl Default for SyncYamlConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 30_000,
            poll_interval_secs: 300,
            poll_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

/// Mapping store section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreYamlConfig {
    pub path: String,
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            path: "notes-bridge.db".into(),
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub left_api_url: String,
    pub left_token: String,
    pub left_api_version: String,
    pub left_parent_id: Option<String>,
    pub left_title_property: String,
    pub left_body_property: String,
    pub left_webhook_secret: Option<String>,
    pub right_api_url: String,
    pub right_token: String,
    pub cooldown_ms: u64,
    pub poll_interval_secs: u64,
    pub poll_concurrency: usize,
    pub request_timeout_secs: u64,
    pub store_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);
        let mut config = Self::from_yaml(yaml);

        config.server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.server_port);
        config.left_api_url = std::env::var("LEFT_API_URL").unwrap_or(config.left_api_url);
        config.left_token = std::env::var("LEFT_API_TOKEN").unwrap_or(config.left_token);
        config.left_parent_id = non_empty_env("LEFT_PARENT_ID").or(config.left_parent_id);
        config.left_webhook_secret =
            non_empty_env("LEFT_WEBHOOK_SECRET").or(config.left_webhook_secret);
        config.right_api_url = std::env::var("RIGHT_API_URL").unwrap_or(config.right_api_url);
        config.right_token = std::env::var("RIGHT_API_TOKEN").unwrap_or(config.right_token);
        config.cooldown_ms = std::env::var("SYNC_COOLDOWN_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.cooldown_ms);
        config.poll_interval_secs = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.poll_interval_secs);
        config.store_path = std::env::var("STORE_PATH").unwrap_or(config.store_path);

        Ok(config)
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        Self {
            server_port: yaml.server.port,
            left_api_url: yaml.left.api_url,
            left_token: yaml.left.token,
            left_api_version: yaml.left.api_version,
            left_parent_id: yaml.left.parent_id,
            left_title_property: yaml.left.title_property,
            left_body_property: yaml.left.body_property,
            left_webhook_secret: yaml.left.webhook_secret,
            right_api_url: yaml.right.api_url,
            right_token: yaml.right.token,
            cooldown_ms: yaml.sync.cooldown_ms,
            poll_interval_secs: yaml.sync.poll_interval_secs,
            poll_concurrency: yaml.sync.poll_concurrency,
            request_timeout_secs: yaml.sync.request_timeout_secs,
            store_path: yaml.store.path,
        }
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

// ============================================================================
// Shared application state
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MappingStore>,
    pub poller: Arc<PollDriver>,
    pub pusher: Arc<PushDriver>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state backed by the SQLite store at `store_path`.
    ///
    /// Opening runs migrations, so it happens on the blocking pool.
    pub async fn new(config: Config) -> Result<Self> {
        let path = config.store_path.clone();
        let store = tokio::task::spawn_blocking(move || SqliteMappingStore::open(path))
            .await
            .context("Mapping store open task failed")?
            .with_context(|| format!("Failed to open mapping store at {}", config.store_path))?;
        Self::with_store(config, Arc::new(store))
    }

    /// Create application state with a throwaway in-process store
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryMappingStore::new()))
    }

    fn with_store(config: Config, store: Arc<dyn MappingStore>) -> Result<Self> {
        let documents = Arc::new(
            NotionClient::new(
                &config.left_api_url,
                &config.left_token,
                &config.left_api_version,
                &config.left_title_property,
                &config.left_body_property,
                config.request_timeout(),
            )
            .context("Failed to build document store client")?,
        );
        let notes = Arc::new(
            KeepClient::new(
                &config.right_api_url,
                &config.right_token,
                config.request_timeout(),
            )
            .context("Failed to build note store client")?,
        );
        Ok(Self::from_parts(config, store, documents, notes))
    }

    /// Wire the sync core over explicit collaborators
    pub fn from_parts(
        config: Config,
        store: Arc<dyn MappingStore>,
        documents: Arc<dyn DocumentApi>,
        notes: Arc<dyn NoteApi>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            documents.clone(),
            notes.clone(),
            Arc::new(DefaultTranslator),
            ReconcilerSettings {
                cooldown: config.cooldown(),
                call_timeout: config.request_timeout(),
                left_parent_id: config.left_parent_id.clone(),
            },
        ));
        let poller = Arc::new(PollDriver::new(
            notes,
            store.clone(),
            reconciler.clone(),
            config.poll_concurrency,
            config.request_timeout(),
        ));
        let pusher = Arc::new(PushDriver::new(
            documents,
            reconciler,
            config.left_parent_id.clone(),
            config.request_timeout(),
        ));

        Self {
            store,
            poller,
            pusher,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Run the HTTP surface and the background poll loop until ctrl-c.
///
/// `in_memory` swaps the SQLite store for a throwaway one (dev runs).
pub async fn start_server(config: Config, in_memory: bool) -> Result<()> {
    let port = config.server_port;
    let poll_interval = config.poll_interval();
    let state = if in_memory {
        tracing::warn!("Using an in-memory mapping store; mappings are lost on exit");
        AppState::in_memory(config)?
    } else {
        AppState::new(config).await?
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poll_loop = state.poller.clone().spawn_loop(poll_interval, shutdown_rx);
    tracing::info!(
        "Polling the note store every {}s",
        poll_interval.as_secs()
    );

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    // Let a running cycle finish so no write is left without its mapping
    shutdown_tx.send(true).ok();
    if let Err(e) = poll_loop.await {
        tracing::warn!("Poll loop ended abnormally: {}", e);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
