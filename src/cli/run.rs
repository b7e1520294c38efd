use super::config::{resolve_config_path, DealVaultConfig};
use super::logging;
use dealvault::engine::DealEngine;
use dealvault::messenger::{DealBot, StdioMessenger};
use dealvault::persistence::{JsonFileStore, MemoryStore, Store};
use std::path::PathBuf;
use tracing::info;

/// Run the bot service
///
/// Reads JSON-lines updates from stdin and writes outbound messages to
/// stdout until stdin closes or Ctrl-C. State is loaded from the data
/// directory at startup, autosaved on the configured interval and saved
/// once more on shutdown.
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `~/.local/share/dealvault/config.toml`
///
/// If the config file doesn't exist, a default one is generated.
/// `--data-dir` overrides `[storage] data_dir`; `--ephemeral` keeps
/// everything in memory.
pub async fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
    ephemeral: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Progress goes to stderr; stdout belongs to the transport
    eprintln!("🚀 Starting DealVault bot service...");

    let config_path = resolve_config_path(config_path);
    eprintln!("Config: {}", config_path.display());

    let config = DealVaultConfig::load_or_create(&config_path)?;
    logging::init(&config.logging)?;

    let data_dir = data_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.data_dir.clone());

    let store: Box<dyn Store> = if ephemeral {
        eprintln!("Store: in-memory (nothing is written to disk)");
        Box::new(MemoryStore::new())
    } else {
        eprintln!("Store: {}", data_dir.display());
        Box::new(JsonFileStore::open(&data_dir)?)
    };

    let engine = DealEngine::load_from(&*store, config.engine_config()?)?;
    info!(
        users = engine.users().len(),
        deals = engine.deals().len(),
        "state loaded"
    );

    let mut bot = DealBot::new(StdioMessenger::stdio(), engine, store, config.bot_config()?);
    bot.run().await?;

    info!("DealVault bot stopped");
    Ok(())
}
