use super::config::{resolve_config_path, DealVaultConfig};
use super::logging;
use chrono::Utc;
use dealvault::engine::DealEngine;
use dealvault::persistence::JsonFileStore;
use tracing::info;

/// Expire stale deals once and save
///
/// For use while the bot is stopped. No transport is attached, so the
/// expiry notices are logged instead of delivered.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    let config = DealVaultConfig::load(&config_path)?;
    logging::init(&config.logging)?;

    let mut store = JsonFileStore::open(&config.storage.data_dir)?;
    let mut engine = DealEngine::load_from(&store, config.engine_config()?)?;

    let (expired, notices) = engine.expire_stale(Utc::now());
    for notice in &notices {
        info!(to = %notice.recipient, "undelivered expiry notice: {}", notice.text);
    }
    engine.save_to(&mut store)?;

    println!("⏳ Expired {} deal(s)", expired.len());
    for id in &expired {
        println!("   {}", id);
    }
    Ok(())
}
