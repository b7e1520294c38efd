use super::config::{resolve_config_path, DealVaultConfig};
use dealvault::engine::{DealEngine, DealStatus};
use dealvault::persistence::JsonFileStore;

/// Show stored users and deals
///
/// Reads the data directory named in the config without modifying it; the
/// bot does not need to be running.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    println!("📊 DealVault Status");
    println!();

    let config_path = resolve_config_path(config_path);
    let config = DealVaultConfig::load(&config_path)?;
    let store = JsonFileStore::open_read_only(&config.storage.data_dir)?;
    let engine = DealEngine::load_from(&store, config.engine_config()?)?;

    println!("{}", render(&engine));
    Ok(())
}

fn render(engine: &DealEngine) -> String {
    let users = engine.users();
    let registered = users.iter().filter(|u| u.is_registered).count();
    let deals = engine.deals();

    let mut out = format!(
        "Users: {} ({} registered)\nDeals: {}\n",
        users.len(),
        registered,
        deals.len()
    );
    for status in [
        DealStatus::Pending,
        DealStatus::Active,
        DealStatus::Completed,
        DealStatus::Cancelled,
        DealStatus::Expired,
    ] {
        out.push_str(&format!("  {}: {}\n", status, deals.count_by_status(status)));
    }
    out
}
