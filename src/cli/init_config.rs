use super::config::{default_data_dir, resolve_config_path, DealVaultConfig};
use std::path::PathBuf;

/// Write a commented default config file
///
/// Refuses to overwrite an existing file unless `force` is set.
pub async fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    if config_path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    let data_dir = data_dir.map(PathBuf::from).unwrap_or_else(default_data_dir);
    DealVaultConfig::create_default(&config_path, &data_dir)?;

    println!("📝 Wrote {}", config_path.display());
    println!("   Data directory: {}", data_dir.display());
    Ok(())
}
