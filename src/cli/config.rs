//! DealVault configuration file handling
//!
//! Operator settings only: where state lives, how often it is saved, when
//! deals expire and how logging is set up. Files are TOML; durations use
//! humantime syntax ("5m", "1h", "30days").

use chrono::Utc;
use dealvault::engine::EngineConfig;
use dealvault::messenger::BotConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_AUTOSAVE_INTERVAL: &str = "5m";
const DEFAULT_EXPIRY: &str = "30days";
const DEFAULT_SWEEP_INTERVAL: &str = "1h";

/// DealVault operator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealVaultConfig {
    /// Where user and deal records are kept
    pub storage: StorageConfig,

    /// Deal expiry settings
    #[serde(default)]
    pub deals: DealsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding users.json and deals.json
    pub data_dir: PathBuf,

    /// How often state is flushed to disk
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealsConfig {
    /// Pending or active deals older than this expire
    #[serde(default = "default_expiry")]
    pub expiry: String,

    /// How often the expiry sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_autosave_interval() -> String {
    DEFAULT_AUTOSAVE_INTERVAL.to_string()
}

fn default_expiry() -> String {
    DEFAULT_EXPIRY.to_string()
}

fn default_sweep_interval() -> String {
    DEFAULT_SWEEP_INTERVAL.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for DealsConfig {
    fn default() -> Self {
        Self {
            expiry: default_expiry(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Parse a nonzero humantime duration
pub fn parse_interval(field: &str, input: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(input)
        .map_err(|e| format!("Invalid duration for {} '{}': {}", field, input, e))?;
    if duration.is_zero() {
        return Err(format!("{} must be greater than zero", field));
    }
    Ok(duration)
}

impl DealVaultConfig {
    /// Load configuration from a TOML file
    ///
    /// Durations are checked here so a bad value fails at startup.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: DealVaultConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        config.engine_config()?;
        config.bot_config()?;

        Ok(config)
    }

    /// Engine settings derived from `[deals]`
    pub fn engine_config(&self) -> Result<EngineConfig, String> {
        let expiry = parse_interval("deals.expiry", &self.deals.expiry)?;
        let expiry = chrono::Duration::from_std(expiry)
            .ok()
            .filter(|e| Utc::now().checked_sub_signed(*e).is_some())
            .ok_or_else(|| format!("deals.expiry out of range: '{}'", self.deals.expiry))?;
        Ok(EngineConfig { expiry })
    }

    /// Bot scheduling derived from `[deals]` and `[storage]`
    pub fn bot_config(&self) -> Result<BotConfig, String> {
        Ok(BotConfig {
            sweep_interval: parse_interval("deals.sweep_interval", &self.deals.sweep_interval)?,
            autosave_interval: parse_interval(
                "storage.autosave_interval",
                &self.storage.autosave_interval,
            )?,
        })
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# DealVault Bot Configuration (Operator Settings)

[storage]
# Directory holding users.json and deals.json
data_dir = "{data_dir}"

# How often state is written to disk (also saved on shutdown)
autosave_interval = "{autosave}"

[deals]
# Pending or active deals older than this are expired
expiry = "{expiry}"

# How often the expiry sweep runs
sweep_interval = "{sweep}"

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/dealvault.log"
"#,
            data_dir = data_dir.display(),
            autosave = DEFAULT_AUTOSAVE_INTERVAL,
            expiry = DEFAULT_EXPIRY,
            sweep = DEFAULT_SWEEP_INTERVAL,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        data_dir: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }

    /// Load `path`, or write a default config there first if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            eprintln!("📝 No config file found. Creating default configuration...");
            Self::create_default(path, &default_data_dir())?;
            eprintln!("   Created: {}", path.display());
        }
        Self::load(path)
    }
}

fn base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dealvault")
}

/// Default config file: ~/.local/share/dealvault/config.toml
pub fn default_config_path() -> PathBuf {
    base_dir().join("config.toml")
}

/// Default data directory: ~/.local/share/dealvault/data
pub fn default_data_dir() -> PathBuf {
    base_dir().join("data")
}

/// Resolve `--config`, falling back to the default location
pub fn resolve_config_path(config: Option<String>) -> PathBuf {
    config
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}
