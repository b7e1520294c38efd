use clap::{Parser, Subcommand};

pub mod config;
pub mod init_config;
pub mod logging;
pub mod run;
pub mod status;
pub mod sweep;
pub mod version;

#[derive(Parser)]
#[command(name = "dealvault")]
#[command(author = "DealVault Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deal negotiation bot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot service (JSON lines on stdin/stdout)
    Run {
        /// Path to config file (default: ~/.local/share/dealvault/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Data directory (overrides [storage] data_dir)
        #[arg(long)]
        data_dir: Option<String>,

        /// Keep all state in memory; nothing is written to disk
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show stored users and deal counts
    Status {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },

    /// Expire stale deals once and save
    Sweep {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },

    /// Write a default config file
    InitConfig {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,

        /// Data directory to record in the config
        #[arg(long)]
        data_dir: Option<String>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            config,
            data_dir,
            ephemeral,
        } => run::execute(config, data_dir, ephemeral).await,
        Commands::Status { config } => status::execute(config).await,
        Commands::Sweep { config } => sweep::execute(config).await,
        Commands::InitConfig {
            config,
            data_dir,
            force,
        } => init_config::execute(config, data_dir, force).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::parse_from(["dealvault", "run"]);

        match cli.command {
            Commands::Run {
                config,
                data_dir,
                ephemeral,
            } => {
                assert_eq!(config, None);
                assert_eq!(data_dir, None);
                assert!(!ephemeral);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_with_all_options() {
        let cli = Cli::parse_from([
            "dealvault",
            "run",
            "--config",
            "/etc/dealvault/config.toml",
            "--data-dir",
            "/srv/dealvault",
            "--ephemeral",
        ]);

        match cli.command {
            Commands::Run {
                config,
                data_dir,
                ephemeral,
            } => {
                assert_eq!(config, Some("/etc/dealvault/config.toml".to_string()));
                assert_eq!(data_dir, Some("/srv/dealvault".to_string()));
                assert!(ephemeral);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["dealvault", "status", "--config", "/tmp/c.toml"]);
        match cli.command {
            Commands::Status { config } => assert_eq!(config, Some("/tmp/c.toml".to_string())),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_parse_sweep() {
        let cli = Cli::parse_from(["dealvault", "sweep"]);
        assert!(matches!(cli.command, Commands::Sweep { config: None }));
    }

    #[test]
    fn test_cli_parse_init_config() {
        let cli = Cli::parse_from(["dealvault", "init-config", "--force"]);
        match cli.command {
            Commands::InitConfig {
                config,
                data_dir,
                force,
            } => {
                assert_eq!(config, None);
                assert_eq!(data_dir, None);
                assert!(force);
            }
            _ => panic!("Expected InitConfig command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["dealvault", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
