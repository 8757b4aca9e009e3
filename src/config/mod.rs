//! # Configuration Management Module
//!
//! Centralized configuration for the LineBBS server, loaded from a TOML file
//! with sensible defaults and type-safe serde structs.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - Listen address
//! - [`StorageConfig`] - Checkpoint file path and interval
//! - [`LoggingConfig`] - Log level and optional log file
//! - [`ServerMetadata`] - Static server identity used by the banner and
//!   `HELP ABOUT` (serialized wholesale as JSON for that command)
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5011"
//!
//! [storage]
//! checkpoint_file = "checkpoint.bin"
//! checkpoint_interval_ticks = 600
//!
//! [logging]
//! level = "info"
//! file = "linebbs.log"
//! ```
//!
//! Precedence is CLI args > config file > defaults, resolved in `main.rs`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metadata: ServerMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP listen address, e.g. "127.0.0.1:5011". Port 0 picks an ephemeral port.
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the checkpoint blob. Loaded wholesale at startup, overwritten
    /// wholesale on every checkpoint.
    pub checkpoint_file: String,
    /// Ticks between periodic checkpoints. Ticks are activity-driven, so the
    /// wall-clock period varies with connection volume.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_ticks: u16,
}

fn default_checkpoint_interval() -> u16 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Static server identity. `HELP ABOUT` sends this struct serialized as JSON;
/// the connect banner quotes the name and license fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub server_name: String,
    pub server_version: String,
    pub server_description: String,
    pub server_author: String,
    pub server_author_email: String,
    pub server_website: String,
    pub server_license: String,
    pub server_license_url: String,
    pub commercial_license: String,
    pub commercial_license_url: String,
    pub server_source: String,
    pub server_source_issue_tracker: String,
    pub server_source_contributing: String,
    pub server_source_contributors: Vec<Contributor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
}

impl Default for ServerMetadata {
    fn default() -> Self {
        ServerMetadata {
            server_name: "LineBBS Server".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            server_description: "A minimal multi-user line-protocol message server.".to_string(),
            server_author: "LineBBS Team".to_string(),
            server_author_email: "linebbs@example.net".to_string(),
            server_website: "https://example.net/linebbs".to_string(),
            server_license: "GPL v3".to_string(),
            server_license_url: "https://www.gnu.org/licenses/gpl-3.0.en.html".to_string(),
            commercial_license: "Contact us at linebbs@example.net for alternative commercial licensing."
                .to_string(),
            commercial_license_url: "mailto:linebbs@example.net".to_string(),
            server_source: "https://example.net/linebbs/source".to_string(),
            server_source_issue_tracker: "https://example.net/linebbs/issues".to_string(),
            server_source_contributing:
                "Contributions to this project are welcome. Please read the CONTRIBUTING.md file for more information, or type HELP CONTRIBUTING when connected to the server."
                    .to_string(),
            server_source_contributors: vec![Contributor {
                name: "LineBBS Team".to_string(),
                email: "linebbs@example.net".to_string(),
            }],
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind: "127.0.0.1:5011".to_string(),
            },
            storage: StorageConfig {
                checkpoint_file: "checkpoint.bin".to_string(),
                checkpoint_interval_ticks: 600,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("linebbs.log".to_string()),
            },
            metadata: ServerMetadata::default(),
        }
    }
}
