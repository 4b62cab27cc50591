//! Configuration for the `enzo` command-line client.

use std::path::Path;

use enzo_core::ClientOptions;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnzoConfig {
    /// Connection settings, passed to `Client::new` as-is.
    pub client: ClientOptions,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl EnzoConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        std::fs::write(path, Self::default_toml()?)
    }

    pub fn default_toml() -> std::io::Result<String> {
        toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)
    }

    /// Apply command-line overrides.
    pub fn with_address(mut self, address: Option<String>) -> Self {
        if let Some(address) = address {
            self.client.address = address;
        }
        self
    }
}

// ── Tests ────────────────────────────────────────────────────────
