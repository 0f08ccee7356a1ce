//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! `DATABASE_URL`, when set, takes precedence over `[database].url`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    /// Upper bound on each collaborator read and on the persist step.
    #[serde(default = "default_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    /// Fixed seed for filler selection. Leave unset in production.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: default_timeout_ms(),
            rng_seed: None,
        }
    }
}

impl SettlementConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.settlement.collaborator_timeout_ms == 0 {
            bail!("settlement.collaborator_timeout_ms must be greater than zero");
        }
        if self.database.url.trim().is_empty() {
            bail!("database.url must not be empty");
        }
        Ok(())
    }
}
