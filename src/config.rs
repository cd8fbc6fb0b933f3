use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::settlement::validation::AmountBounds;

/// Environment variable overriding `postgres_url`
pub const POSTGRES_URL_ENV: &str = "SETTLE_POSTGRES_URL";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub settlement: SettlementConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Settlement engine tunables
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SettlementConfig {
    /// Max |credit - debit| still considered balanced
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,
    #[serde(default = "AmountBounds::entry_default")]
    pub entry_bounds: AmountBounds,
    #[serde(default = "AmountBounds::transfer_default")]
    pub transfer_bounds: AmountBounds,
    /// Bounded wait for session/row locks
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            entry_bounds: AmountBounds::entry_default(),
            transfer_bounds: AmountBounds::transfer_default(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl SettlementConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`, then apply environment overrides
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;

        if let Ok(url) = std::env::var(POSTGRES_URL_ENV)
            && !url.is_empty()
        {
            config.postgres_url = Some(url);
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let s = &self.settlement;
        anyhow::ensure!(
            s.tolerance >= Decimal::ZERO,
            "settlement.tolerance must not be negative"
        );
        for (name, bounds) in [
            ("entry_bounds", &s.entry_bounds),
            ("transfer_bounds", &s.transfer_bounds),
        ] {
            anyhow::ensure!(
                bounds.min > Decimal::ZERO && bounds.min <= bounds.max,
                "settlement.{} must satisfy 0 < min <= max",
                name
            );
        }
        anyhow::ensure!(
            s.lock_timeout_ms > 0,
            "settlement.lock_timeout_ms must be positive"
        );
        Ok(())
    }
}
