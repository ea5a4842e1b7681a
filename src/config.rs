//! Configuration loading from TOML.
//!
//! Every section is optional; missing keys fall back to the defaults the
//! rally has always run with (1000 entry fee, 3000 prize pool, 50/30/20 split).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{RallyError, Result};

pub const DEFAULT_ENTRY_FEE: f64 = 1000.0;
pub const DEFAULT_PRIZE_POOL: f64 = 3000.0;
pub const DEFAULT_STARTING_BALANCE: f64 = 5000.0;

/// Environment variable overriding `[database] path`.
pub const DB_PATH_ENV: &str = "RALLY_DB";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub race: RaceConfig,
    pub teams: TeamsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rally.db"),
        }
    }
}

/// How settlement failures affect the rest of a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// Each entrant settles independently; a failure leaves earlier
    /// settlements of the same race committed.
    #[default]
    PerEntrant,
    /// The whole race (record, settlements, results) commits or rolls back together.
    PerRace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub entry_fee: f64,
    pub prize_pool: f64,
    /// Fraction of the prize pool paid to each finishing position, in order
    pub reward_shares: Vec<f64>,
    pub settlement: SettlementMode,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            entry_fee: DEFAULT_ENTRY_FEE,
            prize_pool: DEFAULT_PRIZE_POOL,
            reward_shares: vec![0.5, 0.3, 0.2],
            settlement: SettlementMode::PerEntrant,
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.entry_fee.is_finite() || self.entry_fee < 0.0 {
            return Err(RallyError::validation("entry_fee", "must be a non-negative number"));
        }
        if !self.prize_pool.is_finite() || self.prize_pool < 0.0 {
            return Err(RallyError::validation("prize_pool", "must be a non-negative number"));
        }
        if self
            .reward_shares
            .iter()
            .any(|share| !share.is_finite() || *share < 0.0)
        {
            return Err(RallyError::validation(
                "reward_shares",
                "every share must be a non-negative fraction",
            ));
        }
        let total: f64 = self.reward_shares.iter().sum();
        // Allow for float noise in hand-written shares like [0.7, 0.2, 0.1]
        if total > 1.0 + 1e-9 {
            return Err(RallyError::validation(
                "reward_shares",
                format!("shares sum to {total}, more than the whole prize pool"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    pub default_starting_balance: f64,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            default_starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            RallyError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&contents)
            .map_err(|e| RallyError::Config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Parse and validate a TOML document, then apply environment overrides.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(contents).map_err(|e| RallyError::Config(e.to_string()))?;
        config.race.validate()?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
    }
}
