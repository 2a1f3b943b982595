use std::{fs, path::Path};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::{account::STARTING_BALANCE, command::MAX_AMOUNT_SCALE, engine::DEFAULT_MAX_ATTEMPTS};

/// Display limit used by the home screen for each of sent / received.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Starting balance must not be negative, got {0}")]
    NegativeStartingBalance(Decimal),
    #[error("Starting balance {0} has more than two decimal places")]
    TooPreciseStartingBalance(Decimal),
    #[error("max_transfer_attempts must be at least 1")]
    NoAttempts,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub starting_balance: Decimal,
    pub max_transfer_attempts: u32,
    pub history_limit_per_role: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: STARTING_BALANCE,
            max_transfer_attempts: DEFAULT_MAX_ATTEMPTS,
            history_limit_per_role: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl LedgerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.starting_balance < Decimal::ZERO {
            return Err(ConfigError::NegativeStartingBalance(self.starting_balance));
        }
        if self.starting_balance.normalize().scale() > MAX_AMOUNT_SCALE {
            return Err(ConfigError::TooPreciseStartingBalance(self.starting_balance));
        }
        if self.max_transfer_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(self)
    }
}
