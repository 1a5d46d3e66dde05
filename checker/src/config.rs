// ============ Harness Configuration ============
// A TOML file with two tables; every key is optional:
//
//   [campaign]
//   cases = 16
//   step_count = 30
//   seed = 0
//   max_shrink_iters = 1024
//
//   [scenario]
//   funded_accounts = 5
//   teardown_deposit_tokens = 100000

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use vefee_sdk::ScenarioConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Randomized campaign settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Number of generated programs
    pub cases: u32,

    /// Upper bound on rules per program, initializers excluded
    pub step_count: usize,

    /// Seed for the program generator; equal seeds replay equal campaigns
    pub seed: u64,

    pub max_shrink_iters: u32,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            cases: 16,
            step_count: 30,
            seed: 0,
            max_shrink_iters: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub campaign: CampaignConfig,
    pub scenario: ScenarioConfig,
}

impl HarnessConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::InvalidValue {
                field,
                message: message.to_string(),
            })
        };

        if self.campaign.cases == 0 {
            return invalid("campaign.cases", "must be at least 1");
        }
        if self.campaign.step_count == 0 {
            return invalid("campaign.step_count", "must be at least 1");
        }

        let scenario = &self.scenario;
        if scenario.funded_accounts == 0 {
            return invalid("scenario.funded_accounts", "must be at least 1");
        }
        if scenario.funded_accounts > scenario.accounts {
            return invalid("scenario.funded_accounts", "exceeds scenario.accounts");
        }
        if scenario.initial_lock_tokens == 0 {
            return invalid("scenario.initial_lock_tokens", "must be at least 1");
        }
        if scenario.dust_threshold == 0 {
            return invalid("scenario.dust_threshold", "must be at least 1");
        }
        Ok(())
    }
}
