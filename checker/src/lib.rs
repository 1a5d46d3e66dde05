// ============ Fee Distribution Invariant Checker ============
// Stateful, property-based check of the fee distributor.
//
// A program is a random sequence of lock, claim and fee deposit rules.
// It runs against a chain through the FeeChain interface; teardown then
// verifies that every participant received exactly the sum of its weekly
// fair shares and that the distributor keeps no more than dust.
//
// Modules:
// - rules: rule set and proptest strategies
// - model: the state machine, setup / apply / teardown
// - config: TOML harness configuration
// - campaign: seeded multi-case runs with shrinking and a JSON report

pub mod campaign;
pub mod config;
pub mod model;
pub mod rules;

pub use campaign::{run_campaign, run_sim_campaign, CampaignError, CampaignReport, Outcome};
pub use config::{CampaignConfig, ConfigError, HarnessConfig};
pub use model::{run_program, FeeDistributionModel, ModelParams, Settlement};
pub use rules::{program_strategy, rule_strategy, Program, Rule};

use thiserror::Error;
use vefee_sdk::ChainError;
use vefee_types::Address;

// ============ Error Types ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// Contract reverts are fatal; rules are never retried
    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("{account} holds {actual} fee units, fair share sum is {expected}")]
    ClaimMismatch {
        account: Address,
        expected: u128,
        actual: u128,
    },

    #[error("distributor keeps {remaining} fee units, dust threshold is {threshold}")]
    DustExceeded { remaining: u128, threshold: u128 },
}

// ============ Tests ============
