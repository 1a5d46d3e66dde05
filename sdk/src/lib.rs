// ============ Fee Distribution SDK ============
// Chain access for the fee distribution harness.
//
// - FeeChain: the collaborator surface the checker drives (escrow,
//   distributor, fee token, time control)
// - SimChain: in-memory chain executing the contracts, one block per call
// - Fixture: deploys the scenario the stateful checker starts from

pub mod fixture;
pub mod sim;

pub use fixture::{Fixture, ScenarioConfig};
pub use sim::SimChain;

use erc20_token::TokenError;
use fee_distributor::DistributorError;
use thiserror::Error;
use vefee_types::{Address, Receipt};
use voting_escrow::VeError;

// ============ Error Types ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{contract} reverted: {reason}")]
    Revert { contract: &'static str, reason: String },

    #[error("{0} is not deployed")]
    NotDeployed(&'static str),

    #[error("unknown account {0}")]
    UnknownAccount(Address),
}

impl ChainError {
    pub fn is_revert(&self) -> bool {
        matches!(self, ChainError::Revert { .. })
    }
}

impl From<TokenError> for ChainError {
    fn from(e: TokenError) -> Self {
        ChainError::Revert {
            contract: "erc20",
            reason: e.to_string(),
        }
    }
}

impl From<VeError> for ChainError {
    fn from(e: VeError) -> Self {
        ChainError::Revert {
            contract: "voting_escrow",
            reason: e.to_string(),
        }
    }
}

impl From<DistributorError> for ChainError {
    fn from(e: DistributorError) -> Self {
        ChainError::Revert {
            contract: "fee_distributor",
            reason: e.to_string(),
        }
    }
}

// ============ Chain Interface ============

/// Everything the stateful checker needs from a chain.
///
/// State-changing calls take the sender, mine one block and return its
/// receipt. A reverted call leaves no trace on chain state.
pub trait FeeChain {
    // ============ Time Control ============

    /// Pending block time
    fn time(&self) -> u64;

    /// Timestamp of the most recently mined block
    fn latest_timestamp(&self) -> u64;

    fn sleep(&mut self, seconds: u64);

    /// Mine an empty block at the pending time
    fn mine(&mut self) -> Receipt;

    fn accounts(&self) -> &[Address];

    // ============ Voting Escrow ============

    fn create_lock(
        &mut self,
        from: Address,
        value: u128,
        unlock_time: u64,
    ) -> Result<Receipt, ChainError>;

    fn increase_amount(&mut self, from: Address, value: u128) -> Result<Receipt, ChainError>;

    fn increase_unlock_time(
        &mut self,
        from: Address,
        unlock_time: u64,
    ) -> Result<Receipt, ChainError>;

    fn withdraw(&mut self, from: Address) -> Result<Receipt, ChainError>;

    fn locked_end(&self, addr: &Address) -> Result<u64, ChainError>;

    // ============ Fee Distributor ============

    fn distributor_address(&self) -> Result<Address, ChainError>;

    fn claim(&mut self, from: Address) -> Result<Receipt, ChainError>;

    fn checkpoint_token(&mut self, from: Address) -> Result<Receipt, ChainError>;

    fn toggle_allow_checkpoint_token(&mut self, from: Address) -> Result<Receipt, ChainError>;

    fn can_checkpoint_token(&self) -> Result<bool, ChainError>;

    fn start_time(&self) -> Result<u64, ChainError>;

    fn tokens_per_week(&self, week: u64) -> Result<u128, ChainError>;

    fn ve_for_at(&self, user: &Address, timestamp: u64) -> Result<u128, ChainError>;

    fn ve_supply(&self, week: u64) -> Result<u128, ChainError>;

    fn time_cursor_of(&self, addr: &Address) -> Result<u64, ChainError>;

    // ============ Fee Token ============

    fn fee_balance_of(&self, addr: &Address) -> Result<u128, ChainError>;

    /// Test hook: create fee tokens out of thin air
    fn mint_fees(&mut self, from: Address, to: Address, value: u128) -> Result<Receipt, ChainError>;
}
