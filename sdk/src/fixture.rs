// ============ Scenario Fixture ============
// Builds the chain state the stateful fee distribution check starts from:
//
// 1. Accounts 0..funded approve the escrow and receive governance tokens
// 2. The admin (account 0) locks tokens for about a year
// 3. One delay later the fee distributor is deployed, admin and emergency
//    return both set to the admin

use log::info;
use serde::{Deserialize, Serialize};
use vefee_types::{Address, DUST_THRESHOLD, UNIT, WEEK, YEAR};

use crate::{ChainError, FeeChain, SimChain};

// ============ Configuration ============

/// Scenario parameters. Token amounts are whole tokens (18 decimals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Accounts created on the chain
    pub accounts: usize,
    /// Leading accounts that receive tokens and take part in the model
    pub funded_accounts: usize,
    pub funding_tokens: u64,
    pub initial_lock_tokens: u64,
    /// Seconds from now until the admin lock ends (rounded down to a week)
    pub initial_lock_duration: u64,
    /// Seconds between the admin lock and distributor deployment
    pub distributor_delay: u64,
    /// Fees deposited at teardown when no token checkpoint ever happened
    pub teardown_deposit_tokens: u64,
    /// Largest residual distributor balance accepted after settlement, base units
    pub dust_threshold: u64,
    pub genesis_time: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            accounts: 10,
            funded_accounts: 5,
            funding_tokens: 10_000_000,
            initial_lock_tokens: 10_000_000,
            initial_lock_duration: YEAR,
            distributor_delay: WEEK,
            teardown_deposit_tokens: 100_000,
            dust_threshold: DUST_THRESHOLD as u64,
            genesis_time: 1_600_000_000,
        }
    }
}

impl ScenarioConfig {
    pub fn funding(&self) -> u128 {
        self.funding_tokens as u128 * UNIT
    }

    pub fn initial_lock(&self) -> u128 {
        self.initial_lock_tokens as u128 * UNIT
    }

    pub fn teardown_deposit(&self) -> u128 {
        self.teardown_deposit_tokens as u128 * UNIT
    }
}

// ============ Fixture ============

#[derive(Clone, Debug)]
pub struct Fixture {
    pub chain: SimChain,
    pub admin: Address,
    /// Accounts driven by the model; the admin comes first
    pub participants: Vec<Address>,
    pub distributor: Address,
}

impl Fixture {
    pub fn deploy(config: &ScenarioConfig) -> Result<Self, ChainError> {
        let mut chain = SimChain::new(config.accounts, config.genesis_time)?;
        let admin = chain.admin();
        let escrow = chain.escrow().address;
        let participants: Vec<Address> = chain
            .accounts()
            .iter()
            .take(config.funded_accounts)
            .copied()
            .collect();

        for account in &participants {
            chain.approve_governance(*account, escrow, u128::MAX)?;
            chain.transfer_governance(admin, *account, config.funding())?;
        }

        let unlock_time = chain.time() + config.initial_lock_duration;
        chain.create_lock(admin, config.initial_lock(), unlock_time)?;

        chain.sleep(config.distributor_delay);
        let start_time = chain.time();
        let distributor = chain.deploy_distributor(admin, start_time, admin, admin)?;

        info!(
            "scenario deployed: {} participants, distributor {} starting {}",
            participants.len(),
            distributor,
            chain.start_time()?
        );

        Ok(Self {
            chain,
            admin,
            participants,
            distributor,
        })
    }
}

// ============ Tests ============
