// ============ Fee Distribution Model ============
// Rule-based model of the fee distributor, driven through FeeChain.
//
// The model tracks which participants hold a lock and until when, every
// fee deposit and every claim. At teardown it settles the distributor
// (two token checkpoints two weeks apart), claims for everybody and checks
// that each participant's fee balance equals the sum of its weekly fair
// shares and that only dust stays behind.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use vefee_math::{fair_share, floor_week, weeks_between};
use vefee_sdk::{FeeChain, ScenarioConfig};
use vefee_types::{Address, MAXTIME, UNIT, WEEK};

use crate::rules::{Program, Rule};
use crate::CheckError;

/// Fees the model counts as already present before any deposit
pub const INITIAL_TOTAL_FEES: u128 = UNIT;

// ============ Parameters ============

#[derive(Clone, Debug)]
pub struct ModelParams {
    /// Tracked participants, all checked at teardown (the five funded
    /// accounts by default); index 0 is the distributor admin
    pub accounts: Vec<Address>,
    pub teardown_deposit: u128,
    pub dust_threshold: u128,
}

impl ModelParams {
    pub fn new(accounts: Vec<Address>, scenario: &ScenarioConfig) -> Self {
        Self {
            accounts,
            teardown_deposit: scenario.teardown_deposit(),
            dust_threshold: scenario.dust_threshold as u128,
        }
    }

    pub fn admin(&self) -> Address {
        self.accounts[0]
    }
}

// ============ Settlement ============

/// What teardown observed once every check passed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub payouts: Vec<(Address, u128)>,
    pub remaining: u128,
    pub total_fees: u128,
    pub weeks: usize,
}

// ============ Model ============

pub struct FeeDistributionModel<'a, C: FeeChain> {
    chain: &'a mut C,
    params: &'a ModelParams,
    distributor: Address,
    locked_until: BTreeMap<Address, u64>,
    fees: BTreeMap<u64, u128>,
    user_claims: BTreeMap<Address, BTreeMap<u64, (u128, u64)>>,
    total_fees: u128,
}

impl<'a, C: FeeChain> FeeDistributionModel<'a, C> {
    /// Start tracking; the admin's pre-existing lock is the only known lock
    pub fn setup(chain: &'a mut C, params: &'a ModelParams) -> Result<Self, CheckError> {
        let admin = params.admin();
        let distributor = chain.distributor_address()?;
        let mut locked_until = BTreeMap::new();
        locked_until.insert(admin, chain.locked_end(&admin)?);

        Ok(Self {
            chain,
            params,
            distributor,
            locked_until,
            fees: BTreeMap::new(),
            user_claims: BTreeMap::new(),
            total_fees: INITIAL_TOTAL_FEES,
        })
    }

    pub fn locked_until(&self, account: &Address) -> Option<u64> {
        self.locked_until.get(account).copied()
    }

    pub fn fees(&self) -> &BTreeMap<u64, u128> {
        &self.fees
    }

    pub fn user_claims(&self, account: &Address) -> Option<&BTreeMap<u64, (u128, u64)>> {
        self.user_claims.get(account)
    }

    pub fn total_fees(&self) -> u128 {
        self.total_fees
    }

    fn account(&self, index: usize) -> Address {
        self.params.accounts[index % self.params.accounts.len()]
    }

    // ============ Rules ============

    pub fn apply(&mut self, rule: &Rule) -> Result<(), CheckError> {
        debug!("apply {:?} at {}", rule, self.chain.time());
        match *rule {
            Rule::NewLock {
                account,
                amount,
                weeks,
                sleep,
            } => self.new_lock(self.account(account), amount, weeks, sleep),
            Rule::ExtendLock {
                account,
                weeks,
                sleep,
            } => self.extend_lock(self.account(account), weeks, sleep),
            Rule::IncreaseLockAmount {
                account,
                amount,
                sleep,
            } => self.increase_lock_amount(self.account(account), amount, sleep),
            Rule::ClaimFees { account, sleep } => self.claim_fees(self.account(account), sleep),
            Rule::TransferFees { amount, sleep } => self.transfer_fees(amount, sleep),
            Rule::TransferFeesWithoutCheckpoint { amount, sleep } => {
                self.transfer_fees_without_checkpoint(amount, sleep)
            }
        }
    }

    /// True when `account` holds a lock that has not expired yet.
    /// An expired lock is withdrawn and forgotten.
    fn check_active_lock(&mut self, account: Address) -> Result<bool, CheckError> {
        let Some(until) = self.locked_until(&account) else {
            return Ok(false);
        };

        if until <= self.chain.time() {
            self.chain.withdraw(account)?;
            self.locked_until.remove(&account);
            debug!("withdrew expired lock of {}", account);
            return Ok(false);
        }

        Ok(true)
    }

    fn new_lock(
        &mut self,
        account: Address,
        amount: u128,
        weeks: u64,
        sleep: u64,
    ) -> Result<(), CheckError> {
        self.chain.sleep(sleep);

        if !self.check_active_lock(account)? {
            let until = (self.chain.time() / WEEK + weeks) * WEEK;
            self.chain.create_lock(account, amount, until)?;
            self.locked_until.insert(account, until);
        }
        Ok(())
    }

    fn extend_lock(&mut self, account: Address, weeks: u64, sleep: u64) -> Result<(), CheckError> {
        self.chain.sleep(sleep);

        if self.check_active_lock(account)? {
            let current = self.locked_until[&account];
            let cap = floor_week(self.chain.time() + MAXTIME);
            let until = ((current / WEEK + weeks) * WEEK).min(cap);

            if until <= current {
                warn!("lock of {} already at the maximum, extension skipped", account);
                return Ok(());
            }

            self.chain.increase_unlock_time(account, until)?;
            self.locked_until.insert(account, until);
        }
        Ok(())
    }

    fn increase_lock_amount(
        &mut self,
        account: Address,
        amount: u128,
        sleep: u64,
    ) -> Result<(), CheckError> {
        self.chain.sleep(sleep);

        if self.check_active_lock(account)? {
            self.chain.increase_amount(account, amount)?;
        }
        Ok(())
    }

    fn claim_fees(&mut self, account: Address, sleep: u64) -> Result<(), CheckError> {
        self.chain.sleep(sleep);

        let before = self.chain.fee_balance_of(&account)?;
        let receipt = self.chain.claim(account)?;
        let claimed = self.chain.fee_balance_of(&account)? - before;

        let cursor = self.chain.time_cursor_of(&account)?;
        self.user_claims
            .entry(account)
            .or_default()
            .insert(receipt.timestamp, (claimed, cursor));
        Ok(())
    }

    fn transfer_fees(&mut self, amount: u128, sleep: u64) -> Result<(), CheckError> {
        self.deposit_fees(amount, sleep)?;

        if !self.chain.can_checkpoint_token()? {
            let admin = self.params.admin();
            self.chain.toggle_allow_checkpoint_token(admin)?;
            self.chain.checkpoint_token(admin)?;
        }
        Ok(())
    }

    fn transfer_fees_without_checkpoint(
        &mut self,
        amount: u128,
        sleep: u64,
    ) -> Result<(), CheckError> {
        self.deposit_fees(amount, sleep)
    }

    fn deposit_fees(&mut self, amount: u128, sleep: u64) -> Result<(), CheckError> {
        self.chain.sleep(sleep);

        let admin = self.params.admin();
        let receipt = self.chain.mint_fees(admin, self.distributor, amount)?;
        *self.fees.entry(receipt.timestamp).or_insert(0) += amount;
        self.total_fees += amount;
        Ok(())
    }

    // ============ Teardown ============

    /// Settle, claim for everybody and verify the fair-share invariant
    pub fn teardown(mut self) -> Result<Settlement, CheckError> {
        if !self.chain.can_checkpoint_token()? {
            self.transfer_fees(self.params.teardown_deposit, 0)?;
        }

        // Fees of the current week only become claimable after the week
        // ends, so settle with a checkpoint on each side of it
        let admin = self.params.admin();
        self.chain.checkpoint_token(admin)?;
        self.chain.sleep(2 * WEEK);
        self.chain.checkpoint_token(admin)?;

        for account in &self.params.accounts {
            self.chain.claim(*account)?;
        }

        let t0 = self.chain.start_time()?;
        let t1 = floor_week(self.chain.latest_timestamp());
        let weeks: Vec<u64> = weeks_between(t0, t1).collect();

        let mut payouts = Vec::with_capacity(self.params.accounts.len());
        for account in &self.params.accounts {
            let mut expected: u128 = 0;
            for &week in &weeks {
                expected += fair_share(
                    self.chain.tokens_per_week(week)?,
                    self.chain.ve_for_at(account, week)?,
                    self.chain.ve_supply(week)?,
                );
            }

            let actual = self.chain.fee_balance_of(account)?;
            if expected != actual {
                return Err(CheckError::ClaimMismatch {
                    account: *account,
                    expected,
                    actual,
                });
            }
            payouts.push((*account, actual));
        }

        let remaining = self.chain.fee_balance_of(&self.distributor)?;
        if remaining >= self.params.dust_threshold {
            return Err(CheckError::DustExceeded {
                remaining,
                threshold: self.params.dust_threshold,
            });
        }

        info!(
            "settled {} weeks: {} fee units deposited, {} left in distributor",
            weeks.len(),
            self.total_fees - INITIAL_TOTAL_FEES,
            remaining
        );

        Ok(Settlement {
            payouts,
            remaining,
            total_fees: self.total_fees,
            weeks: weeks.len(),
        })
    }
}

/// Run one program from setup through teardown
pub fn run_program<C: FeeChain>(
    chain: &mut C,
    params: &ModelParams,
    program: &Program,
) -> Result<Settlement, CheckError> {
    let mut model = FeeDistributionModel::setup(chain, params)?;
    for rule in program.rules() {
        model.apply(rule)?;
    }
    model.teardown()
}
