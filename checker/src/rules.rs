// ============ Rules and Programs ============
// The operations the stateful model can perform and the proptest
// strategies that generate sequences of them.
//
// Every rule carries the seconds to sleep before it runs. Accounts are
// indices into the model's participant list.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use vefee_types::{DAY, UNIT};

/// Base units per thousandth of a token
pub const MILLI_TOKEN: u128 = UNIT / 1_000;

pub const MIN_WEEKS: u64 = 1;
pub const MAX_WEEKS: u64 = 12;
pub const MAX_SLEEP: u64 = 3 * DAY;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Lock `amount` for `weeks` unless the account already has an active lock
    NewLock {
        account: usize,
        amount: u128,
        weeks: u64,
        sleep: u64,
    },
    /// Push an active lock's end `weeks` further out
    ExtendLock { account: usize, weeks: u64, sleep: u64 },
    IncreaseLockAmount {
        account: usize,
        amount: u128,
        sleep: u64,
    },
    ClaimFees { account: usize, sleep: u64 },
    /// Mint fees to the distributor, enabling token checkpoints on first use
    TransferFees { amount: u128, sleep: u64 },
    TransferFeesWithoutCheckpoint { amount: u128, sleep: u64 },
}

impl Rule {
    pub fn sleep(&self) -> u64 {
        match self {
            Rule::NewLock { sleep, .. }
            | Rule::ExtendLock { sleep, .. }
            | Rule::IncreaseLockAmount { sleep, .. }
            | Rule::ClaimFees { sleep, .. }
            | Rule::TransferFees { sleep, .. }
            | Rule::TransferFeesWithoutCheckpoint { sleep, .. } => *sleep,
        }
    }
}

/// One generated test case: both initializers once, then the steps
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub initializers: Vec<Rule>,
    pub steps: Vec<Rule>,
}

impl Program {
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.initializers.iter().chain(self.steps.iter())
    }

    pub fn len(&self) -> usize {
        self.initializers.len() + self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============ Strategies ============

/// 1 to 100 tokens with three decimal places
pub fn amount_strategy() -> impl Strategy<Value = u128> {
    (1_000u128..=100_000).prop_map(|milli| milli * MILLI_TOKEN)
}

pub fn weeks_strategy() -> impl Strategy<Value = u64> {
    MIN_WEEKS..=MAX_WEEKS
}

pub fn sleep_strategy() -> impl Strategy<Value = u64> {
    0..=MAX_SLEEP
}

fn new_lock_strategy(accounts: usize) -> impl Strategy<Value = Rule> {
    (0..accounts, amount_strategy(), weeks_strategy(), sleep_strategy()).prop_map(
        |(account, amount, weeks, sleep)| Rule::NewLock {
            account,
            amount,
            weeks,
            sleep,
        },
    )
}

fn transfer_fees_strategy() -> impl Strategy<Value = Rule> {
    (amount_strategy(), sleep_strategy())
        .prop_map(|(amount, sleep)| Rule::TransferFees { amount, sleep })
}

pub fn rule_strategy(accounts: usize) -> impl Strategy<Value = Rule> {
    prop_oneof![
        new_lock_strategy(accounts),
        (0..accounts, weeks_strategy(), sleep_strategy())
            .prop_map(|(account, weeks, sleep)| Rule::ExtendLock { account, weeks, sleep }),
        (0..accounts, amount_strategy(), sleep_strategy()).prop_map(|(account, amount, sleep)| {
            Rule::IncreaseLockAmount {
                account,
                amount,
                sleep,
            }
        }),
        (0..accounts, sleep_strategy())
            .prop_map(|(account, sleep)| Rule::ClaimFees { account, sleep }),
        transfer_fees_strategy(),
        (amount_strategy(), sleep_strategy())
            .prop_map(|(amount, sleep)| Rule::TransferFeesWithoutCheckpoint { amount, sleep }),
    ]
}

/// Programs over `accounts` participants with 1..=`step_count` steps.
/// The two initializers run in random order before the steps.
pub fn program_strategy(accounts: usize, step_count: usize) -> impl Strategy<Value = Program> {
    let accounts = accounts.max(1);
    (
        new_lock_strategy(accounts),
        transfer_fees_strategy(),
        any::<bool>(),
        proptest::collection::vec(rule_strategy(accounts), 1..=step_count.max(1)),
    )
        .prop_map(|(lock, fees, lock_first, steps)| {
            let initializers = if lock_first { vec![lock, fees] } else { vec![fees, lock] };
            Program { initializers, steps }
        })
}

// ============ Tests ============
