// ============ Fee Distribution Types ============
// Shared type definitions for the token, voting escrow and fee distributor
// contracts, the simulated chain and the stateful checker.
// All token quantities are u128 base units (18 decimals).

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ============ Time Constants ============

pub const DAY: u64 = 86_400;
pub const WEEK: u64 = 7 * DAY;
pub const YEAR: u64 = 365 * DAY;

/// Longest lock the escrow accepts
pub const MAXTIME: u64 = 2 * YEAR;

/// Minimum gap between permissionless token checkpoints
pub const TOKEN_CHECKPOINT_DEADLINE: u64 = DAY;

// ============ Amount Constants ============

pub const UNIT: u128 = 1_000_000_000_000_000_000; // 1e18
pub const DUST_THRESHOLD: u128 = 100;
pub const GOVERNANCE_INITIAL_SUPPLY: u128 = 1_303_030_303 * UNIT;

// ============ Loop Bounds ============
// Iteration caps of the on-chain loops. Behaviour past these caps is
// part of the contract semantics and is reproduced, not widened.

pub const VE_CHECKPOINT_WEEKS: usize = 255;
pub const TOKEN_CHECKPOINT_WEEKS: usize = 20;
pub const SUPPLY_CHECKPOINT_WEEKS: usize = 20;
pub const CLAIM_ITERATIONS: usize = 50;
pub const BINARY_SEARCH_ITERATIONS: usize = 128;
pub const CLAIM_MANY_LIMIT: usize = 20;

// ============ Address ============

/// 20-byte account or contract address
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Deterministic address for a human-readable label.
    /// First 20 bytes of SHA-256(label).
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Address(out)
    }

    /// Address of the `nonce`-th contract deployed by `deployer`
    pub fn contract(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(deployer.0);
        hasher.update(nonce.to_le_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[..20]);
        Address(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = hex::encode(self.0);
        write!(f, "0x{}…{}", &encoded[..6], &encoded[34..])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(stripped).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(AddressParseError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============ Escrow Data Structures ============

/// Voting power line: power(t) = max(bias - slope * (t - ts), 0)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub bias: i128,
    pub slope: i128,
    pub ts: u64,
    pub blk: u64,
}

impl Point {
    /// Voting power carried by this point at time `t`.
    /// Times before `ts` evaluate at `ts`.
    pub fn balance_at(&self, t: u64) -> u128 {
        let dt = t.saturating_sub(self.ts) as i128;
        let value = self.bias - self.slope * dt;
        if value > 0 {
            value as u128
        } else {
            0
        }
    }
}

/// Locked amount and week-aligned unlock time of one account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedBalance {
    pub amount: i128,
    pub end: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositKind {
    DepositFor,
    CreateLock,
    IncreaseLockAmount,
    IncreaseUnlockTime,
}

// ============ Events ============

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Transfer {
        from: Address,
        to: Address,
        value: u128,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: u128,
    },
    Deposit {
        provider: Address,
        value: u128,
        locktime: u64,
        kind: DepositKind,
        ts: u64,
    },
    Withdraw {
        provider: Address,
        value: u128,
        ts: u64,
    },
    Supply {
        prev_supply: u128,
        supply: u128,
    },
    CheckpointToken {
        time: u64,
        tokens: u128,
    },
    Claimed {
        recipient: Address,
        amount: u128,
        claim_epoch: u64,
        max_epoch: u64,
    },
    ToggleAllowCheckpointToken {
        toggle_flag: bool,
    },
    Killed {
        recipient: Address,
        amount: u128,
    },
}

// ============ Transaction Context ============

/// Execution context of one transaction: caller, block and emitted events
#[derive(Clone, Debug)]
pub struct TxContext {
    pub caller: Address,
    pub block_number: u64,
    pub timestamp: u64,
    pub events: Vec<Event>,
}

impl TxContext {
    pub fn new(caller: Address, block_number: u64, timestamp: u64) -> Self {
        Self {
            caller,
            block_number,
            timestamp,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Run `f` as an inner call made by contract `caller`
    pub fn nested<T>(&mut self, caller: Address, f: impl FnOnce(&mut Self) -> T) -> T {
        let outer = core::mem::replace(&mut self.caller, caller);
        let out = f(self);
        self.caller = outer;
        out
    }
}

/// Mined transaction summary returned to callers of the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub block_number: u64,
    pub timestamp: u64,
    pub events: Vec<Event>,
}

impl Receipt {
    pub fn from_context(ctx: TxContext) -> Self {
        Self {
            block_number: ctx.block_number,
            timestamp: ctx.timestamp,
            events: ctx.events,
        }
    }

    /// Events matching `pred`
    pub fn events_where<'a>(
        &'a self,
        pred: impl Fn(&Event) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| pred(e))
    }
}

// ============ Tests ============
