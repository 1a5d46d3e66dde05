// ============ Voting Escrow Contract ============
// Locks governance tokens for up to MAXTIME and grants voting power that
// decays linearly to zero at the (week-aligned) unlock time.
//
// Accounting:
// - Global point history: one point per crossed week boundary plus one per
//   checkpoint, with scheduled slope changes applied at week boundaries
// - User point history: one point per user action
// - slope_changes[t]: slope removed from the global line at week t
//
// Every state change runs a checkpoint first so the global line is filled
// up to the current block before the user's delta is applied.

use std::collections::BTreeMap;

use erc20_token::{Erc20, TokenError};
use log::debug;
use thiserror::Error;
use vefee_math::{floor_week, lock_point};
use vefee_types::{
    Address, DepositKind, Event, LockedBalance, Point, TxContext, BINARY_SEARCH_ITERATIONS,
    MAXTIME, VE_CHECKPOINT_WEEKS, WEEK,
};

/// Fixed-point scale for the block-per-second estimate
const MULTIPLIER: u128 = 1_000_000_000_000_000_000;

// ============ Error Types ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VeError {
    #[error("need non-zero value")]
    ZeroValue,

    #[error("withdraw old tokens first")]
    ExistingLock,

    #[error("can only lock until time in the future")]
    UnlockTimeNotInFuture,

    #[error("voting lock can be 2 years max")]
    UnlockTimeTooFar,

    #[error("no existing lock found")]
    NoExistingLock,

    #[error("cannot add to expired lock, withdraw")]
    LockExpired,

    #[error("can only increase lock duration")]
    NotIncreasing,

    #[error("the lock didn't expire")]
    LockNotExpired,

    #[error("lock amount overflow")]
    Overflow,

    #[error("token: {0}")]
    Token(#[from] TokenError),
}

// ============ Escrow State ============

#[derive(Clone, Debug)]
pub struct VotingEscrow {
    pub address: Address,
    pub token: Address,
    supply: u128,
    locked: BTreeMap<Address, LockedBalance>,
    epoch: u64,
    point_history: Vec<Point>,
    user_point_history: BTreeMap<Address, Vec<Point>>,
    slope_changes: BTreeMap<u64, i128>,
}

impl VotingEscrow {
    pub fn new(ctx: &TxContext, address: Address, token: Address) -> Self {
        Self {
            address,
            token,
            supply: 0,
            locked: BTreeMap::new(),
            epoch: 0,
            point_history: vec![Point {
                bias: 0,
                slope: 0,
                ts: ctx.timestamp,
                blk: ctx.block_number,
            }],
            user_point_history: BTreeMap::new(),
            slope_changes: BTreeMap::new(),
        }
    }

    // ============ Views ============

    pub fn supply(&self) -> u128 {
        self.supply
    }

    pub fn locked(&self, addr: &Address) -> LockedBalance {
        self.locked.get(addr).copied().unwrap_or_default()
    }

    pub fn locked_end(&self, addr: &Address) -> u64 {
        self.locked(addr).end
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn point_history(&self, epoch: u64) -> Point {
        self.point_history
            .get(epoch as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn user_point_epoch(&self, addr: &Address) -> u64 {
        self.user_point_history
            .get(addr)
            .map(|h| h.len().saturating_sub(1) as u64)
            .unwrap_or(0)
    }

    pub fn user_point_history(&self, addr: &Address, epoch: u64) -> Point {
        self.user_point_history
            .get(addr)
            .and_then(|h| h.get(epoch as usize))
            .copied()
            .unwrap_or_default()
    }

    pub fn user_point_history_ts(&self, addr: &Address, epoch: u64) -> u64 {
        self.user_point_history(addr, epoch).ts
    }

    pub fn slope_change(&self, week: u64) -> i128 {
        self.slope_changes.get(&week).copied().unwrap_or(0)
    }

    /// Voting power of `addr` at `t`, extrapolated from its latest point
    pub fn balance_of_at(&self, addr: &Address, t: u64) -> u128 {
        let epoch = self.user_point_epoch(addr);
        if epoch == 0 {
            return 0;
        }
        self.user_point_history(addr, epoch).balance_at(t)
    }

    /// Total voting power at `t`, walking scheduled slope changes forward
    /// from the last global point at or before `t`
    pub fn total_supply_at(&self, t: u64) -> u128 {
        let epoch = self.find_timestamp_epoch(t);
        let point = self.point_history(epoch);
        self.supply_at(point, t)
    }

    fn supply_at(&self, point: Point, t: u64) -> u128 {
        let mut last = point;
        let mut t_i = floor_week(last.ts);
        for _ in 0..VE_CHECKPOINT_WEEKS {
            t_i += WEEK;
            let mut d_slope = 0;
            if t_i > t {
                t_i = t;
            } else {
                d_slope = self.slope_change(t_i);
            }
            last.bias -= last.slope * t_i.saturating_sub(last.ts) as i128;
            if t_i == t {
                break;
            }
            last.slope += d_slope;
            last.ts = t_i;
        }
        if last.bias < 0 {
            0
        } else {
            last.bias as u128
        }
    }

    /// Latest global epoch whose point is at or before `t`
    pub fn find_timestamp_epoch(&self, t: u64) -> u64 {
        let mut min = 0u64;
        let mut max = self.epoch;
        for _ in 0..BINARY_SEARCH_ITERATIONS {
            if min >= max {
                break;
            }
            let mid = (min + max + 2) / 2;
            if self.point_history(mid).ts <= t {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        min
    }

    /// Latest user epoch (up to `max_epoch`) whose point is at or before `t`
    pub fn find_timestamp_user_epoch(&self, addr: &Address, t: u64, max_epoch: u64) -> u64 {
        let mut min = 0u64;
        let mut max = max_epoch;
        for _ in 0..BINARY_SEARCH_ITERATIONS {
            if min >= max {
                break;
            }
            let mid = (min + max + 2) / 2;
            if self.user_point_history(addr, mid).ts <= t {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        min
    }

    // ============ Lock Operations ============

    pub fn create_lock(
        &mut self,
        ctx: &mut TxContext,
        token: &mut Erc20,
        value: u128,
        unlock_time: u64,
    ) -> Result<(), VeError> {
        let addr = ctx.caller;
        let unlock_time = floor_week(unlock_time);
        let locked = self.locked(&addr);

        if value == 0 {
            return Err(VeError::ZeroValue);
        }
        if locked.amount != 0 {
            return Err(VeError::ExistingLock);
        }
        if unlock_time <= ctx.timestamp {
            return Err(VeError::UnlockTimeNotInFuture);
        }
        if unlock_time > ctx.timestamp + MAXTIME {
            return Err(VeError::UnlockTimeTooFar);
        }

        debug!("create_lock {} value={} until={}", addr, value, unlock_time);
        self.deposit(ctx, token, addr, value, unlock_time, locked, DepositKind::CreateLock)
    }

    pub fn increase_amount(
        &mut self,
        ctx: &mut TxContext,
        token: &mut Erc20,
        value: u128,
    ) -> Result<(), VeError> {
        let addr = ctx.caller;
        let locked = self.active_lock(ctx, &addr)?;
        if value == 0 {
            return Err(VeError::ZeroValue);
        }
        self.deposit(ctx, token, addr, value, 0, locked, DepositKind::IncreaseLockAmount)
    }

    /// Add `value` to another account's existing lock, paid by that account
    pub fn deposit_for(
        &mut self,
        ctx: &mut TxContext,
        token: &mut Erc20,
        addr: Address,
        value: u128,
    ) -> Result<(), VeError> {
        let locked = self.active_lock(ctx, &addr)?;
        if value == 0 {
            return Err(VeError::ZeroValue);
        }
        self.deposit(ctx, token, addr, value, 0, locked, DepositKind::DepositFor)
    }

    pub fn increase_unlock_time(
        &mut self,
        ctx: &mut TxContext,
        token: &mut Erc20,
        unlock_time: u64,
    ) -> Result<(), VeError> {
        let addr = ctx.caller;
        let locked = self.active_lock(ctx, &addr)?;
        let unlock_time = floor_week(unlock_time);

        if unlock_time <= locked.end {
            return Err(VeError::NotIncreasing);
        }
        if unlock_time > ctx.timestamp + MAXTIME {
            return Err(VeError::UnlockTimeTooFar);
        }

        self.deposit(ctx, token, addr, 0, unlock_time, locked, DepositKind::IncreaseUnlockTime)
    }

    pub fn withdraw(&mut self, ctx: &mut TxContext, token: &mut Erc20) -> Result<(), VeError> {
        let addr = ctx.caller;
        let old_locked = self.locked(&addr);
        if ctx.timestamp < old_locked.end {
            return Err(VeError::LockNotExpired);
        }
        let value = old_locked.amount.max(0) as u128;

        let new_locked = LockedBalance::default();
        self.locked.insert(addr, new_locked);
        let supply_before = self.supply;
        self.supply -= value;

        self.checkpoint_internal(ctx, Some(addr), old_locked, new_locked);

        let escrow = self.address;
        ctx.nested(escrow, |c| token.transfer(c, addr, value))?;

        debug!("withdraw {} value={}", addr, value);
        ctx.emit(Event::Withdraw {
            provider: addr,
            value,
            ts: ctx.timestamp,
        });
        ctx.emit(Event::Supply {
            prev_supply: supply_before,
            supply: self.supply,
        });
        Ok(())
    }

    /// Record global data to the point history
    pub fn checkpoint(&mut self, ctx: &mut TxContext) {
        self.checkpoint_internal(ctx, None, LockedBalance::default(), LockedBalance::default());
    }

    fn active_lock(&self, ctx: &TxContext, addr: &Address) -> Result<LockedBalance, VeError> {
        let locked = self.locked(addr);
        if locked.amount <= 0 {
            return Err(VeError::NoExistingLock);
        }
        if locked.end <= ctx.timestamp {
            return Err(VeError::LockExpired);
        }
        Ok(locked)
    }

    #[allow(clippy::too_many_arguments)]
    fn deposit(
        &mut self,
        ctx: &mut TxContext,
        token: &mut Erc20,
        addr: Address,
        value: u128,
        unlock_time: u64,
        locked: LockedBalance,
        kind: DepositKind,
    ) -> Result<(), VeError> {
        let supply_before = self.supply;
        self.supply = self.supply.checked_add(value).ok_or(VeError::Overflow)?;

        let old_locked = locked;
        let mut new_locked = locked;
        new_locked.amount = new_locked
            .amount
            .checked_add(value as i128)
            .ok_or(VeError::Overflow)?;
        if unlock_time != 0 {
            new_locked.end = unlock_time;
        }
        self.locked.insert(addr, new_locked);

        self.checkpoint_internal(ctx, Some(addr), old_locked, new_locked);

        if value != 0 {
            let escrow = self.address;
            ctx.nested(escrow, |c| token.transfer_from(c, addr, escrow, value))?;
        }

        ctx.emit(Event::Deposit {
            provider: addr,
            value,
            locktime: new_locked.end,
            kind,
            ts: ctx.timestamp,
        });
        ctx.emit(Event::Supply {
            prev_supply: supply_before,
            supply: self.supply,
        });
        Ok(())
    }

    // ============ Checkpoint ============

    fn set_global_point(&mut self, epoch: u64, point: Point) {
        let idx = epoch as usize;
        if idx < self.point_history.len() {
            self.point_history[idx] = point;
        } else {
            self.point_history.push(point);
        }
    }

    /// Fill the global history up to now, then apply the change of one
    /// user's lock from `old_locked` to `new_locked` (if any)
    fn checkpoint_internal(
        &mut self,
        ctx: &TxContext,
        addr: Option<Address>,
        old_locked: LockedBalance,
        new_locked: LockedBalance,
    ) {
        let now = ctx.timestamp;
        let mut u_old = Point::default();
        let mut u_new = Point::default();
        let mut old_dslope = 0i128;
        let mut new_dslope = 0i128;
        let mut epoch = self.epoch;

        if addr.is_some() {
            u_old = lock_point(old_locked.amount, old_locked.end, now, ctx.block_number);
            u_new = lock_point(new_locked.amount, new_locked.end, now, ctx.block_number);

            // old_locked.end may be in the past; new_locked.end only in the
            // future unless everything expired
            old_dslope = self.slope_change(old_locked.end);
            if new_locked.end != 0 {
                if new_locked.end == old_locked.end {
                    new_dslope = old_dslope;
                } else {
                    new_dslope = self.slope_change(new_locked.end);
                }
            }
        }

        let mut last_point = Point {
            bias: 0,
            slope: 0,
            ts: now,
            blk: ctx.block_number,
        };
        if epoch > 0 {
            last_point = self.point_history(epoch);
        }
        let mut last_checkpoint = last_point.ts;
        let initial_last_point = last_point;

        let mut block_slope: u128 = 0;
        if now > last_point.ts {
            block_slope = MULTIPLIER * ctx.block_number.saturating_sub(last_point.blk) as u128
                / (now - last_point.ts) as u128;
        }

        let mut t_i = floor_week(last_checkpoint);
        for _ in 0..VE_CHECKPOINT_WEEKS {
            t_i += WEEK;
            let mut d_slope = 0i128;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = self.slope_change(t_i);
            }
            last_point.bias -= last_point.slope * t_i.saturating_sub(last_checkpoint) as i128;
            last_point.slope += d_slope;
            if last_point.bias < 0 {
                last_point.bias = 0;
            }
            if last_point.slope < 0 {
                last_point.slope = 0;
            }
            last_checkpoint = t_i;
            last_point.ts = t_i;
            let elapsed = t_i.saturating_sub(initial_last_point.ts) as u128;
            last_point.blk = initial_last_point.blk + (block_slope * elapsed / MULTIPLIER) as u64;
            epoch += 1;
            if t_i == now {
                last_point.blk = ctx.block_number;
                break;
            }
            self.set_global_point(epoch, last_point);
        }

        self.epoch = epoch;

        if addr.is_some() {
            last_point.slope += u_new.slope - u_old.slope;
            last_point.bias += u_new.bias - u_old.bias;
            if last_point.slope < 0 {
                last_point.slope = 0;
            }
            if last_point.bias < 0 {
                last_point.bias = 0;
            }
        }

        self.set_global_point(epoch, last_point);

        let Some(addr) = addr else {
            return;
        };

        // Schedule the slope changes: the old slope no longer ends at
        // old_locked.end, the new one ends at new_locked.end
        if old_locked.end > now {
            old_dslope += u_old.slope;
            if new_locked.end == old_locked.end {
                old_dslope -= u_new.slope;
            }
            self.slope_changes.insert(old_locked.end, old_dslope);
        }

        if new_locked.end > now && new_locked.end > old_locked.end {
            new_dslope -= u_new.slope;
            self.slope_changes.insert(new_locked.end, new_dslope);
        }

        let history = self
            .user_point_history
            .entry(addr)
            .or_insert_with(|| vec![Point::default()]);
        history.push(Point {
            ts: now,
            blk: ctx.block_number,
            ..u_new
        });
    }
}

// ============ Tests ============
