// ============ Fee Distributor Contract ============
// Distributes fee tokens to voting escrow holders week by week.
//
// Flow:
// 1. Fee tokens land in the distributor's balance (no hook, plain transfer)
// 2. checkpoint_token spreads the newly received balance over the week
//    buckets elapsed since the previous token checkpoint
// 3. checkpoint_total_supply snapshots total voting power at every week start
// 4. claim pays balance(user, w) * tokens_per_week[w] / ve_supply[w] for
//    every completed week w the user has not been paid for yet
//
// A week's tokens only become claimable once the following week has started
// and a token checkpoint has happened in it.

use std::collections::BTreeMap;

use erc20_token::{Erc20, TokenError};
use log::{debug, info};
use thiserror::Error;
use vefee_math::{ceil_week, fair_share, floor_week, split_across_weeks};
use vefee_types::{
    Address, Event, Point, TxContext, CLAIM_ITERATIONS, CLAIM_MANY_LIMIT, SUPPLY_CHECKPOINT_WEEKS,
    TOKEN_CHECKPOINT_DEADLINE, WEEK,
};
use voting_escrow::VotingEscrow;

// ============ Error Types ============

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributorError {
    #[error("caller is not allowed to checkpoint")]
    CheckpointNotAllowed,

    #[error("caller is not the admin")]
    NotAdmin,

    #[error("distributor is killed")]
    Killed,

    #[error("token: {0}")]
    Token(#[from] TokenError),
}

// ============ Distributor State ============

#[derive(Clone, Debug)]
pub struct FeeDistributor {
    pub address: Address,
    pub voting_escrow: Address,
    pub token: Address,
    admin: Address,
    emergency_return: Address,
    start_time: u64,
    time_cursor: u64,
    last_token_time: u64,
    time_cursor_of: BTreeMap<Address, u64>,
    user_epoch_of: BTreeMap<Address, u64>,
    tokens_per_week: BTreeMap<u64, u128>,
    token_last_balance: u128,
    ve_supply: BTreeMap<u64, u128>,
    can_checkpoint_token: bool,
    is_killed: bool,
}

impl FeeDistributor {
    pub fn new(
        address: Address,
        voting_escrow: Address,
        start_time: u64,
        token: Address,
        admin: Address,
        emergency_return: Address,
    ) -> Self {
        let t = floor_week(start_time);
        Self {
            address,
            voting_escrow,
            token,
            admin,
            emergency_return,
            start_time: t,
            time_cursor: t,
            last_token_time: t,
            time_cursor_of: BTreeMap::new(),
            user_epoch_of: BTreeMap::new(),
            tokens_per_week: BTreeMap::new(),
            token_last_balance: 0,
            ve_supply: BTreeMap::new(),
            can_checkpoint_token: false,
            is_killed: false,
        }
    }

    // ============ Views ============

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn time_cursor(&self) -> u64 {
        self.time_cursor
    }

    pub fn last_token_time(&self) -> u64 {
        self.last_token_time
    }

    pub fn time_cursor_of(&self, addr: &Address) -> u64 {
        self.time_cursor_of.get(addr).copied().unwrap_or(0)
    }

    pub fn user_epoch_of(&self, addr: &Address) -> u64 {
        self.user_epoch_of.get(addr).copied().unwrap_or(0)
    }

    pub fn tokens_per_week(&self, week: u64) -> u128 {
        self.tokens_per_week.get(&week).copied().unwrap_or(0)
    }

    pub fn ve_supply(&self, week: u64) -> u128 {
        self.ve_supply.get(&week).copied().unwrap_or(0)
    }

    pub fn token_last_balance(&self) -> u128 {
        self.token_last_balance
    }

    pub fn can_checkpoint_token(&self) -> bool {
        self.can_checkpoint_token
    }

    pub fn is_killed(&self) -> bool {
        self.is_killed
    }

    /// Voting power of `user` at `timestamp` from the escrow's user history
    pub fn ve_for_at(&self, ve: &VotingEscrow, user: &Address, timestamp: u64) -> u128 {
        let max_user_epoch = ve.user_point_epoch(user);
        let epoch = ve.find_timestamp_user_epoch(user, timestamp, max_user_epoch);
        ve.user_point_history(user, epoch).balance_at(timestamp)
    }

    // ============ Token Checkpoint ============

    /// Admin may always checkpoint; anyone may once enabled and a day has
    /// passed since the last token checkpoint
    pub fn checkpoint_token(
        &mut self,
        ctx: &mut TxContext,
        fee_token: &Erc20,
    ) -> Result<(), DistributorError> {
        let allowed = ctx.caller == self.admin
            || (self.can_checkpoint_token
                && ctx.timestamp > self.last_token_time + TOKEN_CHECKPOINT_DEADLINE);
        if !allowed {
            return Err(DistributorError::CheckpointNotAllowed);
        }
        self.checkpoint_token_internal(ctx, fee_token);
        Ok(())
    }

    fn checkpoint_token_internal(&mut self, ctx: &mut TxContext, fee_token: &Erc20) {
        let token_balance = fee_token.balance_of(&self.address);
        let to_distribute = token_balance.saturating_sub(self.token_last_balance);
        self.token_last_balance = token_balance;

        let t = self.last_token_time;
        self.last_token_time = ctx.timestamp;

        for (week, share) in split_across_weeks(to_distribute, t, ctx.timestamp) {
            *self.tokens_per_week.entry(week).or_insert(0) += share;
        }

        debug!("checkpoint_token at {} distributing {}", ctx.timestamp, to_distribute);
        ctx.emit(Event::CheckpointToken {
            time: ctx.timestamp,
            tokens: to_distribute,
        });
    }

    // ============ Supply Checkpoint ============

    pub fn checkpoint_total_supply(&mut self, ctx: &mut TxContext, ve: &mut VotingEscrow) {
        self.checkpoint_total_supply_internal(ctx, ve);
    }

    fn checkpoint_total_supply_internal(&mut self, ctx: &mut TxContext, ve: &mut VotingEscrow) {
        let mut t = self.time_cursor;
        let rounded_timestamp = floor_week(ctx.timestamp);
        let distributor = self.address;
        ctx.nested(distributor, |c| ve.checkpoint(c));

        for _ in 0..SUPPLY_CHECKPOINT_WEEKS {
            if t > rounded_timestamp {
                break;
            }
            let epoch = ve.find_timestamp_epoch(t);
            let pt = ve.point_history(epoch);
            // The epoch-0 point can be later than the first deposit
            let dt = if t > pt.ts { (t - pt.ts) as i128 } else { 0 };
            let value = pt.bias - pt.slope * dt;
            self.ve_supply.insert(t, if value > 0 { value as u128 } else { 0 });
            t += WEEK;
        }

        self.time_cursor = t;
    }

    // ============ Claims ============

    /// Claim fees for `addr`. Returns the amount paid out.
    pub fn claim(
        &mut self,
        ctx: &mut TxContext,
        ve: &mut VotingEscrow,
        fee_token: &mut Erc20,
        addr: Address,
    ) -> Result<u128, DistributorError> {
        let last_token_time = self.prepare_claims(ctx, ve, fee_token)?;
        let amount = self.claim_internal(ctx, addr, ve, last_token_time);
        self.pay(ctx, fee_token, addr, amount)?;
        Ok(amount)
    }

    /// Claim for up to twenty addresses; a zero address ends the list
    pub fn claim_many(
        &mut self,
        ctx: &mut TxContext,
        ve: &mut VotingEscrow,
        fee_token: &mut Erc20,
        receivers: &[Address],
    ) -> Result<bool, DistributorError> {
        let last_token_time = self.prepare_claims(ctx, ve, fee_token)?;
        for addr in receivers.iter().take(CLAIM_MANY_LIMIT) {
            if addr.is_zero() {
                break;
            }
            let amount = self.claim_internal(ctx, *addr, ve, last_token_time);
            self.pay(ctx, fee_token, *addr, amount)?;
        }
        Ok(true)
    }

    /// Bring supply and token checkpoints up to date; returns the week
    /// boundary up to which claims are paid
    fn prepare_claims(
        &mut self,
        ctx: &mut TxContext,
        ve: &mut VotingEscrow,
        fee_token: &Erc20,
    ) -> Result<u64, DistributorError> {
        if self.is_killed {
            return Err(DistributorError::Killed);
        }

        if ctx.timestamp >= self.time_cursor {
            self.checkpoint_total_supply_internal(ctx, ve);
        }

        let mut last_token_time = self.last_token_time;
        if self.can_checkpoint_token
            && ctx.timestamp > last_token_time + TOKEN_CHECKPOINT_DEADLINE
        {
            self.checkpoint_token_internal(ctx, fee_token);
            last_token_time = ctx.timestamp;
        }

        Ok(floor_week(last_token_time))
    }

    fn pay(
        &mut self,
        ctx: &mut TxContext,
        fee_token: &mut Erc20,
        addr: Address,
        amount: u128,
    ) -> Result<(), DistributorError> {
        if amount == 0 {
            return Ok(());
        }
        let distributor = self.address;
        ctx.nested(distributor, |c| fee_token.transfer(c, addr, amount))?;
        self.token_last_balance -= amount;
        Ok(())
    }

    fn claim_internal(
        &mut self,
        ctx: &mut TxContext,
        addr: Address,
        ve: &VotingEscrow,
        last_token_time: u64,
    ) -> u128 {
        let mut to_distribute: u128 = 0;
        let max_user_epoch = ve.user_point_epoch(&addr);
        let start_time = self.start_time;

        // No lock, no fees
        if max_user_epoch == 0 {
            return 0;
        }

        let mut week_cursor = self.time_cursor_of(&addr);
        let mut user_epoch = if week_cursor == 0 {
            ve.find_timestamp_user_epoch(&addr, start_time, max_user_epoch)
        } else {
            self.user_epoch_of(&addr)
        };
        if user_epoch == 0 {
            user_epoch = 1;
        }

        let mut user_point = ve.user_point_history(&addr, user_epoch);

        if week_cursor == 0 {
            week_cursor = ceil_week(user_point.ts);
        }
        if week_cursor >= last_token_time {
            return 0;
        }
        if week_cursor < start_time {
            week_cursor = start_time;
        }

        let mut old_user_point = Point::default();

        for _ in 0..CLAIM_ITERATIONS {
            if week_cursor >= last_token_time {
                break;
            }

            if week_cursor >= user_point.ts && user_epoch <= max_user_epoch {
                user_epoch += 1;
                old_user_point = user_point;
                user_point = if user_epoch > max_user_epoch {
                    Point::default()
                } else {
                    ve.user_point_history(&addr, user_epoch)
                };
            } else {
                let balance_of = old_user_point.balance_at(week_cursor);
                if balance_of == 0 && user_epoch > max_user_epoch {
                    break;
                }
                if balance_of > 0 {
                    to_distribute += fair_share(
                        self.tokens_per_week(week_cursor),
                        balance_of,
                        self.ve_supply(week_cursor),
                    );
                }
                week_cursor += WEEK;
            }
        }

        let user_epoch = max_user_epoch.min(user_epoch - 1);
        self.user_epoch_of.insert(addr, user_epoch);
        self.time_cursor_of.insert(addr, week_cursor);

        ctx.emit(Event::Claimed {
            recipient: addr,
            amount: to_distribute,
            claim_epoch: user_epoch,
            max_epoch: max_user_epoch,
        });

        to_distribute
    }

    // ============ Admin ============

    pub fn toggle_allow_checkpoint_token(
        &mut self,
        ctx: &mut TxContext,
    ) -> Result<(), DistributorError> {
        if ctx.caller != self.admin {
            return Err(DistributorError::NotAdmin);
        }
        self.can_checkpoint_token = !self.can_checkpoint_token;
        ctx.emit(Event::ToggleAllowCheckpointToken {
            toggle_flag: self.can_checkpoint_token,
        });
        Ok(())
    }

    /// Disable claims and send the whole balance to the emergency return address
    pub fn kill_me(
        &mut self,
        ctx: &mut TxContext,
        fee_token: &mut Erc20,
    ) -> Result<(), DistributorError> {
        if ctx.caller != self.admin {
            return Err(DistributorError::NotAdmin);
        }
        self.is_killed = true;

        let amount = fee_token.balance_of(&self.address);
        let (distributor, recipient) = (self.address, self.emergency_return);
        ctx.nested(distributor, |c| fee_token.transfer(c, recipient, amount))?;

        info!("distributor killed, {} returned to {}", amount, recipient);
        ctx.emit(Event::Killed { recipient, amount });
        Ok(())
    }
}

// ============ Tests ============

#[cfg(test)]
mod tests {
    use super::*;
    use vefee_types::{DAY, UNIT, YEAR};

    struct Harness {
        gov: Erc20,
        fees: Erc20,
        ve: VotingEscrow,
        fd: FeeDistributor,
        admin: Address,
        alice: Address,
        bob: Address,
        block: u64,
        now: u64,
    }

    impl Harness {
        /// Distributor deployed mid-week; nobody has locked yet
        fn new() -> Self {
            let admin = Address::from_label("admin");
            let alice = Address::from_label("alice");
            let bob = Address::from_label("bob");
            let now = 200 * WEEK + 3 * DAY;

            let mut gov = Erc20::new(Address::from_label("gov"), "Gov", "GOV", 18, admin);
            let fees = Erc20::new(Address::from_label("fees"), "Fee", "FEE", 18, admin);
            let genesis = TxContext::new(admin, 1, now);
            let ve = VotingEscrow::new(&genesis, Address::from_label("escrow"), gov.address);
            let fd = FeeDistributor::new(
                Address::from_label("distributor"),
                ve.address,
                now,
                fees.address,
                admin,
                admin,
            );

            for who in [alice, bob] {
                let mut ctx = TxContext::new(who, 1, now);
                gov.mint_for_testing(&mut ctx, who, 1_000_000 * UNIT).unwrap();
                gov.approve(&mut ctx, ve.address, u128::MAX);
            }

            Self {
                gov,
                fees,
                ve,
                fd,
                admin,
                alice,
                bob,
                block: 1,
                now,
            }
        }

        fn ctx(&mut self, caller: Address) -> TxContext {
            self.block += 1;
            TxContext::new(caller, self.block, self.now)
        }

        fn sleep(&mut self, seconds: u64) {
            self.now += seconds;
        }

        fn lock(&mut self, who: Address, value: u128, until: u64) {
            let mut ctx = self.ctx(who);
            self.ve.create_lock(&mut ctx, &mut self.gov, value, until).unwrap();
        }

        fn deposit_fees(&mut self, amount: u128) {
            let admin = self.admin;
            let to = self.fd.address;
            let mut ctx = self.ctx(admin);
            self.fees.mint_for_testing(&mut ctx, to, amount).unwrap();
        }

        fn checkpoint(&mut self) {
            let admin = self.admin;
            let mut ctx = self.ctx(admin);
            self.fd.checkpoint_token(&mut ctx, &self.fees).unwrap();
        }

        fn claim(&mut self, who: Address) -> u128 {
            let mut ctx = self.ctx(who);
            self.fd
                .claim(&mut ctx, &mut self.ve, &mut self.fees, who)
                .unwrap()
        }
    }

    #[test]
    fn test_start_time_rounded_down() {
        let h = Harness::new();
        assert_eq!(h.fd.start_time(), 200 * WEEK);
        assert_eq!(h.fd.time_cursor(), 200 * WEEK);
        assert_eq!(h.fd.last_token_time(), 200 * WEEK);
        assert!(!h.fd.can_checkpoint_token());
    }

    #[test]
    fn test_checkpoint_token_permissions() {
        let mut h = Harness::new();
        let alice = h.alice;
        let mut ctx = h.ctx(alice);
        assert_eq!(
            h.fd.checkpoint_token(&mut ctx, &h.fees),
            Err(DistributorError::CheckpointNotAllowed)
        );

        let mut ctx = h.ctx(alice);
        assert_eq!(
            h.fd.toggle_allow_checkpoint_token(&mut ctx),
            Err(DistributorError::NotAdmin)
        );

        let admin = h.admin;
        let mut ctx = h.ctx(admin);
        h.fd.toggle_allow_checkpoint_token(&mut ctx).unwrap();
        assert_eq!(
            ctx.events,
            vec![Event::ToggleAllowCheckpointToken { toggle_flag: true }]
        );

        // Enabled, and more than a day since last_token_time (start of week)
        let mut ctx = h.ctx(alice);
        h.fd.checkpoint_token(&mut ctx, &h.fees).unwrap();

        // Right after a checkpoint the deadline has not passed
        let mut ctx = h.ctx(alice);
        assert_eq!(
            h.fd.checkpoint_token(&mut ctx, &h.fees),
            Err(DistributorError::CheckpointNotAllowed)
        );
    }

    #[test]
    fn test_checkpoint_token_splits_by_elapsed_time() {
        let mut h = Harness::new();
        // last_token_time is the week start, now is three days in
        h.deposit_fees(7 * UNIT);
        h.sleep(WEEK);
        // Ten days elapsed: seven in the first week, three in the second
        h.checkpoint();
        assert_eq!(h.fd.tokens_per_week(200 * WEEK), 49 * UNIT / 10);
        assert_eq!(h.fd.tokens_per_week(201 * WEEK), 21 * UNIT / 10);
        assert_eq!(h.fd.token_last_balance(), 7 * UNIT);
    }

    #[test]
    fn test_no_lock_no_fees() {
        let mut h = Harness::new();
        h.deposit_fees(UNIT);
        h.checkpoint();
        h.sleep(2 * WEEK);
        h.checkpoint();
        let alice = h.alice;
        assert_eq!(h.claim(alice), 0);
        assert_eq!(h.fd.time_cursor_of(&alice), 0);
    }

    #[test]
    fn test_current_week_not_claimable() {
        let mut h = Harness::new();
        let alice = h.alice;
        h.lock(alice, 1_000 * UNIT, h.now + YEAR);
        h.sleep(WEEK);
        h.deposit_fees(10 * UNIT);
        h.checkpoint();
        // Tokens sit in the current week until it completes
        assert_eq!(h.claim(alice), 0);

        h.sleep(WEEK);
        h.checkpoint();
        assert!(h.claim(alice) > 0);
    }

    #[test]
    fn test_single_holder_receives_everything() {
        let mut h = Harness::new();
        let alice = h.alice;
        h.lock(alice, 1_000 * UNIT, h.now + YEAR);
        h.sleep(WEEK);
        // Move last_token_time past the lock so no fees land in a week without supply
        h.checkpoint();
        h.deposit_fees(10 * UNIT);
        h.checkpoint();
        h.sleep(2 * WEEK);
        h.checkpoint();

        let claimed = h.claim(alice);
        let remaining = h.fees.balance_of(&h.fd.address);
        assert_eq!(claimed + remaining, 10 * UNIT);
        assert!(remaining < 100, "dust {}", remaining);
    }

    #[test]
    fn test_claim_matches_weekly_fair_share() {
        let mut h = Harness::new();
        let (alice, bob) = (h.alice, h.bob);
        h.lock(alice, 1_000 * UNIT, h.now + YEAR);
        h.sleep(DAY);
        h.lock(bob, 4_000 * UNIT, h.now + 20 * WEEK);
        h.sleep(WEEK);
        h.checkpoint();
        h.deposit_fees(50 * UNIT);
        h.checkpoint();
        h.sleep(2 * WEEK);
        h.checkpoint();

        let paid_alice = h.claim(alice);
        let paid_bob = h.claim(bob);

        let end = floor_week(h.now);
        for who in [alice, bob] {
            let expected: u128 = (h.fd.start_time()..=end)
                .step_by(WEEK as usize)
                .map(|w| {
                    fair_share(
                        h.fd.tokens_per_week(w),
                        h.fd.ve_for_at(&h.ve, &who, w),
                        h.fd.ve_supply(w),
                    )
                })
                .sum();
            let paid = if who == alice { paid_alice } else { paid_bob };
            assert_eq!(paid, expected);
        }
        assert!(paid_bob > paid_alice);
        assert!(h.fees.balance_of(&h.fd.address) < 100);
    }

    #[test]
    fn test_ve_supply_equals_sum_of_holders() {
        let mut h = Harness::new();
        let (alice, bob) = (h.alice, h.bob);
        h.lock(alice, 1_000 * UNIT, h.now + YEAR);
        h.sleep(2 * DAY);
        h.lock(bob, 400 * UNIT, h.now + 6 * WEEK);
        h.sleep(10 * WEEK);
        let admin = h.admin;
        let mut ctx = h.ctx(admin);
        h.fd.checkpoint_total_supply(&mut ctx, &mut h.ve);

        for k in 1..=10 {
            let w = 200 * WEEK + k * WEEK;
            let sum = h.fd.ve_for_at(&h.ve, &alice, w) + h.fd.ve_for_at(&h.ve, &bob, w);
            assert_eq!(h.fd.ve_supply(w), sum, "week {}", k);
        }
    }

    #[test]
    fn test_second_claim_pays_nothing() {
        let mut h = Harness::new();
        let alice = h.alice;
        h.lock(alice, 1_000 * UNIT, h.now + YEAR);
        h.sleep(WEEK);
        h.deposit_fees(10 * UNIT);
        h.checkpoint();
        h.sleep(2 * WEEK);
        h.checkpoint();
        assert!(h.claim(alice) > 0);
        assert_eq!(h.claim(alice), 0);
    }

    #[test]
    fn test_claim_many_pays_each_receiver() {
        let mut h = Harness::new();
        let (alice, bob) = (h.alice, h.bob);
        h.lock(alice, 1_000 * UNIT, h.now + YEAR);
        h.lock(bob, 1_000 * UNIT, h.now + YEAR);
        h.sleep(WEEK);
        h.deposit_fees(10 * UNIT);
        h.checkpoint();
        h.sleep(2 * WEEK);
        h.checkpoint();

        let admin = h.admin;
        let mut ctx = h.ctx(admin);
        h.fd
            .claim_many(&mut ctx, &mut h.ve, &mut h.fees, &[alice, Address::ZERO, bob])
            .unwrap();
        assert!(h.fees.balance_of(&alice) > 0);
        // The zero address terminates the list
        assert_eq!(h.fees.balance_of(&bob), 0);
    }

    #[test]
    fn test_kill_me_returns_balance() {
        let mut h = Harness::new();
        h.deposit_fees(5 * UNIT);
        let admin = h.admin;
        let mut ctx = h.ctx(admin);
        h.fd.kill_me(&mut ctx, &mut h.fees).unwrap();
        assert_eq!(h.fees.balance_of(&admin), 5 * UNIT);
        assert!(h.fd.is_killed());

        let alice = h.alice;
        let mut ctx = h.ctx(alice);
        assert_eq!(
            h.fd.claim(&mut ctx, &mut h.ve, &mut h.fees, alice),
            Err(DistributorError::Killed)
        );
    }
}
