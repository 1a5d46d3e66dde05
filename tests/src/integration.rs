// ============ Fee Distribution Integration Tests ============
// Scenarios across token, escrow, distributor, simulated chain and checker.
//
// Test categories:
// 1. Lag: a week's fees wait for a checkpoint in the following week
// 2. Idempotent claims
// 3. Expired locks
// 4. Settlement through the model (fixed programs)
// 5. Admin paths: claim_many, kill_me

use vefee_checker::{run_program, ModelParams, Program, Rule, Settlement};
use vefee_math::floor_week;
use vefee_sdk::{ChainError, FeeChain, Fixture, ScenarioConfig};
use vefee_types::{Address, DAY, UNIT, WEEK};

// ============ Helper Functions ============

fn deploy() -> (Fixture, ModelParams) {
    let _ = env_logger::builder().is_test(true).try_init();
    let scenario = ScenarioConfig::default();
    let fixture = Fixture::deploy(&scenario).expect("fixture deploys");
    let params = ModelParams::new(fixture.participants.clone(), &scenario);
    (fixture, params)
}

/// Fee tokens received by `account` from one claim
fn claim_delta(fixture: &mut Fixture, account: Address) -> u128 {
    let before = fixture.chain.fee_balance_of(&account).unwrap();
    fixture.chain.claim(account).unwrap();
    fixture.chain.fee_balance_of(&account).unwrap() - before
}

fn sleep_into_next_week(fixture: &mut Fixture) {
    let now = fixture.chain.time();
    let next = floor_week(now) + WEEK;
    fixture.chain.sleep(next - now + 1);
}

fn lock_for(fixture: &mut Fixture, account: Address, amount: u128, weeks: u64) {
    let until = (fixture.chain.time() / WEEK + weeks) * WEEK;
    fixture.chain.create_lock(account, amount, until).unwrap();
}

fn settle(fixture: &mut Fixture, params: &ModelParams, steps: Vec<Rule>) -> Settlement {
    let program = Program {
        initializers: Vec::new(),
        steps,
    };
    run_program(&mut fixture.chain, params, &program).expect("program settles")
}

// ============ 1. Lag ============

#[test]
fn test_fees_wait_for_next_week_checkpoint() {
    let (mut f, _) = deploy();
    let admin = f.admin;
    let distributor = f.distributor;

    f.chain.mint_fees(admin, distributor, 10 * UNIT).unwrap();
    f.chain.checkpoint_token(admin).unwrap();

    // Same week: nothing is claimable yet
    assert_eq!(claim_delta(&mut f, admin), 0);

    // Next week, but the last token checkpoint is still in the old week
    sleep_into_next_week(&mut f);
    assert!(!f.chain.can_checkpoint_token().unwrap());
    assert_eq!(claim_delta(&mut f, admin), 0);

    f.chain.checkpoint_token(admin).unwrap();
    let claimed = claim_delta(&mut f, admin);
    let remaining = f.chain.fee_balance_of(&distributor).unwrap();
    assert!(claimed > 0);
    assert_eq!(claimed + remaining, 10 * UNIT);
    assert!(remaining < 100);
}

#[test]
fn test_enabled_checkpoints_happen_on_claim() {
    let (mut f, _) = deploy();
    let admin = f.admin;
    let distributor = f.distributor;

    f.chain.mint_fees(admin, distributor, 7 * UNIT).unwrap();
    f.chain.toggle_allow_checkpoint_token(admin).unwrap();
    f.chain.checkpoint_token(admin).unwrap();

    sleep_into_next_week(&mut f);
    f.chain.sleep(DAY);
    // More than a day since the last token checkpoint: claim checkpoints itself
    assert!(claim_delta(&mut f, admin) > 0);
}

#[test]
fn test_permissionless_checkpoint_needs_toggle() {
    let (mut f, _) = deploy();
    let bob = f.participants[1];
    f.chain.sleep(2 * DAY);
    assert!(f.chain.checkpoint_token(bob).unwrap_err().is_revert());

    let admin = f.admin;
    f.chain.toggle_allow_checkpoint_token(admin).unwrap();
    f.chain.checkpoint_token(bob).unwrap();
}

// ============ 2. Idempotent Claims ============

#[test]
fn test_second_claim_pays_nothing() {
    let (mut f, _) = deploy();
    let admin = f.admin;
    let distributor = f.distributor;

    f.chain.mint_fees(admin, distributor, 3 * UNIT).unwrap();
    f.chain.toggle_allow_checkpoint_token(admin).unwrap();
    f.chain.checkpoint_token(admin).unwrap();
    f.chain.sleep(2 * WEEK);
    f.chain.checkpoint_token(admin).unwrap();

    assert!(claim_delta(&mut f, admin) > 0);
    assert_eq!(claim_delta(&mut f, admin), 0);
    f.chain.sleep(DAY);
    assert_eq!(claim_delta(&mut f, admin), 0);
}

// ============ 3. Expired Locks ============

#[test]
fn test_expired_lock_withdraws_and_relocks() {
    let (mut f, _) = deploy();
    let bob = f.participants[1];
    let funding = ScenarioConfig::default().funding();

    let locked_at = f.chain.time();
    lock_for(&mut f, bob, 25 * UNIT, 1);
    assert_eq!(f.chain.escrow().user_point_history_ts(&bob, 1), locked_at);
    assert!(f.chain.withdraw(bob).unwrap_err().is_revert());
    assert!(f.chain.increase_amount(bob, UNIT).is_ok());
    // Paid from bob's own balance, whoever sends it
    let carol = f.participants[2];
    f.chain.deposit_for(carol, bob, UNIT).unwrap();
    assert_eq!(f.chain.escrow().locked(&bob).amount as u128, 27 * UNIT);

    f.chain.sleep(2 * WEEK);
    assert!(f.chain.increase_amount(bob, UNIT).unwrap_err().is_revert());
    f.chain.withdraw(bob).unwrap();
    assert_eq!(f.chain.governance().balance_of(&bob), funding);
    assert_eq!(f.chain.locked_end(&bob).unwrap(), 0);
    assert_eq!(f.chain.ve_for_at(&bob, f.chain.time()).unwrap(), 0);

    lock_for(&mut f, bob, 5 * UNIT, 3);
    assert!(f.chain.locked_end(&bob).unwrap() > f.chain.time());
}

// ============ 4. Settlement Through the Model ============

/// Thirty rules cycling through every rule kind and account
fn cyclic_steps() -> Vec<Rule> {
    (0..30u64)
        .map(|i| {
            let account = (i % 5) as usize;
            let amount = (i as u128 + 1) * UNIT / 2;
            let weeks = 1 + i % 12;
            let sleep = (i * 7_919) % (3 * DAY);
            match i % 6 {
                0 => Rule::NewLock {
                    account,
                    amount,
                    weeks,
                    sleep,
                },
                1 => Rule::TransferFees { amount, sleep },
                2 => Rule::ExtendLock { account, weeks, sleep },
                3 => Rule::ClaimFees { account, sleep },
                4 => Rule::IncreaseLockAmount {
                    account,
                    amount,
                    sleep,
                },
                _ => Rule::TransferFeesWithoutCheckpoint { amount, sleep },
            }
        })
        .collect()
}

#[test]
fn test_scenario_reconciles_after_thirty_steps() {
    let (mut f, params) = deploy();
    let distributor = f.distributor;
    let steps = cyclic_steps();
    let deposited: u128 = steps
        .iter()
        .map(|rule| match rule {
            Rule::TransferFees { amount, .. }
            | Rule::TransferFeesWithoutCheckpoint { amount, .. } => *amount,
            _ => 0,
        })
        .sum();

    let settlement = settle(&mut f, &params, steps);

    let paid: u128 = settlement.payouts.iter().map(|(_, amount)| amount).sum();
    assert_eq!(paid + settlement.remaining, deposited);
    assert_eq!(f.chain.fee_balance_of(&distributor).unwrap(), settlement.remaining);
    assert!(settlement.remaining < 100);
    assert!(settlement.payouts.iter().any(|(account, amount)| *account == f.admin && *amount > 0));
}

#[test]
fn test_teardown_deposits_when_never_checkpointed() {
    let (mut f, params) = deploy();
    let steps = vec![
        Rule::NewLock {
            account: 3,
            amount: 60 * UNIT,
            weeks: 6,
            sleep: DAY,
        },
        Rule::TransferFeesWithoutCheckpoint {
            amount: 9 * UNIT,
            sleep: 2 * DAY,
        },
        Rule::ClaimFees { account: 3, sleep: DAY },
    ];

    let settlement = settle(&mut f, &params, steps);

    let teardown = ScenarioConfig::default().teardown_deposit();
    assert_eq!(settlement.total_fees, UNIT + 9 * UNIT + teardown);
    let paid: u128 = settlement.payouts.iter().map(|(_, amount)| amount).sum();
    assert_eq!(paid + settlement.remaining, 9 * UNIT + teardown);
    assert!(f.chain.can_checkpoint_token().unwrap());
}

#[test]
fn test_model_rejects_chain_without_distributor() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut chain = vefee_sdk::SimChain::new(5, 1_600_000_000).unwrap();
    let params = ModelParams::new(chain.accounts().to_vec(), &ScenarioConfig::default());
    let program = Program {
        initializers: Vec::new(),
        steps: Vec::new(),
    };
    let err = run_program(&mut chain, &params, &program).unwrap_err();
    assert_eq!(
        err,
        vefee_checker::CheckError::Chain(ChainError::NotDeployed("fee_distributor"))
    );
}

// ============ 5. Admin Paths ============

#[test]
fn test_claim_many_pays_every_receiver() {
    let (mut f, _) = deploy();
    let admin = f.admin;
    let distributor = f.distributor;
    let (bob, carol) = (f.participants[1], f.participants[2]);

    lock_for(&mut f, bob, 100 * UNIT, 8);
    lock_for(&mut f, carol, 300 * UNIT, 8);
    f.chain.sleep(WEEK);
    f.chain.mint_fees(admin, distributor, 20 * UNIT).unwrap();
    f.chain.checkpoint_token(admin).unwrap();
    f.chain.sleep(2 * WEEK);
    f.chain.checkpoint_token(admin).unwrap();

    f.chain.claim_many(admin, &[bob, carol, admin]).unwrap();
    let paid_bob = f.chain.fee_balance_of(&bob).unwrap();
    let paid_carol = f.chain.fee_balance_of(&carol).unwrap();
    assert!(paid_bob > 0);
    assert!(paid_carol > paid_bob);

    assert_eq!(claim_delta(&mut f, bob), 0);
    assert_eq!(claim_delta(&mut f, carol), 0);
    let total = paid_bob + paid_carol + f.chain.fee_balance_of(&admin).unwrap();
    assert!(20 * UNIT - total < 100);
}

#[test]
fn test_kill_returns_fees_and_stops_claims() {
    let (mut f, _) = deploy();
    let admin = f.admin;
    let distributor = f.distributor;
    let bob = f.participants[1];

    f.chain.mint_fees(admin, distributor, 4 * UNIT).unwrap();
    assert!(f.chain.kill_distributor(bob).unwrap_err().is_revert());

    f.chain.kill_distributor(admin).unwrap();
    assert_eq!(f.chain.fee_balance_of(&admin).unwrap(), 4 * UNIT);
    assert_eq!(f.chain.fee_balance_of(&distributor).unwrap(), 0);
    assert!(f.chain.distributor().unwrap().is_killed());
    assert!(f.chain.claim(bob).unwrap_err().is_revert());
}
