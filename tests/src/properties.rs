// ============ Escrow and Distributor Properties ============
// Random inputs against the simulated chain:
// - weekly ve supply snapshots equal the sum of holders' voting power
// - fee tokens are never created or lost by the distributor

use proptest::prelude::*;
use vefee_math::{floor_week, weeks_between};
use vefee_sdk::{FeeChain, Fixture, ScenarioConfig};
use vefee_types::{DAY, UNIT, WEEK};

fn deploy() -> Fixture {
    Fixture::deploy(&ScenarioConfig::default()).unwrap()
}

/// (account index, whole tokens, weeks, sleep before)
fn lock_strategy() -> impl Strategy<Value = (usize, u128, u64, u64)> {
    (1usize..5, 1u128..=5_000, 1u64..=104, 0u64..=WEEK)
}

/// (milli tokens, sleep before, checkpoint after, claiming account)
fn deposit_strategy() -> impl Strategy<Value = (u128, u64, bool, usize)> {
    (1u128..=100_000, 0u64..=3 * DAY, any::<bool>(), 0usize..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_ve_supply_equals_sum_of_holders(
        locks in proptest::collection::vec(lock_strategy(), 1..8),
        idle_weeks in 0u64..16,
    ) {
        let mut f = deploy();
        let admin = f.admin;

        for (index, tokens, weeks, sleep) in locks {
            f.chain.sleep(sleep);
            let account = f.participants[index];
            if f.chain.locked_end(&account).unwrap() != 0 {
                continue;
            }
            let until = (f.chain.time() / WEEK + weeks) * WEEK;
            f.chain.create_lock(account, tokens * UNIT, until).unwrap();
        }
        f.chain.sleep(idle_weeks * WEEK);

        // Twenty weeks per call
        for _ in 0..3 {
            f.chain.checkpoint_total_supply(admin).unwrap();
        }

        let start = f.chain.start_time().unwrap();
        for week in weeks_between(start, f.chain.time()) {
            let holders: u128 = f
                .participants
                .iter()
                .map(|account| f.chain.ve_for_at(account, week).unwrap())
                .sum();
            prop_assert_eq!(f.chain.ve_supply(week).unwrap(), holders, "week {}", week);
        }
    }

    #[test]
    fn prop_fee_tokens_conserved(
        deposits in proptest::collection::vec(deposit_strategy(), 1..12),
    ) {
        let mut f = deploy();
        let admin = f.admin;
        let distributor = f.distributor;
        f.chain.toggle_allow_checkpoint_token(admin).unwrap();

        let mut minted: u128 = 0;
        for (milli, sleep, checkpoint, claimer) in deposits {
            f.chain.sleep(sleep);
            let amount = milli * UNIT / 1_000;
            f.chain.mint_fees(admin, distributor, amount).unwrap();
            minted += amount;
            if checkpoint {
                f.chain.checkpoint_token(admin).unwrap();
            }
            f.chain.claim(f.participants[claimer]).unwrap();

            let held: u128 = f
                .participants
                .iter()
                .map(|account| f.chain.fee_balance_of(account).unwrap())
                .sum();
            let left = f.chain.fee_balance_of(&distributor).unwrap();
            prop_assert_eq!(held + left, minted);
            prop_assert!(f.chain.distributor().unwrap().token_last_balance() <= left);
        }

        // Settled weeks never hand out more than they were given
        let start = f.chain.start_time().unwrap();
        let last = floor_week(f.chain.distributor().unwrap().last_token_time());
        let assigned: u128 = weeks_between(start, last)
            .map(|week| f.chain.tokens_per_week(week).unwrap())
            .sum();
        prop_assert!(assigned <= minted);
    }
}
