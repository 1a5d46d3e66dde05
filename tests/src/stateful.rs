// ============ Stateful Fee Distribution Tests ============
// Generated programs of up to thirty rules, each on a fresh fixture,
// checked end to end by the fee distribution model. Failures shrink to a
// minimal program.

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use vefee_checker::{
    program_strategy, run_program, run_sim_campaign, CampaignConfig, HarnessConfig, ModelParams,
    Outcome,
};
use vefee_sdk::{FeeChain, Fixture, ScenarioConfig};

const STEP_COUNT: usize = 30;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 12,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_fair_share_holds_for_any_program(program in program_strategy(5, STEP_COUNT)) {
        let scenario = ScenarioConfig::default();
        let mut fixture = Fixture::deploy(&scenario).unwrap();
        let params = ModelParams::new(fixture.participants.clone(), &scenario);

        let result = run_program(&mut fixture.chain, &params, &program);
        prop_assert!(result.is_ok(), "{}", result.unwrap_err());

        let settlement = result.unwrap();
        prop_assert!(settlement.remaining < 100);
        prop_assert_eq!(
            fixture.chain.fee_balance_of(&fixture.distributor).unwrap(),
            settlement.remaining
        );
    }

    #[test]
    fn prop_claims_never_exceed_deposits(program in program_strategy(5, STEP_COUNT)) {
        let scenario = ScenarioConfig::default();
        let mut fixture = Fixture::deploy(&scenario).unwrap();
        let params = ModelParams::new(fixture.participants.clone(), &scenario);

        let settlement = run_program(&mut fixture.chain, &params, &program).unwrap();
        let paid: u128 = settlement.payouts.iter().map(|(_, amount)| amount).sum();
        prop_assert!(paid <= settlement.total_fees);
        prop_assert_eq!(paid + settlement.remaining, settlement.total_fees - vefee_types::UNIT);
    }
}

#[test]
fn test_seeded_campaigns_agree() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = HarnessConfig {
        campaign: CampaignConfig {
            cases: 3,
            step_count: STEP_COUNT,
            seed: 2024,
            max_shrink_iters: 128,
        },
        ..HarnessConfig::default()
    };

    let first = run_sim_campaign(&config).unwrap();
    let second = run_sim_campaign(&config).unwrap();
    assert_eq!(first, second);
    match first.outcome {
        Outcome::Passed { runs, max_residual, .. } => {
            assert_eq!(runs, 3);
            assert!(max_residual < 100);
        }
        Outcome::Counterexample { reason, program } => {
            panic!("counterexample: {}\n{:#?}", reason, program)
        }
    }
}
