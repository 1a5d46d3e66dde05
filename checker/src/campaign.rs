// ============ Campaign Runner ============
// Runs many generated programs, each on a freshly deployed chain, and
// shrinks the first failing program to a minimal counterexample.
//
// Generation is seeded from the configured seed through SHA-256 so a
// campaign replays exactly given the same configuration.

use std::cell::Cell;

use log::{info, warn};
use proptest::test_runner::{
    Config, RngAlgorithm, TestCaseError, TestError, TestRng, TestRunner,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use vefee_sdk::{ChainError, FeeChain, Fixture};

use crate::config::HarnessConfig;
use crate::model::{run_program, ModelParams, INITIAL_TOTAL_FEES};
use crate::rules::{program_strategy, Program};

// ============ Error Types ============

#[derive(Debug, Clone, Error)]
pub enum CampaignError {
    #[error("counterexample after shrinking: {reason}")]
    Counterexample { reason: String, program: Program },

    #[error("campaign aborted: {0}")]
    Aborted(String),
}

// ============ Report ============

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed {
        /// Programs executed, shrinking runs excluded
        runs: u32,
        /// Largest distributor residual seen at teardown
        max_residual: u128,
        /// Fee units deposited across all runs
        total_deposited: u128,
    },
    Counterexample {
        reason: String,
        program: Program,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seed: u64,
    pub cases: u32,
    pub step_count: usize,
    pub outcome: Outcome,
}

impl CampaignReport {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============ Campaign ============

fn seeded_rng(seed: u64) -> TestRng {
    let digest = Sha256::digest(seed.to_le_bytes());
    TestRng::from_seed(RngAlgorithm::ChaCha, &digest)
}

/// Run a campaign against chains built by `deploy`. Each case gets its own
/// chain; a counterexample is reported in the returned report, not as an
/// error. Errors are reserved for campaigns that could not run.
pub fn run_campaign<C, F>(
    config: &HarnessConfig,
    deploy: F,
) -> Result<CampaignReport, CampaignError>
where
    C: FeeChain,
    F: Fn() -> Result<(C, ModelParams), ChainError>,
{
    let campaign = &config.campaign;
    let proptest_config = Config {
        cases: campaign.cases,
        max_shrink_iters: campaign.max_shrink_iters,
        failure_persistence: None,
        ..Config::default()
    };
    let mut runner = TestRunner::new_with_rng(proptest_config, seeded_rng(campaign.seed));
    let strategy = program_strategy(config.scenario.funded_accounts, campaign.step_count);

    let runs = Cell::new(0u32);
    let max_residual = Cell::new(0u128);
    let total_deposited = Cell::new(0u128);
    let failing = Cell::new(false);

    info!(
        "campaign: {} cases, up to {} steps, seed {}",
        campaign.cases, campaign.step_count, campaign.seed
    );

    let result = runner.run(&strategy, |program| {
        let (mut chain, params) =
            deploy().map_err(|e| TestCaseError::fail(format!("deploy failed: {}", e)))?;

        match run_program(&mut chain, &params, &program) {
            Ok(settlement) => {
                if !failing.get() {
                    runs.set(runs.get() + 1);
                    max_residual.set(max_residual.get().max(settlement.remaining));
                    let deposited = settlement.total_fees - INITIAL_TOTAL_FEES;
                    total_deposited.set(total_deposited.get() + deposited);
                }
                Ok(())
            }
            Err(e) => {
                failing.set(true);
                Err(TestCaseError::fail(e.to_string()))
            }
        }
    });

    let outcome = match result {
        Ok(()) => Outcome::Passed {
            runs: runs.get(),
            max_residual: max_residual.get(),
            total_deposited: total_deposited.get(),
        },
        Err(TestError::Fail(reason, program)) => {
            warn!("counterexample with {} rules: {}", program.len(), reason.message());
            Outcome::Counterexample {
                reason: reason.message().to_string(),
                program,
            }
        }
        Err(TestError::Abort(reason)) => {
            return Err(CampaignError::Aborted(reason.message().to_string()))
        }
    };

    Ok(CampaignReport {
        seed: campaign.seed,
        cases: campaign.cases,
        step_count: campaign.step_count,
        outcome,
    })
}

/// Campaign over simulated chains deployed from the configured scenario
pub fn run_sim_campaign(config: &HarnessConfig) -> Result<CampaignReport, CampaignError> {
    let scenario = config.scenario.clone();
    run_campaign(config, move || {
        let fixture = Fixture::deploy(&scenario)?;
        let params = ModelParams::new(fixture.participants, &scenario);
        Ok((fixture.chain, params))
    })
}

/// Error form of a report, for callers that treat a counterexample as failure
pub fn into_result(report: CampaignReport) -> Result<CampaignReport, CampaignError> {
    match report.outcome {
        Outcome::Counterexample { reason, program } => {
            Err(CampaignError::Counterexample { reason, program })
        }
        Outcome::Passed { .. } => Ok(report),
    }
}

// ============ Tests ============
