use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::engine::simulate;
use super::returns::{ReturnMode, ReturnPlan};
use super::rng::{SimRng, Stream};
use super::types::{
    AggregateResult, FailureCause, FailureCauseShare, PercentileBand, Scenario, YearBand,
};
use super::validation::{ConfigError, validate_return_mode, validate_scenario};

const EARLY_WINDOW_YEARS: usize = 5;
const EARLY_MEAN_YEARS: usize = 10;
const EARLY_STREAK: usize = 3;
const BEAR_STREAK: usize = 4;
const TOP_FAILURE_CAUSES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    pub runs: u32,
    pub seed: u64,
    pub returns: ReturnMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            runs: 1_000,
            seed: 42,
            returns: ReturnMode::default(),
        }
    }
}

#[derive(Debug)]
struct RunSummary {
    run_index: u32,
    final_balance: f64,
    balances: Vec<f64>,
    incomes: Vec<f64>,
    spendings: Vec<f64>,
    failure: Option<FailureCause>,
}

pub fn run_batch(scenario: &Scenario, config: &BatchConfig) -> Result<AggregateResult, ConfigError> {
    run_batch_cancellable(scenario, config, &AtomicBool::new(false))
}

// Like `run_batch`, but stops starting new runs once `cancel` is set.
// Finished runs are still aggregated and the result is flagged `cancelled`.
pub fn run_batch_cancellable(
    scenario: &Scenario,
    config: &BatchConfig,
    cancel: &AtomicBool,
) -> Result<AggregateResult, ConfigError> {
    validate_scenario(scenario)?;
    let horizon = scenario.household.horizon_years();
    validate_return_mode(&config.returns, horizon)?;

    let plan = ReturnPlan::new(&config.returns, horizon, config.runs, config.seed);
    if plan.run_count() < config.runs {
        debug!(
            "only {} distinct windows available; running {} of {} requested runs",
            plan.run_count(),
            plan.run_count(),
            config.runs
        );
    }

    let outcomes: Vec<Option<RunSummary>> = (0..plan.run_count())
        .into_par_iter()
        .map(|run_index| {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            Some(run_once(scenario, &plan, config.seed, run_index))
        })
        .collect();

    let cancelled = outcomes.iter().any(Option::is_none);
    let summaries: Vec<RunSummary> = outcomes.into_iter().flatten().collect();
    let mut result = summarize(scenario, &summaries, cancelled);
    result.median_run = median_run_index(&summaries, result.final_balance.p50).map(|run_index| {
        let returns = plan.sequence(run_index);
        let mut rng = SimRng::for_run(config.seed, run_index, Stream::AgedCare);
        simulate(scenario, &returns, &mut rng)
    });

    info!(
        "batch finished: {} runs, success rate {:.1}%, median final balance {:.0}{}",
        result.runs,
        result.success_rate,
        result.final_balance.p50,
        if cancelled { " (cancelled)" } else { "" }
    );
    Ok(result)
}

fn run_once(scenario: &Scenario, plan: &ReturnPlan<'_>, seed: u64, run_index: u32) -> RunSummary {
    let returns = plan.sequence(run_index);
    let mut rng = SimRng::for_run(seed, run_index, Stream::AgedCare);
    let result = simulate(scenario, &returns, &mut rng);

    let final_balance = result.final_balance();
    let failure = if final_balance > 0.0 {
        None
    } else {
        let lived = result.years.len().min(returns.len());
        Some(classify_failure(&returns[..lived]))
    };

    RunSummary {
        run_index,
        final_balance,
        balances: result.years.iter().map(|y| y.total_balance).collect(),
        incomes: result.years.iter().map(|y| y.total_income).collect(),
        spendings: result.years.iter().map(|y| y.total_spending).collect(),
        failure,
    }
}

fn summarize(scenario: &Scenario, summaries: &[RunSummary], cancelled: bool) -> AggregateResult {
    let runs = summaries.len() as u32;
    let successes = summaries.iter().filter(|s| s.final_balance > 0.0).count() as u32;
    let success_rate = if runs == 0 {
        0.0
    } else {
        successes as f64 / runs as f64 * 100.0
    };

    let longest = summaries.iter().map(|s| s.balances.len()).max().unwrap_or(0);
    let years = (0..longest)
        .map(|idx| {
            let reached: Vec<&RunSummary> =
                summaries.iter().filter(|s| idx < s.balances.len()).collect();
            let mut balances: Vec<f64> = reached.iter().map(|s| s.balances[idx]).collect();
            let mut incomes: Vec<f64> = reached.iter().map(|s| s.incomes[idx]).collect();
            let mut spendings: Vec<f64> = reached.iter().map(|s| s.spendings[idx]).collect();
            YearBand {
                year_index: idx as u32,
                age: scenario.household.current_age + idx as u32,
                samples: reached.len(),
                balance: percentile_band(&mut balances),
                income: percentile_band(&mut incomes),
                spending: percentile_band(&mut spendings),
            }
        })
        .collect();

    let mut finals: Vec<f64> = summaries.iter().map(|s| s.final_balance).collect();

    AggregateResult {
        runs,
        successes,
        success_rate,
        years,
        final_balance: percentile_band(&mut finals),
        median_run: None,
        failure_causes: failure_histogram(summaries),
        cancelled,
    }
}

fn median_run_index(summaries: &[RunSummary], target: f64) -> Option<u32> {
    summaries
        .iter()
        .min_by(|a, b| {
            let da = (a.final_balance - target).abs();
            let db = (b.final_balance - target).abs();
            da.total_cmp(&db).then(a.run_index.cmp(&b.run_index))
        })
        .map(|s| s.run_index)
}

fn failure_histogram(summaries: &[RunSummary]) -> Vec<FailureCauseShare> {
    let mut counts: HashMap<FailureCause, u32> = HashMap::new();
    for cause in summaries.iter().filter_map(|s| s.failure) {
        *counts.entry(cause).or_default() += 1;
    }
    let failures: u32 = counts.values().sum();

    let mut shares: Vec<FailureCauseShare> = counts
        .into_iter()
        .map(|(cause, count)| FailureCauseShare {
            cause,
            count,
            percentage: count as f64 / failures.max(1) as f64 * 100.0,
        })
        .collect();
    shares.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(cause_rank(a.cause).cmp(&cause_rank(b.cause)))
    });
    shares.truncate(TOP_FAILURE_CAUSES);
    shares
}

fn cause_rank(cause: FailureCause) -> u8 {
    match cause {
        FailureCause::EarlySequenceRisk => 0,
        FailureCause::PoorEarlyReturns => 1,
        FailureCause::ExtendedBearMarket => 2,
        FailureCause::GradualDepletion => 3,
    }
}

fn longest_negative_streak(returns: &[f64]) -> (usize, usize) {
    let mut best = (0, 0);
    let mut current_start = 0;
    let mut current_len = 0;
    for (i, r) in returns.iter().enumerate() {
        if *r < 0.0 {
            if current_len == 0 {
                current_start = i;
            }
            current_len += 1;
            if current_len > best.0 {
                best = (current_len, current_start);
            }
        } else {
            current_len = 0;
        }
    }
    best
}

pub fn classify_failure(returns: &[f64]) -> FailureCause {
    let (streak, start) = longest_negative_streak(returns);
    if streak >= EARLY_STREAK && start < EARLY_WINDOW_YEARS {
        return FailureCause::EarlySequenceRisk;
    }

    let early = &returns[..returns.len().min(EARLY_MEAN_YEARS)];
    if !early.is_empty() && early.iter().sum::<f64>() / (early.len() as f64) < 0.0 {
        return FailureCause::PoorEarlyReturns;
    }
    if streak >= BEAR_STREAK {
        return FailureCause::ExtendedBearMarket;
    }
    FailureCause::GradualDepletion
}

fn percentile_band(values: &mut [f64]) -> PercentileBand {
    PercentileBand {
        p10: percentile(values, 10.0),
        p25: percentile(values, 25.0),
        p50: percentile(values, 50.0),
        p75: percentile(values, 75.0),
        p90: percentile(values, 90.0),
    }
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
