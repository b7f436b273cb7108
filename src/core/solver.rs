use log::debug;
use serde::{Deserialize, Serialize};

use super::aggregate::{BatchConfig, run_batch};
use super::types::Scenario;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpendingSolveConfig {
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub runs_per_iteration: u32,
    pub final_runs: u32,
}

impl Default for SpendingSolveConfig {
    fn default() -> Self {
        Self {
            target_success_rate: 90.0,
            search_min: 0.0,
            search_max: 200_000.0,
            tolerance: 250.0,
            max_iterations: 24,
            runs_per_iteration: 500,
            final_runs: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_spending: f64,
    pub success_rate: f64,
    pub success_ci_half_width: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSolveResult {
    pub target_success_rate: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub runs_per_iteration: u32,
    pub final_runs: u32,
    pub solved_spending: Option<f64>,
    pub achieved_success_rate: Option<f64>,
    pub achieved_success_ci_half_width: Option<f64>,
    pub iterations: Vec<SpendingSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

pub fn solve_max_spending(
    scenario: &Scenario,
    batch: &BatchConfig,
    config: SpendingSolveConfig,
) -> Result<SpendingSolveResult, String> {
    validate_config(config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(scenario, batch, config.runs_per_iteration, config.search_min)?;
    let high_eval =
        evaluate_candidate(scenario, batch, config.runs_per_iteration, config.search_max)?;

    let mut solved_spending = None;
    let mut converged = false;
    let feasible;
    let message;

    if low_eval.success_rate + 1e-9 < config.target_success_rate {
        feasible = false;
        message = "No feasible spending found within the search bounds.".to_string();
    } else if high_eval.success_rate + 1e-9 >= config.target_success_rate {
        solved_spending = Some(config.search_max);
        converged = true;
        feasible = true;
        message = "Upper spending bound is still feasible; increase search max for a higher target."
            .to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(scenario, batch, config.runs_per_iteration, mid)?;
            iterations.push(SpendingSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_spending: mid,
                success_rate: eval.success_rate,
                success_ci_half_width: eval.success_ci_half_width,
            });
            debug!(
                "solve iteration {it}: spending {mid:.0} -> success {:.1}%",
                eval.success_rate
            );

            if eval.success_rate + 1e-9 >= config.target_success_rate {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_spending = Some(lo);
        feasible = true;
        message = if converged {
            "Solved maximum sustainable spending.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate.".to_string()
        };
    }

    let mut achieved_success_rate = None;
    let mut achieved_success_ci_half_width = None;
    if let Some(spending) = solved_spending {
        let final_eval = evaluate_candidate(scenario, batch, config.final_runs, spending)?;
        achieved_success_rate = Some(final_eval.success_rate);
        achieved_success_ci_half_width = Some(final_eval.success_ci_half_width);
    }

    Ok(SpendingSolveResult {
        target_success_rate: config.target_success_rate,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        runs_per_iteration: config.runs_per_iteration,
        final_runs: config.final_runs,
        solved_spending,
        achieved_success_rate,
        achieved_success_ci_half_width,
        iterations,
        converged,
        feasible,
        message,
    })
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    success_rate: f64,
    success_ci_half_width: f64,
}

fn evaluate_candidate(
    base: &Scenario,
    batch: &BatchConfig,
    runs: u32,
    spending: f64,
) -> Result<CandidateEval, String> {
    let mut scenario = base.clone();
    scenario.household.base_spending = spending.max(0.0);
    let batch = BatchConfig {
        runs: runs.max(1),
        ..batch.clone()
    };

    let result = run_batch(&scenario, &batch).map_err(|e| e.to_string())?;
    Ok(CandidateEval {
        success_rate: result.success_rate,
        success_ci_half_width: binomial_ci_half_width(result.success_rate / 100.0, result.runs)
            * 100.0,
    })
}

fn binomial_ci_half_width(p: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

fn validate_config(config: SpendingSolveConfig) -> Result<(), String> {
    if !(0.0..=100.0).contains(&config.target_success_rate) {
        return Err("target_success_rate must be between 0 and 100".to_string());
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_min < 0.0 {
        return Err("search_min must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    if config.runs_per_iteration == 0 {
        return Err("runs_per_iteration must be > 0".to_string());
    }
    if config.final_runs == 0 {
        return Err("final_runs must be > 0".to_string());
    }
    Ok(())
}
