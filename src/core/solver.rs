use serde::Serialize;
use tracing::debug;

use super::engine::run;
use super::error::{ParameterError, SimulationError};
use super::types::{Outcome, PaymentRule, SimulationParameters};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveConfig {
    /// Periods the scenario may take to reach its target.
    pub max_periods: u32,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl SolveConfig {
    pub fn new(max_periods: u32, search_max: f64) -> Self {
        Self {
            max_periods,
            search_min: 0.0,
            search_max,
            tolerance: 0.01,
            max_iterations: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    /// Periods needed at this amount, when it finishes inside the budget.
    pub periods: Option<u32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveStatus {
    /// Search bracket closed to within tolerance.
    Solved,
    /// The lower search bound already finishes in time.
    BelowBound,
    /// Even the upper search bound does not finish in time.
    AboveBound,
    /// Iteration budget ran out; the upper bracket is returned as the best feasible amount.
    MaxIterations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub config: SolveConfig,
    pub solved_value: Option<f64>,
    pub achieved_periods: Option<u32>,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub status: SolveStatus,
}

/// Finds the smallest fixed per-period payment or contribution that takes `params` to its
/// target within `config.max_periods` periods.
///
/// Whatever payment rule `params` carries is replaced by a fixed amount for each candidate.
pub fn solve_required_amount(
    params: &SimulationParameters,
    config: SolveConfig,
) -> Result<SolveResult, SimulationError> {
    validate_config(params, config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low = periods_to_target(params, config, config.search_min)?;
    let high = periods_to_target(params, config, config.search_max)?;

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let status;

    if low.is_some() {
        solved_value = Some(config.search_min);
        converged = true;
        feasible = true;
        status = SolveStatus::BelowBound;
    } else if high.is_none() {
        feasible = false;
        status = SolveStatus::AboveBound;
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let periods = periods_to_target(params, config, mid)?;
            iterations.push(SolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                periods,
            });

            if periods.is_some() {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(hi);
        feasible = true;
        status = if converged {
            SolveStatus::Solved
        } else {
            SolveStatus::MaxIterations
        };
    }

    let achieved_periods = match solved_value {
        Some(value) => periods_to_target(params, config, value)?,
        None => None,
    };
    debug!(?status, ?solved_value, iterations = iterations.len(), "goal search finished");

    Ok(SolveResult {
        config,
        solved_value,
        achieved_periods,
        iterations,
        converged,
        feasible,
        status,
    })
}

fn periods_to_target(
    base: &SimulationParameters,
    config: SolveConfig,
    amount: f64,
) -> Result<Option<u32>, SimulationError> {
    let mut params = base.clone();
    params.payment = PaymentRule::fixed(amount.max(0.0));
    params.safety_cap = config.max_periods;

    Ok(match run(&params)? {
        Outcome::Completed(schedule) => Some(schedule.len() as u32),
        Outcome::NonConvergent(_) | Outcome::SafetyCapReached(_) => None,
    })
}

fn validate_config(params: &SimulationParameters, config: SolveConfig) -> Result<(), ParameterError> {
    if params.target().is_none() {
        return Err(ParameterError::MissingTarget);
    }
    if config.max_periods == 0 {
        return Err(ParameterError::SolveConfig("max periods must be > 0"));
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err(ParameterError::SolveConfig("search bounds must be finite"));
    }
    if config.search_min < 0.0 {
        return Err(ParameterError::SolveConfig("search min must be >= 0"));
    }
    if config.search_max <= config.search_min {
        return Err(ParameterError::SolveConfig(
            "search max must be greater than search min",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(ParameterError::SolveConfig("tolerance must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(ParameterError::SolveConfig("max iterations must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::accrual::PeriodicRate;
    use crate::core::types::{Cadence, Direction, StopCondition};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn card(balance: f64, apr: f64) -> SimulationParameters {
        SimulationParameters::new(
            balance,
            Direction::Reduce,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(apr)),
            PaymentRule::fixed(0.0),
            StopCondition::Target(0.0),
        )
    }

    #[test]
    fn finds_annuity_payment_for_three_year_payoff() {
        // 100 / (1 - 1.02^-36) ~= 196.16
        let config = SolveConfig::new(36, 1_000.0);
        let result = solve_required_amount(&card(5_000.0, 0.24), config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_eq!(result.status, SolveStatus::Solved);
        assert_close(
            result.solved_value.expect("value expected"),
            196.16,
            config.tolerance + 0.01,
        );
        assert!(result.achieved_periods.expect("periods expected") <= 36);
    }

    #[test]
    fn interest_free_balance_splits_evenly() {
        let config = SolveConfig::new(12, 5_000.0);
        let result = solve_required_amount(&card(1_200.0, 0.0), config).expect("must solve");
        assert_close(result.solved_value.expect("value expected"), 100.0, 0.02);
        assert_eq!(result.achieved_periods, Some(12));
    }

    #[test]
    fn reports_infeasible_when_upper_bound_too_low() {
        let config = SolveConfig::new(36, 50.0);
        let result = solve_required_amount(&card(5_000.0, 0.24), config).expect("must return");
        assert!(!result.feasible);
        assert_eq!(result.status, SolveStatus::AboveBound);
        assert!(result.solved_value.is_none());
        assert!(result.achieved_periods.is_none());
    }

    #[test]
    fn lower_bound_already_feasible() {
        let config = SolveConfig {
            search_min: 1_000.0,
            ..SolveConfig::new(36, 6_000.0)
        };
        let result = solve_required_amount(&card(5_000.0, 0.24), config).expect("must return");
        assert_eq!(result.status, SolveStatus::BelowBound);
        assert_eq!(result.solved_value, Some(1_000.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn iteration_budget_returns_best_feasible_estimate() {
        let config = SolveConfig {
            max_iterations: 2,
            tolerance: 1e-6,
            ..SolveConfig::new(36, 1_000.0)
        };
        let result = solve_required_amount(&card(5_000.0, 0.24), config).expect("must return");
        assert_eq!(result.status, SolveStatus::MaxIterations);
        assert!(result.feasible);
        assert!(!result.converged);
        assert_eq!(result.iterations.len(), 2);
        assert!(result.achieved_periods.is_some());
    }

    #[test]
    fn horizon_scenarios_cannot_be_solved() {
        let params = SimulationParameters::new(
            0.0,
            Direction::Grow,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(0.05)),
            PaymentRule::fixed(100.0),
            StopCondition::Horizon(120),
        );
        let err = solve_required_amount(&params, SolveConfig::new(120, 1_000.0))
            .expect_err("no target");
        assert_eq!(
            err,
            SimulationError::InvalidParameters(ParameterError::MissingTarget)
        );
    }

    #[test]
    fn rejects_inverted_bounds() {
        let config = SolveConfig {
            search_min: 10.0,
            ..SolveConfig::new(12, 5.0)
        };
        assert!(matches!(
            solve_required_amount(&card(100.0, 0.1), config),
            Err(SimulationError::InvalidParameters(ParameterError::SolveConfig(_)))
        ));
    }
}
