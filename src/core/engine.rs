#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use super::error::SimulationError;
use super::stepper::{flows, step};
use super::types::{
    Direction, NonConvergent, Outcome, PeriodState, Schedule, SimulationParameters, StopCondition,
};

/// Runs one scenario until it reaches its target or horizon, stalls, or hits the safety cap.
///
/// Parameters are validated before the first period; a rule table that fails to cover a period
/// aborts the run with `SimulationError::NoApplicableRule`.
pub fn run(params: &SimulationParameters) -> Result<Outcome, SimulationError> {
    params.validate()?;

    let expected_len = match params.stop {
        StopCondition::Horizon(periods) => periods.min(params.safety_cap),
        StopCondition::Target(_) => params.safety_cap.min(120),
    };
    let mut schedule = Schedule::with_capacity(
        params.direction,
        params.cadence,
        params.start_quantity,
        expected_len as usize,
    );
    let mut state = PeriodState {
        quantity: params.start_quantity,
    };

    debug!(
        start = params.start_quantity,
        direction = ?params.direction,
        cadence = ?params.cadence,
        stop = ?params.stop,
        safety_cap = params.safety_cap,
        "starting projection"
    );

    for period in 0..params.safety_cap {
        let next = step(state, params, period)?;
        schedule.push(next.record);
        trace!(
            period,
            accrual = next.accrual,
            payment = next.payment,
            quantity = next.state.quantity,
            "period simulated"
        );

        if next.reached_target {
            debug!(periods = schedule.len(), "target reached");
            return Ok(Outcome::Completed(schedule));
        }

        match params.stop {
            StopCondition::Horizon(periods) => {
                if period + 1 >= periods {
                    debug!(periods = schedule.len(), "horizon reached");
                    return Ok(Outcome::Completed(schedule));
                }
            }
            StopCondition::Target(_) => {
                if !made_progress(params.direction, state.quantity, next.state.quantity) {
                    warn!(
                        period,
                        accrual = next.accrual,
                        payment = next.payment,
                        "payment does not outpace accrual; projection cannot converge"
                    );
                    return Ok(Outcome::NonConvergent(NonConvergent {
                        schedule,
                        period,
                        accrual: next.accrual,
                        payment: next.payment,
                    }));
                }
            }
        }

        state = next.state;
    }

    if let Some(target) = params.target() {
        let period = params.safety_cap - 1;
        let (accrual, payment) = flows(target, params, period)?;
        let accrual = accrual.amount;
        if !crosses_target(params.direction, accrual, payment) {
            warn!(
                period,
                accrual,
                payment,
                remaining = state.quantity,
                "target lies beyond the steady state; projection cannot converge"
            );
            return Ok(Outcome::NonConvergent(NonConvergent {
                schedule,
                period,
                accrual,
                payment,
            }));
        }
    }

    warn!(
        safety_cap = params.safety_cap,
        remaining = state.quantity,
        "safety cap reached before target"
    );
    Ok(Outcome::SafetyCapReached(schedule))
}

/// Whether a step taken at the target itself would still move past it. When it would not, the
/// run can only creep toward a steady state short of the target.
fn crosses_target(direction: Direction, accrual: f64, payment: f64) -> bool {
    match direction {
        Direction::Reduce => accrual - payment < 0.0,
        Direction::Grow => accrual + payment > 0.0,
    }
}

fn made_progress(direction: Direction, before: f64, after: f64) -> bool {
    match direction {
        Direction::Reduce => after < before,
        Direction::Grow => after > before,
    }
}

/// A named parameter set, e.g. "minimum only" or "fixed plus extra".
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub params: SimulationParameters,
}

impl Scenario {
    pub fn new(name: impl Into<String>, params: SimulationParameters) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRun {
    pub name: String,
    pub outcome: Outcome,
}

/// Runs independent scenarios, in parallel when the `parallel` feature is on.
///
/// Results keep the input order. Any invalid scenario fails the whole batch.
pub fn run_scenarios(scenarios: &[Scenario]) -> Result<Vec<ScenarioRun>, SimulationError> {
    #[cfg(feature = "parallel")]
    let iter = scenarios.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = scenarios.iter();

    iter.map(|scenario| {
        run(&scenario.params).map(|outcome| ScenarioRun {
            name: scenario.name.clone(),
            outcome,
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::accrual::{AdaptiveBaseline, KCAL_PER_KG, MifflinStJeor, PeriodicRate, Sex};
    use crate::core::error::{NoApplicableRuleError, ParameterError};
    use crate::core::rates::{Rule, RuleTable};
    use crate::core::types::{Cadence, OutcomeStatus, PaymentRule};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn card(balance: f64, apr: f64, payment: PaymentRule) -> SimulationParameters {
        SimulationParameters::new(
            balance,
            Direction::Reduce,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(apr)),
            payment,
            StopCondition::Target(0.0),
        )
    }

    fn total_accrual(schedule: &Schedule) -> f64 {
        schedule.records().iter().map(|r| r.accrual).sum()
    }

    fn dieter(intake: f64) -> SimulationParameters {
        SimulationParameters::new(
            100.0,
            Direction::Reduce,
            Cadence::Weekly,
            Arc::new(AdaptiveBaseline {
                baseline: MifflinStJeor {
                    height_cm: 180.0,
                    age_years: 40,
                    sex: Sex::Male,
                },
                activity_factor: 1.4,
                daily_intake: intake,
                energy_per_unit: KCAL_PER_KG,
            }),
            PaymentRule::fixed(0.0),
            StopCondition::Target(85.0),
        )
    }

    #[test]
    fn fixed_payment_pays_off_card_and_beats_percent_minimum() {
        let fixed = run(&card(5_000.0, 0.24, PaymentRule::fixed(200.0))).expect("valid");
        let minimum = run(&card(
            5_000.0,
            0.24,
            PaymentRule::PercentWithFloor {
                percent: 0.03,
                floor: 35.0,
            },
        ))
        .expect("valid");

        assert!(fixed.is_completed());
        let schedule = fixed.schedule();
        assert!(schedule.len() < 600);
        assert_eq!(schedule.final_quantity(), 0.0);
        assert!(total_accrual(schedule) < total_accrual(minimum.schedule()));
        assert!(schedule.len() < minimum.schedule().len());
    }

    #[test]
    fn fixed_payment_schedule_has_expected_length() {
        // n = -ln(1 - rB/P) / ln(1 + r) = -ln(0.5) / ln(1.02) ~= 35.0
        let outcome = run(&card(5_000.0, 0.24, PaymentRule::fixed(200.0))).expect("valid");
        assert_eq!(outcome.schedule().len(), 36);
    }

    #[test]
    fn payment_below_first_accrual_is_non_convergent() {
        let outcome = run(&card(1_000.0, 0.20, PaymentRule::fixed(10.0))).expect("valid");
        let Outcome::NonConvergent(result) = outcome else {
            panic!("expected non-convergent outcome");
        };
        assert_eq!(result.period, 0);
        assert_eq!(result.schedule.len(), 1);
        assert_approx_tol(result.accrual, 16.666_666, 1e-5);
        assert_approx_tol(result.payment, 10.0, 1e-12);
    }

    #[test]
    fn percent_minimum_below_rate_never_converges() {
        let outcome = run(&card(
            5_000.0,
            0.24,
            PaymentRule::PercentWithFloor {
                percent: 0.015,
                floor: 35.0,
            },
        ))
        .expect("valid");
        assert_eq!(outcome.status(), OutcomeStatus::NonConvergent);
    }

    #[test]
    fn slow_payoff_hits_safety_cap_with_partial_schedule() {
        let mut params = card(5_000.0, 0.24, PaymentRule::fixed(105.0));
        params.safety_cap = 120;
        let outcome = run(&params).expect("valid");
        assert_eq!(outcome.status(), OutcomeStatus::SafetyCapReached);
        assert_eq!(outcome.schedule().len(), 120);
        assert!(outcome.schedule().final_quantity() > 0.0);
        assert!(outcome.schedule().final_quantity() < 5_000.0);
    }

    #[test]
    fn horizon_growth_runs_exactly_horizon_periods() {
        let params = SimulationParameters::new(
            1_000.0,
            Direction::Grow,
            Cadence::Yearly,
            Arc::new(PeriodicRate::new(0.07)),
            PaymentRule::fixed(0.0),
            StopCondition::Horizon(10),
        );
        let outcome = run(&params).expect("valid");
        assert!(outcome.is_completed());
        assert_eq!(outcome.schedule().len(), 10);
        assert_approx_tol(outcome.schedule().final_quantity(), 1_967.15, 0.01);
    }

    #[test]
    fn horizon_beyond_safety_cap_is_reported() {
        let mut params = SimulationParameters::new(
            1_000.0,
            Direction::Grow,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(0.05)),
            PaymentRule::fixed(100.0),
            StopCondition::Horizon(720),
        );
        params.safety_cap = 600;
        let outcome = run(&params).expect("valid");
        assert_eq!(outcome.status(), OutcomeStatus::SafetyCapReached);
        assert_eq!(outcome.schedule().len(), 600);
    }

    #[test]
    fn starting_past_target_is_rejected_up_front() {
        let err = run(&card(0.0, 0.2, PaymentRule::fixed(10.0))).expect_err("invalid");
        assert_eq!(
            err,
            SimulationError::InvalidParameters(ParameterError::AlreadyAtTarget {
                start: 0.0,
                target: 0.0
            })
        );
    }

    #[test]
    fn reduce_without_target_is_rejected() {
        let mut params = card(1_000.0, 0.2, PaymentRule::fixed(100.0));
        params.stop = StopCondition::Horizon(12);
        assert_eq!(
            run(&params),
            Err(SimulationError::InvalidParameters(
                ParameterError::MissingTarget
            ))
        );
    }

    #[test]
    fn uncovered_rule_key_aborts_run() {
        let mut params = card(1_000.0, 0.2, PaymentRule::fixed(100.0));
        params.contribution_cap = Some(RuleTable::new(vec![Rule::between(0, 1, 2_400.0)]));
        let err = run(&params).expect_err("table has a gap at period 2");
        assert_eq!(
            err,
            SimulationError::NoApplicableRule(NoApplicableRuleError { key: 2 })
        );
    }

    #[test]
    fn adaptive_baseline_takes_longer_than_constant_deficit_estimate() {
        let params = dieter(2_000.0);
        let first_week = params
            .accrual
            .accrue(
                100.0,
                &crate::core::types::PeriodContext::new(0, &params),
            )
            .expect("no table")
            .amount;
        let naive_weeks = (15.0 / first_week.abs()).ceil() as usize;

        let outcome = run(&params).expect("valid");
        assert!(outcome.is_completed());
        assert_eq!(outcome.schedule().final_quantity(), 85.0);
        assert!(outcome.schedule().len() > naive_weeks);
    }

    #[test]
    fn intake_above_maintenance_is_non_convergent() {
        let outcome = run(&dieter(3_500.0)).expect("valid");
        assert_eq!(outcome.status(), OutcomeStatus::NonConvergent);
    }

    #[test]
    fn goal_past_adaptive_steady_state_is_non_convergent() {
        let mut params = dieter(2_500.0);
        params.stop = StopCondition::Target(60.0);
        let Outcome::NonConvergent(result) = run(&params).expect("valid") else {
            panic!("expected non-convergent outcome");
        };
        assert_eq!(result.period, params.safety_cap - 1);
        assert_eq!(result.schedule.len(), params.safety_cap as usize);
        assert!(result.schedule.final_quantity() > 85.0);
        assert!(result.accrual > 0.0);
    }

    #[test]
    fn percent_minimum_without_floor_never_reaches_zero() {
        let outcome = run(&card(
            1_000.0,
            0.24,
            PaymentRule::PercentWithFloor {
                percent: 0.03,
                floor: 0.0,
            },
        ))
        .expect("valid");
        assert_eq!(outcome.status(), OutcomeStatus::NonConvergent);
        assert_eq!(outcome.schedule().len(), 600);
    }

    #[test]
    fn scenarios_run_independently_and_keep_order() {
        let scenarios = vec![
            Scenario::new("fixed", card(5_000.0, 0.24, PaymentRule::fixed(200.0))),
            Scenario::new("stuck", card(1_000.0, 0.20, PaymentRule::fixed(10.0))),
            Scenario::new("fixed again", card(5_000.0, 0.24, PaymentRule::fixed(200.0))),
        ];
        let runs = run_scenarios(&scenarios).expect("all valid");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].name, "fixed");
        assert_eq!(runs[1].outcome.status(), OutcomeStatus::NonConvergent);
        assert_eq!(runs[0].outcome, runs[2].outcome);
    }

    #[test]
    fn one_invalid_scenario_fails_the_batch() {
        let scenarios = vec![
            Scenario::new("ok", card(5_000.0, 0.24, PaymentRule::fixed(200.0))),
            Scenario::new("paid off", card(0.0, 0.24, PaymentRule::fixed(200.0))),
        ];
        assert!(run_scenarios(&scenarios).is_err());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_payment_above_first_accrual_terminates_exactly_at_zero(
            balance in 500u32..50_000,
            apr_bp in 0u32..3_600,
            extra in 0u32..500
        ) {
            let balance = balance as f64;
            let apr = apr_bp as f64 / 10_000.0;
            let first_accrual = balance * apr / 12.0;
            let payment = first_accrual + balance / 200.0 + extra as f64;

            let outcome = run(&card(balance, apr, PaymentRule::fixed(payment))).expect("valid");
            prop_assert!(outcome.is_completed());
            let schedule = outcome.schedule();
            prop_assert!(schedule.len() < 600);
            prop_assert_eq!(schedule.final_quantity(), 0.0);

            let mut previous = balance;
            for record in schedule.records() {
                prop_assert!(record.closing >= 0.0);
                prop_assert!(record.closing < previous);
                previous = record.closing;
            }
        }

        #[test]
        fn prop_growth_with_contributions_is_strictly_increasing(
            start in 0u32..100_000,
            return_bp in 0u32..1_200,
            contribution in 10u32..2_000,
            years in 1u32..40
        ) {
            let params = SimulationParameters::new(
                start as f64,
                Direction::Grow,
                Cadence::Monthly,
                Arc::new(PeriodicRate::new(return_bp as f64 / 10_000.0)),
                PaymentRule::fixed(contribution as f64),
                StopCondition::Horizon(years * 12),
            );
            let outcome = run(&params).expect("valid");
            prop_assert!(outcome.is_completed());
            prop_assert_eq!(outcome.schedule().len(), (years * 12) as usize);

            let mut previous = start as f64;
            for record in outcome.schedule().records() {
                prop_assert!(record.closing > previous);
                previous = record.closing;
            }
        }

        #[test]
        fn prop_every_run_terminates_within_safety_cap(
            balance in 1u32..100_000,
            apr_bp in 0u32..10_000,
            payment in 0u32..1_000,
            cap in 1u32..800
        ) {
            let mut params = card(balance as f64, apr_bp as f64 / 10_000.0, PaymentRule::fixed(payment as f64));
            params.safety_cap = cap;
            let outcome = run(&params).expect("valid");
            prop_assert!(outcome.schedule().len() <= cap as usize);
            let indices = outcome
                .schedule()
                .records()
                .iter()
                .map(|r| r.period)
                .collect::<Vec<_>>();
            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
