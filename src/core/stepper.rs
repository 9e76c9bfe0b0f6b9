use super::accrual::Accrual;
use super::error::NoApplicableRuleError;
use super::rates::effective_limit;
use super::types::{Direction, PeriodContext, PeriodRecord, PeriodState, SimulationParameters};

/// Result of advancing one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub state: PeriodState,
    /// Rounded snapshot for the schedule.
    pub record: PeriodRecord,
    /// Unrounded amounts actually applied.
    pub accrual: f64,
    pub payment: f64,
    pub reached_target: bool,
}

/// Accrual and capped, non-negative payment for `quantity` in `period`, before any target clamp.
pub(crate) fn flows(
    quantity: f64,
    params: &SimulationParameters,
    period: u32,
) -> Result<(Accrual, f64), NoApplicableRuleError> {
    let ctx = PeriodContext::new(period, params);
    let accrual = params.accrual.accrue(quantity, &ctx)?;

    let mut payment = params.payment.resolve(quantity, &ctx).max(0.0);
    if let Some(cap) = &params.contribution_cap {
        let per_period = effective_limit(cap, ctx.rule_key())? / ctx.periods_per_year();
        payment = payment.min(per_period.max(0.0));
    }
    Ok((accrual, payment))
}

/// Advances `state` by one period.
///
/// Accrual is evaluated against the incoming quantity, the payment rule is resolved, the
/// payment is held non-negative and under any contribution cap, and the final period is
/// clamped so the quantity lands exactly on the target instead of overshooting it.
pub fn step(
    state: PeriodState,
    params: &SimulationParameters,
    period: u32,
) -> Result<Step, NoApplicableRuleError> {
    let quantity = state.quantity;
    let (
        Accrual {
            amount: mut accrual,
            rate,
        },
        mut payment,
    ) = flows(quantity, params, period)?;

    let mut reached_target = false;
    let closing = match (params.direction, params.target()) {
        (Direction::Reduce, Some(target)) => {
            let owed = quantity + accrual;
            if owed - payment <= target {
                reached_target = true;
                if owed >= target {
                    payment = owed - target;
                } else {
                    payment = 0.0;
                    accrual = target - quantity;
                }
                target
            } else {
                owed - payment
            }
        }
        (Direction::Grow, Some(target)) => {
            let grown = quantity + accrual;
            if grown + payment >= target {
                reached_target = true;
                if grown <= target {
                    payment = target - grown;
                } else {
                    payment = 0.0;
                    accrual = target - quantity;
                }
                target
            } else {
                grown + payment
            }
        }
        (Direction::Reduce, None) => quantity + accrual - payment,
        (Direction::Grow, None) => quantity + accrual + payment,
    };

    let precision = params.precision;
    Ok(Step {
        state: PeriodState { quantity: closing },
        record: PeriodRecord {
            period,
            opening: round_to(quantity, precision),
            accrual: round_to(accrual, precision),
            payment: round_to(payment, precision),
            closing: round_to(closing, precision),
            rate,
        },
        accrual,
        payment,
        reached_target,
    })
}

/// Rounds half away from zero to `precision` decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    // `+ 0.0` folds negative zero into zero.
    (value * scale).round() / scale + 0.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::accrual::{AdaptiveBaseline, KCAL_PER_KG, MifflinStJeor, PeriodicRate, Sex};
    use crate::core::rates::{Rule, RuleTable};
    use crate::core::types::{Cadence, PaymentRule, StopCondition};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn payoff(balance: f64, apr: f64, payment: PaymentRule) -> SimulationParameters {
        SimulationParameters::new(
            balance,
            Direction::Reduce,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(apr)),
            payment,
            StopCondition::Target(0.0),
        )
    }

    fn start(quantity: f64) -> PeriodState {
        PeriodState { quantity }
    }

    #[test]
    fn percent_with_floor_uses_floor_on_small_balance() {
        let params = payoff(
            500.0,
            0.0,
            PaymentRule::PercentWithFloor {
                percent: 0.02,
                floor: 35.0,
            },
        );
        let step = step(start(500.0), &params, 0).expect("no tables");
        assert_approx(step.payment, 35.0);
        assert_approx(step.state.quantity, 465.0);
    }

    #[test]
    fn percent_with_floor_tracks_balance_when_above_floor() {
        let params = payoff(
            5_000.0,
            0.0,
            PaymentRule::PercentWithFloor {
                percent: 0.02,
                floor: 35.0,
            },
        );
        let step = step(start(5_000.0), &params, 0).expect("no tables");
        assert_approx(step.payment, 100.0);
    }

    #[test]
    fn interest_is_added_before_payment() {
        let params = payoff(1_200.0, 0.12, PaymentRule::fixed(100.0));
        let step = step(start(1_200.0), &params, 0).expect("no tables");
        assert_approx(step.accrual, 12.0);
        assert_approx(step.state.quantity, 1_112.0);
        assert_eq!(step.record.period, 0);
        assert_eq!(step.record.opening, 1_200.0);
        assert_eq!(step.record.closing, 1_112.0);
        assert_approx(step.record.rate, 0.01);
        assert!(!step.reached_target);
    }

    #[test]
    fn final_payment_is_capped_at_amount_owed() {
        let params = payoff(100.0, 0.12, PaymentRule::fixed(250.0));
        let step = step(start(100.0), &params, 0).expect("no tables");
        assert!(step.reached_target);
        assert_approx(step.payment, 101.0);
        assert_eq!(step.state.quantity, 0.0);
        assert_eq!(step.record.closing, 0.0);
    }

    #[test]
    fn payment_below_interest_grows_balance() {
        let params = payoff(1_000.0, 0.20, PaymentRule::fixed(10.0));
        let step = step(start(1_000.0), &params, 0).expect("no tables");
        assert!(step.state.quantity > 1_000.0);
        assert_eq!(step.record.closing, 1_006.67);
    }

    #[test]
    fn contribution_cap_limits_growth_payment_by_age() {
        let mut params = SimulationParameters::new(
            10_000.0,
            Direction::Grow,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(0.0)),
            PaymentRule::fixed(5_000.0),
            StopCondition::Horizon(600),
        );
        params.start_age = Some(49);
        params.contribution_cap = Some(RuleTable::new(vec![
            Rule::at_least(50, 30_000.0),
            Rule::otherwise(24_000.0),
        ]));

        let before = step(start(10_000.0), &params, 11).expect("covered");
        let after = step(start(10_000.0), &params, 12).expect("covered");
        assert_approx(before.payment, 2_000.0);
        assert_approx(after.payment, 2_500.0);
    }

    #[test]
    fn cap_table_gap_is_an_error() {
        let mut params = payoff(1_000.0, 0.1, PaymentRule::fixed(50.0));
        params.contribution_cap = Some(RuleTable::new(vec![Rule::between(0, 2, 600.0)]));
        let err = step(start(1_000.0), &params, 3).expect_err("uncovered period");
        assert_eq!(err.key, 3);
    }

    #[test]
    fn growth_toward_target_lands_exactly() {
        let params = SimulationParameters::new(
            990.0,
            Direction::Grow,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(0.0)),
            PaymentRule::fixed(50.0),
            StopCondition::Target(1_000.0),
        );
        let step = step(start(990.0), &params, 0).expect("no tables");
        assert!(step.reached_target);
        assert_approx(step.payment, 10.0);
        assert_eq!(step.state.quantity, 1_000.0);
    }

    #[test]
    fn weight_loss_accrual_is_clamped_at_goal() {
        let params = SimulationParameters::new(
            80.2,
            Direction::Reduce,
            Cadence::Weekly,
            Arc::new(AdaptiveBaseline {
                baseline: MifflinStJeor {
                    height_cm: 175.0,
                    age_years: 35,
                    sex: Sex::Female,
                },
                activity_factor: 1.5,
                daily_intake: 1_200.0,
                energy_per_unit: KCAL_PER_KG,
            }),
            PaymentRule::fixed(0.0),
            StopCondition::Target(80.0),
        );
        let step = step(start(80.2), &params, 0).expect("no tables");
        assert!(step.reached_target);
        assert_eq!(step.state.quantity, 80.0);
        assert_approx(step.accrual, -0.2);
        assert_eq!(step.payment, 0.0);
    }

    #[test]
    fn round_to_keeps_requested_places() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(-0.001, 2), 0.0);
        assert!(round_to(-0.001, 2).is_sign_positive());
        assert_eq!(round_to(81.234_56, 1), 81.2);
    }
}
