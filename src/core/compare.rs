use serde::Serialize;

use super::engine::ScenarioRun;
use super::metrics::{total_accrual, total_payment};
use super::types::{OutcomeStatus, Schedule};

/// Difference between two schedules at one period index, `a - b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDelta {
    pub period: u32,
    pub quantity_a: f64,
    pub quantity_b: f64,
    pub delta_quantity: f64,
    pub delta_accrual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub delta_total_accrual: f64,
    pub delta_total_payment: f64,
    pub delta_period_count: i64,
    pub delta_final_quantity: f64,
    pub per_period_delta: Vec<PeriodDelta>,
}

/// Compares two schedules period by period.
///
/// Periods are aligned by index. Past the end of the shorter schedule its final quantity is
/// held constant and it accrues nothing, so a scenario that finished early keeps contributing
/// a well-defined value to every later delta.
pub fn compare(a: &Schedule, b: &Schedule) -> ScenarioComparison {
    let len = a.len().max(b.len());
    let per_period_delta = (0..len)
        .map(|index| {
            let (quantity_a, accrual_a) = aligned(a, index);
            let (quantity_b, accrual_b) = aligned(b, index);
            PeriodDelta {
                period: index as u32,
                quantity_a,
                quantity_b,
                delta_quantity: quantity_a - quantity_b,
                delta_accrual: accrual_a - accrual_b,
            }
        })
        .collect();

    ScenarioComparison {
        delta_total_accrual: total_accrual(a) - total_accrual(b),
        delta_total_payment: total_payment(a) - total_payment(b),
        delta_period_count: a.len() as i64 - b.len() as i64,
        delta_final_quantity: a.final_quantity() - b.final_quantity(),
        per_period_delta,
    }
}

fn aligned(schedule: &Schedule, index: usize) -> (f64, f64) {
    match schedule.records().get(index) {
        Some(record) => (record.closing, record.accrual),
        None => (schedule.final_quantity(), 0.0),
    }
}

/// One alternative measured against the baseline, without the per-period detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub baseline: String,
    pub alternative: String,
    pub alternative_status: OutcomeStatus,
    /// Positive when the alternative accrues more than the baseline.
    pub delta_total_accrual: f64,
    pub delta_total_payment: f64,
    pub delta_period_count: i64,
    pub delta_final_quantity: f64,
}

/// Compares every run in `others` against `baseline`, in order.
pub fn compare_against(baseline: &ScenarioRun, others: &[ScenarioRun]) -> Vec<ComparisonSummary> {
    let base = baseline.outcome.schedule();
    others
        .iter()
        .map(|other| {
            let comparison = compare(other.outcome.schedule(), base);
            ComparisonSummary {
                baseline: baseline.name.clone(),
                alternative: other.name.clone(),
                alternative_status: other.outcome.status(),
                delta_total_accrual: comparison.delta_total_accrual,
                delta_total_payment: comparison.delta_total_payment,
                delta_period_count: comparison.delta_period_count,
                delta_final_quantity: comparison.delta_final_quantity,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::accrual::PeriodicRate;
    use crate::core::engine::{Scenario, run, run_scenarios};
    use crate::core::types::{
        Cadence, Direction, PaymentRule, SimulationParameters, StopCondition,
    };
    use proptest::prelude::{prop_assert_eq, proptest};

    fn card(balance: f64, apr: f64, payment: f64) -> SimulationParameters {
        SimulationParameters::new(
            balance,
            Direction::Reduce,
            Cadence::Monthly,
            Arc::new(PeriodicRate::new(apr)),
            PaymentRule::fixed(payment),
            StopCondition::Target(0.0),
        )
    }

    fn schedule(balance: f64, apr: f64, payment: f64) -> Schedule {
        run(&card(balance, apr, payment))
            .expect("valid")
            .into_schedule()
    }

    #[test]
    fn paying_extra_saves_interest_and_time() {
        let base = schedule(5_000.0, 0.24, 200.0);
        let extra = schedule(5_000.0, 0.24, 300.0);
        let cmp = compare(&extra, &base);

        assert!(cmp.delta_total_accrual < 0.0);
        assert!(cmp.delta_period_count < 0);
        assert_eq!(cmp.delta_final_quantity, 0.0);
        assert_eq!(cmp.per_period_delta.len(), base.len());
    }

    #[test]
    fn shorter_schedule_holds_its_terminal_quantity() {
        let short = schedule(300.0, 0.0, 100.0);
        let long = schedule(600.0, 0.0, 100.0);
        let cmp = compare(&short, &long);

        assert_eq!(cmp.per_period_delta.len(), 6);
        assert_eq!(cmp.delta_period_count, -3);
        let tail = &cmp.per_period_delta[4];
        assert_eq!(tail.period, 4);
        assert_eq!(tail.quantity_a, 0.0);
        assert_eq!(tail.quantity_b, 100.0);
        assert_eq!(tail.delta_quantity, -100.0);
        assert_eq!(tail.delta_accrual, 0.0);
    }

    #[test]
    fn comparing_a_schedule_with_itself_is_all_zero() {
        let s = schedule(5_000.0, 0.24, 200.0);
        let cmp = compare(&s, &s);
        assert_eq!(cmp.delta_total_accrual, 0.0);
        assert_eq!(cmp.delta_period_count, 0);
        assert!(cmp.per_period_delta.iter().all(|d| d.delta_quantity == 0.0));
    }

    #[test]
    fn compare_against_reports_each_alternative() {
        let runs = run_scenarios(&[
            Scenario::new("fixed", card(5_000.0, 0.24, 200.0)),
            Scenario::new("fixed-plus-extra", card(5_000.0, 0.24, 250.0)),
            Scenario::new("too-little", card(5_000.0, 0.24, 50.0)),
        ])
        .expect("valid");
        let summaries = compare_against(&runs[0], &runs[1..]);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].baseline, "fixed");
        assert_eq!(summaries[0].alternative, "fixed-plus-extra");
        assert_eq!(summaries[0].alternative_status, OutcomeStatus::Completed);
        assert!(summaries[0].delta_total_accrual < 0.0);
        assert_eq!(summaries[1].alternative_status, OutcomeStatus::NonConvergent);
        assert!(summaries[1].delta_final_quantity > 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_comparison_is_antisymmetric(
            balance in 500u32..20_000,
            apr_bp in 0u32..3_000,
            payment_a in 1u32..400,
            payment_b in 1u32..400
        ) {
            let balance = balance as f64;
            let apr = apr_bp as f64 / 10_000.0;
            let floor = balance * apr / 12.0 + balance / 100.0;
            let a = schedule(balance, apr, floor + payment_a as f64);
            let b = schedule(balance, apr, floor + payment_b as f64);

            let ab = compare(&a, &b);
            let ba = compare(&b, &a);
            prop_assert_eq!(ab.delta_total_accrual, -ba.delta_total_accrual);
            prop_assert_eq!(ab.delta_total_payment, -ba.delta_total_payment);
            prop_assert_eq!(ab.delta_period_count, -ba.delta_period_count);
            prop_assert_eq!(ab.per_period_delta.len(), ba.per_period_delta.len());
        }
    }
}
