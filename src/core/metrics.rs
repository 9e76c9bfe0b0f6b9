use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

use super::error::SimulationError;
use super::types::{Cadence, Outcome, Schedule};

pub fn total_accrual(schedule: &Schedule) -> f64 {
    schedule.records().iter().map(|record| record.accrual).sum()
}

pub fn total_payment(schedule: &Schedule) -> f64 {
    schedule.records().iter().map(|record| record.payment).sum()
}

/// Share of the first payment eaten by accrual. `None` when nothing was paid in period 0.
pub fn first_period_accrual_ratio(schedule: &Schedule) -> Option<f64> {
    let first = schedule.first()?;
    (first.payment > 0.0).then(|| first.accrual / first.payment)
}

pub fn average_accrual_per_period(schedule: &Schedule) -> Option<f64> {
    if schedule.is_empty() {
        return None;
    }
    Some(total_accrual(schedule) / schedule.len() as f64)
}

pub fn average_accrual_per_day(schedule: &Schedule) -> Option<f64> {
    average_accrual_per_period(schedule).map(|avg| avg / schedule.cadence().period_days())
}

pub fn average_accrual_per_week(schedule: &Schedule) -> Option<f64> {
    average_accrual_per_day(schedule).map(|per_day| per_day * 7.0)
}

/// A period count split into calendar units for its cadence.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub total_days: u64,
}

impl HumanDuration {
    pub fn from_periods(periods: u32, cadence: Cadence) -> Self {
        let per_year = cadence.periods_per_year();
        let (months, weeks) = match cadence {
            Cadence::Monthly => (periods % per_year, 0),
            Cadence::Weekly => (0, periods % per_year),
            Cadence::Yearly => (0, 0),
        };
        Self {
            years: periods / per_year,
            months,
            weeks,
            total_days: elapsed_days(periods, cadence) as u64,
        }
    }
}

pub fn time_to_target(schedule: &Schedule) -> HumanDuration {
    HumanDuration::from_periods(schedule.len() as u32, schedule.cadence())
}

fn elapsed_days(periods: u32, cadence: Cadence) -> i64 {
    (periods as f64 * cadence.period_days()).round() as i64
}

/// `today` plus `periods` periods, rounded to the nearest whole day.
pub fn projected_date(
    today: NaiveDate,
    periods: u32,
    cadence: Cadence,
) -> Result<NaiveDate, SimulationError> {
    TimeDelta::try_days(elapsed_days(periods, cadence))
        .and_then(|delta| today.checked_add_signed(delta))
        .ok_or(SimulationError::DateOutOfRange)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub periods: usize,
    pub total_accrual: f64,
    pub total_payment: f64,
    pub final_quantity: f64,
    pub first_period_accrual_ratio: Option<f64>,
    pub average_accrual_per_day: Option<f64>,
    pub average_accrual_per_week: Option<f64>,
    /// Only set for completed runs; a capped or stalled run has no meaningful duration.
    pub time_to_target: Option<HumanDuration>,
    pub projected_date: Option<NaiveDate>,
}

pub fn summarize(outcome: &Outcome, today: NaiveDate) -> Result<MetricsSummary, SimulationError> {
    let schedule = outcome.schedule();
    let (time_to_target, projected_date) = if outcome.is_completed() {
        (
            Some(time_to_target(schedule)),
            Some(projected_date(
                today,
                schedule.len() as u32,
                schedule.cadence(),
            )?),
        )
    } else {
        (None, None)
    };

    Ok(MetricsSummary {
        periods: schedule.len(),
        total_accrual: total_accrual(schedule),
        total_payment: total_payment(schedule),
        final_quantity: schedule.final_quantity(),
        first_period_accrual_ratio: first_period_accrual_ratio(schedule),
        average_accrual_per_day: average_accrual_per_day(schedule),
        average_accrual_per_week: average_accrual_per_week(schedule),
        time_to_target,
        projected_date,
    })
}
