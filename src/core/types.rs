use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::accrual::AccrualModel;
use super::error::{
    ParameterError, ensure_finite, ensure_non_negative, ensure_range, ensure_rate,
};
use super::rates::RuleTable;

pub const DEFAULT_SAFETY_CAP: u32 = 600;
pub const DEFAULT_PRECISION: u32 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub fn periods_per_year(self) -> u32 {
        match self {
            Cadence::Weekly => 52,
            Cadence::Monthly => 12,
            Cadence::Yearly => 1,
        }
    }

    pub fn period_days(self) -> f64 {
        match self {
            Cadence::Weekly => 7.0,
            Cadence::Monthly => 365.25 / 12.0,
            Cadence::Yearly => 365.25,
        }
    }
}

/// Which way the tracked quantity moves when the plan is working.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Payments are subtracted: debt payoff, weight loss.
    Reduce,
    /// Contributions are added: savings and retirement accounts.
    Grow,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopCondition {
    /// Stop once the quantity reaches this value.
    Target(f64),
    /// Stop after a fixed number of periods.
    Horizon(u32),
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStep {
    /// First rule key (age or period index) this amount applies to.
    pub from: u32,
    pub amount: f64,
}

/// How much is paid or contributed each period, before caps and target clamping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PaymentRule {
    Fixed { amount: f64 },
    /// `max(opening quantity * percent, floor)`; shrinks with the balance until the floor.
    PercentWithFloor { percent: f64, floor: f64 },
    /// A fixed amount raised by `annual_growth` once per elapsed year.
    Escalating { initial: f64, annual_growth: f64 },
    /// Steps sorted by `from`; the last step at or below the current key applies.
    Scheduled { steps: Vec<ScheduleStep> },
}

impl PaymentRule {
    pub fn fixed(amount: f64) -> Self {
        PaymentRule::Fixed { amount }
    }

    pub fn resolve(&self, quantity: f64, ctx: &PeriodContext) -> f64 {
        match self {
            PaymentRule::Fixed { amount } => *amount,
            PaymentRule::PercentWithFloor { percent, floor } => (quantity * percent).max(*floor),
            PaymentRule::Escalating {
                initial,
                annual_growth,
            } => initial * (1.0 + annual_growth).powi(ctx.years_elapsed() as i32),
            PaymentRule::Scheduled { steps } => {
                let key = ctx.rule_key();
                steps
                    .iter()
                    .rev()
                    .find(|step| step.from <= key)
                    .map(|step| step.amount)
                    .unwrap_or(0.0)
            }
        }
    }

    fn validate(&self) -> Result<(), ParameterError> {
        match self {
            PaymentRule::Fixed { amount } => ensure_non_negative("payment amount", *amount),
            PaymentRule::PercentWithFloor { percent, floor } => {
                ensure_range("payment percent", *percent, 0.0, 1.0)?;
                ensure_non_negative("payment floor", *floor)
            }
            PaymentRule::Escalating {
                initial,
                annual_growth,
            } => {
                ensure_non_negative("payment amount", *initial)?;
                ensure_rate("payment growth", *annual_growth)
            }
            PaymentRule::Scheduled { steps } => {
                for step in steps {
                    ensure_non_negative("scheduled payment", step.amount)?;
                }
                if steps.windows(2).any(|pair| pair[0].from >= pair[1].from) {
                    return Err(ParameterError::UnorderedSchedule);
                }
                Ok(())
            }
        }
    }
}

/// Immutable input to one scenario run.
#[derive(Debug, Clone)]
pub struct SimulationParameters {
    pub start_quantity: f64,
    pub direction: Direction,
    pub cadence: Cadence,
    pub accrual: Arc<dyn AccrualModel>,
    pub payment: PaymentRule,
    /// Annual contribution limits; the stepper applies `limit / periods_per_year`.
    pub contribution_cap: Option<RuleTable>,
    pub stop: StopCondition,
    /// When set, rule tables are keyed by whole age instead of period index.
    pub start_age: Option<u32>,
    pub safety_cap: u32,
    /// Decimal places kept when a record is emitted.
    pub precision: u32,
}

impl SimulationParameters {
    pub fn new(
        start_quantity: f64,
        direction: Direction,
        cadence: Cadence,
        accrual: Arc<dyn AccrualModel>,
        payment: PaymentRule,
        stop: StopCondition,
    ) -> Self {
        Self {
            start_quantity,
            direction,
            cadence,
            accrual,
            payment,
            contribution_cap: None,
            stop,
            start_age: None,
            safety_cap: DEFAULT_SAFETY_CAP,
            precision: DEFAULT_PRECISION,
        }
    }

    pub fn target(&self) -> Option<f64> {
        match self.stop {
            StopCondition::Target(target) => Some(target),
            StopCondition::Horizon(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        ensure_finite("starting quantity", self.start_quantity)?;
        self.accrual.validate()?;
        self.payment.validate()?;
        if let Some(cap) = &self.contribution_cap {
            cap.validate("contribution cap")?;
        }
        if self.safety_cap == 0 {
            return Err(ParameterError::ZeroSafetyCap);
        }
        if self.precision > 10 {
            return Err(ParameterError::Precision(self.precision));
        }

        match (self.stop, self.direction) {
            (StopCondition::Horizon(0), _) => Err(ParameterError::ZeroHorizon),
            (StopCondition::Horizon(_), Direction::Reduce) => Err(ParameterError::MissingTarget),
            (StopCondition::Horizon(_), Direction::Grow) => Ok(()),
            (StopCondition::Target(target), direction) => {
                ensure_finite("target quantity", target)?;
                let needs_progress = match direction {
                    Direction::Reduce => self.start_quantity > target,
                    Direction::Grow => self.start_quantity < target,
                };
                if needs_progress {
                    Ok(())
                } else {
                    Err(ParameterError::AlreadyAtTarget {
                        start: self.start_quantity,
                        target,
                    })
                }
            }
        }
    }
}

/// What the stepper knows about the period being simulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodContext {
    pub period: u32,
    pub cadence: Cadence,
    pub start_age: Option<u32>,
}

impl PeriodContext {
    pub fn new(period: u32, params: &SimulationParameters) -> Self {
        Self {
            period,
            cadence: params.cadence,
            start_age: params.start_age,
        }
    }

    pub fn periods_per_year(&self) -> f64 {
        self.cadence.periods_per_year() as f64
    }

    pub fn period_days(&self) -> f64 {
        self.cadence.period_days()
    }

    pub fn years_elapsed(&self) -> u32 {
        self.period / self.cadence.periods_per_year()
    }

    pub fn age(&self) -> Option<u32> {
        self.start_age.map(|age| age + self.years_elapsed())
    }

    /// Key used for rule tables and payment schedules.
    pub fn rule_key(&self) -> u32 {
        self.age().unwrap_or(self.period)
    }
}

/// The single quantity carried from one period to the next, at full precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodState {
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRecord {
    pub period: u32,
    pub opening: f64,
    pub accrual: f64,
    pub payment: f64,
    pub closing: f64,
    /// Per-period rate that produced the accrual.
    pub rate: f64,
}

/// Append-only, period-ordered output of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    direction: Direction,
    cadence: Cadence,
    start_quantity: f64,
    records: Vec<PeriodRecord>,
}

impl Schedule {
    pub fn new(direction: Direction, cadence: Cadence, start_quantity: f64) -> Self {
        Self {
            direction,
            cadence,
            start_quantity,
            records: Vec::new(),
        }
    }

    pub(crate) fn with_capacity(
        direction: Direction,
        cadence: Cadence,
        start_quantity: f64,
        capacity: usize,
    ) -> Self {
        Self {
            direction,
            cadence,
            start_quantity,
            records: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, record: PeriodRecord) {
        debug_assert!(
            self.records
                .last()
                .is_none_or(|last| last.period < record.period),
            "period index must increase"
        );
        self.records.push(record);
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn start_quantity(&self) -> f64 {
        self.start_quantity
    }

    pub fn records(&self) -> &[PeriodRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&PeriodRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&PeriodRecord> {
        self.records.last()
    }

    /// Closing quantity of the last record, or the start when nothing ran.
    pub fn final_quantity(&self) -> f64 {
        self.records
            .last()
            .map(|record| record.closing)
            .unwrap_or(self.start_quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonConvergent {
    /// Records up to and including the period that made no progress, or the full capped run
    /// when the target lies past the steady state.
    pub schedule: Schedule,
    pub period: u32,
    /// Amounts from the stalled period, or evaluated at the target for a steady-state stall.
    pub accrual: f64,
    pub payment: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeStatus {
    Completed,
    NonConvergent,
    SafetyCapReached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Target reached, or the horizon elapsed for a horizon-bound projection.
    Completed(Schedule),
    /// A period left the quantity no closer to its target.
    NonConvergent(NonConvergent),
    /// Still converging when the iteration budget ran out; the schedule is partial.
    SafetyCapReached(Schedule),
}

impl Outcome {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            Outcome::Completed(_) => OutcomeStatus::Completed,
            Outcome::NonConvergent(_) => OutcomeStatus::NonConvergent,
            Outcome::SafetyCapReached(_) => OutcomeStatus::SafetyCapReached,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        match self {
            Outcome::Completed(schedule) | Outcome::SafetyCapReached(schedule) => schedule,
            Outcome::NonConvergent(result) => &result.schedule,
        }
    }

    pub fn into_schedule(self) -> Schedule {
        match self {
            Outcome::Completed(schedule) | Outcome::SafetyCapReached(schedule) => schedule,
            Outcome::NonConvergent(result) => result.schedule,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}
