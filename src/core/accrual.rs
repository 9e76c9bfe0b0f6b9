use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::error::{
    NoApplicableRuleError, ParameterError, ensure_non_negative, ensure_range, ensure_rate,
};
use super::rates::{RuleTable, effective_periodic_rate};
use super::types::PeriodContext;

/// Energy content of one kilogram of body mass change, in kcal.
pub const KCAL_PER_KG: f64 = 7_700.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accrual {
    /// Signed change to the quantity before any payment is applied.
    pub amount: f64,
    /// Per-period rate behind `amount`.
    pub rate: f64,
}

/// Per-period accrual strategy.
///
/// `accrue` is called every period with the quantity carried into that period, so models that
/// depend on the quantity (interest on a shrinking balance, energy needs of a lighter body) are
/// re-evaluated as the projection moves.
pub trait AccrualModel: Debug + Send + Sync {
    fn accrue(&self, quantity: f64, ctx: &PeriodContext) -> Result<Accrual, NoApplicableRuleError>;

    fn validate(&self) -> Result<(), ParameterError> {
        Ok(())
    }
}

/// Constant nominal annual rate: card APR, expected account return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicRate {
    pub annual_rate: f64,
}

impl PeriodicRate {
    pub fn new(annual_rate: f64) -> Self {
        Self { annual_rate }
    }
}

impl AccrualModel for PeriodicRate {
    fn accrue(&self, quantity: f64, ctx: &PeriodContext) -> Result<Accrual, NoApplicableRuleError> {
        let rate = effective_periodic_rate(self.annual_rate, ctx.periods_per_year());
        Ok(Accrual {
            amount: quantity * rate,
            rate,
        })
    }

    fn validate(&self) -> Result<(), ParameterError> {
        ensure_rate("annual rate", self.annual_rate)
    }
}

/// Annual rate looked up per period from a rule table (introductory APRs, age glide paths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandedRate {
    pub table: RuleTable,
}

impl BandedRate {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }
}

impl AccrualModel for BandedRate {
    fn accrue(&self, quantity: f64, ctx: &PeriodContext) -> Result<Accrual, NoApplicableRuleError> {
        let annual_rate = self.table.resolve(ctx.rule_key())?;
        let rate = effective_periodic_rate(annual_rate, ctx.periods_per_year());
        Ok(Accrual {
            amount: quantity * rate,
            rate,
        })
    }

    fn validate(&self) -> Result<(), ParameterError> {
        self.table.validate("rate table")?;
        for rule in self.table.rules() {
            ensure_rate("annual rate", rule.value)?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

/// Resting energy expenditure (kcal/day) from weight, height and age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MifflinStJeor {
    pub height_cm: f64,
    pub age_years: u32,
    pub sex: Sex,
}

impl MifflinStJeor {
    pub fn resting_energy(&self, weight_kg: f64, age_years: u32) -> f64 {
        let sex_offset = match self.sex {
            Sex::Male => 5.0,
            Sex::Female => -161.0,
        };
        10.0 * weight_kg + 6.25 * self.height_cm - 5.0 * age_years as f64 + sex_offset
    }
}

/// Body-mass change driven by the gap between intake and a maintenance level that is
/// recomputed from the current weight every period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveBaseline {
    pub baseline: MifflinStJeor,
    pub activity_factor: f64,
    pub daily_intake: f64,
    pub energy_per_unit: f64,
}

impl AdaptiveBaseline {
    pub fn maintenance(&self, weight: f64, ctx: &PeriodContext) -> f64 {
        let age = ctx.age().unwrap_or(self.baseline.age_years);
        self.baseline.resting_energy(weight, age) * self.activity_factor
    }
}

impl AccrualModel for AdaptiveBaseline {
    fn accrue(&self, quantity: f64, ctx: &PeriodContext) -> Result<Accrual, NoApplicableRuleError> {
        let daily_balance = self.daily_intake - self.maintenance(quantity, ctx);
        let amount = daily_balance * ctx.period_days() / self.energy_per_unit;
        let rate = if quantity.abs() > f64::EPSILON {
            amount / quantity
        } else {
            0.0
        };
        Ok(Accrual { amount, rate })
    }

    fn validate(&self) -> Result<(), ParameterError> {
        ensure_range("height", self.baseline.height_cm, 50.0, 272.0)?;
        ensure_range("activity factor", self.activity_factor, 1.0, 2.5)?;
        ensure_non_negative("daily intake", self.daily_intake)?;
        ensure_range("energy per unit", self.energy_per_unit, 1.0, f64::MAX)
    }
}
