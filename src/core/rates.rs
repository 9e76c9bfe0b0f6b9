use serde::{Deserialize, Serialize};

use super::error::{NoApplicableRuleError, ParameterError, ensure_finite};

/// Per-period share of a nominal annual rate.
///
/// Plain division; compounding happens in the stepper, one period at a time.
pub fn effective_periodic_rate(nominal_annual_rate: f64, periods_per_year: f64) -> f64 {
    nominal_annual_rate / periods_per_year
}

/// Looks up the first rule in `table` that covers `key` (an age or a period index).
pub fn effective_limit(table: &RuleTable, key: u32) -> Result<f64, NoApplicableRuleError> {
    table.resolve(key)
}

/// One row of a piecewise table. Both bounds are inclusive; a missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub from: Option<u32>,
    #[serde(default)]
    pub to: Option<u32>,
    pub value: f64,
}

impl Rule {
    pub fn between(from: u32, to: u32, value: f64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            value,
        }
    }

    pub fn at_least(from: u32, value: f64) -> Self {
        Self {
            from: Some(from),
            to: None,
            value,
        }
    }

    /// Keys strictly below `to_exclusive`, which must be at least 1.
    pub fn below(to_exclusive: u32, value: f64) -> Self {
        Self {
            from: None,
            to: Some(to_exclusive.saturating_sub(1)),
            value,
        }
    }

    pub fn otherwise(value: f64) -> Self {
        Self {
            from: None,
            to: None,
            value,
        }
    }

    fn covers(&self, key: u32) -> bool {
        self.from.is_none_or(|from| key >= from) && self.to.is_none_or(|to| key <= to)
    }
}

/// Ordered piecewise table; the first covering rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn resolve(&self, key: u32) -> Result<f64, NoApplicableRuleError> {
        self.rules
            .iter()
            .find(|rule| rule.covers(key))
            .map(|rule| rule.value)
            .ok_or(NoApplicableRuleError { key })
    }

    pub(crate) fn validate(&self, name: &'static str) -> Result<(), ParameterError> {
        if self.rules.is_empty() {
            return Err(ParameterError::EmptyRuleTable(name));
        }
        for rule in &self.rules {
            ensure_finite(name, rule.value)?;
        }
        Ok(())
    }
}
