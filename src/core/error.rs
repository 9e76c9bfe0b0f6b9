use thiserror::Error;

/// Parameter problems detected before the first period is simulated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },
    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} must be greater than -100%, got {value}")]
    RateTooLow { field: &'static str, value: f64 },
    #[error("starting quantity {start} is already at or past target {target}")]
    AlreadyAtTarget { start: f64, target: f64 },
    #[error("a reducing projection needs a target quantity")]
    MissingTarget,
    #[error("horizon must be at least one period")]
    ZeroHorizon,
    #[error("safety cap must be at least one period")]
    ZeroSafetyCap,
    #[error("rule table for {0} has no entries")]
    EmptyRuleTable(&'static str),
    #[error("scheduled payment steps must start at strictly increasing keys")]
    UnorderedSchedule,
    #[error("record precision {0} exceeds 10 decimal places")]
    Precision(u32),
    #[error("invalid search configuration: {0}")]
    SolveConfig(&'static str),
}

/// A rule table that was expected to cover every key did not.
///
/// This means the table handed to the engine is malformed; it is not a condition callers are
/// expected to recover from.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
#[error("no rule in table covers key {key}")]
pub struct NoApplicableRuleError {
    pub key: u32,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParameterError),
    #[error(transparent)]
    NoApplicableRule(#[from] NoApplicableRuleError),
    #[error("projected date falls outside the supported calendar range")]
    DateOutOfRange,
}

pub(crate) fn ensure_finite(field: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParameterError::NonFinite { field })
    }
}

pub(crate) fn ensure_non_negative(field: &'static str, value: f64) -> Result<(), ParameterError> {
    ensure_finite(field, value)?;
    if value < 0.0 {
        return Err(ParameterError::Negative { field, value });
    }
    Ok(())
}

pub(crate) fn ensure_rate(field: &'static str, value: f64) -> Result<(), ParameterError> {
    ensure_finite(field, value)?;
    if value <= -1.0 {
        return Err(ParameterError::RateTooLow { field, value });
    }
    Ok(())
}

pub(crate) fn ensure_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ParameterError> {
    ensure_finite(field, value)?;
    if !(min..=max).contains(&value) {
        return Err(ParameterError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
