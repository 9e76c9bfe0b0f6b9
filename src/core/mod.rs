mod accrual;
mod compare;
mod engine;
mod error;
mod metrics;
mod presets;
mod rates;
mod sample;
mod solver;
mod stepper;
mod types;

pub use accrual::{
    Accrual, AccrualModel, AdaptiveBaseline, BandedRate, KCAL_PER_KG, MifflinStJeor,
    PeriodicRate, Sex,
};
pub use compare::{ComparisonSummary, PeriodDelta, ScenarioComparison, compare, compare_against};
pub use engine::{Scenario, ScenarioRun, run, run_scenarios};
pub use error::{NoApplicableRuleError, ParameterError, SimulationError};
pub use metrics::{
    HumanDuration, MetricsSummary, average_accrual_per_day, average_accrual_per_period,
    average_accrual_per_week, first_period_accrual_ratio, projected_date, summarize,
    time_to_target, total_accrual, total_payment,
};
pub use presets::{
    CardInputs, RetirementInputs, WeightInputs, account_type_scenarios, card_scenarios,
    retirement_scenario, weight_scenario,
};
pub use rates::{Rule, RuleTable, effective_limit, effective_periodic_rate};
pub use sample::{ChartPoint, ChartSeries, sample};
pub use solver::{SolveConfig, SolveIteration, SolveResult, SolveStatus, solve_required_amount};
pub use stepper::{Step, round_to, step};
pub use types::{
    Cadence, DEFAULT_PRECISION, DEFAULT_SAFETY_CAP, Direction, NonConvergent, Outcome,
    OutcomeStatus, PaymentRule, PeriodContext, PeriodRecord, PeriodState, Schedule, ScheduleStep,
    SimulationParameters, StopCondition,
};
