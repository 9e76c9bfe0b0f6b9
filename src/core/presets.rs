use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::accrual::{
    AccrualModel, AdaptiveBaseline, BandedRate, KCAL_PER_KG, MifflinStJeor, PeriodicRate, Sex,
};
use super::engine::Scenario;
use super::rates::{Rule, RuleTable};
use super::types::{Cadence, Direction, PaymentRule, SimulationParameters, StopCondition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInputs {
    pub balance: f64,
    pub apr: f64,
    pub minimum_percent: f64,
    pub minimum_floor: f64,
    pub fixed_payment: f64,
    pub extra_payment: f64,
    /// Promotional APR charged for the first `intro_months` months.
    pub intro_apr: Option<f64>,
    pub intro_months: u32,
}

/// "minimum-only", "fixed" and, when an extra amount is given, "fixed-plus-extra".
pub fn card_scenarios(inputs: &CardInputs) -> Vec<Scenario> {
    let accrual: Arc<dyn AccrualModel> = match inputs.intro_apr {
        Some(intro_apr) if inputs.intro_months > 0 => {
            Arc::new(BandedRate::new(RuleTable::new(vec![
                Rule::below(inputs.intro_months, intro_apr),
                Rule::otherwise(inputs.apr),
            ])))
        }
        _ => Arc::new(PeriodicRate::new(inputs.apr)),
    };
    let payoff = |payment: PaymentRule| {
        SimulationParameters::new(
            inputs.balance,
            Direction::Reduce,
            Cadence::Monthly,
            Arc::clone(&accrual),
            payment,
            StopCondition::Target(0.0),
        )
    };

    let mut scenarios = vec![
        Scenario::new(
            "minimum-only",
            payoff(PaymentRule::PercentWithFloor {
                percent: inputs.minimum_percent,
                floor: inputs.minimum_floor,
            }),
        ),
        Scenario::new("fixed", payoff(PaymentRule::fixed(inputs.fixed_payment))),
    ];
    if inputs.extra_payment > 0.0 {
        scenarios.push(Scenario::new(
            "fixed-plus-extra",
            payoff(PaymentRule::fixed(inputs.fixed_payment + inputs.extra_payment)),
        ));
    }
    scenarios
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub current_balance: f64,
    pub annual_return: f64,
    pub annual_contribution: f64,
    /// Yearly raise applied to the contribution.
    pub contribution_growth: f64,
    /// Annual limits keyed by age; `None` means uncapped.
    pub contribution_limits: Option<RuleTable>,
}

impl RetirementInputs {
    /// Employee deferral limits with the age-50 catch-up and the larger catch-up at 60 to 63.
    pub fn default_limits() -> RuleTable {
        RuleTable::new(vec![
            Rule::between(60, 63, 34_750.0),
            Rule::at_least(50, 31_000.0),
            Rule::otherwise(23_500.0),
        ])
    }

    pub(crate) fn horizon_months(&self) -> u32 {
        self.retirement_age
            .saturating_sub(self.current_age)
            .saturating_mul(12)
    }
}

fn accumulation(
    name: &str,
    inputs: &RetirementInputs,
    annual_return: f64,
    limits: Option<RuleTable>,
) -> Scenario {
    let mut params = SimulationParameters::new(
        inputs.current_balance,
        Direction::Grow,
        Cadence::Monthly,
        Arc::new(PeriodicRate::new(annual_return)),
        PaymentRule::Escalating {
            initial: inputs.annual_contribution / 12.0,
            annual_growth: inputs.contribution_growth,
        },
        StopCondition::Horizon(inputs.horizon_months()),
    );
    params.contribution_cap = limits;
    params.start_age = Some(inputs.current_age);
    Scenario::new(name, params)
}

/// Monthly growth from the current age up to retirement.
pub fn retirement_scenario(inputs: &RetirementInputs) -> Scenario {
    accumulation(
        "retirement",
        inputs,
        inputs.annual_return,
        inputs.contribution_limits.clone(),
    )
}

/// The same savings plan in a capped tax-advantaged account and in a taxable account whose
/// return is reduced by `tax_drag` but which takes any contribution.
pub fn account_type_scenarios(inputs: &RetirementInputs, tax_drag: f64) -> Vec<Scenario> {
    vec![
        accumulation(
            "tax-advantaged",
            inputs,
            inputs.annual_return,
            inputs.contribution_limits.clone(),
        ),
        accumulation("taxable", inputs, inputs.annual_return - tax_drag, None),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightInputs {
    pub weight_kg: f64,
    pub goal_kg: f64,
    pub height_cm: f64,
    pub age_years: u32,
    pub sex: Sex,
    pub activity_factor: f64,
    pub daily_intake: f64,
}

/// Weekly weight projection toward `goal_kg`; gains are projected when the goal is above the
/// current weight.
pub fn weight_scenario(inputs: &WeightInputs) -> Scenario {
    let direction = if inputs.goal_kg > inputs.weight_kg {
        Direction::Grow
    } else {
        Direction::Reduce
    };
    let mut params = SimulationParameters::new(
        inputs.weight_kg,
        direction,
        Cadence::Weekly,
        Arc::new(AdaptiveBaseline {
            baseline: MifflinStJeor {
                height_cm: inputs.height_cm,
                age_years: inputs.age_years,
                sex: inputs.sex,
            },
            activity_factor: inputs.activity_factor,
            daily_intake: inputs.daily_intake,
            energy_per_unit: KCAL_PER_KG,
        }),
        PaymentRule::fixed(0.0),
        StopCondition::Target(inputs.goal_kg),
    );
    params.start_age = Some(inputs.age_years);
    Scenario::new("weight", params)
}
