pub mod format;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{
    CardInputs, ChartSeries, ComparisonSummary, DEFAULT_SAFETY_CAP, MetricsSummary, Outcome,
    OutcomeStatus, PeriodRecord, RetirementInputs, RuleTable, Scenario, ScenarioRun, Sex,
    SimulationError, SimulationParameters, SolveConfig, SolveResult, StopCondition, WeightInputs,
    account_type_scenarios, card_scenarios, compare_against, retirement_scenario, run_scenarios,
    sample, solve_required_amount, summarize, weight_scenario,
};

/// Oldest retirement age accepted on the command line.
const MAX_AGE: u32 = 120;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CliSex {
    Male,
    Female,
}

impl From<CliSex> for Sex {
    fn from(value: CliSex) -> Self {
        match value {
            CliSex::Male => Sex::Male,
            CliSex::Female => Sex::Female,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "projection",
    about = "Period-by-period projections: card payoff, retirement savings, weight change"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_SAFETY_CAP,
        help = "Maximum number of periods simulated per scenario"
    )]
    safety_cap: u32,
    #[arg(long, global = true, default_value_t = 60, help = "Points kept per chart series")]
    max_points: usize,
    #[arg(
        long,
        global = true,
        help = "Date projections start from (YYYY-MM-DD); defaults to today"
    )]
    start_date: Option<NaiveDate>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    #[arg(long, global = true, help = "Include every period record in the report")]
    full_schedule: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Credit-card payoff: minimum payment vs fixed payment vs fixed plus extra.
    Card(CardArgs),
    /// Monthly savings growth until retirement, optionally against a taxable account.
    Retirement(RetirementArgs),
    /// Weekly weight projection with a metabolic baseline recomputed from each new weight.
    Weight(WeightArgs),
    /// Run a scenario described in a JSON file.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct CardArgs {
    #[arg(long)]
    balance: f64,
    #[arg(long, help = "Annual percentage rate in percent, e.g. 24")]
    apr: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Minimum payment as a percent of the balance"
    )]
    min_percent: f64,
    #[arg(long, default_value_t = 35.0, help = "Smallest minimum payment")]
    min_floor: f64,
    #[arg(long, help = "Fixed monthly payment")]
    payment: f64,
    #[arg(long, default_value_t = 0.0, help = "Extra paid on top of the fixed payment")]
    extra: f64,
    #[arg(long, help = "Introductory APR in percent")]
    intro_apr: Option<f64>,
    #[arg(long, default_value_t = 0)]
    intro_months: u32,
    #[arg(
        long,
        help = "Solve for the fixed payment that clears the balance in this many months"
    )]
    payoff_months: Option<u32>,
}

#[derive(Args, Debug, Clone)]
struct RetirementArgs {
    #[arg(long)]
    current_age: u32,
    #[arg(long)]
    retirement_age: u32,
    #[arg(long, default_value_t = 0.0)]
    balance: f64,
    #[arg(long, default_value_t = 6.0, help = "Expected annual return in percent")]
    return_rate: f64,
    #[arg(long, help = "Annual contribution")]
    contribution: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Yearly contribution raise in percent"
    )]
    contribution_growth: f64,
    #[arg(long, help = "Ignore age-based contribution limits")]
    no_limits: bool,
    #[arg(
        long,
        help = "Also project a taxable account whose return is reduced by this many percent"
    )]
    tax_drag: Option<f64>,
    #[arg(
        long,
        help = "Solve for the monthly contribution that reaches this balance by retirement"
    )]
    target_balance: Option<f64>,
    #[arg(skip)]
    contribution_limits: Option<RuleTable>,
}

#[derive(Args, Debug, Clone)]
struct WeightArgs {
    #[arg(long, help = "Current weight in kg")]
    weight: f64,
    #[arg(long, help = "Goal weight in kg")]
    goal: f64,
    #[arg(long, help = "Height in cm")]
    height: f64,
    #[arg(long)]
    age: u32,
    #[arg(long, value_enum)]
    sex: CliSex,
    #[arg(
        long,
        default_value_t = 1.375,
        help = "Activity multiplier applied to resting energy"
    )]
    activity: f64,
    #[arg(long, help = "Daily energy intake in kcal")]
    intake: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CardPayload {
    balance: Option<f64>,
    apr: Option<f64>,
    min_percent: Option<f64>,
    min_floor: Option<f64>,
    payment: Option<f64>,
    extra: Option<f64>,
    intro_apr: Option<f64>,
    intro_months: Option<u32>,
    payoff_months: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RetirementPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    balance: Option<f64>,
    return_rate: Option<f64>,
    contribution: Option<f64>,
    contribution_growth: Option<f64>,
    no_limits: Option<bool>,
    tax_drag: Option<f64>,
    target_balance: Option<f64>,
    contribution_limits: Option<RuleTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WeightPayload {
    weight: Option<f64>,
    goal: Option<f64>,
    height: Option<f64>,
    age: Option<u32>,
    sex: Option<CliSex>,
    activity: Option<f64>,
    intake: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ScenarioPayload {
    Card(CardPayload),
    Retirement(RetirementPayload),
    Weight(WeightPayload),
}

struct SolveRequest {
    params: SimulationParameters,
    config: SolveConfig,
}

/// Scenarios to run, the first being the comparison baseline.
struct Request {
    scenarios: Vec<Scenario>,
    solve: Option<SolveRequest>,
}

#[derive(Debug, Clone)]
struct Settings {
    safety_cap: u32,
    max_points: usize,
    start_date: NaiveDate,
    full_schedule: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub status: OutcomeStatus,
    /// Period in which a non-convergent run stopped making progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stalled_at: Option<u32>,
    pub metrics: MetricsSummary,
    pub chart: ChartSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<PeriodRecord>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub start_date: NaiveDate,
    pub scenarios: Vec<ScenarioReport>,
    pub comparisons: Vec<ComparisonSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solve: Option<SolveResult>,
}

fn ensure_percent(flag: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(format!("{flag} must be between 0 and 100"));
    }
    Ok(())
}

fn ensure_non_negative(flag: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{flag} must be >= 0"));
    }
    Ok(())
}

fn build_card_inputs(args: &CardArgs) -> Result<CardInputs, String> {
    if !args.balance.is_finite() || args.balance <= 0.0 {
        return Err("--balance must be > 0".to_string());
    }
    ensure_percent("--apr", args.apr)?;
    ensure_percent("--min-percent", args.min_percent)?;
    ensure_non_negative("--min-floor", args.min_floor)?;
    ensure_non_negative("--payment", args.payment)?;
    ensure_non_negative("--extra", args.extra)?;
    if let Some(intro_apr) = args.intro_apr {
        ensure_percent("--intro-apr", intro_apr)?;
        if args.intro_months == 0 {
            return Err("--intro-months must be > 0 when --intro-apr is set".to_string());
        }
    }
    if args.payoff_months == Some(0) {
        return Err("--payoff-months must be > 0".to_string());
    }

    Ok(CardInputs {
        balance: args.balance,
        apr: args.apr / 100.0,
        minimum_percent: args.min_percent / 100.0,
        minimum_floor: args.min_floor,
        fixed_payment: args.payment,
        extra_payment: args.extra,
        intro_apr: args.intro_apr.map(|v| v / 100.0),
        intro_months: args.intro_months,
    })
}

fn build_retirement_inputs(args: &RetirementArgs) -> Result<RetirementInputs, String> {
    if args.retirement_age <= args.current_age {
        return Err("--retirement-age must be > --current-age".to_string());
    }
    if args.retirement_age > MAX_AGE {
        return Err(format!("--retirement-age must be <= {MAX_AGE}"));
    }
    ensure_non_negative("--balance", args.balance)?;
    if !args.return_rate.is_finite() || args.return_rate <= -100.0 {
        return Err("--return-rate must be > -100".to_string());
    }
    ensure_non_negative("--contribution", args.contribution)?;
    if !args.contribution_growth.is_finite() || args.contribution_growth <= -100.0 {
        return Err("--contribution-growth must be > -100".to_string());
    }
    if let Some(drag) = args.tax_drag {
        ensure_percent("--tax-drag", drag)?;
    }
    if args
        .target_balance
        .is_some_and(|target| !target.is_finite() || target <= args.balance)
    {
        return Err("--target-balance must be > --balance".to_string());
    }

    let contribution_limits = if args.no_limits {
        None
    } else {
        Some(
            args.contribution_limits
                .clone()
                .unwrap_or_else(RetirementInputs::default_limits),
        )
    };

    Ok(RetirementInputs {
        current_age: args.current_age,
        retirement_age: args.retirement_age,
        current_balance: args.balance,
        annual_return: args.return_rate / 100.0,
        annual_contribution: args.contribution,
        contribution_growth: args.contribution_growth / 100.0,
        contribution_limits,
    })
}

fn build_weight_inputs(args: &WeightArgs) -> Result<WeightInputs, String> {
    if !args.weight.is_finite() || args.weight <= 0.0 {
        return Err("--weight must be > 0".to_string());
    }
    if !args.goal.is_finite() || args.goal <= 0.0 {
        return Err("--goal must be > 0".to_string());
    }
    if args.goal == args.weight {
        return Err("--goal must differ from --weight".to_string());
    }
    if !(50.0..=272.0).contains(&args.height) {
        return Err("--height must be between 50 and 272".to_string());
    }
    if !(1.0..=2.5).contains(&args.activity) {
        return Err("--activity must be between 1.0 and 2.5".to_string());
    }
    ensure_non_negative("--intake", args.intake)?;

    Ok(WeightInputs {
        weight_kg: args.weight,
        goal_kg: args.goal,
        height_cm: args.height,
        age_years: args.age,
        sex: args.sex.into(),
        activity_factor: args.activity,
        daily_intake: args.intake,
    })
}

fn card_request(args: &CardArgs) -> Result<Request, String> {
    let inputs = build_card_inputs(args)?;
    let scenarios = card_scenarios(&inputs);
    let solve = args.payoff_months.map(|months| SolveRequest {
        params: scenarios[1].params.clone(),
        config: SolveConfig::new(months, inputs.balance * (1.0 + inputs.apr) + 1.0),
    });
    Ok(Request { scenarios, solve })
}

fn retirement_request(args: &RetirementArgs) -> Result<Request, String> {
    let inputs = build_retirement_inputs(args)?;
    let base = retirement_scenario(&inputs);
    let solve = args.target_balance.map(|target| {
        let mut params = base.params.clone();
        params.stop = StopCondition::Target(target);
        SolveRequest {
            params,
            config: SolveConfig::new(inputs.horizon_months(), target),
        }
    });
    let scenarios = match args.tax_drag {
        Some(drag) => account_type_scenarios(&inputs, drag / 100.0),
        None => vec![base],
    };
    Ok(Request { scenarios, solve })
}

fn weight_request(args: &WeightArgs) -> Result<Request, String> {
    let inputs = build_weight_inputs(args)?;
    Ok(Request {
        scenarios: vec![weight_scenario(&inputs)],
        solve: None,
    })
}

fn default_card_args() -> CardArgs {
    CardArgs {
        balance: 5_000.0,
        apr: 24.0,
        min_percent: 3.0,
        min_floor: 35.0,
        payment: 200.0,
        extra: 0.0,
        intro_apr: None,
        intro_months: 0,
        payoff_months: None,
    }
}

fn default_retirement_args() -> RetirementArgs {
    RetirementArgs {
        current_age: 35,
        retirement_age: 65,
        balance: 0.0,
        return_rate: 6.0,
        contribution: 6_000.0,
        contribution_growth: 0.0,
        no_limits: false,
        tax_drag: None,
        target_balance: None,
        contribution_limits: None,
    }
}

fn default_weight_args() -> WeightArgs {
    WeightArgs {
        weight: 90.0,
        goal: 80.0,
        height: 175.0,
        age: 35,
        sex: CliSex::Male,
        activity: 1.375,
        intake: 2_000.0,
    }
}

fn request_from_payload(payload: ScenarioPayload) -> Result<Request, String> {
    match payload {
        ScenarioPayload::Card(p) => {
            let mut args = default_card_args();
            if let Some(v) = p.balance {
                args.balance = v;
            }
            if let Some(v) = p.apr {
                args.apr = v;
            }
            if let Some(v) = p.min_percent {
                args.min_percent = v;
            }
            if let Some(v) = p.min_floor {
                args.min_floor = v;
            }
            if let Some(v) = p.payment {
                args.payment = v;
            }
            if let Some(v) = p.extra {
                args.extra = v;
            }
            if p.intro_apr.is_some() {
                args.intro_apr = p.intro_apr;
            }
            if let Some(v) = p.intro_months {
                args.intro_months = v;
            }
            if p.payoff_months.is_some() {
                args.payoff_months = p.payoff_months;
            }
            card_request(&args)
        }
        ScenarioPayload::Retirement(p) => {
            let mut args = default_retirement_args();
            if let Some(v) = p.current_age {
                args.current_age = v;
            }
            if let Some(v) = p.retirement_age {
                args.retirement_age = v;
            }
            if let Some(v) = p.balance {
                args.balance = v;
            }
            if let Some(v) = p.return_rate {
                args.return_rate = v;
            }
            if let Some(v) = p.contribution {
                args.contribution = v;
            }
            if let Some(v) = p.contribution_growth {
                args.contribution_growth = v;
            }
            if let Some(v) = p.no_limits {
                args.no_limits = v;
            }
            if p.tax_drag.is_some() {
                args.tax_drag = p.tax_drag;
            }
            if p.target_balance.is_some() {
                args.target_balance = p.target_balance;
            }
            if p.contribution_limits.is_some() {
                args.contribution_limits = p.contribution_limits;
            }
            retirement_request(&args)
        }
        ScenarioPayload::Weight(p) => {
            let mut args = default_weight_args();
            if let Some(v) = p.weight {
                args.weight = v;
            }
            if let Some(v) = p.goal {
                args.goal = v;
            }
            if let Some(v) = p.height {
                args.height = v;
            }
            if let Some(v) = p.age {
                args.age = v;
            }
            if let Some(v) = p.sex {
                args.sex = v;
            }
            if let Some(v) = p.activity {
                args.activity = v;
            }
            if let Some(v) = p.intake {
                args.intake = v;
            }
            weight_request(&args)
        }
    }
}

fn request_from_json(json: &str) -> Result<Request, String> {
    let payload = serde_json::from_str::<ScenarioPayload>(json)
        .map_err(|e| format!("Invalid scenario JSON: {e}"))?;
    request_from_payload(payload)
}

fn request_from_file(path: &Path) -> Result<Request, String> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    request_from_json(&json)
}

fn scenario_report(run: &ScenarioRun, settings: &Settings) -> Result<ScenarioReport, SimulationError> {
    let schedule = run.outcome.schedule();
    let stalled_at = match &run.outcome {
        Outcome::NonConvergent(result) => Some(result.period),
        Outcome::Completed(_) | Outcome::SafetyCapReached(_) => None,
    };
    Ok(ScenarioReport {
        name: run.name.clone(),
        status: run.outcome.status(),
        stalled_at,
        metrics: summarize(&run.outcome, settings.start_date)?,
        chart: sample(schedule, settings.max_points),
        schedule: settings
            .full_schedule
            .then(|| schedule.records().to_vec()),
    })
}

fn build_report(request: Request, settings: &Settings) -> Result<Report, SimulationError> {
    let runs = run_scenarios(&request.scenarios)?;
    let comparisons = match runs.split_first() {
        Some((baseline, others)) => compare_against(baseline, others),
        None => Vec::new(),
    };
    let scenarios = runs
        .iter()
        .map(|run| scenario_report(run, settings))
        .collect::<Result<Vec<_>, _>>()?;
    let solve = request
        .solve
        .map(|s| solve_required_amount(&s.params, s.config))
        .transpose()?;

    info!(
        scenarios = scenarios.len(),
        comparisons = comparisons.len(),
        solved = solve.is_some(),
        "projection finished"
    );
    Ok(Report {
        start_date: settings.start_date,
        scenarios,
        comparisons,
        solve,
    })
}

fn render(report: &Report, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| format!("failed to serialize report: {e}")),
        OutputFormat::Text => {
            format::render_text(report).map_err(|e| format!("failed to render report: {e}"))
        }
    }
}

/// Caps every scenario run and the solver's search horizon at `safety_cap` periods.
fn apply_safety_cap(request: &mut Request, safety_cap: u32) {
    for scenario in &mut request.scenarios {
        scenario.params.safety_cap = safety_cap;
    }
    if let Some(solve) = &mut request.solve {
        solve.config.max_periods = solve.config.max_periods.min(safety_cap);
    }
}

/// Builds, runs and renders the scenarios requested on the command line.
pub fn run_cli(cli: Cli) -> Result<String, String> {
    if cli.safety_cap == 0 {
        return Err("--safety-cap must be > 0".to_string());
    }
    if cli.max_points < 2 {
        return Err("--max-points must be >= 2".to_string());
    }
    let settings = Settings {
        safety_cap: cli.safety_cap,
        max_points: cli.max_points,
        start_date: cli
            .start_date
            .unwrap_or_else(|| Local::now().date_naive()),
        full_schedule: cli.full_schedule,
    };

    let mut request = match &cli.command {
        Command::Card(args) => card_request(args)?,
        Command::Retirement(args) => retirement_request(args)?,
        Command::Weight(args) => weight_request(args)?,
        Command::Run { config } => request_from_file(config)?,
    };
    apply_safety_cap(&mut request, settings.safety_cap);

    let report = build_report(request, &settings).map_err(|e| e.to_string())?;
    render(&report, cli.format)
}
