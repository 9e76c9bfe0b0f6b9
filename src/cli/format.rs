use std::fmt::{self, Write};

use crate::core::{HumanDuration, OutcomeStatus};

use super::Report;

/// Groups the integer part in thousands: `1234567.891` with 2 decimals is `1,234,567.89`.
pub fn format_amount(value: f64, decimals: usize) -> String {
    let scale = 10f64.powi(decimals as i32);
    let scaled = (value.abs() * scale).round();
    let whole = (scaled / scale).trunc() as u64;
    let fraction = (scaled - whole as f64 * scale).round() as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    let sign = if value < 0.0 && scaled > 0.0 { "-" } else { "" };
    if decimals == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{fraction:0decimals$}")
    }
}

pub fn format_percentage(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn plural(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// "3 years 2 months", "1 year 8 weeks", "5 weeks".
pub fn format_duration(duration: &HumanDuration) -> String {
    let mut parts = Vec::new();
    if duration.years > 0 {
        parts.push(plural(duration.years, "year"));
    }
    if duration.months > 0 {
        parts.push(plural(duration.months, "month"));
    }
    if duration.weeks > 0 {
        parts.push(plural(duration.weeks, "week"));
    }
    if parts.is_empty() {
        return "under a period".to_string();
    }
    parts.join(" ")
}

fn status_label(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Completed => "completed",
        OutcomeStatus::NonConvergent => "never finishes: payment does not outpace accrual",
        OutcomeStatus::SafetyCapReached => "not finished within the projection limit",
    }
}

/// Plain-text report, one block per scenario followed by comparisons and the solve result.
pub fn render_text(report: &Report) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Projection from {}", report.start_date)?;

    for scenario in &report.scenarios {
        let m = &scenario.metrics;
        writeln!(out)?;
        writeln!(out, "[{}] {}", scenario.name, status_label(scenario.status))?;
        writeln!(out, "  periods:        {}", m.periods)?;
        writeln!(out, "  final quantity: {}", format_amount(m.final_quantity, 2))?;
        writeln!(out, "  total accrual:  {}", format_amount(m.total_accrual, 2))?;
        writeln!(out, "  total payments: {}", format_amount(m.total_payment, 2))?;
        if let Some(ratio) = m.first_period_accrual_ratio {
            writeln!(out, "  first-period accrual share: {}", format_percentage(ratio))?;
        }
        if let Some(per_week) = m.average_accrual_per_week {
            writeln!(out, "  average accrual per week:   {}", format_amount(per_week, 2))?;
        }
        if let (Some(duration), Some(date)) = (&m.time_to_target, m.projected_date) {
            writeln!(out, "  finishes in {} ({date})", format_duration(duration))?;
        }
        if let Some(period) = scenario.stalled_at {
            writeln!(out, "  stalled in period {period}")?;
        }
    }

    if !report.comparisons.is_empty() {
        writeln!(out)?;
        writeln!(out, "Compared with baseline:")?;
        for c in &report.comparisons {
            writeln!(
                out,
                "  {} vs {}: accrual {}, payments {}, periods {:+}, final {}",
                c.alternative,
                c.baseline,
                signed(c.delta_total_accrual),
                signed(c.delta_total_payment),
                c.delta_period_count,
                signed(c.delta_final_quantity),
            )?;
        }
    }

    if let Some(solve) = &report.solve {
        writeln!(out)?;
        match (solve.solved_value, solve.achieved_periods) {
            (Some(value), Some(periods)) => {
                writeln!(
                    out,
                    "Required amount per period: {} ({periods} periods, {:?})",
                    format_amount(value, 2),
                    solve.status
                )?;
            }
            _ => {
                writeln!(
                    out,
                    "No amount up to {} reaches the target within {} periods",
                    format_amount(solve.config.search_max, 2),
                    solve.config.max_periods
                )?;
            }
        }
    }

    Ok(out)
}

fn signed(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_amount(value, 2))
    } else {
        format_amount(value, 2)
    }
}
