use serde::Serialize;

use super::types::{PeriodRecord, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub period: u32,
    pub quantity: f64,
    pub accrual: f64,
    pub payment: f64,
}

impl From<&PeriodRecord> for ChartPoint {
    fn from(record: &PeriodRecord) -> Self {
        Self {
            period: record.period,
            quantity: record.closing,
            accrual: record.accrual,
            payment: record.payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub start_quantity: f64,
    /// Distance between consecutive sampled periods, apart from the final point.
    pub stride: usize,
    pub source_len: usize,
    pub points: Vec<ChartPoint>,
}

/// Reduces `schedule` to at most `max_points` points for charting.
///
/// Picks every `ceil(len / max_points)`-th record starting from the first and always ends on
/// the last record. When the stride grid is already full, its last point gives way to the
/// final record so the bound holds. `max_points` below 2 is treated as 2.
pub fn sample(schedule: &Schedule, max_points: usize) -> ChartSeries {
    let records = schedule.records();
    let len = records.len();
    let max_points = max_points.max(2);

    let (stride, points) = if len <= max_points {
        (1, records.iter().map(ChartPoint::from).collect())
    } else {
        let stride = len.div_ceil(max_points);
        let mut points: Vec<ChartPoint> = records
            .iter()
            .step_by(stride)
            .map(ChartPoint::from)
            .collect();
        if (len - 1) % stride != 0 {
            let last = ChartPoint::from(&records[len - 1]);
            if points.len() >= max_points {
                points.pop();
            }
            points.push(last);
        }
        (stride, points)
    };

    ChartSeries {
        start_quantity: schedule.start_quantity(),
        stride,
        source_len: len,
        points,
    }
}
