//! Generators for synthetic observation series.
//!
//! Values follow a predictable pattern so stored rows can be checked
//! against what was generated.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use xenia_common::Observation;

/// Fixed start time used by the generated series: 2024-03-01 00:00:00.
pub fn series_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid series start")
}

/// `count` observations for one sensor, `step_minutes` apart.
///
/// The i-th record has value `i as f64 / 10.0`.
pub fn observation_series(
    sensor_id: i64,
    platform_handle: &str,
    count: usize,
    step_minutes: i64,
) -> Vec<Observation> {
    let start = series_start();
    (0..count)
        .map(|i| {
            let m_date = start + Duration::minutes(step_minutes * i as i64);
            Observation::new(sensor_id, platform_handle, m_date, Some(i as f64 / 10.0))
        })
        .collect()
}

/// CSV text with a `DATE_UTC` column followed by `columns`, one row per
/// `step_minutes`. Cell values are `row + column_index / 10`.
pub fn csv_series(columns: &[&str], rows: usize, step_minutes: i64) -> String {
    let start = series_start();
    let mut out = String::from("DATE_UTC");
    for column in columns {
        out.push(',');
        out.push_str(column);
    }
    out.push('\n');

    for row in 0..rows {
        let m_date = start + Duration::minutes(step_minutes * row as i64);
        out.push_str(&m_date.format("%Y-%m-%dT%H:%M:%S").to_string());
        for idx in 0..columns.len() {
            out.push_str(&format!(",{}", row as f64 + idx as f64 / 10.0));
        }
        out.push('\n');
    }
    out
}
