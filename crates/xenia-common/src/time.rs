//! Timestamp parsing for observation sources.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{XeniaError, XeniaResult};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse an observation timestamp into a naive UTC datetime.
///
/// Timestamps carrying an offset are converted to UTC; timestamps without
/// one are assumed to already be UTC. A bare date means midnight.
pub fn parse_obs_time(s: &str) -> XeniaResult<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }

    for format in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ndt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(ndt);
        }
    }

    Err(XeniaError::InvalidTime(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_rfc3339_is_converted_to_utc() {
        let parsed = parse_obs_time("2024-01-15T12:00:00-05:00").unwrap();
        assert_eq!(parsed, ymd_hms(2024, 1, 15, 17, 0, 0));
    }

    #[test]
    fn test_naive_formats() {
        assert_eq!(
            parse_obs_time("2024-01-15 06:30:00").unwrap(),
            ymd_hms(2024, 1, 15, 6, 30, 0)
        );
        assert_eq!(
            parse_obs_time("01/15/2024 06:30").unwrap(),
            ymd_hms(2024, 1, 15, 6, 30, 0)
        );
        assert_eq!(
            parse_obs_time(" 2024-01-15 ").unwrap(),
            ymd_hms(2024, 1, 15, 0, 0, 0)
        );
    }

    #[test]
    fn test_invalid_time() {
        assert!(matches!(
            parse_obs_time("yesterday"),
            Err(XeniaError::InvalidTime(_))
        ));
    }
}
