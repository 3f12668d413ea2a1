//! Batch time ranges.
//!
//! Ranges keep the caller's raw `from`/`to` strings and are parsed on demand, because
//! only some backends need absolute bounds.
//!
//! Accepted forms: `now`, `now-<n><unit>` / `now+<n><unit>` with units `s m h d w`,
//! or integer epoch milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const DEFAULT_FROM: &str = "now-6h";
pub const DEFAULT_TO: &str = "now";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    #[error("invalid time expression: {0:?}")]
    InvalidExpression(String),

    #[error("time range start {from} is after end {to}")]
    Inverted { from: i64, to: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl TimeRange {
    /// Build a range, substituting defaults for empty bounds.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            from: if from.trim().is_empty() { DEFAULT_FROM.to_string() } else { from },
            to: if to.trim().is_empty() { DEFAULT_TO.to_string() } else { to },
        }
    }

    /// Absolute bounds in epoch milliseconds, relative to the current time.
    pub fn bounds_ms(&self) -> Result<(i64, i64), TimeRangeError> {
        self.bounds_ms_at(now_ms())
    }

    /// Absolute bounds in epoch milliseconds, relative to `now_ms`.
    pub fn bounds_ms_at(&self, now_ms: i64) -> Result<(i64, i64), TimeRangeError> {
        let from = parse_time(&self.from, now_ms)?;
        let to = parse_time(&self.to, now_ms)?;
        if from > to {
            return Err(TimeRangeError::Inverted { from, to });
        }
        Ok((from, to))
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn parse_time(expr: &str, now_ms: i64) -> Result<i64, TimeRangeError> {
    let expr = expr.trim();
    let invalid = || TimeRangeError::InvalidExpression(expr.to_string());

    if let Ok(epoch) = expr.parse::<i64>() {
        return Ok(epoch);
    }

    let rest = expr.strip_prefix("now").ok_or_else(invalid)?;
    if rest.is_empty() {
        return Ok(now_ms);
    }

    let (sign, offset) = match rest.as_bytes()[0] {
        b'-' => (-1, &rest[1..]),
        b'+' => (1, &rest[1..]),
        _ => return Err(invalid()),
    };
    if offset.len() < 2 || !offset.is_char_boundary(offset.len() - 1) {
        return Err(invalid());
    }
    let (amount, unit) = offset.split_at(offset.len() - 1);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    let unit_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(invalid()),
    };

    amount
        .checked_mul(sign * unit_ms)
        .and_then(|offset| now_ms.checked_add(offset))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_defaults_for_empty_bounds() {
        let range = TimeRange::new("", " ");
        assert_eq!(range.from, DEFAULT_FROM);
        assert_eq!(range.to, DEFAULT_TO);
        assert_eq!(range.bounds_ms_at(NOW).unwrap(), (NOW - 6 * 3_600_000, NOW));
    }

    #[test]
    fn test_relative_and_epoch() {
        assert_eq!(parse_time("now-5m", NOW).unwrap(), NOW - 300_000);
        assert_eq!(parse_time("now+1d", NOW).unwrap(), NOW + 86_400_000);
        assert_eq!(parse_time("1500000000000", NOW).unwrap(), 1_500_000_000_000);
    }

    #[test]
    fn test_invalid_expressions() {
        for bad in ["yesterday", "now-", "now-5", "now-5y", "now*5m", "now-xm"] {
            assert!(parse_time(bad, NOW).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_out_of_range_offsets_rejected() {
        for huge in ["now-9000000000000000w", "now+9223372036854775807s", "now-15250285w"] {
            assert_eq!(
                parse_time(huge, NOW),
                Err(TimeRangeError::InvalidExpression(huge.to_string()))
            );
        }
        assert!(TimeRange::new("now-9000000000000000w", "now").bounds_ms_at(NOW).is_err());
    }

    #[test]
    fn test_inverted_range() {
        let range = TimeRange::new("now", "now-1h");
        assert!(matches!(
            range.bounds_ms_at(NOW),
            Err(TimeRangeError::Inverted { .. })
        ));
    }
}
