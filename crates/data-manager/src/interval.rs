//! Bucketing of the time axis into fixed-width intervals

use crate::time_filter::ENGINE_DATE_FORMAT;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use presto_shared::{PrestoError, PrestoResult};
use regex::Regex;

static INTERVAL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)([A-Za-z]+)").unwrap());

/// Width in seconds of an interval such as `10s`, `5m`, `1h` or `2d`.
///
/// Unit letters other than s, m, h and d give a width of 0. Input without
/// any `<digits><letters>` run is rejected.
pub fn interval_seconds(interval: &str) -> PrestoResult<u64> {
    let invalid = || PrestoError::InvalidInterval {
        input: interval.to_string(),
    };

    let captures = INTERVAL_PATTERN.captures(interval).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;

    let unit_secs = match &captures[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => 0,
    };

    Ok(amount.saturating_mul(unit_secs))
}

/// Everything needed to bucket rows for one query execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketContext {
    pub since: NaiveDateTime,
    pub width_secs: u64,
    /// Engine expression computing the zero-based bucket index of a row
    pub expression: String,
}

impl BucketContext {
    pub fn new(time_expr: &str, since: NaiveDateTime, interval: &str) -> PrestoResult<Self> {
        let width_secs = interval_seconds(interval)?;
        let expression = format!(
            "floor((to_unixtime({time_expr}) - to_unixtime(date_parse('{}', '{ENGINE_DATE_FORMAT}'))) / ({width_secs}))",
            since.format(crate::time_filter::LITERAL_FORMAT)
        );

        Ok(Self {
            since,
            width_secs,
            expression,
        })
    }

    pub fn since_epoch_secs(&self) -> i64 {
        self.since.and_utc().timestamp()
    }

    /// Epoch milliseconds of the start of bucket `index`
    pub fn bucket_start_millis(&self, index: f64) -> i64 {
        let secs = index * self.width_secs as f64 + self.since_epoch_secs() as f64;
        (secs * 1000.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(interval_seconds("10s").unwrap(), 10);
        assert_eq!(interval_seconds("5m").unwrap(), 300);
        assert_eq!(interval_seconds("1h").unwrap(), 3_600);
        assert_eq!(interval_seconds("2d").unwrap(), 172_800);
        // the host sometimes sends a lower bound marker
        assert_eq!(interval_seconds(">30s").unwrap(), 30);
    }

    #[test]
    fn test_unknown_unit_is_zero_width() {
        assert_eq!(interval_seconds("3w").unwrap(), 0);
        assert_eq!(interval_seconds("100ms").unwrap(), 0);
    }

    #[test]
    fn test_malformed_interval() {
        for bad in ["", "auto", "10", "m5"] {
            assert!(matches!(
                interval_seconds(bad),
                Err(PrestoError::InvalidInterval { .. })
            ));
        }
    }

    #[test]
    fn test_bucket_expression() {
        let since = NaiveDateTime::parse_from_str("2015-03-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let bucket = BucketContext::new("ts", since, "1m").unwrap();

        assert_eq!(
            bucket.expression,
            "floor((to_unixtime(ts) - to_unixtime(date_parse('2015-03-01 00:00:00', '%Y-%m-%e %H:%i:%s'))) / (60))"
        );
        assert_eq!(bucket.bucket_start_millis(2.0), (since.and_utc().timestamp() + 120) * 1000);
    }
}
