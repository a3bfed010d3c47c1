//! Translation of host time ranges into engine filter predicates

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use presto_shared::{PrestoError, PrestoResult, RawTimeRange};

/// Pattern the engine's `date_parse` is called with
pub const ENGINE_DATE_FORMAT: &str = "%Y-%m-%e %H:%i:%s";

/// Layout instants are rendered in before being handed to `date_parse`
pub const LITERAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Expression reading the time field, parsed when the column holds text
pub fn time_field_expression(field: &str, is_string: bool) -> String {
    if is_string {
        format!("date_parse({field}, '{ENGINE_DATE_FORMAT}')")
    } else {
        field.to_string()
    }
}

/// `date_parse('<instant>', ...)` literal for an instant
pub fn date_parse_literal(instant: NaiveDateTime) -> String {
    format!(
        "date_parse('{}', '{ENGINE_DATE_FORMAT}')",
        instant.format(LITERAL_FORMAT)
    )
}

/// One bound of a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeExpr {
    Now,
    /// Offset back from now, from `now-<n><unit>`
    Relative(Duration),
    Absolute(NaiveDateTime),
}

impl TimeExpr {
    pub fn parse(input: &str) -> PrestoResult<Self> {
        let text = input.trim();
        let invalid = || PrestoError::InvalidDate {
            input: input.to_string(),
        };

        if text == "now" {
            return Ok(TimeExpr::Now);
        }

        if let Some(offset) = text.strip_prefix("now-") {
            return parse_offset(offset).map(TimeExpr::Relative).ok_or_else(invalid);
        }

        parse_absolute(text).map(TimeExpr::Absolute).ok_or_else(invalid)
    }

    pub fn is_now(&self) -> bool {
        matches!(self, TimeExpr::Now)
    }

    /// Concrete instant of this bound given the current instant, `None` when
    /// the offset reaches past the representable range
    pub fn resolve(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            TimeExpr::Now => Some(now),
            TimeExpr::Relative(offset) => now.checked_sub_signed(*offset),
            TimeExpr::Absolute(instant) => Some(*instant),
        }
    }
}

fn parse_offset(offset: &str) -> Option<Duration> {
    let split = offset.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = offset.split_at(split);
    let amount: i64 = amount.parse().ok()?;

    match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    }
}

fn parse_absolute(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    for format in [
        LITERAL_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    // epoch milliseconds, the form the host serializes instants to
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        let millis: i64 = text.parse().ok()?;
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc());
    }

    None
}

/// Filter predicate plus the instant buckets are counted from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFilter {
    pub predicate: String,
    pub since: NaiveDateTime,
}

impl TimeFilter {
    pub fn since_epoch_secs(&self) -> i64 {
        self.since.and_utc().timestamp()
    }
}

/// Builds time filters for one datasource
#[derive(Debug, Clone)]
pub struct TimeFilterBuilder {
    time_expr: String,
    pseudo_now: NaiveDateTime,
    tz_offset_secs: i64,
}

impl TimeFilterBuilder {
    /// `pseudo_now` of `None` means wall-clock now
    pub fn new(
        time_expr: impl Into<String>,
        pseudo_now: Option<NaiveDateTime>,
        tz_offset_secs: i64,
    ) -> Self {
        Self {
            time_expr: time_expr.into(),
            pseudo_now: pseudo_now.unwrap_or_else(|| Utc::now().naive_utc()),
            tz_offset_secs,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.pseudo_now
    }

    pub fn build(&self, range: &RawTimeRange) -> PrestoResult<TimeFilter> {
        let invalid = |input: &String| PrestoError::InvalidDate {
            input: input.clone(),
        };

        let from = TimeExpr::parse(&range.from)?;
        let until = TimeExpr::parse(&range.to)?;
        let start = from
            .resolve(self.pseudo_now)
            .ok_or_else(|| invalid(&range.from))?;
        let end = until
            .resolve(self.pseudo_now)
            .ok_or_else(|| invalid(&range.to))?;

        if start > end {
            return Err(invalid(&range.from));
        }

        if until.is_now() {
            // trailing window, no timezone shift
            return Ok(TimeFilter {
                predicate: format!("{} > {}", self.time_expr, date_parse_literal(start)),
                since: start,
            });
        }

        let from_secs = start.and_utc().timestamp() + self.tz_offset_secs;
        let until_secs = end.and_utc().timestamp() + self.tz_offset_secs;

        let since = DateTime::from_timestamp(from_secs, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| invalid(&range.from))?;

        Ok(TimeFilter {
            predicate: format!(
                "to_unixtime({expr}) > {from_secs} and to_unixtime({expr}) < {until_secs}",
                expr = self.time_expr
            ),
            since,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, LITERAL_FORMAT).unwrap()
    }

    #[test]
    fn test_time_field_expression() {
        assert_eq!(time_field_expression("ts", false), "ts");
        assert_eq!(
            time_field_expression("ts", true),
            "date_parse(ts, '%Y-%m-%e %H:%i:%s')"
        );
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(TimeExpr::parse("now").unwrap(), TimeExpr::Now);
        assert_eq!(
            TimeExpr::parse("now-6h").unwrap(),
            TimeExpr::Relative(Duration::hours(6))
        );
        assert_eq!(
            TimeExpr::parse("2015-03-01 10:00:00").unwrap(),
            TimeExpr::Absolute(at("2015-03-01 10:00:00"))
        );
        assert_eq!(
            TimeExpr::parse("2015-03-01T10:00:00Z").unwrap(),
            TimeExpr::Absolute(at("2015-03-01 10:00:00"))
        );
        assert_eq!(
            TimeExpr::parse("1425204000000").unwrap(),
            TimeExpr::Absolute(at("2015-03-01 10:00:00"))
        );
    }

    #[test]
    fn test_bad_date_is_input_error() {
        for bad in ["yesterday", "now-3x", "2015-13-45", "", "now-200000000000d"] {
            assert!(matches!(
                TimeExpr::parse(bad),
                Err(PrestoError::InvalidDate { .. })
            ));
        }

        let builder = TimeFilterBuilder::new("ts", Some(at("2015-03-01 12:00:00")), 0);
        for range in [
            RawTimeRange::last("100000000d"),
            RawTimeRange::new("now-1h", "now-100000000d"),
            RawTimeRange::new("2015-03-01 11:00:00", "2015-03-01 10:00:00"),
            RawTimeRange::new("now-1h", "now-2h"),
            RawTimeRange::new("2015-03-02 00:00:00", "now"),
        ] {
            assert!(matches!(
                builder.build(&range),
                Err(PrestoError::InvalidDate { .. })
            ));
        }
    }

    #[test]
    fn test_trailing_window_uses_pseudo_now() {
        let builder = TimeFilterBuilder::new("ts", Some(at("2015-03-01 12:00:00")), 8 * 3600);
        let filter = builder.build(&RawTimeRange::last("1h")).unwrap();

        assert_eq!(filter.since, at("2015-03-01 11:00:00"));
        assert_eq!(
            filter.predicate,
            "ts > date_parse('2015-03-01 11:00:00', '%Y-%m-%e %H:%i:%s')"
        );
    }

    #[test]
    fn test_absolute_range_applies_timezone() {
        let builder = TimeFilterBuilder::new("ts", None, 3600);
        let range = RawTimeRange::new("1970-01-01 00:00:00", "1970-01-01 01:00:00");
        let filter = builder.build(&range).unwrap();

        assert_eq!(
            filter.predicate,
            "to_unixtime(ts) > 3600 and to_unixtime(ts) < 7200"
        );
        assert_eq!(filter.since_epoch_secs(), 3600);
    }

    #[test]
    fn test_relative_range_not_ending_now() {
        let builder = TimeFilterBuilder::new("ts", Some(at("1970-01-02 00:00:00")), 0);
        let filter = builder
            .build(&RawTimeRange::new("now-2h", "now-1h"))
            .unwrap();

        assert_eq!(
            filter.predicate,
            "to_unixtime(ts) > 79200 and to_unixtime(ts) < 82800"
        );
    }
}
