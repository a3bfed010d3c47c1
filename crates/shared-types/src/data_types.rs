//! Request and response shapes exchanged with the dashboard host

use serde::{Deserialize, Serialize};

/// Unresolved time range as handed over by the host's time service.
///
/// Each bound is an absolute instant, a relative offset such as `now-1h`,
/// or the literal `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTimeRange {
    pub from: String,
    pub to: String,
}

impl RawTimeRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Trailing window ending at "now", e.g. `RawTimeRange::last("6h")`.
    pub fn last(offset: &str) -> Self {
        Self::new(format!("now-{offset}"), "now")
    }
}

/// One panel series request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTarget {
    /// Table the series lives in
    pub series: Option<String>,
    pub column: Option<String>,
    /// Aggregate applied to `column`, `mean` when absent
    pub function: Option<String>,
    /// Extra predicate and-ed to the time filter
    pub condition: Option<String>,
    /// Free-form query, used when `raw_query` is set or no series is given
    pub query: Option<String>,
    pub raw_query: bool,
    #[serde(alias = "groupby_field")]
    pub group_by_field: Option<String>,
    pub alias: Option<String>,
    pub interval: Option<String>,
    pub hide: bool,
}

impl QueryTarget {
    /// Target built from a table/column pair
    pub fn series(series: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            series: Some(series.into()),
            column: Some(column.into()),
            ..Default::default()
        }
    }

    /// Target carrying a hand-written query
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            raw_query: true,
            ..Default::default()
        }
    }

    pub fn with_group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by_field = Some(field.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    fn has_series(&self) -> bool {
        matches!((&self.series, &self.column), (Some(s), Some(c)) if !s.is_empty() && !c.is_empty())
    }

    fn has_query(&self) -> bool {
        self.query.as_deref().is_some_and(|q| !q.trim().is_empty())
    }

    /// Whether this target contributes a query at all
    pub fn is_queryable(&self) -> bool {
        !self.hide && (self.has_series() || self.has_query())
    }

    /// Whether the raw query text should be used instead of the pair
    pub fn uses_raw_query(&self) -> bool {
        self.has_query() && (self.raw_query || !self.has_series())
    }
}

/// Host-level query cycle request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    pub range: RawTimeRange,
    /// Default bucket width for targets without their own interval
    pub interval: String,
    pub targets: Vec<QueryTarget>,
}

/// `[value, timestampMillis]`, serialized as a two element array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint(pub Option<f64>, pub i64);

impl TimeSeriesPoint {
    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub target: String,
    pub datapoints: Vec<TimeSeriesPoint>,
}

/// Result of one query cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Vec<NamedSeries>,
}

/// Annotation as authored in the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationDefinition {
    pub name: String,
    pub query: String,
    pub title_column: Option<String>,
    pub tags_column: Option<String>,
    pub text_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEvent {
    /// Epoch milliseconds
    pub time: i64,
    pub title: Option<String>,
    pub tags: Option<String>,
    pub text: Option<String>,
    pub annotation: AnnotationDefinition,
}

/// Entry of a template-variable or metric picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFindValue {
    pub text: String,
    pub expandable: bool,
}

impl MetricFindValue {
    pub fn leaf(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expandable: false,
        }
    }
}
