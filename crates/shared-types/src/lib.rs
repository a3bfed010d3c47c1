//! Shared types for the Presto datasource
//!
//! This crate contains the types exchanged between the dashboard host, the
//! query pipeline in `presto-data`, and the dashboard stores. Everything here
//! is plain data plus the error type and the dashboard store contract.

pub mod dashboard;
pub mod data_types;
pub mod errors;

pub use dashboard::{
    slugify, split_tags, DashboardHit, DashboardRecord, DashboardStore, SavedDashboard,
    SearchHits, SearchQuery, SearchScope,
};
pub use data_types::{
    AnnotationDefinition, AnnotationEvent, MetricFindValue, NamedSeries, QueryOptions,
    QueryResponse, QueryTarget, RawTimeRange, TimeSeriesPoint,
};
pub use errors::{PrestoError, PrestoResult};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_queryable() {
        assert!(QueryTarget::series("cpu", "value").is_queryable());
        assert!(QueryTarget::raw("select 1").is_queryable());
        assert!(!QueryTarget::default().is_queryable());

        let mut hidden = QueryTarget::series("cpu", "value");
        hidden.hide = true;
        assert!(!hidden.is_queryable());
    }

    #[test]
    fn test_target_from_host_json() {
        let target: QueryTarget = serde_json::from_value(json!({
            "series": "host.cpu",
            "column": "load",
            "groupby_field": "region",
            "alias": "$s-$g",
            "hide": false
        }))
        .unwrap();

        assert_eq!(target.group_by_field.as_deref(), Some("region"));
        assert!(!target.uses_raw_query());
    }

    #[test]
    fn test_point_serializes_as_pair() {
        let series = NamedSeries {
            target: "cpu".to_string(),
            datapoints: vec![TimeSeriesPoint(Some(1.5), 1000), TimeSeriesPoint(None, 2000)],
        };

        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["datapoints"], json!([[1.5, 1000], [null, 2000]]));
    }

    #[test]
    fn test_last_range() {
        let range = RawTimeRange::last("6h");
        assert_eq!(range.from, "now-6h");
        assert_eq!(range.to, "now");
    }
}
