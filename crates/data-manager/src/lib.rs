//! Query pipeline for the Presto datasource
//!
//! Translates host panel requests into engine SQL, sends them through a
//! rotating, retrying executor and reshapes the answers into time series,
//! annotations and metric lists. Dashboards can be kept in the engine itself
//! through [`EngineDashboardStore`].

pub mod dashboards;
pub mod datasource;
pub mod executor;
pub mod interval;
pub mod query_builder;
pub mod reshaper;
pub mod response;
pub mod template;
pub mod time_filter;

pub use dashboards::{dashboard_table, title_from_table, EngineDashboardStore};
pub use datasource::PrestoDatasource;
pub use executor::{
    Credentials, EndpointRing, EngineRequest, HttpTransport, RequestBody, RequestExecutor,
    RetryPolicy, Transport, TransportFailure,
};
pub use interval::{interval_seconds, BucketContext};
pub use query_builder::{PreparedQuery, QueryBuilder};
pub use reshaper::{SeriesContext, SeriesReshaper};
pub use response::{normalize, RawSeries};
pub use template::{NoTemplating, TemplateSrv, VariableMap};
pub use time_filter::{TimeExpr, TimeFilter, TimeFilterBuilder};

pub use tokio_util::sync::CancellationToken;
