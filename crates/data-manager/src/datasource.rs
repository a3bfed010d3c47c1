//! The datasource the host talks to

use crate::dashboards::EngineDashboardStore;
use crate::executor::{Credentials, EngineRequest, HttpTransport, RequestExecutor, Transport};
use crate::query_builder::QueryBuilder;
use crate::reshaper::{self, SeriesContext, SeriesReshaper};
use crate::response::{normalize, RawSeries};
use crate::template::{NoTemplating, TemplateSrv};
use crate::time_filter::{time_field_expression, TimeFilter, TimeFilterBuilder};
use futures::future::try_join_all;
use presto_config::{ConfigValidator, DataSourceConfig};
use presto_shared::{
    AnnotationDefinition, AnnotationEvent, DashboardRecord, DashboardStore, MetricFindValue,
    NamedSeries, PrestoResult, QueryOptions, QueryResponse, QueryTarget, RawTimeRange,
    SavedDashboard, SearchHits,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct PrestoDatasource {
    config: Arc<DataSourceConfig>,
    executor: RequestExecutor,
    templates: Arc<dyn TemplateSrv>,
    dashboards: Arc<dyn DashboardStore>,
    time_expr: String,
    shutdown: CancellationToken,
}

impl PrestoDatasource {
    /// Validate `config` and build a datasource sending through `transport`.
    ///
    /// Dashboards go to the engine until another store is installed with
    /// [`PrestoDatasource::with_dashboard_store`].
    pub fn new(config: DataSourceConfig, transport: Arc<dyn Transport>) -> PrestoResult<Self> {
        ConfigValidator::validate(&config)?;

        let shutdown = CancellationToken::new();
        let executor = RequestExecutor::from_config(&config, transport);
        let dashboards = Arc::new(EngineDashboardStore::new(
            executor.clone(),
            &config,
            shutdown.child_token(),
        ));
        let time_expr = time_field_expression(&config.time_field, config.time_field_is_string);

        Ok(Self {
            config: Arc::new(config),
            executor,
            templates: Arc::new(NoTemplating),
            dashboards,
            time_expr,
            shutdown,
        })
    }

    /// Datasource over HTTP using the configured credentials
    pub fn connect(config: DataSourceConfig) -> PrestoResult<Self> {
        let transport = Arc::new(HttpTransport::new(Credentials::from_config(&config)));
        Self::new(config, transport)
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateSrv>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_dashboard_store(mut self, store: Arc<dyn DashboardStore>) -> Self {
        self.dashboards = store;
        self
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Cancel every request in flight and every one issued afterwards
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn time_filter(&self, range: &RawTimeRange) -> PrestoResult<TimeFilter> {
        TimeFilterBuilder::new(
            self.time_expr.clone(),
            self.config.pseudonow,
            self.config.timezone_offset_secs(),
        )
        .build(range)
    }

    /// Run a statement and normalize the answer
    pub async fn series_query(&self, sql: &str) -> PrestoResult<Vec<RawSeries>> {
        let body = self
            .executor
            .execute(&EngineRequest::query(sql, &self.config.database), &self.shutdown)
            .await?;
        Ok(normalize(body))
    }

    pub async fn query(&self, options: &QueryOptions) -> PrestoResult<QueryResponse> {
        let filter = self.time_filter(&options.range)?;

        let per_target = options
            .targets
            .iter()
            .map(|target| self.query_target(target, &filter, &options.interval));
        let results = try_join_all(per_target).await?;

        Ok(QueryResponse {
            data: results.into_iter().flatten().collect(),
        })
    }

    async fn query_target(
        &self,
        target: &QueryTarget,
        filter: &TimeFilter,
        default_interval: &str,
    ) -> PrestoResult<Vec<NamedSeries>> {
        let prepared = QueryBuilder::new(target).prepare(
            filter,
            &self.time_expr,
            default_interval,
            self.templates.as_ref(),
        )?;
        let Some(prepared) = prepared else {
            return Ok(Vec::new());
        };

        let series = self.series_query(&prepared.sql).await?;
        let context = SeriesContext {
            alias: prepared.alias,
            group_by_field: prepared.group_by_field,
            series_name: prepared.series_name,
            bucket: prepared.bucket,
            approximate: self.config.approximate,
        };

        Ok(SeriesReshaper::new(&context).reshape(series))
    }

    pub async fn annotation_query(
        &self,
        annotation: &AnnotationDefinition,
        range: &RawTimeRange,
    ) -> PrestoResult<Vec<AnnotationEvent>> {
        let filter = self.time_filter(range)?;
        let sql = annotation.query.replacen("$timeFilter", &filter.predicate, 1);
        let sql = self.templates.replace(&sql);

        let series = self.series_query(&sql).await?;
        Ok(reshaper::annotations(&series, annotation))
    }

    pub async fn metric_find_query(&self, query: &str) -> PrestoResult<Vec<MetricFindValue>> {
        let sql = self.templates.replace(query);
        let series = self.series_query(&sql).await?;
        Ok(reshaper::metric_values(&series))
    }

    pub async fn list_series(&self) -> PrestoResult<Vec<String>> {
        let series = self.series_query("show tables").await?;
        Ok(reshaper::series_names(&series))
    }

    pub async fn list_columns(&self, series: &str) -> PrestoResult<Vec<String>> {
        let table = self.templates.replace(series);
        let answer = self
            .series_query(&format!("select * from {table} limit 1"))
            .await?;
        Ok(reshaper::column_names(&answer))
    }

    /// Save a host dashboard document
    pub async fn save_dashboard(&self, dashboard: Value) -> PrestoResult<SavedDashboard> {
        let record = DashboardRecord::from_json(dashboard)?;
        self.dashboards.save_dashboard(record).await
    }

    pub async fn get_dashboard(&self, id: &str, is_temp: bool) -> PrestoResult<Value> {
        self.dashboards.get_dashboard(id, is_temp).await
    }

    pub async fn delete_dashboard(&self, id: &str) -> PrestoResult<String> {
        self.dashboards.delete_dashboard(id).await
    }

    pub async fn search_dashboards(&self, query: &str) -> PrestoResult<SearchHits> {
        self.dashboards.search_dashboards(query).await
    }
}
