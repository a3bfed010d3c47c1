//! Dashboards persisted as engine tables, one table per dashboard

use crate::executor::{EngineRequest, RequestExecutor};
use crate::response::{normalize, RawSeries};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use presto_config::{DataSourceConfig, Ttl};
use presto_shared::{
    split_tags, DashboardHit, DashboardRecord, DashboardStore, PrestoError, PrestoResult,
    SavedDashboard, SearchHits, SearchQuery, SearchScope,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const DASHBOARD_TABLE_PREFIX: &str = "grafana.dashboard_";
pub const TEMP_DASHBOARD_TABLE_PREFIX: &str = "grafana.temp_dashboard_";

/// Fixed timestamp every dashboard row is written with
const DASHBOARD_ROW_TIME: i64 = 1_000_000_000_000;

/// Table holding the dashboard titled `title`
pub fn dashboard_table(title: &str, temp: bool) -> String {
    let prefix = if temp {
        TEMP_DASHBOARD_TABLE_PREFIX
    } else {
        DASHBOARD_TABLE_PREFIX
    };
    format!("{prefix}{}", STANDARD.encode(title))
}

/// Title encoded in a dashboard table name
pub fn title_from_table(table: &str) -> Option<String> {
    let encoded = table
        .strip_prefix(TEMP_DASHBOARD_TABLE_PREFIX)
        .or_else(|| table.strip_prefix(DASHBOARD_TABLE_PREFIX))?;
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Search statement for a parsed query
pub fn search_statement(query: &SearchQuery) -> String {
    let pattern = query.pattern();
    let predicate = match query.scope {
        SearchScope::Tags => format!("tags =~ /{pattern}/i"),
        SearchScope::Title => format!("title =~ /{pattern}/i"),
        SearchScope::Any => format!("(tags =~ /{pattern}/i or title =~ /{pattern}/i)"),
    };
    format!("select title, tags from /{DASHBOARD_TABLE_PREFIX}.*/ where {predicate}")
}

#[derive(Clone)]
pub struct EngineDashboardStore {
    executor: RequestExecutor,
    cancel: CancellationToken,
    database: String,
    save_temp: bool,
    temp_ttl: String,
    public_url: String,
}

impl EngineDashboardStore {
    pub fn new(executor: RequestExecutor, config: &DataSourceConfig, cancel: CancellationToken) -> Self {
        Self {
            executor,
            cancel,
            database: config.database.clone(),
            save_temp: config.save_temp,
            temp_ttl: config.save_temp_ttl.clone(),
            public_url: config.public_url.clone().unwrap_or_default(),
        }
    }

    async fn run(&self, sql: &str) -> PrestoResult<Value> {
        log::debug!("dashboard statement: {}", sql);
        self.executor
            .execute(&EngineRequest::query(sql, &self.database), &self.cancel)
            .await
    }

    async fn run_series(&self, sql: &str) -> PrestoResult<Vec<RawSeries>> {
        self.run(sql).await.map(normalize)
    }

    fn write_payload(&self, record: &DashboardRecord) -> PrestoResult<Value> {
        let document = serde_json::to_string(&record.body)?;
        let table = dashboard_table(&record.title, record.temp);

        if record.temp {
            let ttl = Ttl::parse(&self.temp_ttl)?;
            let expires = ttl.expires_at(chrono::Utc::now().timestamp_millis());
            Ok(json!([{
                "name": table,
                "columns": ["time", "sequence_number", "title", "tags", "dashboard", "expires"],
                "points": [[DASHBOARD_ROW_TIME, 1, record.title, record.joined_tags(), document, expires]],
            }]))
        } else {
            Ok(json!([{
                "name": table,
                "columns": ["time", "sequence_number", "title", "tags", "dashboard"],
                "points": [[DASHBOARD_ROW_TIME, 1, record.title, record.joined_tags(), document]],
            }]))
        }
    }
}

fn hit_from_series(series: &RawSeries) -> Option<DashboardHit> {
    let row = series.rows.first();
    let title = series
        .column_index("title")
        .and_then(|idx| row?.get(idx)?.as_str().map(str::to_string))
        .or_else(|| series.name.as_deref().and_then(title_from_table))?;
    let tags = series
        .column_index("tags")
        .and_then(|idx| row?.get(idx))
        .and_then(Value::as_str)
        .map(split_tags)
        .unwrap_or_default();

    Some(DashboardHit {
        id: title.clone(),
        title,
        tags,
    })
}

#[async_trait]
impl DashboardStore for EngineDashboardStore {
    async fn save_dashboard(&self, dashboard: DashboardRecord) -> PrestoResult<SavedDashboard> {
        if dashboard.temp && !self.save_temp {
            return Err(PrestoError::DashboardSave {
                title: dashboard.title,
                message: "temporary dashboards are disabled".to_string(),
            });
        }

        let payload = self.write_payload(&dashboard)?;
        self.executor
            .execute(&EngineRequest::write_series(payload), &self.cancel)
            .await
            .map_err(|err| match err {
                PrestoError::Engine { body, .. } => PrestoError::DashboardSave {
                    title: dashboard.title.clone(),
                    message: body,
                },
                other => other,
            })?;

        log::info!(
            "saved dashboard '{}' (temp: {})",
            dashboard.title,
            dashboard.temp
        );

        let url = if dashboard.temp {
            format!("{}#dashboard/temp/{}", self.public_url, dashboard.title)
        } else {
            format!("/dashboard/db/{}", dashboard.title)
        };

        Ok(SavedDashboard {
            title: dashboard.title,
            url,
        })
    }

    async fn get_dashboard(&self, id: &str, is_temp: bool) -> PrestoResult<Value> {
        let table = dashboard_table(id, is_temp);
        let series = self
            .run_series(&format!("select dashboard from \"{table}\""))
            .await?;

        let not_found = || PrestoError::DashboardNotFound { id: id.to_string() };
        let first = series.iter().find(|s| !s.is_empty()).ok_or_else(not_found)?;
        let idx = first.column_index("dashboard").unwrap_or(0);
        let cell = first.rows[0].get(idx).ok_or_else(not_found)?;

        match cell {
            Value::String(document) => Ok(serde_json::from_str(document)?),
            Value::Object(_) => Ok(cell.clone()),
            _ => Err(not_found()),
        }
    }

    async fn delete_dashboard(&self, id: &str) -> PrestoResult<String> {
        let table = dashboard_table(id, false);
        let result = self
            .run(&format!("drop series \"{table}\""))
            .await
            .map_err(|err| match err {
                PrestoError::Engine { body, .. } => PrestoError::DashboardDelete {
                    id: id.to_string(),
                    message: body,
                },
                other => other,
            })?;

        if result.is_null() {
            return Err(PrestoError::DashboardDelete {
                id: id.to_string(),
                message: "engine returned no result".to_string(),
            });
        }

        log::info!("deleted dashboard '{}'", id);
        Ok(id.to_string())
    }

    async fn search_dashboards(&self, query: &str) -> PrestoResult<SearchHits> {
        let query = SearchQuery::parse(query);
        let series = self.run_series(&search_statement(&query)).await?;

        Ok(SearchHits {
            dashboards: series.iter().filter_map(hit_from_series).collect(),
            tags: Vec::new(),
            tags_only: query.scope == SearchScope::Tags,
        })
    }
}
