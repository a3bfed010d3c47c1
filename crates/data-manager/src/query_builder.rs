//! Turns panel targets into engine SQL

use crate::interval::BucketContext;
use crate::template::TemplateSrv;
use crate::time_filter::TimeFilter;
use once_cell::sync::Lazy;
use presto_shared::{PrestoResult, QueryTarget};
use regex::Regex;

/// Aggregate used when a target names none
pub const DEFAULT_FUNCTION: &str = "mean";

static GROUP_BY_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bgroup\s+by\s+(.+?)(?:\border\s+by\b|\blimit\b|\bhaving\b|$)").unwrap()
});

static FROM_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bfrom\s+"?([A-Za-z0-9_.]+)"?"#).unwrap());

/// SQL ready to send plus what the reshaper needs to read the answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub sql: String,
    /// Alias template after host substitution, `$s`/`$g`/`$n` left in place
    pub alias: String,
    pub group_by_field: Option<String>,
    pub series_name: Option<String>,
    pub bucket: BucketContext,
}

pub struct QueryBuilder<'a> {
    target: &'a QueryTarget,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(target: &'a QueryTarget) -> Self {
        Self { target }
    }

    /// Query text with `$timeFilter`, `$interval` and `$datetrunc` still in
    /// it, or `None` when the target asks for nothing.
    pub fn base_query(&self) -> Option<String> {
        if !self.target.is_queryable() {
            return None;
        }

        if self.target.uses_raw_query() {
            let raw = self.target.query.as_deref()?.trim();
            return Some(raw.trim_end_matches(';').trim_end().to_string());
        }

        let series = self.target.series.as_deref()?;
        let column = self.target.column.as_deref()?;
        let function = self
            .target
            .function
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FUNCTION);
        let group_by = self.group_by_field();

        let mut sql = String::from("select $interval as time");
        if let Some(field) = &group_by {
            sql.push_str(", ");
            sql.push_str(field);
        }
        sql.push_str(&format!(
            ", {function}({column}) as {column} from {series} where $timeFilter"
        ));
        if let Some(condition) = self.target.condition.as_deref().filter(|c| !c.trim().is_empty()) {
            sql.push_str(" and ");
            sql.push_str(condition);
        }
        sql.push_str(" group by $datetrunc");
        if let Some(field) = &group_by {
            sql.push_str(", ");
            sql.push_str(field);
        }

        Some(sql)
    }

    pub fn group_by_field(&self) -> Option<String> {
        if let Some(field) = self.target.group_by_field.as_deref().filter(|f| !f.is_empty()) {
            return Some(field.to_string());
        }

        if self.target.uses_raw_query() {
            return self.target.query.as_deref().and_then(raw_group_by_field);
        }

        None
    }

    /// Table the answer is named after when the response carries no name
    pub fn series_name(&self) -> Option<String> {
        if self.target.uses_raw_query() {
            self.target.query.as_deref().and_then(raw_series_name)
        } else {
            self.target.series.clone()
        }
    }

    pub fn prepare(
        &self,
        filter: &TimeFilter,
        time_expr: &str,
        default_interval: &str,
        templates: &dyn TemplateSrv,
    ) -> PrestoResult<Option<PreparedQuery>> {
        let Some(base) = self.base_query() else {
            return Ok(None);
        };

        let interval = self
            .target
            .interval
            .as_deref()
            .filter(|i| !i.is_empty())
            .unwrap_or(default_interval);
        let bucket = BucketContext::new(time_expr, filter.since, interval)?;

        let sql = render_query(&base, &filter.predicate, &bucket.expression, templates);
        log::debug!("built query for {:?}: {}", self.target.series, sql);

        Ok(Some(PreparedQuery {
            sql,
            alias: templates.replace(self.target.alias.as_deref().unwrap_or("")),
            group_by_field: self.group_by_field(),
            series_name: self.series_name(),
            bucket,
        }))
    }
}

/// Fill the placeholders, first occurrence each, then hand the text to the
/// host for its own variables.
pub fn render_query(
    base: &str,
    filter_predicate: &str,
    bucket_expr: &str,
    templates: &dyn TemplateSrv,
) -> String {
    let mut sql = base
        .replacen("$timeFilter", filter_predicate, 1)
        .replacen("$interval", bucket_expr, 1)
        .replacen("$datetrunc", bucket_expr, 1);
    sql.push_str(&format!(" order by {bucket_expr} asc"));

    templates.replace(&sql)
}

/// Second entry of the `group by` list of a hand-written query
pub fn raw_group_by_field(query: &str) -> Option<String> {
    let list = GROUP_BY_LIST.captures(query)?.get(1)?.as_str();
    let item = list.split(',').nth(1)?.split_whitespace().next()?;
    let field = item.trim_matches('"').trim_end_matches(';');

    (!field.is_empty()).then(|| field.to_string())
}

pub fn raw_series_name(query: &str) -> Option<String> {
    FROM_TABLE
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
