//! Reshaping of normalized engine rows into host series, annotations and
//! metric lists

use crate::interval::BucketContext;
use crate::response::RawSeries;
use chrono::DateTime;
use once_cell::sync::Lazy;
use presto_shared::{
    AnnotationDefinition, AnnotationEvent, MetricFindValue, NamedSeries, TimeSeriesPoint,
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static APPROXIMATE_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.*)\+/-").unwrap());

const TIME_COLUMN: &str = "time";
const SEQUENCE_COLUMN: &str = "sequence_number";

/// What the reshaper needs to know about the query that produced the rows
#[derive(Debug, Clone)]
pub struct SeriesContext {
    /// Alias template; empty falls back to `$s`
    pub alias: String,
    pub group_by_field: Option<String>,
    /// Used for `$s` when the response carries no series name
    pub series_name: Option<String>,
    pub bucket: BucketContext,
    pub approximate: bool,
}

pub struct SeriesReshaper<'a> {
    context: &'a SeriesContext,
}

impl<'a> SeriesReshaper<'a> {
    pub fn new(context: &'a SeriesContext) -> Self {
        Self { context }
    }

    pub fn reshape(&self, series: Vec<RawSeries>) -> Vec<NamedSeries> {
        series
            .into_iter()
            .flat_map(|s| self.reshape_one(s))
            .collect()
    }

    fn reshape_one(&self, mut series: RawSeries) -> Vec<NamedSeries> {
        let group_field = self.context.group_by_field.as_deref();
        let value_idx = value_column(&series.columns, group_field);
        let time_idx = series.column_index(TIME_COLUMN).unwrap_or(0);
        let group_idx = group_field.and_then(|field| series.column_index(field));

        if self.context.approximate {
            for row in &mut series.rows {
                if let Some(cell) = row.get_mut(value_idx) {
                    *cell = parse_approximate(cell);
                }
            }
        }

        // partitions in first-appearance order
        let mut order: Vec<String> = Vec::new();
        let mut partitions: HashMap<String, Vec<TimeSeriesPoint>> = HashMap::new();

        for row in &series.rows {
            let Some(index) = row.get(time_idx).and_then(numeric_cell) else {
                log::debug!("skipping row without a bucket index: {:?}", row);
                continue;
            };

            let key = match group_idx {
                Some(idx) => row.get(idx).map(cell_text).unwrap_or_default(),
                None => String::new(),
            };

            let point = TimeSeriesPoint(
                row.get(value_idx).and_then(numeric_cell),
                self.context.bucket.bucket_start_millis(index),
            );

            partitions
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(point);
        }

        let identifier = series
            .name
            .as_deref()
            .or(self.context.series_name.as_deref())
            .unwrap_or("");
        let template = if self.context.alias.is_empty() {
            "$s"
        } else {
            self.context.alias.as_str()
        };

        order
            .into_iter()
            .map(|key| {
                let datapoints = partitions.remove(&key).unwrap_or_default();
                let target = if group_idx.is_some() {
                    let mut name = series_name(template, identifier, Some(&key));
                    if !template.contains("$g") {
                        name.push_str(&key);
                    }
                    name
                } else {
                    series_name(template, identifier, None)
                };

                NamedSeries { target, datapoints }
            })
            .collect()
    }
}

/// First column that is not the time, sequence or group-by column
fn value_column(columns: &[String], group_field: Option<&str>) -> usize {
    columns
        .iter()
        .position(|c| {
            c != TIME_COLUMN && c != SEQUENCE_COLUMN && Some(c.as_str()) != group_field
        })
        .unwrap_or(1)
}

/// Expand an alias template.
///
/// `$s` is the series identifier, `$1`, `$2`, ... its dot separated segments
/// (empty segments skipped) and `$g` the group value.
pub fn series_name(template: &str, identifier: &str, group: Option<&str>) -> String {
    let mut name = template.replacen("$s", identifier, 1);

    let segments: Vec<&str> = identifier.split('.').filter(|s| !s.is_empty()).collect();
    // highest index first so `$1` does not clobber `$10`
    for (i, segment) in segments.iter().enumerate().rev() {
        name = name.replacen(&format!("${}", i + 1), segment, 1);
    }

    if let Some(group) = group {
        name = name.replacen("$g", group, 1);
    }

    name
}

/// Numeric value of a cell, `None` for anything else
pub fn numeric_cell(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn optional_text(cell: Option<&Value>) -> Option<String> {
    match cell {
        None | Some(Value::Null) => None,
        Some(cell) => Some(cell_text(cell)),
    }
}

/// `12.5+/-0.3` becomes 12.5, `7+/-1` becomes 7, anything else 0
pub fn parse_approximate(cell: &Value) -> Value {
    let Some(text) = cell.as_str().filter(|s| !s.is_empty()) else {
        return Value::from(0);
    };
    let Some(captures) = APPROXIMATE_CELL.captures(text) else {
        return Value::from(0);
    };

    let number = captures[1].trim();
    if number.contains('.') {
        number.parse::<f64>().map(Value::from).unwrap_or(Value::Null)
    } else {
        number.parse::<i64>().map(Value::from).unwrap_or(Value::Null)
    }
}

/// Epoch milliseconds of an annotation time cell: numeric seconds or a date
fn annotation_time(cell: &Value) -> Option<i64> {
    if let Value::Number(n) = cell {
        return n.as_f64().map(|secs| (secs * 1000.0).round() as i64);
    }

    let text = cell.as_str()?.trim();
    if let Ok(secs) = text.parse::<f64>() {
        return Some((secs * 1000.0).round() as i64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ]
        .iter()
        .find_map(|format| chrono::NaiveDateTime::parse_from_str(text, format).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
}

pub fn annotations(series: &[RawSeries], definition: &AnnotationDefinition) -> Vec<AnnotationEvent> {
    let mut events = Vec::new();

    for s in series {
        let named = |column: &Option<String>| column.as_deref().and_then(|c| s.column_index(c));
        let time_idx = s.column_index(TIME_COLUMN).unwrap_or(0);
        let title_idx = named(&definition.title_column).unwrap_or(1);
        let tags_idx = named(&definition.tags_column);
        let text_idx = named(&definition.text_column);

        for row in &s.rows {
            let Some(time) = row.get(time_idx).and_then(annotation_time) else {
                log::debug!("skipping annotation row without a usable time: {:?}", row);
                continue;
            };

            events.push(AnnotationEvent {
                time,
                title: optional_text(row.get(title_idx)),
                tags: optional_text(tags_idx.and_then(|i| row.get(i))),
                text: optional_text(text_idx.and_then(|i| row.get(i))),
                annotation: definition.clone(),
            });
        }
    }

    events
}

/// Second column (or the only one) of the first series
pub fn metric_values(series: &[RawSeries]) -> Vec<MetricFindValue> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let idx = if first.columns.len() > 1 { 1 } else { 0 };

    first
        .rows
        .iter()
        .filter_map(|row| optional_text(row.get(idx)))
        .map(MetricFindValue::leaf)
        .collect()
}

/// Table names from a `show tables` answer, or the legacy per-series names
pub fn series_names(series: &[RawSeries]) -> Vec<String> {
    match series.first() {
        Some(first) if !first.rows.is_empty() => {
            let idx = if first.columns.len() > 1 { 1 } else { 0 };
            first
                .rows
                .iter()
                .filter_map(|row| optional_text(row.get(idx)))
                .collect()
        }
        _ => series.iter().filter_map(|s| s.name.clone()).collect(),
    }
}

pub fn column_names(series: &[RawSeries]) -> Vec<String> {
    series
        .first()
        .map(|s| s.columns.clone())
        .unwrap_or_default()
}
