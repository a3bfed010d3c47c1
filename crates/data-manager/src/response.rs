//! Normalization of the engine's response shapes

use serde::Deserialize;
use serde_json::Value;

/// Engine answer in canonical form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawSeries {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyColumn {
    Named { name: String },
    Bare(String),
}

impl LegacyColumn {
    fn into_name(self) -> String {
        match self {
            LegacyColumn::Named { name } | LegacyColumn::Bare(name) => name,
        }
    }
}

/// One series in either of the shapes the engine has produced over time
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EngineSeries {
    CurrentColumnsPoints {
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
        #[serde(default)]
        points: Vec<Vec<Value>>,
    },
    LegacyColumnsData {
        #[serde(rename = "Name", default)]
        name: Option<String>,
        #[serde(rename = "Columns")]
        columns: Vec<LegacyColumn>,
        #[serde(rename = "Data", default)]
        data: Vec<Vec<Value>>,
    },
    /// Bare table listing entry
    NameOnly { name: String },
}

impl From<EngineSeries> for RawSeries {
    fn from(series: EngineSeries) -> Self {
        match series {
            EngineSeries::CurrentColumnsPoints {
                name,
                columns,
                points,
            } => RawSeries {
                name,
                columns,
                rows: points,
            },
            EngineSeries::LegacyColumnsData {
                name,
                columns,
                data,
            } => RawSeries {
                name,
                columns: columns.into_iter().map(LegacyColumn::into_name).collect(),
                rows: data,
            },
            EngineSeries::NameOnly { name } => RawSeries {
                name: Some(name),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSeriesResponse {
    Many(Vec<EngineSeries>),
    One(EngineSeries),
}

/// Normalize an engine response body. Bodies in no known shape yield no
/// series.
pub fn normalize(body: Value) -> Vec<RawSeries> {
    if body.is_null() {
        return Vec::new();
    }

    match serde_json::from_value::<RawSeriesResponse>(body) {
        Ok(RawSeriesResponse::Many(series)) => series.into_iter().map(RawSeries::from).collect(),
        Ok(RawSeriesResponse::One(series)) => vec![series.into()],
        Err(e) => {
            log::warn!("unrecognized engine response shape: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_shape_list() {
        let series = normalize(json!([
            { "name": "cpu", "columns": ["time", "load"], "points": [[0, 1.5], [1, 2]] }
        ]));

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name.as_deref(), Some("cpu"));
        assert_eq!(series[0].column_index("load"), Some(1));
        assert_eq!(series[0].rows[1], vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_legacy_single_object() {
        let series = normalize(json!({
            "Columns": [{ "name": "time" }, "value"],
            "Data": [[0, "3"]]
        }));

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, None);
        assert_eq!(series[0].columns, vec!["time", "value"]);
        assert_eq!(series[0].rows.len(), 1);
    }

    #[test]
    fn test_name_only_listing() {
        let series = normalize(json!([{ "name": "cpu" }, { "name": "mem" }]));
        let names: Vec<_> = series.iter().filter_map(|s| s.name.as_deref()).collect();
        assert_eq!(names, vec!["cpu", "mem"]);
        assert!(series[0].is_empty());
    }

    #[test]
    fn test_unknown_shapes_are_empty() {
        assert!(normalize(Value::Null).is_empty());
        assert!(normalize(json!("ok")).is_empty());
        assert!(normalize(json!([])).is_empty());
    }
}
