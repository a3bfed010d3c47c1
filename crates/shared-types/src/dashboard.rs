//! Dashboard persistence contract shared by the engine and local stores

use crate::errors::{PrestoError, PrestoResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dashboard document with the fields stores index on pulled out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRecord {
    pub title: String,
    pub tags: Vec<String>,
    /// Temporary (shared) dashboards expire and are never updated
    pub temp: bool,
    /// Full document, without the `temp` marker
    pub body: Value,
}

impl DashboardRecord {
    /// Split a host dashboard document into its indexed fields.
    ///
    /// `tags` may be an array of strings or a comma separated string. The
    /// `temp` key is removed from the stored body.
    pub fn from_json(mut body: Value) -> PrestoResult<Self> {
        let object = body.as_object_mut().ok_or_else(|| PrestoError::DataParse {
            message: "dashboard must be a JSON object".to_string(),
        })?;

        let title = object
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PrestoError::DataParse {
                message: "dashboard has no title".to_string(),
            })?
            .to_string();

        let tags = match object.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(joined)) => split_tags(joined),
            _ => Vec::new(),
        };

        let temp = object
            .remove("temp")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(Self {
            title,
            tags,
            temp,
            body,
        })
    }

    /// Tags in the comma joined form stores denormalize them to
    pub fn joined_tags(&self) -> String {
        self.tags.join(",")
    }

    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

/// Split a comma joined tag string, dropping the empty tag
pub fn split_tags(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// URL slug of a dashboard title: lowercase, word characters kept,
/// runs of spaces become a single `-`.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == ' ')
        .collect();

    kept.split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDashboard {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardHit {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHits {
    pub dashboards: Vec<DashboardHit>,
    pub tags: Vec<String>,
    pub tags_only: bool,
}

/// Which indexed field a search looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Tags,
    Title,
    Any,
}

/// Parsed dashboard search string.
///
/// `tags!:foo` searches tags only, `title:foo` titles only, anything else
/// both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub scope: SearchScope,
    pub term: String,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        if let Some(term) = query.strip_prefix("tags!:") {
            Self {
                scope: SearchScope::Tags,
                term: term.to_string(),
            }
        } else if let Some(term) = query.strip_prefix("title:") {
            Self {
                scope: SearchScope::Title,
                term: term.to_string(),
            }
        } else {
            Self {
                scope: SearchScope::Any,
                term: query.to_string(),
            }
        }
    }

    /// Unanchored match pattern for the term
    pub fn pattern(&self) -> String {
        format!(".*{}.*", self.term)
    }

    pub fn matches_tags(&self) -> bool {
        matches!(self.scope, SearchScope::Tags | SearchScope::Any)
    }

    pub fn matches_title(&self) -> bool {
        matches!(self.scope, SearchScope::Title | SearchScope::Any)
    }
}

/// Save/load/delete/search of dashboard documents
#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn save_dashboard(&self, dashboard: DashboardRecord) -> PrestoResult<SavedDashboard>;

    async fn get_dashboard(&self, id: &str, is_temp: bool) -> PrestoResult<Value>;

    /// Returns the id of the deleted dashboard
    async fn delete_dashboard(&self, id: &str) -> PrestoResult<String>;

    async fn search_dashboards(&self, query: &str) -> PrestoResult<SearchHits>;
}
