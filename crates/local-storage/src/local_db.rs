//! Dashboards kept in key/value storage.
//!
//! Three JSON buckets are maintained: `t` maps each tag to the ids carrying
//! it, `l` maps each title to its ids and `d` maps ids to records. Every id
//! listed in `t` or `l` has a record in `d`.

use crate::storage::{JsonStorageExt, KeyValueStorage};
use async_trait::async_trait;
use parking_lot::Mutex;
use presto_config::Ttl;
use presto_shared::{
    DashboardHit, DashboardRecord, DashboardStore, PrestoError, PrestoResult, SavedDashboard,
    SearchHits, SearchQuery, SearchScope,
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

pub const TAG_BUCKET: &str = "t";
pub const TITLE_BUCKET: &str = "l";
pub const DASHBOARD_BUCKET: &str = "d";

const TEMP_ID_PREFIX: &str = "temp/";

type IdIndex = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDashboard {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub dashboard: Value,
    /// Epoch milliseconds after which a temporary dashboard reads as missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl StoredDashboard {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires.is_some_and(|at| at <= now_ms)
    }

    fn hit(&self) -> DashboardHit {
        DashboardHit {
            id: self.id.clone(),
            title: self.title.clone(),
            tags: self.tags.clone(),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Drop `id` from every list, and lists left empty
fn scrub(index: &mut IdIndex, id: &str) -> bool {
    let mut removed = false;
    index.retain(|_, ids| {
        let before = ids.len();
        ids.retain(|existing| existing != id);
        removed |= ids.len() != before;
        !ids.is_empty()
    });
    removed
}

fn append(index: &mut IdIndex, key: &str, id: &str) {
    let ids = index.entry(key.to_string()).or_default();
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// Case-insensitive search pattern; terms that are not valid regexes are
/// matched literally.
pub fn search_pattern(query: &SearchQuery) -> PrestoResult<Regex> {
    let build = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();

    build(&query.pattern())
        .or_else(|_| build(&format!(".*{}.*", regex::escape(&query.term))))
        .map_err(|e| PrestoError::DataParse {
            message: format!("bad search pattern: {e}"),
        })
}

pub struct LocalDashboardStore<S: KeyValueStorage> {
    storage: S,
    temp_ttl: Ttl,
    lock: Mutex<()>,
}

impl<S: KeyValueStorage> LocalDashboardStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            temp_ttl: Ttl {
                amount: 30,
                unit: presto_config::TtlUnit::Days,
            },
            lock: Mutex::new(()),
        }
    }

    pub fn with_temp_ttl(mut self, ttl: Ttl) -> Self {
        self.temp_ttl = ttl;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn index(&self, bucket: &str) -> PrestoResult<IdIndex> {
        Ok(self.storage.get_json(bucket)?.unwrap_or_default())
    }

    fn records(&self) -> PrestoResult<BTreeMap<String, StoredDashboard>> {
        Ok(self.storage.get_json(DASHBOARD_BUCKET)?.unwrap_or_default())
    }

    /// Store `record`, replacing any earlier version. Returns its id.
    pub fn save(&self, record: &DashboardRecord) -> PrestoResult<String> {
        let _guard = self.lock.lock();

        let slug = record.slug();
        if slug.is_empty() {
            return Err(PrestoError::DashboardSave {
                title: record.title.clone(),
                message: "title has no characters usable in an id".to_string(),
            });
        }

        let mut records = self.records()?;

        if record.temp {
            let id = format!("{TEMP_ID_PREFIX}{slug}");
            records.insert(
                id.clone(),
                StoredDashboard {
                    id: id.clone(),
                    title: record.title.clone(),
                    tags: record.tags.clone(),
                    dashboard: record.body.clone(),
                    expires: Some(self.temp_ttl.expires_at(now_ms())),
                },
            );
            self.storage.set_json(DASHBOARD_BUCKET, &records)?;
            return Ok(id);
        }

        let mut tags = self.index(TAG_BUCKET)?;
        let mut titles = self.index(TITLE_BUCKET)?;
        scrub(&mut tags, &slug);
        scrub(&mut titles, &slug);

        append(&mut titles, &record.title, &slug);
        for tag in &record.tags {
            append(&mut tags, tag, &slug);
        }

        records.insert(
            slug.clone(),
            StoredDashboard {
                id: slug.clone(),
                title: record.title.clone(),
                tags: record.tags.clone(),
                dashboard: record.body.clone(),
                expires: None,
            },
        );

        self.storage.set_json(DASHBOARD_BUCKET, &records)?;
        self.storage.set_json(TITLE_BUCKET, &titles)?;
        self.storage.set_json(TAG_BUCKET, &tags)?;

        log::info!("saved dashboard '{}' as {}", record.title, slug);
        Ok(slug)
    }

    /// Record stored under `id`, `None` when missing or expired
    pub fn get(&self, id: &str, is_temp: bool) -> PrestoResult<Option<StoredDashboard>> {
        let key = if is_temp && !id.starts_with(TEMP_ID_PREFIX) {
            format!("{TEMP_ID_PREFIX}{id}")
        } else {
            id.to_string()
        };

        Ok(self
            .records()?
            .remove(&key)
            .filter(|record| !record.is_expired(now_ms())))
    }

    /// Remove the record and scrub its id from every list. Returns whether
    /// anything was removed.
    pub fn delete(&self, id: &str) -> PrestoResult<bool> {
        let _guard = self.lock.lock();

        let mut records = self.records()?;
        let mut tags = self.index(TAG_BUCKET)?;
        let mut titles = self.index(TITLE_BUCKET)?;

        let had_record = records.remove(id).is_some();
        let had_tags = scrub(&mut tags, id);
        let had_titles = scrub(&mut titles, id);

        self.storage.set_json(DASHBOARD_BUCKET, &records)?;
        self.storage.set_json(TITLE_BUCKET, &titles)?;
        self.storage.set_json(TAG_BUCKET, &tags)?;

        Ok(had_record || had_tags || had_titles)
    }

    /// Dashboards whose tags match `tag` or whose title matches `title`,
    /// tag hits first, each id once.
    pub fn search(
        &self,
        tag: Option<&Regex>,
        title: Option<&Regex>,
    ) -> PrestoResult<Vec<DashboardHit>> {
        let records = self.records()?;
        let mut visited = HashSet::new();
        let mut hits = Vec::new();

        let buckets = [(TAG_BUCKET, tag), (TITLE_BUCKET, title)];
        for (bucket, pattern) in buckets {
            let Some(pattern) = pattern else { continue };

            for (key, ids) in self.index(bucket)? {
                if !pattern.is_match(&key) {
                    continue;
                }
                for id in ids {
                    if !visited.insert(id.clone()) {
                        continue;
                    }
                    if let Some(record) = records.get(&id) {
                        hits.push(record.hit());
                    }
                }
            }
        }

        Ok(hits)
    }

    pub fn titles(&self) -> PrestoResult<Vec<String>> {
        Ok(self.index(TITLE_BUCKET)?.into_keys().collect())
    }

    pub fn tags(&self) -> PrestoResult<Vec<String>> {
        Ok(self.index(TAG_BUCKET)?.into_keys().collect())
    }
}

#[async_trait]
impl<S: KeyValueStorage> DashboardStore for LocalDashboardStore<S> {
    async fn save_dashboard(&self, dashboard: DashboardRecord) -> PrestoResult<SavedDashboard> {
        let id = self.save(&dashboard)?;

        let url = match id.strip_prefix(TEMP_ID_PREFIX) {
            Some(slug) => format!("#dashboard/temp/{slug}"),
            None => format!("/dashboard/db/{id}"),
        };

        Ok(SavedDashboard {
            title: dashboard.title,
            url,
        })
    }

    async fn get_dashboard(&self, id: &str, is_temp: bool) -> PrestoResult<Value> {
        self.get(id, is_temp)?
            .map(|record| record.dashboard)
            .ok_or_else(|| PrestoError::DashboardNotFound { id: id.to_string() })
    }

    async fn delete_dashboard(&self, id: &str) -> PrestoResult<String> {
        if self.delete(id)? {
            Ok(id.to_string())
        } else {
            Err(PrestoError::DashboardNotFound { id: id.to_string() })
        }
    }

    async fn search_dashboards(&self, query: &str) -> PrestoResult<SearchHits> {
        let query = SearchQuery::parse(query);
        let pattern = search_pattern(&query)?;

        let dashboards = self.search(
            query.matches_tags().then_some(&pattern),
            query.matches_title().then_some(&pattern),
        )?;

        let tags = if query.scope == SearchScope::Tags {
            self.tags()?
                .into_iter()
                .filter(|tag| pattern.is_match(tag))
                .collect()
        } else {
            Vec::new()
        };

        Ok(SearchHits {
            dashboards,
            tags,
            tags_only: query.scope == SearchScope::Tags,
        })
    }
}
