//! Configuration system for the Presto datasource
//! Loads, validates and describes the host's datasource settings

use chrono::NaiveDateTime;
use presto_shared::PrestoError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod parser;
pub mod ttl;
pub mod validation;

pub use parser::{ConfigFormat, ConfigParser};
pub use ttl::{Ttl, TtlUnit};
pub use validation::ConfigValidator;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown ttl duration format: {0}")]
    InvalidTtl(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for PrestoError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidTtl(ttl) => PrestoError::InvalidTtl { ttl },
            other => PrestoError::InvalidConfig {
                message: other.to_string(),
                field: None,
            },
        }
    }
}

/// Where dashboards are saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardPersistence {
    /// One engine table per dashboard
    #[default]
    Engine,
    /// Local key/value storage
    Local,
}

/// Backoff applied to transient engine failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Datasource configuration as entered in the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    pub name: String,
    /// Engine endpoints, rotated round-robin on every request
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Appended verbatim to every request path
    pub key: Option<String>,
    pub database: String,
    pub time_field: String,
    /// Time field is stored as text and needs `date_parse`
    pub time_field_is_string: bool,
    /// Stand-in for the current instant, `YYYY-MM-DD HH:MM:SS`
    #[serde(with = "naive_datetime_opt")]
    pub pseudonow: Option<NaiveDateTime>,
    /// Hours added to absolute time filter bounds
    pub timezone: f64,
    pub dashboards: DashboardPersistence,
    pub save_temp: bool,
    pub save_temp_ttl: String,
    /// Parse `<n>+/-<err>` cells into plain numbers
    pub approximate: bool,
    pub retry: RetrySettings,
    pub request_timeout_ms: Option<u64>,
    /// File used by local dashboard storage outside the browser
    pub local_storage_path: Option<PathBuf>,
    /// Prefix for temporary dashboard links
    pub public_url: Option<String>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            name: "presto".to_string(),
            urls: vec!["http://localhost:8080".to_string()],
            username: None,
            password: None,
            key: None,
            database: "presto".to_string(),
            time_field: "time".to_string(),
            time_field_is_string: true,
            pseudonow: None,
            timezone: 0.0,
            dashboards: DashboardPersistence::Engine,
            save_temp: true,
            save_temp_ttl: "30d".to_string(),
            approximate: false,
            retry: RetrySettings::default(),
            request_timeout_ms: None,
            local_storage_path: None,
            public_url: None,
        }
    }
}

impl DataSourceConfig {
    /// Timezone offset in whole seconds
    pub fn timezone_offset_secs(&self) -> i64 {
        (self.timezone * 3600.0).round() as i64
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn temp_ttl(&self) -> Result<Ttl> {
        Ttl::parse(&self.save_temp_ttl)
    }
}

/// Serde adapter for optional naive datetimes written as
/// `YYYY-MM-DD HH:MM:SS` (a `T` separator is accepted too).
pub mod naive_datetime_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid pseudonow '{text}'"))
            }),
        }
    }
}
