//! Datasource config files in yaml, json or toml

use crate::{ConfigError, DataSourceConfig, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format named by the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                ConfigError::Parse(format!("{} has no config extension", path.display()))
            })?;

        match ext.as_str() {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::Parse(format!(
                "{}: .{} is not yaml, json or toml",
                path.display(),
                other
            ))),
        }
    }

    pub fn decode<T: DeserializeOwned>(self, content: &str) -> Result<T> {
        let decoded = match self {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        };
        decoded.map_err(|message| ConfigError::Parse(format!("{:?}: {}", self, message)))
    }
}

/// Loads a [`DataSourceConfig`], filling unset fields with defaults
pub struct ConfigParser;

impl ConfigParser {
    pub fn parse_file(path: impl AsRef<Path>) -> Result<DataSourceConfig> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)?;

        Self::parse_string(&content, format)
    }

    pub fn parse_string(content: &str, format: ConfigFormat) -> Result<DataSourceConfig> {
        // an empty file is the default config
        if content.trim().is_empty() {
            return Ok(DataSourceConfig::default());
        }
        format.decode(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DashboardPersistence;

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
name: warehouse
urls:
  - http://presto-1:8080
  - http://presto-2:8080
username: grafana
password: secret
time_field: event_time
time_field_is_string: false
pseudonow: "2015-03-01 00:00:00"
timezone: 8
dashboards: local
save_temp_ttl: 2w
retry:
  initial_delay_ms: 50
"#;

        let config = ConfigParser::parse_string(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.name, "warehouse");
        assert_eq!(config.urls.len(), 2);
        assert_eq!(config.time_field, "event_time");
        assert!(!config.time_field_is_string);
        assert!(config.pseudonow.is_some());
        assert_eq!(config.timezone_offset_secs(), 8 * 3600);
        assert_eq!(config.dashboards, DashboardPersistence::Local);
        assert_eq!(config.retry.initial_delay_ms, 50);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        // untouched fields keep their defaults
        assert_eq!(config.database, "presto");
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
urls = ["http://presto:8080"]
time_field = "ts"
approximate = true
"#;
        let config = ConfigParser::parse_string(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.time_field, "ts");
        assert!(config.approximate);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("ds.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("ds.JSON")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("ds.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("ds")).is_err());
    }

    #[test]
    fn test_empty_and_malformed_content() {
        let config = ConfigParser::parse_string("  \n", ConfigFormat::Yaml).unwrap();
        assert_eq!(config, DataSourceConfig::default());

        let err = ConfigParser::parse_string("urls = [", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(message) if message.starts_with("Toml")));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasource.json");
        fs::write(&path, r#"{ "urls": ["http://presto:9000"] }"#).unwrap();

        let config = ConfigParser::parse_file(&path).unwrap();
        assert_eq!(config.urls, vec!["http://presto:9000"]);
    }
}
