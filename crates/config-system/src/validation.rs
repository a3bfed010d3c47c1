//! Configuration validation utilities

use crate::{ConfigError, DataSourceConfig, DashboardPersistence, Result, Ttl};
use url::Url;

/// Configuration validator with comprehensive checks
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete configuration
    pub fn validate(config: &DataSourceConfig) -> Result<()> {
        Self::validate_endpoints(config)?;
        Self::validate_time_field(config)?;
        Self::validate_dashboards(config)?;
        Self::validate_retry(config)?;

        Ok(())
    }

    /// Validate the engine endpoint list
    fn validate_endpoints(config: &DataSourceConfig) -> Result<()> {
        if config.urls.is_empty() {
            return Err(ConfigError::Validation(
                "At least one engine url is required".to_string(),
            ));
        }

        for url in &config.urls {
            let parsed = Url::parse(url)
                .map_err(|e| ConfigError::Validation(format!("Invalid url '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Validation(format!(
                    "Unsupported url scheme '{}' in {}",
                    parsed.scheme(),
                    url
                )));
            }
        }

        if config.database.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Database name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_time_field(config: &DataSourceConfig) -> Result<()> {
        if config.time_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Time field cannot be empty".to_string(),
            ));
        }

        if !(-14.0..=14.0).contains(&config.timezone) {
            return Err(ConfigError::Validation(format!(
                "Invalid timezone: {}. Must be between -14 and 14 hours",
                config.timezone
            )));
        }

        Ok(())
    }

    fn validate_dashboards(config: &DataSourceConfig) -> Result<()> {
        if config.save_temp {
            Ttl::parse(&config.save_temp_ttl)?;
        }

        if config.dashboards == DashboardPersistence::Local {
            if let Some(path) = &config.local_storage_path {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Validation(
                        "Local storage path cannot be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_retry(config: &DataSourceConfig) -> Result<()> {
        let retry = &config.retry;

        if retry.max_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "Retry max_delay_ms must be greater than 0".to_string(),
            ));
        }

        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::Validation(format!(
                "Retry initial_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.initial_delay_ms, retry.max_delay_ms
            )));
        }

        if config.request_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
