use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{PersistError, Result};
use crate::dialect::{DatabaseFamily, DatabaseVersion};

/// Persistence unit configuration
///
/// Deserializable from JSON, e.g.
/// `{"family": "mysql", "version": "8.0", "batch_size": 25}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Target database family
    pub family: DatabaseFamily,

    /// Target database version, `major[.minor[.micro]]`
    pub version: String,

    /// Rows per JDBC batch (1 disables batching)
    pub batch_size: usize,

    /// Maximum entries per query interpretation map
    pub query_plan_cache_max_size: usize,

    /// Collect statistics
    pub statistics_enabled: bool,

    /// Statement timeout passed through to the driver
    pub query_timeout_ms: Option<u64>,
}

impl PersistenceSettings {
    pub fn new(family: DatabaseFamily, version: &str) -> Self {
        Self {
            family,
            version: version.to_string(),
            batch_size: 1,
            query_plan_cache_max_size: 2048,
            statistics_enabled: false,
            query_timeout_ms: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn query_plan_cache_max_size(mut self, max_size: usize) -> Self {
        self.query_plan_cache_max_size = max_size;
        self
    }

    pub fn statistics_enabled(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn database_version(&self) -> Result<DatabaseVersion> {
        DatabaseVersion::parse(&self.version)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates a JSON settings file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PersistError::Configuration("batch_size must be > 0".into()));
        }

        if self.query_plan_cache_max_size == 0 {
            return Err(PersistError::Configuration(
                "query_plan_cache_max_size must be > 0".into(),
            ));
        }

        let version = self.database_version()?;
        let minimum = self.family.minimum_version();
        if version < minimum {
            return Err(PersistError::Configuration(format!(
                "{} {} is older than the minimum supported version {}",
                self.family, version, minimum
            )));
        }

        Ok(())
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self::new(DatabaseFamily::PostgreSql, "15.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PersistenceSettings::default();
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.query_plan_cache_max_size, 2048);
        assert!(!settings.statistics_enabled);
        assert!(settings.timeout().is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let settings = PersistenceSettings::new(DatabaseFamily::MySql, "8.0")
            .batch_size(25)
            .statistics_enabled(true)
            .query_timeout(Duration::from_secs(3));

        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.timeout(), Some(Duration::from_secs(3)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = PersistenceSettings::from_json(r#"{"family": "cockroach", "version": "23.1"}"#).unwrap();
        assert_eq!(settings.family, DatabaseFamily::CockroachDb);
        assert_eq!(settings.query_plan_cache_max_size, 2048);
    }

    #[test]
    fn test_validate() {
        assert!(PersistenceSettings::default().batch_size(0).validate().is_err());
        assert!(PersistenceSettings::new(DatabaseFamily::PostgreSql, "abc").validate().is_err());
        assert!(PersistenceSettings::new(DatabaseFamily::PostgreSql, "8.0").validate().is_err());
        assert!(PersistenceSettings::from_json(r#"{"family": "oracle"}"#).is_err());
    }
}
