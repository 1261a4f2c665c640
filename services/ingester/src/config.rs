//! Ingester configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

use xenia_storage::{DatabaseConfig, WriterConfig};

fn default_records_before_commit() -> usize {
    WriterConfig::default().records_before_commit
}

fn default_queue_capacity() -> usize {
    WriterConfig::default().queue_capacity
}

/// Top-level ingester configuration.
///
/// ```yaml
/// Database:
///   db_type: sqlite
///   file_path: /var/lib/xenia/xenia.db
/// records_before_commit: 100
/// queue_capacity: 1024
/// add_missing: false
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct IngesterConfig {
    #[serde(rename = "Database")]
    pub database: DatabaseConfig,

    /// Records written per transaction
    #[serde(default = "default_records_before_commit")]
    pub records_before_commit: usize,

    /// Bound of the queue between the reader and the writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Create missing taxonomy rows while binding mappings
    #[serde(default)]
    pub add_missing: bool,
}

impl IngesterConfig {
    /// Load configuration from a YAML settings file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database = DatabaseConfig::from_env()?;
        let records_before_commit = parse_env("XENIA_RECORDS_BEFORE_COMMIT")?
            .unwrap_or_else(default_records_before_commit);
        let queue_capacity =
            parse_env("XENIA_QUEUE_CAPACITY")?.unwrap_or_else(default_queue_capacity);
        let add_missing = env::var("XENIA_ADD_MISSING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Self {
            database,
            records_before_commit,
            queue_capacity,
            add_missing,
        };
        config.validate()?;
        Ok(config)
    }

    /// YAML file when a path is given, environment otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Self::from_env(),
        }
    }

    pub fn writer_config(&self) -> Result<WriterConfig> {
        Ok(WriterConfig::new(
            self.records_before_commit,
            self.queue_capacity,
        )?)
    }

    fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.writer_config()?;
        Ok(())
    }
}

fn parse_env(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {} '{}'", name, value)),
        Err(_) => Ok(None),
    }
}
