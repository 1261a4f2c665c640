//! Database and writer configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use xenia_common::{XeniaError, XeniaResult};

/// Kind of relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Sqlite,
}

impl StoreKind {
    /// Store kind this build was compiled against.
    pub fn compiled() -> Self {
        if cfg!(feature = "postgres") {
            StoreKind::Postgres
        } else {
            StoreKind::Sqlite
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Postgres => write!(f, "postgres"),
            StoreKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

/// Connection settings for one store, one variant per store kind.
///
/// The YAML form mirrors the `Database` section of the legacy settings file:
///
/// ```yaml
/// Database:
///   db_type: postgres
///   user: xenia
///   password: secret
///   host: db.example.org
///   port: 5432
///   name: xenia
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "db_type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Postgres {
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_host")]
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(rename = "name", default)]
        database: Option<String>,
        /// Pre-built connection string, used verbatim when present
        #[serde(rename = "connectionstring", default)]
        connection_string: Option<String>,
    },
    Sqlite {
        file_path: PathBuf,
    },
}

#[derive(Deserialize)]
struct SettingsFile {
    #[serde(rename = "Database")]
    database: DatabaseConfig,
}

impl DatabaseConfig {
    /// PostgreSQL configuration from discrete connection fields.
    pub fn postgres(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> XeniaResult<Self> {
        let config = DatabaseConfig::Postgres {
            user: Some(user.into()),
            password: Some(password.into()),
            host: host.into(),
            port,
            database: Some(database.into()),
            connection_string: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// PostgreSQL configuration from a pre-built connection string.
    pub fn postgres_url(url: impl Into<String>) -> XeniaResult<Self> {
        let config = DatabaseConfig::Postgres {
            user: None,
            password: None,
            host: default_host(),
            port: default_port(),
            database: None,
            connection_string: Some(url.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// SQLite configuration for a database file (created if missing).
    pub fn sqlite(file_path: impl Into<PathBuf>) -> XeniaResult<Self> {
        let config = DatabaseConfig::Sqlite {
            file_path: file_path.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from a URL, detecting the store kind from its scheme.
    pub fn from_url(url: &str) -> XeniaResult<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Self::postgres_url(url)
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            let path = rest.trim_start_matches("//");
            let path = path.split('?').next().unwrap_or(path);
            Self::sqlite(path)
        } else {
            Err(XeniaError::InvalidConfig(format!(
                "Unsupported database URL '{}'. Use 'postgres' or 'sqlite'.",
                url
            )))
        }
    }

    /// Load the `Database` section of a YAML settings file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> XeniaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            XeniaError::InvalidConfig(msg) => {
                XeniaError::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse the `Database` section from YAML text.
    pub fn from_yaml_str(content: &str) -> XeniaResult<Self> {
        let settings: SettingsFile = serde_yaml::from_str(content)
            .map_err(|e| XeniaError::InvalidConfig(e.to_string()))?;
        settings.database.validate()?;
        Ok(settings.database)
    }

    /// Load configuration from environment variables (and a `.env` file if present).
    ///
    /// `DATABASE_URL` takes precedence. Otherwise `XENIA_DB_TYPE` selects the
    /// store kind and the kind-specific `XENIA_DB_*` / `XENIA_SQLITE_PATH`
    /// variables supply the fields.
    pub fn from_env() -> XeniaResult<Self> {
        let _ = dotenvy::dotenv();

        if let Ok(url) = env::var("DATABASE_URL") {
            return Self::from_url(&url);
        }

        let db_type = env::var("XENIA_DB_TYPE").unwrap_or_else(|_| "sqlite".to_string());
        match db_type.to_lowercase().as_str() {
            "postgres" => {
                let port = match env::var("XENIA_DB_PORT") {
                    Ok(port) => port.parse().map_err(|_| {
                        XeniaError::InvalidConfig(format!("Invalid XENIA_DB_PORT '{}'", port))
                    })?,
                    Err(_) => default_port(),
                };
                let config = DatabaseConfig::Postgres {
                    user: env::var("XENIA_DB_USER").ok(),
                    password: env::var("XENIA_DB_PASSWORD").ok(),
                    host: env::var("XENIA_DB_HOST").unwrap_or_else(|_| default_host()),
                    port,
                    database: env::var("XENIA_DB_NAME").ok(),
                    connection_string: None,
                };
                config.validate()?;
                Ok(config)
            }
            "sqlite" => Self::sqlite(
                env::var("XENIA_SQLITE_PATH").unwrap_or_else(|_| "xenia.sqlite3".to_string()),
            ),
            other => Err(XeniaError::InvalidConfig(format!(
                "Unsupported database type '{}'. Use 'postgres' or 'sqlite'.",
                other
            ))),
        }
    }

    /// Check that the variant carries the fields its store kind needs.
    pub fn validate(&self) -> XeniaResult<()> {
        match self {
            DatabaseConfig::Postgres {
                database,
                connection_string,
                ..
            } => {
                let has_url = connection_string.as_deref().is_some_and(|s| !s.is_empty());
                let has_name = database.as_deref().is_some_and(|s| !s.is_empty());
                if !has_url && !has_name {
                    return Err(XeniaError::InvalidConfig(
                        "postgres configuration needs either 'connectionstring' or 'name'"
                            .to_string(),
                    ));
                }
            }
            DatabaseConfig::Sqlite { file_path } => {
                if file_path.as_os_str().is_empty() {
                    return Err(XeniaError::InvalidConfig(
                        "sqlite configuration needs a 'file_path'".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> StoreKind {
        match self {
            DatabaseConfig::Postgres { .. } => StoreKind::Postgres,
            DatabaseConfig::Sqlite { .. } => StoreKind::Sqlite,
        }
    }

    /// Fail unless this build can talk to the configured store kind.
    pub fn ensure_compiled(&self) -> XeniaResult<()> {
        if self.kind() != StoreKind::compiled() {
            return Err(XeniaError::InvalidConfig(format!(
                "Database type {} not compiled in. Rebuild with the '{}' feature.",
                self.kind(),
                self.kind()
            )));
        }
        Ok(())
    }

    /// Connection URL understood by sqlx.
    pub fn connection_url(&self) -> String {
        match self {
            DatabaseConfig::Postgres {
                user,
                password,
                host,
                port,
                database,
                connection_string,
            } => {
                if let Some(url) = connection_string.as_deref().filter(|s| !s.is_empty()) {
                    return url.to_string();
                }
                let credentials = match (user, password) {
                    (Some(user), Some(password)) => format!("{}:{}@", user, password),
                    (Some(user), None) => format!("{}@", user),
                    _ => String::new(),
                };
                format!(
                    "postgresql://{}{}:{}/{}",
                    credentials,
                    host,
                    port,
                    database.as_deref().unwrap_or_default()
                )
            }
            DatabaseConfig::Sqlite { file_path } => {
                format!("sqlite:{}?mode=rwc", file_path.display())
            }
        }
    }

    /// Short database description for log messages (never includes credentials).
    pub fn database_name(&self) -> String {
        match self {
            DatabaseConfig::Postgres {
                host,
                port,
                database,
                ..
            } => match database {
                Some(name) => format!("{} at {}:{}", name, host, port),
                None => "postgres (connection string)".to_string(),
            },
            DatabaseConfig::Sqlite { file_path } => file_path.display().to_string(),
        }
    }
}

/// Background writer tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// A commit is issued every this many records
    pub records_before_commit: usize,
    /// Bound of the producer → writer queue
    pub queue_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            records_before_commit: 100,
            queue_capacity: 1024,
        }
    }
}

impl WriterConfig {
    pub fn new(records_before_commit: usize, queue_capacity: usize) -> XeniaResult<Self> {
        let config = Self {
            records_before_commit,
            queue_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> XeniaResult<()> {
        if self.records_before_commit == 0 {
            return Err(XeniaError::InvalidConfig(
                "records_before_commit must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(XeniaError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_url_from_fields() {
        let config = DatabaseConfig::postgres("xenia", "pw", "db.local", 5433, "obs").unwrap();
        assert_eq!(
            config.connection_url(),
            "postgresql://xenia:pw@db.local:5433/obs"
        );
        assert_eq!(config.kind(), StoreKind::Postgres);
        assert_eq!(config.database_name(), "obs at db.local:5433");
    }

    #[test]
    fn test_connection_string_wins() {
        let yaml = r#"
Database:
  db_type: postgres
  name: ignored
  connectionstring: postgresql://u:p@h:1/real
"#;
        let config = DatabaseConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.connection_url(), "postgresql://u:p@h:1/real");
    }

    #[test]
    fn test_yaml_postgres_defaults() {
        let yaml = r#"
Database:
  db_type: postgres
  user: xenia
  password: secret
  name: xenia
"#;
        let config = DatabaseConfig::from_yaml_str(yaml).unwrap();
        match config {
            DatabaseConfig::Postgres { ref host, port, .. } => {
                assert_eq!(host, "localhost");
                assert_eq!(port, 5432);
            }
            _ => panic!("expected postgres"),
        }
    }

    #[test]
    fn test_yaml_sqlite() {
        let yaml = "Database:\n  db_type: sqlite\n  file_path: /tmp/xenia.db\n";
        let config = DatabaseConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.connection_url(), "sqlite:/tmp/xenia.db?mode=rwc");
        assert_eq!(config.kind(), StoreKind::Sqlite);
    }

    #[test]
    fn test_unsupported_db_type_rejected() {
        let yaml = "Database:\n  db_type: oracle\n";
        assert!(matches!(
            DatabaseConfig::from_yaml_str(yaml),
            Err(XeniaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_postgres_without_name_or_url_rejected() {
        let yaml = "Database:\n  db_type: postgres\n  user: x\n";
        assert!(DatabaseConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_from_url() {
        let config = DatabaseConfig::from_url("sqlite:///var/lib/xenia.db?mode=rwc").unwrap();
        assert_eq!(
            config,
            DatabaseConfig::Sqlite {
                file_path: PathBuf::from("/var/lib/xenia.db")
            }
        );
        assert!(DatabaseConfig::from_url("postgresql://localhost/xenia").is_ok());
        assert!(DatabaseConfig::from_url("mysql://localhost/xenia").is_err());
    }

    #[test]
    fn test_writer_config_validation() {
        assert!(WriterConfig::new(0, 10).is_err());
        assert!(WriterConfig::new(10, 0).is_err());
        let config = WriterConfig::new(5, 10).unwrap();
        assert_eq!(config.records_before_commit, 5);
        assert_eq!(WriterConfig::default().records_before_commit, 100);
    }
}
