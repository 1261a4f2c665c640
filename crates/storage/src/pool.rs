//! Database pool creation.
//!
//! The backend is chosen with cargo features rather than `sqlx::AnyPool` so
//! that chrono timestamps and typed rows work the same on both stores.
//!
//! - `postgres` feature: `PgPool`
//! - `sqlite` feature (default): `SqlitePool`
//!
//! If both features are enabled, `postgres` takes priority.

use tracing::info;

use xenia_common::{XeniaError, XeniaResult};

use crate::config::DatabaseConfig;

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("xenia-storage needs the 'sqlite' or 'postgres' feature");

/// Database driver selected at compile time.
#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type Db = sqlx::Sqlite;

/// Connection pool for the compiled backend.
pub type DbPool = sqlx::Pool<Db>;

/// A single connection for the compiled backend.
pub type DbConnection = <Db as sqlx::Database>::Connection;

/// Default pool size for resolver and store use.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connect a pool to the configured store.
pub async fn connect(config: &DatabaseConfig) -> XeniaResult<DbPool> {
    connect_with(config, DEFAULT_MAX_CONNECTIONS).await
}

/// Connect a pool limited to `max_connections` connections.
pub async fn connect_with(config: &DatabaseConfig, max_connections: u32) -> XeniaResult<DbPool> {
    config.ensure_compiled()?;

    let pool = sqlx::pool::PoolOptions::<Db>::new()
        .max_connections(max_connections)
        .connect(&config.connection_url())
        .await
        .map_err(|e| {
            XeniaError::Connection(format!("{}: {}", config.database_name(), e))
        })?;

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    apply_sqlite_optimizations(&pool).await?;

    info!(
        database = %config.database_name(),
        kind = %config.kind(),
        max_connections,
        "Connected to database"
    );
    Ok(pool)
}

/// WAL mode so the writer and resolver can share one database file.
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
async fn apply_sqlite_optimizations(pool: &DbPool) -> XeniaResult<()> {
    for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
        sqlx::query(pragma)
            .execute(pool)
            .await
            .map_err(|e| XeniaError::Connection(format!("{} failed: {}", pragma, e)))?;
    }
    Ok(())
}

/// Convert a sqlx error raised while writing `table`, classifying unique
/// and primary key violations as duplicates.
pub(crate) fn classify(err: sqlx::Error, table: &'static str, key: impl FnOnce() -> String) -> XeniaError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            XeniaError::Duplicate { table, key: key() }
        }
        _ => XeniaError::Database(format!("{}: {}", table, err)),
    }
}

/// Convert a sqlx error raised by a query against `table`.
pub(crate) fn query_failed(table: &'static str) -> impl FnOnce(sqlx::Error) -> XeniaError {
    move |e| XeniaError::Database(format!("Query on {} failed: {}", table, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    async fn test_sqlite_pool() {
        let (_dir, path) = test_utils::temp_sqlite_path();
        let config = DatabaseConfig::sqlite(&path).unwrap();
        let pool = connect(&config).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn test_uncompiled_backend_rejected() {
        let config = if cfg!(feature = "postgres") {
            DatabaseConfig::sqlite("/tmp/never-opened.db").unwrap()
        } else {
            DatabaseConfig::postgres_url("postgresql://localhost/xenia").unwrap()
        };
        assert!(matches!(
            connect(&config).await,
            Err(XeniaError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    async fn test_unreachable_store_is_connection_error() {
        let config = DatabaseConfig::sqlite("/nonexistent-dir/sub/xenia.db").unwrap();
        assert!(matches!(
            connect(&config).await,
            Err(XeniaError::Connection(_))
        ));
    }
}
