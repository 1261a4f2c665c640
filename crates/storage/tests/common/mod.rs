//! Shared setup for the storage integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use xenia_storage::{connect, ensure_schema, DatabaseConfig, Db, DbPool, EntityResolver};

pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
    pub config: DatabaseConfig,
    pub pool: DbPool,
}

impl TestDb {
    pub async fn new() -> Self {
        let (dir, path) = test_utils::temp_sqlite_path();
        let config = DatabaseConfig::sqlite(&path).unwrap();
        let pool = connect(&config).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        Self {
            dir,
            path,
            config,
            pool,
        }
    }

    pub fn resolver(&self) -> EntityResolver {
        EntityResolver::new(self.pool.clone())
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<Db, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
