//! Direct, single record access to the `multi_obs` table.

use chrono::Utc;
use tracing::{debug, error};

use xenia_common::{Observation, XeniaResult};

use crate::pool::{classify, query_failed, Db, DbConnection, DbPool};

const INSERT_SQL: &str = "INSERT INTO multi_obs \
     (row_entry_date, platform_handle, sensor_id, m_type_id, m_date, m_lon, m_lat, m_z, m_value) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING row_id";

/// Insert one observation on `conn` and return its row id.
///
/// A conflict on `(sensor_id, m_date)` is reported as `XeniaError::Duplicate`.
pub async fn insert_observation(conn: &mut DbConnection, obs: &Observation) -> XeniaResult<i64> {
    sqlx::query_scalar::<Db, i64>(INSERT_SQL)
        .bind(obs.row_entry_date)
        .bind(&obs.platform_handle)
        .bind(obs.sensor_id)
        .bind(obs.m_type_id)
        .bind(obs.m_date)
        .bind(obs.m_lon)
        .bind(obs.m_lat)
        .bind(obs.m_z)
        .bind(obs.m_value)
        .fetch_one(conn)
        .await
        .map_err(|e| classify(e, "multi_obs", || obs.key()))
}

/// Observation writes outside of the batched writer, each in its own
/// implicit transaction.
#[derive(Clone)]
pub struct ObservationStore {
    pool: DbPool,
}

impl ObservationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn add_observation(&self, obs: &Observation) -> XeniaResult<i64> {
        let mut conn = self.pool.acquire().await.map_err(query_failed("multi_obs"))?;
        let row_id = insert_observation(&mut conn, obs).await?;
        debug!(row_id, key = %obs.key(), "Added observation");
        Ok(row_id)
    }

    /// Row id of the stored observation for this sensor at `m_date`.
    pub async fn observation_exists(&self, obs: &Observation) -> XeniaResult<Option<i64>> {
        sqlx::query_scalar::<Db, i64>(
            "SELECT row_id FROM multi_obs WHERE sensor_id = $1 AND m_date = $2",
        )
        .bind(obs.sensor_id)
        .bind(obs.m_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("multi_obs"))
    }

    /// Insert `obs`, or when a value is already stored for its sensor and
    /// time either update it (`update_if_exists`) or leave it untouched.
    ///
    /// Returns the row id written, or `None` when an existing row was kept.
    pub async fn add_or_update_observation(
        &self,
        obs: &Observation,
        update_if_exists: bool,
    ) -> XeniaResult<Option<i64>> {
        let existing = match self.observation_exists(obs).await? {
            Some(row_id) => row_id,
            None => match self.add_observation(obs).await {
                Ok(row_id) => return Ok(Some(row_id)),
                Err(e) if e.is_duplicate() => match self.observation_exists(obs).await? {
                    Some(row_id) => row_id,
                    None => return Err(e),
                },
                Err(e) => {
                    error!(key = %obs.key(), error = %e, "Unable to add observation");
                    return Err(e);
                }
            },
        };

        if !update_if_exists {
            debug!(key = %obs.key(), "Observation exists, not updating");
            return Ok(None);
        }

        // Only the value changes; the stored measurement type stays.
        sqlx::query("UPDATE multi_obs SET m_value = $1, row_update_date = $2 WHERE row_id = $3")
            .bind(obs.m_value)
            .bind(Utc::now().naive_utc())
            .bind(existing)
            .execute(&self.pool)
            .await
            .map_err(query_failed("multi_obs"))?;

        debug!(row_id = existing, key = %obs.key(), "Updated observation");
        Ok(Some(existing))
    }

    /// Number of stored observations for a platform.
    pub async fn count_for_platform(&self, platform_handle: &str) -> XeniaResult<i64> {
        sqlx::query_scalar::<Db, i64>("SELECT COUNT(*) FROM multi_obs WHERE platform_handle = $1")
            .bind(platform_handle)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("multi_obs"))
    }
}
