//! Entity resolution for the xenia reference tables.
//!
//! Every `resolve_*` operation follows the same exists-or-create pattern and
//! returns a stable row id. A duplicate-key rejection on insert means another
//! path already created the row, so the resolver re-queries and returns the
//! existing id instead of failing.
//!
//! The `*_exists` queries return `Ok(None)` when no row matches and `Err(_)`
//! only when the query itself failed.
//!
//! Row ids of `obs_type`, `uom_type`, `m_scalar_type` and `m_type` are not
//! generated by the store. They are allocated as `max(row_id) + 1` inside a
//! transaction; the unique constraints on those tables turn a concurrent
//! allocation into a duplicate rejection, after which the allocation is retried.

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use xenia_common::{PlatformHandle, TaxonomyLink, XeniaError, XeniaResult};

use crate::pool::{classify, query_failed, Db, DbConnection, DbPool};

/// Attempts made to allocate an application managed row id.
const MAX_ID_ATTEMPTS: usize = 5;

/// Optional organization attributes used when the row has to be created.
#[derive(Debug, Clone)]
pub struct OrganizationDetails {
    pub active: i32,
    pub long_name: String,
    pub description: String,
    pub url: String,
}

impl Default for OrganizationDetails {
    fn default() -> Self {
        Self {
            active: 1,
            long_name: String::new(),
            description: String::new(),
            url: String::new(),
        }
    }
}

/// Optional platform attributes used when the row has to be created.
#[derive(Debug, Clone)]
pub struct PlatformDetails {
    pub fixed_longitude: Option<f64>,
    pub fixed_latitude: Option<f64>,
    pub active: i32,
    pub url: String,
    pub description: String,
}

impl Default for PlatformDetails {
    fn default() -> Self {
        Self {
            fixed_longitude: None,
            fixed_latitude: None,
            active: 1,
            url: String::new(),
            description: String::new(),
        }
    }
}

impl PlatformDetails {
    pub fn at(lon: f64, lat: f64) -> Self {
        Self {
            fixed_longitude: Some(lon),
            fixed_latitude: Some(lat),
            ..Self::default()
        }
    }
}

/// A sensor to create on a platform: observation, unit and order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub obs_name: String,
    pub uom: String,
    pub s_order: i32,
}

impl SensorSpec {
    pub fn new(obs_name: impl Into<String>, uom: impl Into<String>, s_order: i32) -> Self {
        Self {
            obs_name: obs_name.into(),
            uom: uom.into(),
            s_order,
        }
    }
}

/// A reference row whose id the resolver allocates.
#[derive(Debug, Clone, Copy)]
enum TaxonomyRow<'a> {
    ObservationType(&'a str),
    UomType(&'a str),
    ScalarType { obs_type_id: i64, uom_type_id: i64 },
    MeasurementType { scalar_type_id: i64, description: &'a str },
}

impl TaxonomyRow<'_> {
    fn link(&self) -> TaxonomyLink {
        match self {
            TaxonomyRow::ObservationType(_) => TaxonomyLink::ObservationType,
            TaxonomyRow::UomType(_) => TaxonomyLink::UomType,
            TaxonomyRow::ScalarType { .. } => TaxonomyLink::ScalarType,
            TaxonomyRow::MeasurementType { .. } => TaxonomyLink::MeasurementType,
        }
    }

    fn describe(&self) -> String {
        match self {
            TaxonomyRow::ObservationType(name) | TaxonomyRow::UomType(name) => name.to_string(),
            TaxonomyRow::ScalarType {
                obs_type_id,
                uom_type_id,
            } => format!("obs_type_id={} uom_type_id={}", obs_type_id, uom_type_id),
            TaxonomyRow::MeasurementType { scalar_type_id, .. } => {
                format!("m_scalar_type_id={}", scalar_type_id)
            }
        }
    }

    async fn insert(&self, conn: &mut DbConnection, row_id: i64) -> XeniaResult<()> {
        let result = match *self {
            TaxonomyRow::ObservationType(name) => {
                sqlx::query("INSERT INTO obs_type (row_id, standard_name) VALUES ($1, $2)")
                    .bind(row_id)
                    .bind(name)
                    .execute(&mut *conn)
                    .await
            }
            TaxonomyRow::UomType(name) => {
                sqlx::query("INSERT INTO uom_type (row_id, standard_name) VALUES ($1, $2)")
                    .bind(row_id)
                    .bind(name)
                    .execute(&mut *conn)
                    .await
            }
            TaxonomyRow::ScalarType {
                obs_type_id,
                uom_type_id,
            } => {
                sqlx::query(
                    "INSERT INTO m_scalar_type (row_id, obs_type_id, uom_type_id) VALUES ($1, $2, $3)",
                )
                .bind(row_id)
                .bind(obs_type_id)
                .bind(uom_type_id)
                .execute(&mut *conn)
                .await
            }
            TaxonomyRow::MeasurementType {
                scalar_type_id,
                description,
            } => {
                sqlx::query(
                    "INSERT INTO m_type (row_id, num_types, m_scalar_type_id, description) \
                     VALUES ($1, 1, $2, $3)",
                )
                .bind(row_id)
                .bind(scalar_type_id)
                .bind(description)
                .execute(&mut *conn)
                .await
            }
        };
        result
            .map(|_| ())
            .map_err(|e| classify(e, self.link().table(), || self.describe()))
    }
}

/// Resolves semantic keys to row ids, creating missing rows.
///
/// Assumes a single resolver context per process against a given set of
/// reference tables; concurrent allocators are tolerated through the
/// duplicate-and-retry path but not coordinated.
#[derive(Clone)]
pub struct EntityResolver {
    pool: DbPool,
}

impl EntityResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    // ========================================================================
    // Existence queries
    // ========================================================================

    pub async fn organization_exists(&self, name: &str) -> XeniaResult<Option<i64>> {
        let id = sqlx::query_scalar::<Db, i64>("SELECT row_id FROM organization WHERE short_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("organization"))?;
        if id.is_none() {
            debug!(organization = name, "Organization does not exist");
        }
        Ok(id)
    }

    pub async fn platform_exists(&self, platform_handle: &str) -> XeniaResult<Option<i64>> {
        let id = sqlx::query_scalar::<Db, i64>("SELECT row_id FROM platform WHERE platform_handle = $1")
            .bind(platform_handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("platform"))?;
        if id.is_none() {
            debug!(platform = platform_handle, "Platform does not exist");
        }
        Ok(id)
    }

    pub async fn observation_type_exists(&self, obs_name: &str) -> XeniaResult<Option<i64>> {
        let id = sqlx::query_scalar::<Db, i64>("SELECT row_id FROM obs_type WHERE standard_name = $1")
            .bind(obs_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("obs_type"))?;
        if id.is_none() {
            debug!(obs = obs_name, "Observation does not exist in obs_type table");
        }
        Ok(id)
    }

    pub async fn uom_type_exists(&self, uom: &str) -> XeniaResult<Option<i64>> {
        let id = sqlx::query_scalar::<Db, i64>("SELECT row_id FROM uom_type WHERE standard_name = $1")
            .bind(uom)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("uom_type"))?;
        if id.is_none() {
            debug!(uom, "UOM does not exist in uom_type table");
        }
        Ok(id)
    }

    pub async fn scalar_type_exists(
        &self,
        obs_type_id: i64,
        uom_type_id: i64,
    ) -> XeniaResult<Option<i64>> {
        let id = sqlx::query_scalar::<Db, i64>(
            "SELECT row_id FROM m_scalar_type WHERE obs_type_id = $1 AND uom_type_id = $2",
        )
        .bind(obs_type_id)
        .bind(uom_type_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("m_scalar_type"))?;
        if id.is_none() {
            debug!(obs_type_id, uom_type_id, "Scalar type does not exist");
        }
        Ok(id)
    }

    /// Single-scalar measurement type wrapping `scalar_type_id`.
    pub async fn measurement_type_for_scalar(&self, scalar_type_id: i64) -> XeniaResult<Option<i64>> {
        sqlx::query_scalar::<Db, i64>(
            "SELECT row_id FROM m_type WHERE m_scalar_type_id = $1 AND num_types = 1",
        )
        .bind(scalar_type_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("m_type"))
    }

    /// Measurement type for an observation name and unit pair.
    pub async fn measurement_type_exists(&self, obs_name: &str, uom: &str) -> XeniaResult<Option<i64>> {
        let id = sqlx::query_scalar::<Db, i64>(
            "SELECT m_type.row_id FROM m_type \
             JOIN m_scalar_type ON m_scalar_type.row_id = m_type.m_scalar_type_id \
             JOIN obs_type ON obs_type.row_id = m_scalar_type.obs_type_id \
             JOIN uom_type ON uom_type.row_id = m_scalar_type.uom_type_id \
             WHERE obs_type.standard_name = $1 AND uom_type.standard_name = $2 \
             ORDER BY m_type.row_id LIMIT 1",
        )
        .bind(obs_name)
        .bind(uom)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("m_type"))?;
        if id.is_none() {
            debug!(obs = obs_name, uom, "m_type does not exist");
        }
        Ok(id)
    }

    /// Sensor measuring `obs_name` in `uom` with order `s_order` on a platform.
    pub async fn sensor_exists(
        &self,
        obs_name: &str,
        uom: &str,
        platform_handle: &str,
        s_order: i32,
    ) -> XeniaResult<Option<i64>> {
        sqlx::query_scalar::<Db, i64>(
            "SELECT sensor.row_id FROM sensor \
             JOIN platform ON platform.row_id = sensor.platform_id \
             JOIN m_type ON m_type.row_id = sensor.m_type_id \
             JOIN m_scalar_type ON m_scalar_type.row_id = m_type.m_scalar_type_id \
             JOIN obs_type ON obs_type.row_id = m_scalar_type.obs_type_id \
             JOIN uom_type ON uom_type.row_id = m_scalar_type.uom_type_id \
             WHERE sensor.s_order = $1 AND platform.platform_handle = $2 \
             AND obs_type.standard_name = $3 AND uom_type.standard_name = $4",
        )
        .bind(s_order)
        .bind(platform_handle)
        .bind(obs_name)
        .bind(uom)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("sensor"))
    }

    async fn taxonomy_row_exists(&self, row: TaxonomyRow<'_>) -> XeniaResult<Option<i64>> {
        match row {
            TaxonomyRow::ObservationType(name) => self.observation_type_exists(name).await,
            TaxonomyRow::UomType(name) => self.uom_type_exists(name).await,
            TaxonomyRow::ScalarType {
                obs_type_id,
                uom_type_id,
            } => self.scalar_type_exists(obs_type_id, uom_type_id).await,
            TaxonomyRow::MeasurementType { scalar_type_id, .. } => {
                self.measurement_type_for_scalar(scalar_type_id).await
            }
        }
    }

    // ========================================================================
    // Organization / platform
    // ========================================================================

    pub async fn resolve_organization(&self, name: &str) -> XeniaResult<i64> {
        self.resolve_organization_with(name, &OrganizationDetails::default())
            .await
    }

    pub async fn resolve_organization_with(
        &self,
        name: &str,
        details: &OrganizationDetails,
    ) -> XeniaResult<i64> {
        if let Some(id) = self.organization_exists(name).await? {
            return Ok(id);
        }

        let inserted = sqlx::query_scalar::<Db, i64>(
            "INSERT INTO organization (row_entry_date, short_name, active, long_name, description, url) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING row_id",
        )
        .bind(Self::now())
        .bind(name)
        .bind(details.active)
        .bind(&details.long_name)
        .bind(&details.description)
        .bind(&details.url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "organization", || name.to_string()));

        match inserted {
            Ok(id) => {
                info!(organization = name, row_id = id, "Added organization");
                Ok(id)
            }
            Err(e) if e.is_duplicate() => {
                warn!(organization = name, "Organization already exists, using existing row");
                self.organization_exists(name)
                    .await?
                    .ok_or_else(|| vanished("organization", name))
            }
            Err(e) => {
                error!(organization = name, error = %e, "Unable to add organization");
                Err(e)
            }
        }
    }

    /// Ensure the platform row for `handle` exists.
    ///
    /// When `org_id` is `None` the organization named by the handle prefix is
    /// resolved (and created if needed) first.
    pub async fn resolve_platform(
        &self,
        handle: &PlatformHandle,
        org_id: Option<i64>,
        details: &PlatformDetails,
    ) -> XeniaResult<i64> {
        if let Some(id) = self.platform_exists(handle.as_str()).await? {
            return Ok(id);
        }

        let org_id = match org_id {
            Some(id) => id,
            None => self.resolve_organization(handle.organization()).await?,
        };

        let inserted = sqlx::query_scalar::<Db, i64>(
            "INSERT INTO platform (row_entry_date, organization_id, short_name, platform_handle, \
             fixed_longitude, fixed_latitude, active, url, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING row_id",
        )
        .bind(Self::now())
        .bind(org_id)
        .bind(handle.short_name())
        .bind(handle.as_str())
        .bind(details.fixed_longitude)
        .bind(details.fixed_latitude)
        .bind(details.active)
        .bind(&details.url)
        .bind(&details.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "platform", || handle.to_string()));

        match inserted {
            Ok(id) => {
                info!(platform = %handle, row_id = id, organization_id = org_id, "Added platform");
                Ok(id)
            }
            Err(e) if e.is_duplicate() => {
                warn!(platform = %handle, "Platform already exists, using existing row");
                self.platform_exists(handle.as_str())
                    .await?
                    .ok_or_else(|| vanished("platform", handle.as_str()))
            }
            Err(e) => {
                error!(platform = %handle, error = %e, "Unable to add platform");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Taxonomy chain
    // ========================================================================

    pub async fn resolve_observation_type(&self, obs_name: &str) -> XeniaResult<i64> {
        match self.observation_type_exists(obs_name).await? {
            Some(id) => Ok(id),
            None => self.allocate_taxonomy_row(TaxonomyRow::ObservationType(obs_name)).await,
        }
    }

    pub async fn resolve_uom_type(&self, uom: &str) -> XeniaResult<i64> {
        match self.uom_type_exists(uom).await? {
            Some(id) => Ok(id),
            None => self.allocate_taxonomy_row(TaxonomyRow::UomType(uom)).await,
        }
    }

    pub async fn resolve_scalar_type(&self, obs_type_id: i64, uom_type_id: i64) -> XeniaResult<i64> {
        match self.scalar_type_exists(obs_type_id, uom_type_id).await? {
            Some(id) => Ok(id),
            None => {
                self.allocate_taxonomy_row(TaxonomyRow::ScalarType {
                    obs_type_id,
                    uom_type_id,
                })
                .await
            }
        }
    }

    pub async fn resolve_measurement_type(&self, scalar_type_id: i64) -> XeniaResult<i64> {
        match self.measurement_type_for_scalar(scalar_type_id).await? {
            Some(id) => Ok(id),
            None => {
                self.allocate_taxonomy_row(TaxonomyRow::MeasurementType {
                    scalar_type_id,
                    description: "",
                })
                .await
            }
        }
    }

    /// Walk the taxonomy chain for `obs_name(uom)` and return its m_type id.
    ///
    /// With `allow_create` false the first missing link is reported and no
    /// rows are written.
    pub async fn resolve_taxonomy(
        &self,
        obs_name: &str,
        uom: &str,
        allow_create: bool,
    ) -> XeniaResult<i64> {
        if let Some(id) = self.measurement_type_exists(obs_name, uom).await? {
            return Ok(id);
        }

        let obs_type_id = match self.observation_type_exists(obs_name).await? {
            Some(id) => id,
            None if allow_create => self.resolve_observation_type(obs_name).await?,
            None => return Err(missing(TaxonomyLink::ObservationType, obs_name)),
        };

        let uom_type_id = match self.uom_type_exists(uom).await? {
            Some(id) => id,
            None if allow_create => self.resolve_uom_type(uom).await?,
            None => return Err(missing(TaxonomyLink::UomType, uom)),
        };

        let scalar_type_id = match self.scalar_type_exists(obs_type_id, uom_type_id).await? {
            Some(id) => id,
            None if allow_create => self.resolve_scalar_type(obs_type_id, uom_type_id).await?,
            None => {
                return Err(missing(
                    TaxonomyLink::ScalarType,
                    &format!("{}({})", obs_name, uom),
                ))
            }
        };

        match self.measurement_type_for_scalar(scalar_type_id).await? {
            Some(id) => Ok(id),
            None if allow_create => self.resolve_measurement_type(scalar_type_id).await,
            None => Err(missing(
                TaxonomyLink::MeasurementType,
                &format!("{}({})", obs_name, uom),
            )),
        }
    }

    async fn allocate_taxonomy_row(&self, row: TaxonomyRow<'_>) -> XeniaResult<i64> {
        let table = row.link().table();
        let next_id_sql = format!("SELECT COALESCE(MAX(row_id), 0) + 1 FROM {}", table);

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let mut tx = self.pool.begin().await.map_err(query_failed(table))?;
            let next_id = sqlx::query_scalar::<Db, i64>(&next_id_sql)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_failed(table))?;

            match row.insert(&mut *tx, next_id).await {
                Ok(()) => {
                    tx.commit()
                        .await
                        .map_err(|e| classify(e, table, || row.describe()))?;
                    debug!(table, row_id = next_id, row = %row.describe(), "Added taxonomy row");
                    return Ok(next_id);
                }
                Err(e) if e.is_duplicate() => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(table, error = %rollback_err, "Rollback after conflict failed");
                    }
                    if let Some(id) = self.taxonomy_row_exists(row).await? {
                        warn!(table, row = %row.describe(), "Row already exists, using existing row");
                        return Ok(id);
                    }
                    debug!(table, attempt, row_id = next_id, "Row id already taken, retrying");
                }
                Err(e) => {
                    error!(table, row = %row.describe(), error = %e, "Unable to add taxonomy row");
                    return Err(e);
                }
            }
        }

        error!(table, row = %row.describe(), "Giving up on row id allocation");
        Err(XeniaError::IdAllocation(table))
    }

    // ========================================================================
    // Sensors
    // ========================================================================

    /// Ensure the sensor `obs_name(uom)` with order `s_order` exists on the platform.
    ///
    /// The platform must already exist. With `allow_create_taxonomy` false a
    /// missing observation type, unit, scalar type or measurement type fails
    /// the call with [`XeniaError::MissingTaxonomy`] and nothing is created.
    pub async fn resolve_sensor(
        &self,
        obs_name: &str,
        uom: &str,
        handle: &PlatformHandle,
        s_order: i32,
        allow_create_taxonomy: bool,
    ) -> XeniaResult<i64> {
        if let Some(id) = self
            .sensor_exists(obs_name, uom, handle.as_str(), s_order)
            .await?
        {
            return Ok(id);
        }

        let platform_id = self
            .platform_exists(handle.as_str())
            .await?
            .ok_or_else(|| XeniaError::MissingEntity {
                kind: "platform",
                key: handle.to_string(),
            })?;

        let m_type_id = self
            .resolve_taxonomy(obs_name, uom, allow_create_taxonomy)
            .await
            .inspect_err(|e| {
                error!(platform = %handle, obs = obs_name, uom, error = %e, "Cannot add sensor")
            })?;

        let inserted = sqlx::query_scalar::<Db, i64>(
            "INSERT INTO sensor (row_entry_date, platform_id, m_type_id, short_name, fixed_z, active, s_order) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING row_id",
        )
        .bind(Self::now())
        .bind(platform_id)
        .bind(m_type_id)
        .bind(obs_name)
        .bind(0.0_f64)
        .bind(1_i32)
        .bind(s_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            classify(e, "sensor", || {
                format!("{}({}) s_order={} on {}", obs_name, uom, s_order, handle)
            })
        });

        match inserted {
            Ok(id) => {
                debug!(
                    platform = %handle,
                    obs = obs_name,
                    uom,
                    s_order,
                    sensor_id = id,
                    "Added sensor"
                );
                Ok(id)
            }
            Err(e) if e.is_duplicate() => {
                warn!(platform = %handle, obs = obs_name, uom, s_order, "Sensor already exists, using existing row");
                self.sensor_exists(obs_name, uom, handle.as_str(), s_order)
                    .await?
                    .ok_or_else(|| vanished("sensor", obs_name))
            }
            Err(e) => {
                error!(platform = %handle, obs = obs_name, uom, error = %e, "Unable to add sensor");
                Err(e)
            }
        }
    }

    /// Create the organization, platform and every listed sensor, creating
    /// taxonomy rows as needed.
    ///
    /// A sensor that cannot be added is logged and reported as `None`; the
    /// remaining sensors are still processed.
    #[instrument(skip(self, sensors), fields(platform = %handle, sensors = sensors.len()))]
    pub async fn build_minimal_platform(
        &self,
        handle: &PlatformHandle,
        sensors: &[SensorSpec],
    ) -> XeniaResult<Vec<Option<i64>>> {
        self.resolve_platform(handle, None, &PlatformDetails::default())
            .await?;

        let mut sensor_ids = Vec::with_capacity(sensors.len());
        for spec in sensors {
            debug!(obs = %spec.obs_name, uom = %spec.uom, "Adding sensor");
            match self
                .resolve_sensor(&spec.obs_name, &spec.uom, handle, spec.s_order, true)
                .await
            {
                Ok(id) => sensor_ids.push(Some(id)),
                Err(e) => {
                    error!(
                        obs = %spec.obs_name,
                        uom = %spec.uom,
                        error = %e,
                        "Sensor not added"
                    );
                    sensor_ids.push(None);
                }
            }
        }
        Ok(sensor_ids)
    }
}

fn missing(link: TaxonomyLink, name: &str) -> XeniaError {
    XeniaError::MissingTaxonomy {
        link,
        name: name.to_string(),
    }
}

/// A duplicate was reported but the conflicting row cannot be read back.
fn vanished(kind: &'static str, key: &str) -> XeniaError {
    XeniaError::Database(format!(
        "{} '{}' was rejected as a duplicate but cannot be found",
        kind, key
    ))
}
