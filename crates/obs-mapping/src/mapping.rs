//! Mapping records and the per-platform mapping list.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use xenia_common::{PlatformHandle, M_DATE_OBS};
use xenia_storage::{EntityResolver, PlatformDetails};

use crate::error::{MappingError, MappingResult};

fn default_s_order() -> i32 {
    1
}

/// Record as it appears in a mapping document. `target_uom`, `source_uom`
/// and `s_order` may be absent or null.
#[derive(Debug, Deserialize)]
struct ObsMapRecord {
    target_obs: String,
    #[serde(default)]
    target_uom: Option<String>,
    header_column: String,
    #[serde(default)]
    source_uom: Option<String>,
    #[serde(default)]
    s_order: Option<i32>,
}

impl From<ObsMapRecord> for ObsMap {
    fn from(record: ObsMapRecord) -> Self {
        Self {
            target_obs: record.target_obs,
            target_uom: record.target_uom,
            source_obs: record.header_column,
            source_uom: record.source_uom,
            s_order: record.s_order.unwrap_or_else(default_s_order),
            source_index: None,
            sensor_id: None,
            m_type_id: None,
        }
    }
}

/// One source column mapped onto a xenia observation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ObsMapRecord")]
pub struct ObsMap {
    pub target_obs: String,
    pub target_uom: Option<String>,
    /// Source column name (`header_column` in the document)
    pub source_obs: String,
    pub source_uom: Option<String>,
    pub s_order: i32,
    /// Position of `source_obs` in the current source, once indexed
    pub source_index: Option<usize>,
    /// Resolved after binding
    pub sensor_id: Option<i64>,
    /// Resolved after binding
    pub m_type_id: Option<i64>,
}

impl ObsMap {
    pub fn new(
        target_obs: impl Into<String>,
        target_uom: Option<&str>,
        source_obs: impl Into<String>,
        s_order: i32,
    ) -> Self {
        Self {
            target_obs: target_obs.into(),
            target_uom: target_uom.map(str::to_string),
            source_obs: source_obs.into(),
            source_uom: None,
            s_order,
            source_index: None,
            sensor_id: None,
            m_type_id: None,
        }
    }

    /// True for the record naming the timestamp column.
    pub fn is_date_field(&self) -> bool {
        self.target_obs == M_DATE_OBS
    }
}

/// Ordered mapping records for one platform.
#[derive(Debug, Clone, Default)]
pub struct ObsMapping {
    records: Vec<ObsMap>,
}

impl ObsMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> MappingResult<Self> {
        let records: Vec<ObsMap> = serde_json::from_str(json)?;
        debug!(records = records.len(), "Loaded mapping records");
        Ok(Self { records })
    }

    pub fn load_file(path: impl AsRef<Path>) -> MappingResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to load mapping file")
        })
    }

    pub fn add(&mut self, record: ObsMap) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObsMap> {
        self.records.iter()
    }

    pub fn date_field(&self) -> Option<&ObsMap> {
        self.records.iter().find(|r| r.is_date_field())
    }

    pub fn by_source_name(&self, name: &str) -> Option<&ObsMap> {
        self.records.iter().find(|r| r.source_obs == name)
    }

    pub fn by_target_name(&self, name: &str) -> Option<&ObsMap> {
        self.records.iter().find(|r| r.target_obs == name)
    }

    pub fn by_sensor_id(&self, sensor_id: i64) -> Option<&ObsMap> {
        self.records.iter().find(|r| r.sensor_id == Some(sensor_id))
    }

    pub fn by_m_type_id(&self, m_type_id: i64) -> Option<&ObsMap> {
        self.records.iter().find(|r| r.m_type_id == Some(m_type_id))
    }

    /// Record each mapped column's position in `headers`.
    ///
    /// The date column is required; other columns missing from the source
    /// are logged and left unindexed.
    pub fn index_columns<S: AsRef<str>>(&mut self, headers: &[S]) -> MappingResult<()> {
        for record in &mut self.records {
            record.source_index = headers
                .iter()
                .position(|h| h.as_ref().trim() == record.source_obs);
            if record.source_index.is_none() {
                if record.is_date_field() {
                    return Err(MappingError::MissingColumn(record.source_obs.clone()));
                }
                warn!(column = %record.source_obs, obs = %record.target_obs, "Mapped column not in source");
            }
        }
        if self.date_field().is_none() {
            return Err(MappingError::NoDateField);
        }
        Ok(())
    }

    /// Resolve the sensor and measurement type of every non-date record on
    /// `handle`, creating the platform and sensors that do not exist yet.
    ///
    /// `allow_create_taxonomy` is passed through to sensor resolution. The
    /// first failure aborts binding; a platform created before that failure
    /// is kept.
    #[instrument(skip(self, resolver), fields(platform = %handle, records = self.records.len()))]
    pub async fn bind(
        &mut self,
        resolver: &EntityResolver,
        handle: &PlatformHandle,
        allow_create_taxonomy: bool,
    ) -> MappingResult<()> {
        let mut platform_ready = false;
        let mut bound = 0usize;

        for record in self.records.iter_mut().filter(|r| !r.is_date_field()) {
            let uom = record
                .target_uom
                .as_deref()
                .ok_or_else(|| MappingError::MissingUnit(record.target_obs.clone()))?;

            debug!(
                obs = %record.target_obs,
                uom,
                s_order = record.s_order,
                "Checking sensor exists"
            );
            let existing = resolver
                .sensor_exists(&record.target_obs, uom, handle.as_str(), record.s_order)
                .await?;

            let sensor_id = match existing {
                Some(id) => id,
                None => {
                    if !platform_ready {
                        resolver
                            .resolve_platform(handle, None, &PlatformDetails::default())
                            .await?;
                        platform_ready = true;
                    }
                    debug!(obs = %record.target_obs, uom, "Sensor does not exist, adding");
                    resolver
                        .resolve_sensor(
                            &record.target_obs,
                            uom,
                            handle,
                            record.s_order,
                            allow_create_taxonomy,
                        )
                        .await
                        .inspect_err(|e| {
                            error!(obs = %record.target_obs, uom, error = %e, "Unable to bind mapping")
                        })?
                }
            };

            record.sensor_id = Some(sensor_id);
            record.m_type_id = resolver
                .measurement_type_exists(&record.target_obs, uom)
                .await?;
            bound += 1;
        }

        info!(bound, "Mapping bound to platform");
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ObsMapping {
    type Item = &'a ObsMap;
    type IntoIter = std::slice::Iter<'a, ObsMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
