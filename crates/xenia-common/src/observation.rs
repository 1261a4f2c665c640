//! Observation value records and taxonomy identifiers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Target observation name reserved for the timestamp column of a source.
pub const M_DATE_OBS: &str = "m_date";

/// A single timestamped measured value destined for the `multi_obs` table.
///
/// `sensor_id` and `m_type_id` must already be resolved before a record is
/// handed to the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sensor_id: i64,
    pub m_type_id: Option<i64>,
    pub platform_handle: String,
    pub m_date: NaiveDateTime,
    pub m_value: Option<f64>,
    pub m_lon: Option<f64>,
    pub m_lat: Option<f64>,
    pub m_z: Option<f64>,
    pub row_entry_date: NaiveDateTime,
}

impl Observation {
    pub fn new(
        sensor_id: i64,
        platform_handle: impl Into<String>,
        m_date: NaiveDateTime,
        m_value: Option<f64>,
    ) -> Self {
        Self {
            sensor_id,
            m_type_id: None,
            platform_handle: platform_handle.into(),
            m_date,
            m_value,
            m_lon: None,
            m_lat: None,
            m_z: None,
            row_entry_date: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn with_m_type(mut self, m_type_id: i64) -> Self {
        self.m_type_id = Some(m_type_id);
        self
    }

    pub fn with_position(mut self, lon: f64, lat: f64, z: Option<f64>) -> Self {
        self.m_lon = Some(lon);
        self.m_lat = Some(lat);
        self.m_z = z;
        self
    }

    /// Human readable conflict key used in log and error messages.
    pub fn key(&self) -> String {
        format!("sensor_id={} m_date={}", self.sensor_id, self.m_date)
    }
}

/// Links of the taxonomy chain a sensor depends on, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxonomyLink {
    ObservationType,
    UomType,
    ScalarType,
    MeasurementType,
}

impl TaxonomyLink {
    /// Table backing this link.
    pub fn table(&self) -> &'static str {
        match self {
            TaxonomyLink::ObservationType => "obs_type",
            TaxonomyLink::UomType => "uom_type",
            TaxonomyLink::ScalarType => "m_scalar_type",
            TaxonomyLink::MeasurementType => "m_type",
        }
    }
}

impl std::fmt::Display for TaxonomyLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}
