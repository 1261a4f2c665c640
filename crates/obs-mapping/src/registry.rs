//! Mappings for several platforms, keyed by platform handle.
//!
//! The registry is owned by whoever drives ingestion and passed explicitly
//! to the code that needs it.

use std::collections::HashMap;

use tracing::debug;

use crate::mapping::{ObsMap, ObsMapping};

/// Field a registry lookup matches on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchFilter<'a> {
    SourceName(&'a str),
    TargetName(&'a str),
    SensorId(i64),
    MeasurementTypeId(i64),
}

#[derive(Debug, Default)]
pub struct PlatformObsRegistry {
    platforms: HashMap<String, ObsMapping>,
}

impl PlatformObsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record to the platform's mapping, creating the mapping if needed.
    ///
    /// Returns `false` without adding when a record for the same sensor is
    /// already present. Records without a resolved sensor are compared by
    /// source column instead.
    pub fn add(&mut self, platform_handle: &str, record: ObsMap) -> bool {
        let mapping = self
            .platforms
            .entry(platform_handle.to_string())
            .or_default();

        let present = match record.sensor_id {
            Some(sensor_id) => mapping.by_sensor_id(sensor_id).is_some(),
            None => mapping
                .iter()
                .any(|r| r.sensor_id.is_none() && r.source_obs == record.source_obs),
        };
        if present {
            debug!(
                platform = platform_handle,
                obs = %record.target_obs,
                sensor_id = ?record.sensor_id,
                "Mapping record already registered"
            );
            return false;
        }

        mapping.add(record);
        true
    }

    /// Register a whole mapping, replacing any previous one for the platform.
    pub fn insert(&mut self, platform_handle: &str, mapping: ObsMapping) -> Option<ObsMapping> {
        self.platforms.insert(platform_handle.to_string(), mapping)
    }

    pub fn get(&self, platform_handle: &str) -> Option<&ObsMapping> {
        self.platforms.get(platform_handle)
    }

    pub fn get_mut(&mut self, platform_handle: &str) -> Option<&mut ObsMapping> {
        self.platforms.get_mut(platform_handle)
    }

    pub fn find(&self, platform_handle: &str, filter: SearchFilter<'_>) -> Option<&ObsMap> {
        let mapping = self.get(platform_handle)?;
        match filter {
            SearchFilter::SourceName(name) => mapping.by_source_name(name),
            SearchFilter::TargetName(name) => mapping.by_target_name(name),
            SearchFilter::SensorId(id) => mapping.by_sensor_id(id),
            SearchFilter::MeasurementTypeId(id) => mapping.by_m_type_id(id),
        }
    }

    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.platforms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}
