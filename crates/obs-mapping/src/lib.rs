//! Observation mappings: which source column feeds which xenia sensor.
//!
//! A mapping document is a JSON list of records naming a target observation
//! and unit, the source column it is read from and the sensor order. Binding
//! a mapping against a platform resolves (and if needed creates) the sensor
//! of every record through the storage crate's entity resolver.

pub mod error;
pub mod mapping;
pub mod registry;

pub use error::{MappingError, MappingResult};
pub use mapping::{ObsMap, ObsMapping};
pub use registry::{PlatformObsRegistry, SearchFilter};
