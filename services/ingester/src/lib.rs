//! Observation ingester library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod config;
pub mod ingest;
pub mod sources;

pub use config::IngesterConfig;
pub use ingest::{IngestSummary, IngestionPipeline};
pub use sources::{CsvSource, ObservationSource, SourceRow};
