//! Error types for mapping loading and binding.

use thiserror::Error;
use xenia_common::{XeniaError, M_DATE_OBS};

pub type MappingResult<T> = Result<T, MappingError>;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid mapping document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Mapping for '{0}' has no target_uom")]
    MissingUnit(String),

    #[error("Mapping has no '{}' record", M_DATE_OBS)]
    NoDateField,

    #[error("Source column '{0}' is not present")]
    MissingColumn(String),

    #[error(transparent)]
    Store(#[from] XeniaError),
}
