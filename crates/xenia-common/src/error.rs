//! Error types for the xenia observation crates.

use thiserror::Error;

use crate::TaxonomyLink;

/// Result type alias using XeniaError.
pub type XeniaResult<T> = Result<T, XeniaError>;

/// Primary error type for resolution, mapping and persistence operations.
#[derive(Debug, Error)]
pub enum XeniaError {
    // === Store Errors ===
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate {table} row: {key}")]
    Duplicate { table: &'static str, key: String },

    // === Resolution Errors ===
    #[error("{link} '{name}' does not exist and taxonomy creation is disabled")]
    MissingTaxonomy { link: TaxonomyLink, name: String },

    #[error("{kind} '{key}' does not exist")]
    MissingEntity { kind: &'static str, key: String },

    #[error("Unable to allocate a {0} row id after repeated conflicts")]
    IdAllocation(&'static str),

    // === Input Errors ===
    #[error("Malformed platform handle '{0}': expected 'organization.short_name'")]
    MalformedHandle(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    // === Infrastructure Errors ===
    #[error("Observation writer is no longer accepting records")]
    WriterClosed,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XeniaError {
    /// True when the store rejected an insert because the row already exists.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, XeniaError::Duplicate { .. })
    }

    /// True when a link of the taxonomy chain or a parent entity is missing.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            XeniaError::MissingTaxonomy { .. } | XeniaError::MissingEntity { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_taxonomy_message_names_link() {
        let err = XeniaError::MissingTaxonomy {
            link: TaxonomyLink::UomType,
            name: "m/s".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "uom_type 'm/s' does not exist and taxonomy creation is disabled"
        );
        assert!(err.is_resolution_failure());
        assert!(!err.is_duplicate());
    }

    #[test]
    fn test_duplicate_classification() {
        let err = XeniaError::Duplicate {
            table: "multi_obs",
            key: "sensor_id=4 m_date=2024-01-01 00:00:00".to_string(),
        };
        assert!(err.is_duplicate());
        assert!(err.to_string().starts_with("Duplicate multi_obs row"));
    }

    #[test]
    fn test_io_error_converts() {
        fn open_missing() -> XeniaResult<()> {
            std::fs::read("/nonexistent-dir/xenia.csv")?;
            Ok(())
        }
        let err = open_missing().unwrap_err();
        assert!(matches!(err, XeniaError::Io(_)));
        assert!(!err.is_resolution_failure());
    }
}
