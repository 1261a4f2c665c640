//! Shared test utilities for the xenia observation workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Temporary SQLite database and file helpers
//! - Observation series generators
//! - Mapping and CSV fixtures for the ingestion scenarios
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, temp_sqlite_path};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Assert that an optional measured value matches within `epsilon`.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_value_approx_eq;
///
/// assert_value_approx_eq!(Some(4.2001), 4.2, 0.001); // passes
/// assert_value_approx_eq!(None, 4.2, 0.001);         // fails
/// ```
#[macro_export]
macro_rules! assert_value_approx_eq {
    ($value:expr, $expected:expr, $epsilon:expr) => {{
        let value: Option<f64> = $value;
        let expected: f64 = $expected as f64;
        let epsilon: f64 = $epsilon as f64;
        match value {
            Some(actual) if (actual - expected).abs() <= epsilon => {}
            other => panic!(
                "assertion failed: value `{:?}` is not within `{:?}` of `{:?}`",
                other, epsilon, expected
            ),
        }
    }};
}
