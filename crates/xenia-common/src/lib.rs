//! Common types and utilities shared across the xenia observation crates.

pub mod error;
pub mod observation;
pub mod platform;
pub mod time;

pub use error::{XeniaError, XeniaResult};
pub use observation::{Observation, TaxonomyLink, M_DATE_OBS};
pub use platform::PlatformHandle;
pub use time::parse_obs_time;
