//! Platform handles.

use serde::{Deserialize, Serialize};

use crate::{XeniaError, XeniaResult};

/// Dot separated platform identifier, `organization.short_name`.
///
/// Additional dot separated segments are kept as part of the handle
/// (e.g. `carocoops.cap2.buoy`) but only the first two are significant: the
/// first names the owning organization, the second is the platform short name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformHandle {
    handle: String,
    org_end: usize,
}

impl PlatformHandle {
    /// Parse a handle, failing if it has no organization prefix or short name.
    pub fn parse(handle: impl Into<String>) -> XeniaResult<Self> {
        let handle = handle.into();
        let mut parts = handle.split('.');
        let org = parts.next().unwrap_or_default();
        let short_name = parts.next().unwrap_or_default();
        if org.is_empty() || short_name.is_empty() {
            return Err(XeniaError::MalformedHandle(handle));
        }
        let org_end = org.len();
        Ok(Self { handle, org_end })
    }

    pub fn as_str(&self) -> &str {
        &self.handle
    }

    /// Owning organization short name.
    pub fn organization(&self) -> &str {
        &self.handle[..self.org_end]
    }

    /// Platform short name, the segment following the organization.
    pub fn short_name(&self) -> &str {
        let rest = &self.handle[self.org_end + 1..];
        rest.split('.').next().unwrap_or(rest)
    }
}

impl std::fmt::Display for PlatformHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.handle)
    }
}

impl std::str::FromStr for PlatformHandle {
    type Err = XeniaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PlatformHandle {
    type Error = XeniaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PlatformHandle> for String {
    fn from(handle: PlatformHandle) -> Self {
        handle.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_part_handle() {
        let handle = PlatformHandle::parse("noaa.buoy1").unwrap();
        assert_eq!(handle.organization(), "noaa");
        assert_eq!(handle.short_name(), "buoy1");
        assert_eq!(handle.as_str(), "noaa.buoy1");
    }

    #[test]
    fn test_parse_three_part_handle() {
        let handle: PlatformHandle = "carocoops.cap2.buoy".parse().unwrap();
        assert_eq!(handle.organization(), "carocoops");
        assert_eq!(handle.short_name(), "cap2");
        assert_eq!(handle.to_string(), "carocoops.cap2.buoy");
    }

    #[test]
    fn test_malformed_handles_are_rejected() {
        for bad in ["buoy1", "", ".buoy1", "noaa.", "noaa..x"] {
            let err = PlatformHandle::parse(bad).unwrap_err();
            assert!(
                matches!(err, XeniaError::MalformedHandle(ref h) if h == bad),
                "expected MalformedHandle for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_serde_validates_handle() {
        let handle: PlatformHandle = serde_json::from_str("\"usgs.gauge_7\"").unwrap();
        assert_eq!(handle.short_name(), "gauge_7");
        assert!(serde_json::from_str::<PlatformHandle>("\"nodot\"").is_err());
    }
}
