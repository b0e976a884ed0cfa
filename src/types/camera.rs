//! Camera identity and capability types

use serde::{Deserialize, Serialize};

/// Stable camera identity.
///
/// The display name from the console; unique within one discovery snapshot
/// and used as the partition key for slots, registry entries and file paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form: spaces and path separators become `_`.
    pub fn safe_name(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                other => other,
            })
            .collect()
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A camera as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    /// Console-side identifier used in API paths.
    pub api_id: String,
    pub connected: bool,
    pub supports_full_hd: bool,
}

impl Camera {
    /// Quality to request first, given the operator's preference.
    pub fn preferred_quality(&self, high_quality_enabled: bool) -> Quality {
        if high_quality_enabled && self.supports_full_hd {
            Quality::High
        } else {
            Quality::Standard
        }
    }
}

/// Snapshot quality requested from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    High,
    Standard,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::High => write!(f, "high"),
            Quality::Standard => write!(f, "standard"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name_replaces_separators() {
        let id = CameraId::new("Front Door/Left\\Up");
        assert_eq!(id.safe_name(), "Front_Door_Left_Up");
    }

    #[test]
    fn test_preferred_quality() {
        let cam = Camera {
            id: "Yard".into(),
            api_id: "abc".into(),
            connected: true,
            supports_full_hd: false,
        };
        assert_eq!(cam.preferred_quality(true), Quality::Standard);

        let cam = Camera {
            supports_full_hd: true,
            ..cam
        };
        assert_eq!(cam.preferred_quality(true), Quality::High);
        assert_eq!(cam.preferred_quality(false), Quality::Standard);
    }
}
