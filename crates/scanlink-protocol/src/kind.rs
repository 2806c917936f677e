//! Device categories and tags

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Category of physical sensor
///
/// Selects which capability adapter a driver factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeviceKind {
    /// Rotating-laser range sensor (2D lidar)
    #[default]
    RangingSensor,
    /// Depth camera, read as a virtual scan line
    DepthCamera,
}

impl DeviceKind {
    /// Short name used in tags, logs and config files
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::RangingSensor => "ranging",
            DeviceKind::DepthCamera => "depth",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown device kind '{0}' (expected 'ranging' or 'depth')")]
pub struct ParseDeviceKindError(pub String);

impl FromStr for DeviceKind {
    type Err = ParseDeviceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ranging" | "lidar" | "ranging_sensor" => Ok(DeviceKind::RangingSensor),
            "depth" | "camera" | "depth_camera" => Ok(DeviceKind::DepthCamera),
            other => Err(ParseDeviceKindError(other.to_string())),
        }
    }
}

/// Source device tag attached to every batch
///
/// Defaults to the transport path when the configuration does not name the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceTag(String);

impl DeviceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for DeviceTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}
