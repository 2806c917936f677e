//! Driver-level scan records
//!
//! A `RawScan` is what a vendor driver hands back from one `read_once` call.
//! Distances are in whatever unit the driver reports; normalization happens in
//! the reader (see [`crate::units`]).

/// One decoded point as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawPoint {
    /// Beam angle in degrees
    pub angle_deg: f64,
    /// Raw range value (meters or millimeters depending on the SDK variant)
    pub range: f64,
    /// Return strength, when the driver reports one
    pub intensity: Option<f64>,
    /// Driver-side validity flag (checksum / interference)
    pub valid: bool,
}

impl RawPoint {
    /// Valid point without intensity
    pub fn new(angle_deg: f64, range: f64) -> Self {
        Self {
            angle_deg,
            range,
            intensity: None,
            valid: true,
        }
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = Some(intensity);
        self
    }

    /// Mark the point as rejected by the driver
    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// One decoded scan (typically one sensor revolution)
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawScan {
    pub points: Vec<RawPoint>,
    /// Device clock stamp in microseconds, if the driver exposes one
    pub device_stamp_us: Option<u64>,
}

impl RawScan {
    pub fn new(points: Vec<RawPoint>) -> Self {
        Self {
            points,
            device_stamp_us: None,
        }
    }

    /// Scan built from `(angle_deg, range)` pairs
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().map(|&(a, r)| RawPoint::new(a, r)).collect())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
