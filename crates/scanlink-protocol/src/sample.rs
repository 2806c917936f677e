//! Normalized samples and scan batches

use crate::kind::DeviceTag;
use crate::time::CaptureTime;

/// One normalized range sample
///
/// `distance_m` is always in meters and never negative once it leaves the reader.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    pub angle_deg: f64,
    pub distance_m: f64,
    pub intensity: Option<f64>,
}

impl Sample {
    pub fn new(angle_deg: f64, distance_m: f64, intensity: Option<f64>) -> Self {
        Self {
            angle_deg,
            distance_m,
            intensity,
        }
    }

    /// Sensor-frame Cartesian position `(x, y)` in meters
    ///
    /// Angle 0° points along +x, counter-clockwise positive.
    pub fn to_cartesian(&self) -> (f64, f64) {
        let rad = self.angle_deg.to_radians();
        (self.distance_m * rad.cos(), self.distance_m * rad.sin())
    }
}

/// The samples recovered in one scan cycle plus metadata
///
/// Immutable after creation: fields are only reachable through accessors, and
/// re-stamping consumes the batch and returns a new one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanBatch {
    device_tag: DeviceTag,
    capture_time: CaptureTime,
    sequence: u64,
    samples: Vec<Sample>,
}

impl ScanBatch {
    pub fn new(
        device_tag: DeviceTag,
        capture_time: CaptureTime,
        sequence: u64,
        samples: Vec<Sample>,
    ) -> Self {
        Self {
            device_tag,
            capture_time,
            sequence,
            samples,
        }
    }

    pub fn device_tag(&self) -> &DeviceTag {
        &self.device_tag
    }

    pub fn capture_time(&self) -> CaptureTime {
        self.capture_time
    }

    /// Per-device batch counter, increasing in capture order
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Same batch, stamped with a different capture time
    pub fn with_capture_time(self, capture_time: CaptureTime) -> Self {
        Self {
            capture_time,
            ..self
        }
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
