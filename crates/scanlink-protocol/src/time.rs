//! Capture timestamps

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock capture time, microseconds since the UNIX epoch
///
/// Devices are not hardware-synchronized, so this is host time taken when a
/// batch was produced (or assigned by the coordinator for a whole poll cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureTime(u64);

impl CaptureTime {
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        Self(time.duration_since(UNIX_EPOCH).unwrap_or_default().as_micros() as u64)
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Seconds since the epoch, the unit of the persisted `timestamp` column
    pub fn as_secs_f64(&self) -> f64 {
        Duration::from_micros(self.0).as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_time_conversions() {
        let t = CaptureTime::from_micros(1_500_000);
        assert_eq!(t.as_micros(), 1_500_000);
        assert!((t.as_secs_f64() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_capture_time_now_is_after_epoch() {
        let t = CaptureTime::now();
        assert!(t.as_micros() > 0);
        assert!(CaptureTime::from_system_time(UNIX_EPOCH).as_micros() == 0);
    }
}
