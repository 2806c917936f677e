//! Per-cycle read path
//!
//! One call to [`ScanReader::next`] is one read cycle: fetch at most one raw
//! scan from the session, normalize units, filter, and stamp the result.

use crate::config::DeviceConfig;
use crate::error::SessionError;
use crate::session::DeviceSession;
use scanlink_protocol::{
    CaptureTime, DistanceUnit, RawPoint, RawScan, Sample, ScanBatch, normalize_distance,
};
use std::time::Duration;
use tracing::trace;

/// Outcome of one successful read cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Filtered samples (possibly empty)
    Batch(ScanBatch),
    /// Nothing arrived within the cycle timeout; expected when idle
    NoData,
}

impl ScanOutcome {
    pub fn into_batch(self) -> Option<ScanBatch> {
        match self {
            ScanOutcome::Batch(batch) => Some(batch),
            ScanOutcome::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, ScanOutcome::NoData)
    }
}

/// Range filter applied to every decoded point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFilter {
    pub range_min_m: f64,
    pub range_max_m: f64,
    pub noise_floor_m: f64,
    pub unit: DistanceUnit,
}

impl SampleFilter {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            range_min_m: config.range_min_m,
            range_max_m: config.range_max_m,
            noise_floor_m: config.noise_floor_m,
            unit: config.distance_unit,
        }
    }

    /// Normalized sample, or `None` if the point is dropped
    ///
    /// Dropped: driver-flagged invalid, non-finite angle or range, at or below
    /// the noise floor, outside `[range_min_m, range_max_m]`.
    pub fn apply(&self, point: &RawPoint) -> Option<Sample> {
        if !point.valid || !point.angle_deg.is_finite() || !point.range.is_finite() {
            return None;
        }
        let distance_m = normalize_distance(point.range, self.unit);
        if distance_m <= self.noise_floor_m {
            return None;
        }
        if distance_m < self.range_min_m || distance_m > self.range_max_m {
            return None;
        }
        let intensity = point.intensity.filter(|i| i.is_finite());
        Some(Sample::new(point.angle_deg, distance_m, intensity))
    }

    /// Kept samples in driver order, plus the number dropped
    pub fn filter_scan(&self, scan: &RawScan) -> (Vec<Sample>, usize) {
        let samples: Vec<Sample> = scan.points.iter().filter_map(|p| self.apply(p)).collect();
        let dropped = scan.points.len() - samples.len();
        (samples, dropped)
    }
}

/// Reads batches from one session
///
/// Holds only the per-device sequence counter; the session is borrowed per
/// call so the caller keeps ownership of the lifecycle.
#[derive(Debug, Default)]
pub struct ScanReader {
    next_sequence: u64,
}

impl ScanReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next batch will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// One read cycle
    ///
    /// # Errors
    /// - `TransportDisconnect` on link loss (the caller may `reconnect()`)
    /// - `Driver` for other driver faults
    /// - `InvalidState` when the session is not scanning
    pub fn next(
        &mut self,
        session: &mut DeviceSession,
        timeout: Duration,
    ) -> Result<ScanOutcome, SessionError> {
        let raw = match session.read_once(timeout) {
            Ok(raw) => raw,
            Err(e) => {
                session.metrics().record_error();
                return Err(e);
            },
        };
        let Some(raw) = raw else {
            session.metrics().record_no_data();
            return Ok(ScanOutcome::NoData);
        };

        let filter = match session.config() {
            Some(config) => SampleFilter::from_config(config),
            None => {
                return Err(SessionError::InvalidState {
                    op: "read",
                    state: session.state(),
                });
            },
        };
        let (samples, dropped) = filter.filter_scan(&raw);
        session.metrics().record_scan(samples.len(), dropped);
        trace!(
            "{}: batch {} kept {} dropped {}",
            session.tag(),
            self.next_sequence,
            samples.len(),
            dropped
        );

        let batch = ScanBatch::new(session.tag(), CaptureTime::now(), self.next_sequence, samples);
        self.next_sequence += 1;
        Ok(ScanOutcome::Batch(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlink_transport::TransportCandidate;
    use scanlink_transport::mock::{MockDriver, MockHandle, MockRead};

    fn filter(min: f64, max: f64) -> SampleFilter {
        SampleFilter {
            range_min_m: min,
            range_max_m: max,
            noise_floor_m: 0.0,
            unit: DistanceUnit::Auto,
        }
    }

    fn started(config: DeviceConfig) -> (DeviceSession, MockHandle) {
        let driver = MockDriver::new();
        let handle = driver.handle();
        let mut session = DeviceSession::new(Box::new(driver));
        session.configure(config).unwrap();
        session.open().unwrap();
        session.start().unwrap();
        (session, handle)
    }

    #[test]
    fn test_filter_drops_out_of_range() {
        let scan = RawScan::from_pairs(&[(0.0, 0.05), (1.0, 1.2), (2.0, 9.0), (3.0, 3.3)]);
        let (kept, dropped) = filter(0.1, 8.0).filter_scan(&scan);
        let distances: Vec<f64> = kept.iter().map(|s| s.distance_m).collect();
        assert_eq!(distances, vec![1.2, 3.3]);
        assert_eq!(dropped, 2);
    }

    #[test]
    fn test_filter_bounds_inclusive() {
        let f = filter(0.1, 8.0);
        assert!(f.apply(&RawPoint::new(0.0, 0.1)).is_some());
        assert!(f.apply(&RawPoint::new(0.0, 8.0)).is_some());
    }

    #[test]
    fn test_filter_invalid_and_non_finite() {
        let f = filter(0.0, 8.0);
        assert!(f.apply(&RawPoint::new(0.0, 1.0).invalid()).is_none());
        assert!(f.apply(&RawPoint::new(0.0, f64::NAN)).is_none());
        assert!(f.apply(&RawPoint::new(f64::INFINITY, 1.0)).is_none());
        // Zero range is a dropped return even with range_min 0
        assert!(f.apply(&RawPoint::new(0.0, 0.0)).is_none());

        let s = f.apply(&RawPoint::new(0.0, 1.0).with_intensity(f64::NAN)).unwrap();
        assert_eq!(s.intensity, None);
    }

    #[test]
    fn test_filter_noise_floor() {
        let f = SampleFilter {
            noise_floor_m: 0.3,
            ..filter(0.0, 8.0)
        };
        assert!(f.apply(&RawPoint::new(0.0, 0.3)).is_none());
        assert!(f.apply(&RawPoint::new(0.0, 0.31)).is_some());
    }

    #[test]
    fn test_filter_millimeter_heuristic() {
        let f = filter(0.1, 8.0);
        let s = f.apply(&RawPoint::new(10.0, 2500.0)).unwrap();
        assert!((s.distance_m - 2.5).abs() < 1e-12);

        let forced = SampleFilter {
            unit: DistanceUnit::Millimeters,
            ..f
        };
        let s = forced.apply(&RawPoint::new(10.0, 500.0)).unwrap();
        assert!((s.distance_m - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_next_batches_and_no_data() {
        let config = DeviceConfig::ranging(TransportCandidate::new("mock0", 230_400))
            .with_tag("front")
            .with_range(0.1, 8.0);
        let (mut session, handle) = started(config);
        handle.push_reads([
            MockRead::Scan(RawScan::from_pairs(&[(0.0, 0.05), (1.0, 1.2), (2.0, 9.0), (3.0, 3.3)])),
            MockRead::NoData,
            MockRead::Scan(RawScan::from_pairs(&[(0.0, 20.0)])),
        ]);

        let mut reader = ScanReader::new();
        let timeout = Duration::from_millis(5);

        let first = reader.next(&mut session, timeout).unwrap().into_batch().unwrap();
        assert_eq!(first.device_tag().as_str(), "front");
        assert_eq!(first.sequence(), 0);
        let distances: Vec<f64> = first.samples().iter().map(|s| s.distance_m).collect();
        assert_eq!(distances, vec![1.2, 3.3]);

        assert!(reader.next(&mut session, timeout).unwrap().is_no_data());

        // Everything filtered is still a batch, not NoData
        let empty = reader.next(&mut session, timeout).unwrap().into_batch().unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.sequence(), 1);

        let m = session.metrics().snapshot();
        assert_eq!(m.scans, 2);
        assert_eq!(m.samples_kept, 2);
        assert_eq!(m.samples_dropped, 3);
        assert_eq!(m.no_data, 1);
    }

    #[test]
    fn test_next_reports_disconnect() {
        let config = DeviceConfig::ranging(TransportCandidate::new("mock0", 230_400));
        let (mut session, handle) = started(config);
        handle.push_reads([MockRead::Disconnect]);

        let mut reader = ScanReader::new();
        let err = reader.next(&mut session, Duration::from_millis(5)).unwrap_err();
        assert!(err.is_transport_disconnect());
        assert_eq!(session.metrics().snapshot().errors, 1);
    }

    #[test]
    fn test_capture_order_within_device() {
        let config = DeviceConfig::ranging(TransportCandidate::new("mock0", 230_400));
        let (mut session, handle) = started(config);
        handle.push_reads((0..5).map(|_| MockRead::Scan(RawScan::from_pairs(&[(0.0, 1.0)]))));

        let mut reader = ScanReader::new();
        let mut last: Option<ScanBatch> = None;
        for _ in 0..5 {
            let batch = reader
                .next(&mut session, Duration::from_millis(5))
                .unwrap()
                .into_batch()
                .unwrap();
            if let Some(prev) = &last {
                assert_eq!(batch.sequence(), prev.sequence() + 1);
            }
            last = Some(batch);
        }
    }
}
