//! Acquisition loops
//!
//! Both loops check the [`StopSignal`] once per cycle, honor the configured
//! limits, and close every session before returning, whatever the exit path.

use crate::coordinator::{MultiSensorCoordinator, PollResult};
use crate::sink::SampleSink;
use crate::stop::StopSignal;
use scanlink_driver::{ScanOutcome, ScanStream, SessionError};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end an acquisition run
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Sink error: {0}")]
    Sink(#[from] io::Error),
}

/// Bounds of one acquisition run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionLimits {
    /// Stop after this many batches (all devices together)
    pub max_scans: Option<u64>,
    pub max_duration: Option<Duration>,
    /// Per-cycle read timeout of a single-device run (coordinated runs use
    /// the coordinator's `per_device_timeout`)
    pub read_timeout: Duration,
    /// Idle sleep after a cycle that produced nothing
    pub cycle_interval: Duration,
}

impl Default for AcquisitionLimits {
    fn default() -> Self {
        Self {
            max_scans: None,
            max_duration: None,
            read_timeout: Duration::from_millis(200),
            cycle_interval: Duration::from_millis(5),
        }
    }
}

impl AcquisitionLimits {
    /// Run until stopped
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn scans(max_scans: u64) -> Self {
        Self {
            max_scans: Some(max_scans),
            ..Self::default()
        }
    }

    pub fn duration(max_duration: Duration) -> Self {
        Self {
            max_duration: Some(max_duration),
            ..Self::default()
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    MaxScans,
    MaxDuration,
}

/// Counters of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionSummary {
    pub cycles: u64,
    pub batches: u64,
    pub samples: u64,
    pub no_data: u64,
    /// Read errors that did not end the run
    pub errors: u64,
    pub reason: StopReason,
}

struct Progress {
    started: Instant,
    cycles: u64,
    batches: u64,
    samples: u64,
    no_data: u64,
    errors: u64,
}

impl Progress {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            cycles: 0,
            batches: 0,
            samples: 0,
            no_data: 0,
            errors: 0,
        }
    }

    fn should_stop(&self, limits: &AcquisitionLimits, stop: &StopSignal) -> Option<StopReason> {
        if stop.is_requested() {
            return Some(StopReason::Requested);
        }
        if limits.max_scans.is_some_and(|max| self.batches >= max) {
            return Some(StopReason::MaxScans);
        }
        if limits.max_duration.is_some_and(|max| self.started.elapsed() >= max) {
            return Some(StopReason::MaxDuration);
        }
        None
    }

    fn summary(&self, reason: StopReason) -> AcquisitionSummary {
        AcquisitionSummary {
            cycles: self.cycles,
            batches: self.batches,
            samples: self.samples,
            no_data: self.no_data,
            errors: self.errors,
            reason,
        }
    }
}

/// Driver faults other than link loss do not end a run
fn is_recoverable(e: &SessionError) -> bool {
    matches!(e, SessionError::Driver { .. })
}

/// Read one device until stopped or a limit is hit
///
/// The stream is closed and the sink flushed on every exit path.
///
/// # Errors
/// Session errors that the stream could not recover from (reconnect
/// exhaustion, link loss without auto-reconnect), and sink failures.
pub fn run_single(
    stream: &mut ScanStream,
    sink: &mut dyn SampleSink,
    limits: &AcquisitionLimits,
    stop: &StopSignal,
) -> Result<AcquisitionSummary, AcquisitionError> {
    info!("Acquiring from {}", stream.tag());
    let mut progress = Progress::new();
    let result = single_loop(stream, sink, limits, stop, &mut progress);
    finish(result, sink, &mut [stream])
}

fn single_loop(
    stream: &mut ScanStream,
    sink: &mut dyn SampleSink,
    limits: &AcquisitionLimits,
    stop: &StopSignal,
    progress: &mut Progress,
) -> Result<AcquisitionSummary, AcquisitionError> {
    loop {
        if let Some(reason) = progress.should_stop(limits, stop) {
            return Ok(progress.summary(reason));
        }
        progress.cycles += 1;
        match stream.next(limits.read_timeout) {
            Ok(ScanOutcome::Batch(batch)) => {
                progress.batches += 1;
                progress.samples += batch.len() as u64;
                sink.accept(batch)?;
            },
            Ok(ScanOutcome::NoData) => {
                progress.no_data += 1;
                if !limits.cycle_interval.is_zero() {
                    std::thread::sleep(limits.cycle_interval);
                }
            },
            Err(e) if is_recoverable(&e) => {
                progress.errors += 1;
                warn!("{}: {}", stream.tag(), e);
            },
            Err(e) => return Err(e.into()),
        }
    }
}

/// Poll every coordinated device until stopped or a limit is hit
///
/// Device errors and partial losses are logged and counted; they never end
/// the run. The coordinator is shut down (closing every stream) and the sink
/// flushed before returning.
pub fn run_coordinated(
    coordinator: &mut MultiSensorCoordinator,
    sink: &mut dyn SampleSink,
    limits: &AcquisitionLimits,
    stop: &StopSignal,
) -> Result<AcquisitionSummary, AcquisitionError> {
    info!("Acquiring from {} device(s)", coordinator.len());
    let mut progress = Progress::new();
    let result = coordinated_loop(coordinator, sink, limits, stop, &mut progress);
    coordinator.shutdown();
    finish(result, sink, &mut [])
}

fn coordinated_loop(
    coordinator: &mut MultiSensorCoordinator,
    sink: &mut dyn SampleSink,
    limits: &AcquisitionLimits,
    stop: &StopSignal,
    progress: &mut Progress,
) -> Result<AcquisitionSummary, AcquisitionError> {
    loop {
        if let Some(reason) = progress.should_stop(limits, stop) {
            return Ok(progress.summary(reason));
        }
        progress.cycles += 1;
        let cycle = coordinator.poll_all(coordinator.config().per_device_timeout);

        let mut delivered = false;
        for (tag, result) in cycle.entries {
            match result {
                PollResult::Batch(batch) => {
                    if limits.max_scans.is_some_and(|max| progress.batches >= max) {
                        debug!("{}: batch beyond the scan limit discarded", tag);
                        continue;
                    }
                    delivered = true;
                    progress.batches += 1;
                    progress.samples += batch.len() as u64;
                    sink.accept(batch)?;
                },
                PollResult::NoData => progress.no_data += 1,
                PollResult::Error(e) => {
                    progress.errors += 1;
                    debug!("{}: {}", tag, e);
                },
            }
        }
        if limits.max_scans.is_some_and(|max| progress.batches >= max) {
            return Ok(progress.summary(StopReason::MaxScans));
        }
        if !delivered && !limits.cycle_interval.is_zero() {
            std::thread::sleep(limits.cycle_interval);
        }
    }
}

fn finish(
    result: Result<AcquisitionSummary, AcquisitionError>,
    sink: &mut dyn SampleSink,
    streams: &mut [&mut ScanStream],
) -> Result<AcquisitionSummary, AcquisitionError> {
    for stream in streams.iter_mut() {
        // Close failures are logged by the session
        let _ = stream.close();
    }
    let flushed = sink.flush();
    let summary = result?;
    flushed?;
    info!(
        "Acquisition ended ({:?}): {} batch(es), {} sample(s), {} cycle(s)",
        summary.reason, summary.batches, summary.samples, summary.cycles
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;
    use scanlink_driver::{DeviceConfig, TransportCandidate, TransportLeases};
    use scanlink_protocol::RawScan;
    use scanlink_transport::mock::{MockDriver, MockHandle, MockRead};

    fn stream(driver: MockDriver) -> (ScanStream, MockHandle) {
        let handle = driver.handle();
        let config = DeviceConfig::ranging(TransportCandidate::new("mock0", 230_400));
        let stream =
            ScanStream::connect(Box::new(driver), config, &TransportLeases::new()).unwrap();
        (stream, handle)
    }

    fn limits() -> AcquisitionLimits {
        AcquisitionLimits::default()
            .with_read_timeout(Duration::from_millis(5))
            .with_cycle_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_max_scans() {
        let (mut s, handle) = stream(MockDriver::repeating(RawScan::from_pairs(&[(0.0, 1.0)])));
        let mut sink = CollectingSink::new();
        let limits = AcquisitionLimits {
            max_scans: Some(3),
            ..limits()
        };

        let summary = run_single(&mut s, &mut sink, &limits, &StopSignal::new()).unwrap();
        assert_eq!(summary.reason, StopReason::MaxScans);
        assert_eq!(summary.batches, 3);
        assert_eq!(sink.len(), 3);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_stop_requested_before_start() {
        let (mut s, handle) = stream(MockDriver::repeating(RawScan::from_pairs(&[(0.0, 1.0)])));
        let stop = StopSignal::new();
        stop.request_stop();

        let summary = run_single(&mut s, &mut CollectingSink::new(), &limits(), &stop).unwrap();
        assert_eq!(summary.reason, StopReason::Requested);
        assert_eq!(summary.cycles, 0);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_max_duration() {
        let (mut s, _handle) = stream(MockDriver::new());
        let limits = AcquisitionLimits {
            max_duration: Some(Duration::from_millis(30)),
            ..limits()
        };
        let summary =
            run_single(&mut s, &mut CollectingSink::new(), &limits, &StopSignal::new()).unwrap();
        assert_eq!(summary.reason, StopReason::MaxDuration);
        assert!(summary.no_data > 0);
    }

    #[test]
    fn test_disconnect_ends_run_and_closes() {
        let (mut s, handle) = stream(MockDriver::repeating(RawScan::from_pairs(&[(0.0, 1.0)])));
        handle.push_reads([
            MockRead::Scan(RawScan::from_pairs(&[(0.0, 2.0)])),
            MockRead::Fail(scanlink_transport::DeviceErrorKind::InvalidResponse),
            MockRead::Disconnect,
        ]);
        let mut sink = CollectingSink::new();

        let err = run_single(&mut s, &mut sink, &limits(), &StopSignal::new()).unwrap_err();
        assert!(matches!(err, AcquisitionError::Session(ref e) if e.is_transport_disconnect()));
        assert_eq!(sink.len(), 1);
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn test_coordinated_run_shuts_down() {
        let (a, a_handle) = {
            let driver = MockDriver::repeating(RawScan::from_pairs(&[(0.0, 1.0)]));
            let handle = driver.handle();
            let config = DeviceConfig::ranging(TransportCandidate::new("A", 230_400));
            let leases = TransportLeases::new();
            (ScanStream::connect(Box::new(driver), config, &leases).unwrap(), handle)
        };
        let mut coordinator =
            MultiSensorCoordinator::new(vec![a], crate::CoordinatorConfig::default()).unwrap();
        let mut sink = CollectingSink::new();
        let limits = AcquisitionLimits {
            max_scans: Some(4),
            ..limits()
        };

        let summary =
            run_coordinated(&mut coordinator, &mut sink, &limits, &StopSignal::new()).unwrap();
        assert_eq!(summary.batches, 4);
        assert!(!a_handle.is_open());
    }
}
