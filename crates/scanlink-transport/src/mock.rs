//! Mock backend
//!
//! Scripted drivers with observable state, for tests and `--simulate` runs.
//! A [`MockDriver`] shares its state with any number of [`MockHandle`]s, so a
//! test can hand the driver to a session and still see whether the device was
//! left open or started.

use crate::{
    DeviceError, DeviceErrorKind, DeviceKind, DriverFactory, DriverSettings, RawPoint, RawScan,
    ScanDriver, TransportCandidate, TransportError,
};
use parking_lot::Mutex;
use rand::Rng;
use scanlink_protocol::{DepthRow, depth_row_to_scan};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One scripted `read_once` result
#[derive(Debug, Clone)]
pub enum MockRead {
    Scan(RawScan),
    /// Return `Ok(None)` immediately
    NoData,
    /// Sleep the whole read timeout, then return `Ok(None)`
    Stall,
    /// Block this long whatever the read timeout, then return `Ok(None)`
    Hang(Duration),
    /// Drop the link: the device closes and the read fails with `Disconnected`
    Disconnect,
    Fail(DeviceErrorKind),
}

/// What `read_once` does once the script is exhausted
#[derive(Debug, Clone)]
pub enum MockIdle {
    NoData,
    Stall,
    Repeat(RawScan),
    Synthetic(SyntheticRoom),
    Depth(SyntheticDepthCamera),
}

#[derive(Debug)]
struct MockState {
    settings: Option<DriverSettings>,
    open: bool,
    started: bool,
    configure_calls: usize,
    open_calls: usize,
    start_calls: usize,
    stop_calls: usize,
    close_calls: usize,
    read_calls: usize,
    open_failures: usize,
    open_failure_kind: DeviceErrorKind,
    start_busy: usize,
    close_fails: bool,
    read_latency: Duration,
    script: VecDeque<MockRead>,
    idle: MockIdle,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            settings: None,
            open: false,
            started: false,
            configure_calls: 0,
            open_calls: 0,
            start_calls: 0,
            stop_calls: 0,
            close_calls: 0,
            read_calls: 0,
            open_failures: 0,
            open_failure_kind: DeviceErrorKind::NoResponse,
            start_busy: 0,
            close_fails: false,
            read_latency: Duration::ZERO,
            script: VecDeque::new(),
            idle: MockIdle::NoData,
        }
    }
}

/// Shared view of a mock device
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn settings(&self) -> Option<DriverSettings> {
        self.state.lock().settings.clone()
    }

    pub fn configure_calls(&self) -> usize {
        self.state.lock().configure_calls
    }

    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    /// Queue scripted reads
    pub fn push_reads<I: IntoIterator<Item = MockRead>>(&self, reads: I) {
        self.state.lock().script.extend(reads);
    }

    /// Fail the next `count` `open()` calls (`usize::MAX`: always)
    pub fn fail_open(&self, count: usize) {
        self.fail_open_with(count, DeviceErrorKind::NoResponse);
    }

    /// Fail the next `count` `open()` calls with a given error kind
    pub fn fail_open_with(&self, count: usize, kind: DeviceErrorKind) {
        let mut state = self.state.lock();
        state.open_failures = count;
        state.open_failure_kind = kind;
    }

    /// Report busy on the next `count` `start()` calls
    pub fn start_busy(&self, count: usize) {
        self.state.lock().start_busy = count;
    }

    pub fn fail_close(&self, fails: bool) {
        self.state.lock().close_fails = fails;
    }

    pub fn set_idle(&self, idle: MockIdle) {
        self.state.lock().idle = idle;
    }

    /// Simulated per-scan delivery delay (capped by the read timeout)
    pub fn set_read_latency(&self, latency: Duration) {
        self.state.lock().read_latency = latency;
    }
}

/// Scripted in-memory scan driver
#[derive(Debug, Default)]
pub struct MockDriver {
    handle: MockHandle,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver that delivers the same scan on every read
    pub fn repeating(scan: RawScan) -> Self {
        let driver = Self::new();
        driver.handle.set_idle(MockIdle::Repeat(scan));
        driver
    }

    /// Driver that never delivers: every read sleeps its full timeout
    pub fn stalled() -> Self {
        let driver = Self::new();
        driver.handle.set_idle(MockIdle::Stall);
        driver
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

fn device_error(kind: DeviceErrorKind, message: &str) -> TransportError {
    TransportError::Device(DeviceError::new(kind, message))
}

impl ScanDriver for MockDriver {
    fn configure(&mut self, settings: &DriverSettings) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.configure_calls += 1;
        state.settings = Some(settings.clone());
        Ok(())
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.open_calls += 1;
        if state.settings.is_none() {
            return Err(device_error(DeviceErrorKind::UnsupportedConfig, "not configured"));
        }
        if state.open_failures > 0 {
            if state.open_failures != usize::MAX {
                state.open_failures -= 1;
            }
            return Err(device_error(state.open_failure_kind, "scripted open failure"));
        }
        state.open = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.start_calls += 1;
        if !state.open {
            return Err(TransportError::NotStarted);
        }
        if state.start_busy > 0 {
            if state.start_busy != usize::MAX {
                state.start_busy -= 1;
            }
            return Err(device_error(DeviceErrorKind::Busy, "motor not at speed"));
        }
        state.started = true;
        Ok(())
    }

    fn read_once(&mut self, timeout: Duration) -> Result<Option<RawScan>, TransportError> {
        let (read, latency) = {
            let mut state = self.handle.state.lock();
            state.read_calls += 1;
            if !state.started {
                return Err(TransportError::NotStarted);
            }
            let scripted = state.script.pop_front();
            let read = match scripted {
                Some(read) => read,
                None => match &mut state.idle {
                    MockIdle::NoData => MockRead::NoData,
                    MockIdle::Stall => MockRead::Stall,
                    MockIdle::Repeat(scan) => MockRead::Scan(scan.clone()),
                    MockIdle::Synthetic(room) => MockRead::Scan(room.next_scan()),
                    MockIdle::Depth(camera) => MockRead::Scan(camera.next_scan()),
                },
            };
            if let MockRead::Disconnect = read {
                state.open = false;
                state.started = false;
            }
            (read, state.read_latency)
        };

        match read {
            MockRead::Scan(scan) => {
                if !latency.is_zero() {
                    std::thread::sleep(latency.min(timeout));
                }
                Ok(Some(scan))
            },
            MockRead::NoData => Ok(None),
            MockRead::Stall => {
                std::thread::sleep(timeout);
                Ok(None)
            },
            MockRead::Hang(duration) => {
                std::thread::sleep(duration);
                Ok(None)
            },
            MockRead::Disconnect => Err(TransportError::Disconnected),
            MockRead::Fail(kind) => Err(device_error(kind, "scripted read failure")),
        }
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.stop_calls += 1;
        state.started = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.close_calls += 1;
        state.started = false;
        state.open = false;
        if state.close_fails {
            return Err(device_error(DeviceErrorKind::Backend, "close failed"));
        }
        Ok(())
    }
}

/// A set of simulated transports for probe tests and simulation runs
///
/// Only the registered `(path, bit_rate)` pairs answer; every other pair
/// fails `open()`. Each driver the bench builds is recorded with its handle.
#[derive(Debug, Clone, Default)]
pub struct MockBench {
    responsive: Arc<Mutex<HashSet<TransportCandidate>>>,
    created: Arc<Mutex<Vec<(TransportCandidate, MockHandle)>>>,
    idle: Arc<Mutex<Option<MockIdle>>>,
}

impl MockBench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a transport answer at a bit rate
    pub fn responsive(self, path: &str, bit_rate: u32) -> Self {
        self.responsive.lock().insert(TransportCandidate::new(path, bit_rate));
        self
    }

    /// Read behavior of drivers built from now on
    pub fn with_idle(self, idle: MockIdle) -> Self {
        *self.idle.lock() = Some(idle);
        self
    }

    /// Every driver built so far, in creation order
    pub fn created(&self) -> Vec<(TransportCandidate, MockHandle)> {
        self.created.lock().clone()
    }

    /// Handles of drivers built for a transport path
    pub fn handles_for(&self, path: &str) -> Vec<MockHandle> {
        self.created
            .lock()
            .iter()
            .filter(|(c, _)| c.path == path)
            .map(|(_, h)| h.clone())
            .collect()
    }
}

impl DriverFactory for MockBench {
    fn create(
        &self,
        candidate: &TransportCandidate,
        _kind: DeviceKind,
    ) -> Result<Box<dyn ScanDriver>, TransportError> {
        let driver = MockDriver::new();
        let handle = driver.handle();
        if !self.responsive.lock().contains(candidate) {
            handle.fail_open(usize::MAX);
        }
        if let Some(idle) = self.idle.lock().clone() {
            handle.set_idle(idle);
        }
        self.created.lock().push((candidate.clone(), handle));
        Ok(Box::new(driver))
    }
}

/// Synthetic scans of a rectangular room seen from inside
///
/// Produces one full revolution per call with mild range noise and a few
/// dropped returns, which is enough to exercise filtering and sinks.
#[derive(Debug, Clone)]
pub struct SyntheticRoom {
    /// Room half-extents in meters
    pub half_width_m: f64,
    pub half_depth_m: f64,
    /// Sensor offset from the room center in meters
    pub offset_m: (f64, f64),
    pub points_per_scan: usize,
    /// Standard deviation-ish range noise in meters (uniform ±noise)
    pub noise_m: f64,
    /// Fraction of points reported with zero range
    pub dropout: f64,
    /// Report ranges in millimeters, like some SDK variants do
    pub millimeters: bool,
    /// Bumped every scan so consecutive scans differ slightly
    revolution: u64,
}

impl Default for SyntheticRoom {
    fn default() -> Self {
        Self {
            half_width_m: 3.0,
            half_depth_m: 2.0,
            offset_m: (0.5, -0.25),
            points_per_scan: 360,
            noise_m: 0.01,
            dropout: 0.02,
            millimeters: false,
            revolution: 0,
        }
    }
}

impl SyntheticRoom {
    /// Exact wall distance along a beam
    pub fn wall_distance(&self, angle_deg: f64) -> f64 {
        let (c, s) = (angle_deg.to_radians().cos(), angle_deg.to_radians().sin());
        let (ox, oy) = self.offset_m;
        let mut best = f64::INFINITY;
        if c.abs() > f64::EPSILON {
            let wall = if c > 0.0 { self.half_width_m } else { -self.half_width_m };
            best = best.min((wall - ox) / c);
        }
        if s.abs() > f64::EPSILON {
            let wall = if s > 0.0 { self.half_depth_m } else { -self.half_depth_m };
            best = best.min((wall - oy) / s);
        }
        best
    }

    pub fn next_scan(&mut self) -> RawScan {
        let mut rng = rand::thread_rng();
        let n = self.points_per_scan.max(1);
        let phase = (self.revolution % 4) as f64 * 0.25;
        self.revolution += 1;

        let points = (0..n)
            .map(|i| {
                let angle = -180.0 + 360.0 * (i as f64 + phase) / n as f64;
                let mut range = if rng.r#gen::<f64>() < self.dropout {
                    0.0
                } else {
                    let noise = if self.noise_m > 0.0 {
                        rng.gen_range(-self.noise_m..self.noise_m)
                    } else {
                        0.0
                    };
                    (self.wall_distance(angle) + noise).max(0.0)
                };
                if self.millimeters {
                    range *= 1000.0;
                }
                RawPoint::new(angle, range).with_intensity(rng.gen_range(80.0..255.0))
            })
            .collect();

        RawScan::new(points)
    }
}

/// The synthetic room seen by a depth camera through one image row
///
/// Each scan is a z16 row run through [`depth_row_to_scan`], so ranges come
/// out in millimeters and missing returns as invalid points, like a real
/// camera feeding the scan pipeline.
#[derive(Debug, Clone)]
pub struct SyntheticDepthCamera {
    /// Noise and dropout are taken from the room
    pub room: SyntheticRoom,
    /// Row width in pixels
    pub width: usize,
    pub hfov_deg: f64,
    /// Depths beyond this are reported as 0 (no data)
    pub max_depth_mm: u16,
}

impl Default for SyntheticDepthCamera {
    fn default() -> Self {
        Self {
            room: SyntheticRoom::default(),
            width: 160,
            hfov_deg: 87.0,
            max_depth_mm: 10_000,
        }
    }
}

impl SyntheticDepthCamera {
    pub fn next_row(&mut self) -> DepthRow {
        let mut rng = rand::thread_rng();
        let width = self.width.max(1);
        let half_fov = self.hfov_deg / 2.0;
        let step = if width > 1 {
            self.hfov_deg / (width - 1) as f64
        } else {
            0.0
        };

        let depth_mm = (0..width)
            .map(|i| {
                if rng.r#gen::<f64>() < self.room.dropout {
                    return 0;
                }
                let angle = if width > 1 {
                    half_fov - step * i as f64
                } else {
                    0.0
                };
                let noise = if self.room.noise_m > 0.0 {
                    rng.gen_range(-self.room.noise_m..self.room.noise_m)
                } else {
                    0.0
                };
                let mm = ((self.room.wall_distance(angle) + noise) * 1000.0).round();
                if mm <= 0.0 || mm > f64::from(self.max_depth_mm) {
                    0
                } else {
                    mm as u16
                }
            })
            .collect();

        DepthRow {
            depth_mm,
            hfov_deg: self.hfov_deg,
        }
    }

    pub fn next_scan(&mut self) -> RawScan {
        depth_row_to_scan(&self.next_row())
    }
}
