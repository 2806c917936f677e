//! Device session state machine
//!
//! ```text
//! Unconfigured → Configured → Initialized → Scanning → Stopped → Disconnected
//!                    ↑             ↑            │          │
//!                    │             └─ reconnect ┴──────────┘
//!                    └── open()/reconnect() failure
//! ```
//!
//! `Disconnected` is terminal. `close()` may be called from any state, any
//! number of times, and also runs when the session is dropped, so the driver
//! handle and the transport lease are released on every exit path.

use crate::config::DeviceConfig;
use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use scanlink_protocol::{DeviceTag, RawScan};
use scanlink_transport::{ScanDriver, TransportError, TransportLease, TransportLeases};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`DeviceSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unconfigured,
    Configured,
    /// Handle open, not sampling
    Initialized,
    Scanning,
    Stopped,
    /// Terminal
    Disconnected,
}

/// One sensor's lifecycle
///
/// Owns its driver exclusively. The transport lease is taken in `open()` and
/// held until `close()`, so a second session (or a probe) on the same
/// transport is refused instead of fighting over the port.
pub struct DeviceSession {
    driver: Box<dyn ScanDriver>,
    state: SessionState,
    config: Option<DeviceConfig>,
    leases: TransportLeases,
    lease: Option<TransportLease>,
    /// Driver `open()` succeeded and `close()` has not run since
    handle_open: bool,
    metrics: Arc<SessionMetrics>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.state)
            .field("transport", &self.transport_label())
            .field("handle_open", &self.handle_open)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Session with a private lease registry
    pub fn new(driver: Box<dyn ScanDriver>) -> Self {
        Self::with_leases(driver, TransportLeases::new())
    }

    /// Session sharing a lease registry with other sessions and probes
    pub fn with_leases(driver: Box<dyn ScanDriver>, leases: TransportLeases) -> Self {
        Self {
            driver,
            state: SessionState::Unconfigured,
            config: None,
            leases,
            lease: None,
            handle_open: false,
            metrics: Arc::new(SessionMetrics::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> Option<&DeviceConfig> {
        self.config.as_ref()
    }

    pub fn tag(&self) -> DeviceTag {
        match &self.config {
            Some(config) => config.device_tag(),
            None => DeviceTag::new("unconfigured"),
        }
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    /// Whether this session currently holds its transport
    pub fn holds_transport(&self) -> bool {
        self.lease.is_some()
    }

    fn transport_label(&self) -> String {
        self.config
            .as_ref()
            .and_then(|c| c.transport.as_ref())
            .map(|t| t.to_string())
            .unwrap_or_else(|| "<unconfigured>".to_string())
    }

    fn require(&self, op: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    fn timing(&self) -> (u32, Duration, Duration) {
        match &self.config {
            Some(c) => (c.busy_retries, c.retry_delay, c.warmup),
            None => (0, Duration::ZERO, Duration::ZERO),
        }
    }

    /// Unconfigured → Configured
    ///
    /// Validates the configuration and hands the driver its settings. A
    /// rejected configuration leaves the session `Unconfigured`.
    pub fn configure(&mut self, config: DeviceConfig) -> Result<(), SessionError> {
        self.require("configure", &[SessionState::Unconfigured])?;
        config.validate()?;
        let settings = config.driver_settings()?;
        self.driver
            .configure(&settings)
            .map_err(|e| crate::config::ConfigError::Rejected(e.to_string()))?;

        debug!("Configured {} as {}", settings.transport, config.device_kind);
        self.config = Some(config);
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Configured → Initialized
    ///
    /// On failure the driver is closed, the lease released and the session
    /// stays `Configured`.
    pub fn open(&mut self) -> Result<(), SessionError> {
        self.require("open", &[SessionState::Configured])?;
        let transport = self.transport_label();
        let path = self
            .config
            .as_ref()
            .and_then(|c| c.transport.as_ref())
            .map(|t| t.path.clone())
            .unwrap_or_default();

        let lease = self
            .leases
            .try_acquire(&path)
            .ok_or_else(|| SessionError::TransportInUse(path.clone()))?;

        match self.driver.open() {
            Ok(()) => {
                self.lease = Some(lease);
                self.handle_open = true;
                self.state = SessionState::Initialized;
                info!("Opened {}", transport);
                Ok(())
            },
            Err(e) => {
                if let Err(close_err) = self.driver.close() {
                    debug!("Cleanup close after failed open of {}: {}", transport, close_err);
                }
                drop(lease);
                Err(SessionError::DeviceUnreachable {
                    transport,
                    source: e,
                })
            },
        }
    }

    /// `start()` with busy retries; returns the attempt count with the last error
    fn start_driver(&mut self) -> Result<(), (u32, TransportError)> {
        let (busy_retries, retry_delay, warmup) = self.timing();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.driver.start() {
                Ok(()) => break,
                Err(e) if e.is_busy() && attempt <= busy_retries => {
                    warn!(
                        "{} busy on start (attempt {}/{}): {}",
                        self.transport_label(),
                        attempt,
                        busy_retries + 1,
                        e
                    );
                    std::thread::sleep(retry_delay);
                },
                Err(e) => return Err((attempt, e)),
            }
        }
        if !warmup.is_zero() {
            debug!("Warming up {} for {:?}", self.transport_label(), warmup);
            std::thread::sleep(warmup);
        }
        Ok(())
    }

    /// Initialized/Stopped → Scanning
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require("start", &[SessionState::Initialized, SessionState::Stopped])?;
        match self.start_driver() {
            Ok(()) => {
                self.state = SessionState::Scanning;
                info!("Scanning on {}", self.transport_label());
                Ok(())
            },
            Err((_, e)) if e.is_link_loss() => Err(SessionError::TransportDisconnect {
                transport: self.transport_label(),
                source: e,
            }),
            Err((attempts, e)) => Err(SessionError::DeviceBusy {
                transport: self.transport_label(),
                attempts,
                source: e,
            }),
        }
    }

    /// Scanning → Stopped; a no-op in every other state
    ///
    /// A driver failure is reported, but the session is considered stopped.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Scanning {
            return Ok(());
        }
        self.state = SessionState::Stopped;
        info!("Stopped {}", self.transport_label());
        self.driver.stop().map_err(|e| SessionError::Driver {
            transport: self.transport_label(),
            source: e,
        })
    }

    /// Any state → Disconnected
    ///
    /// Stops sampling if needed, closes the driver handle if it is open and
    /// releases the lease. Only the first call can fail (a driver close
    /// failure is reported once and never retried); later calls return
    /// `Ok(())`.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        let transport = self.transport_label();

        if self.state == SessionState::Scanning {
            if let Err(e) = self.driver.stop() {
                warn!("Stop during close of {} failed: {}", transport, e);
            }
        }

        let mut result = Ok(());
        if self.handle_open {
            self.handle_open = false;
            if let Err(e) = self.driver.close() {
                error!("Failed to close {}: {}", transport, e);
                result = Err(SessionError::Close {
                    transport: transport.clone(),
                    source: e,
                });
            }
        }

        self.lease = None;
        self.state = SessionState::Disconnected;
        info!("Disconnected {}", transport);
        result
    }

    /// Replay `open()`/`start()` on the same transport after a link loss
    ///
    /// Makes up to `max_reconnect_attempts` attempts, sleeping `retry_delay`
    /// between them, and stops early on an error that retrying cannot fix
    /// (access denied, transport not found). The lease is kept while retrying. When every attempt
    /// fails the lease is released, the session is left `Configured` and
    /// `DeviceUnreachable` carries the last driver error.
    pub fn reconnect(&mut self) -> Result<(), SessionError> {
        self.require(
            "reconnect",
            &[
                SessionState::Initialized,
                SessionState::Scanning,
                SessionState::Stopped,
            ],
        )?;
        let transport = self.transport_label();
        let (max_attempts, retry_delay) = match &self.config {
            Some(c) => (c.max_reconnect_attempts.max(1), c.retry_delay),
            None => (1, Duration::ZERO),
        };

        if self.state == SessionState::Scanning {
            if let Err(e) = self.driver.stop() {
                debug!("Stop before reconnect of {} failed: {}", transport, e);
            }
        }
        if self.handle_open {
            self.handle_open = false;
            if let Err(e) = self.driver.close() {
                debug!("Close before reconnect of {} failed: {}", transport, e);
            }
        }
        self.state = SessionState::Configured;

        let mut last_error = TransportError::Disconnected;
        let mut attempts = 0;
        for attempt in 1..=max_attempts {
            attempts = attempt;
            if attempt > 1 {
                std::thread::sleep(retry_delay);
            }
            info!("Reconnecting {} (attempt {}/{})", transport, attempt, max_attempts);

            if let Err(e) = self.driver.open() {
                warn!("Reconnect open of {} failed: {}", transport, e);
                if let Err(close_err) = self.driver.close() {
                    debug!("Cleanup close of {} failed: {}", transport, close_err);
                }
                let fatal = e.is_fatal();
                last_error = e;
                if fatal {
                    break;
                }
                continue;
            }
            self.handle_open = true;
            self.state = SessionState::Initialized;

            match self.start_driver() {
                Ok(()) => {
                    self.state = SessionState::Scanning;
                    self.metrics.record_reconnect();
                    info!("Reconnected {} after {} attempt(s)", transport, attempt);
                    return Ok(());
                },
                Err((_, e)) => {
                    warn!("Reconnect start of {} failed: {}", transport, e);
                    self.handle_open = false;
                    if let Err(close_err) = self.driver.close() {
                        debug!("Cleanup close of {} failed: {}", transport, close_err);
                    }
                    self.state = SessionState::Configured;
                    last_error = e;
                },
            }
        }

        self.lease = None;
        self.state = SessionState::Configured;
        error!("Giving up on {} after {} reconnect attempt(s)", transport, attempts);
        Err(SessionError::DeviceUnreachable {
            transport,
            source: last_error,
        })
    }

    /// One driver read cycle
    ///
    /// `Ok(None)` when nothing arrived within `timeout`. Link loss maps to
    /// `TransportDisconnect`, any other driver fault to `Driver`.
    pub fn read_once(&mut self, timeout: Duration) -> Result<Option<RawScan>, SessionError> {
        self.require("read", &[SessionState::Scanning])?;
        match self.driver.read_once(timeout) {
            Ok(scan) => Ok(scan),
            Err(TransportError::Timeout) => Ok(None),
            Err(e) if e.is_link_loss() => Err(SessionError::TransportDisconnect {
                transport: self.transport_label(),
                source: e,
            }),
            Err(e) => Err(SessionError::Driver {
                transport: self.transport_label(),
                source: e,
            }),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            // close() already logged the failure
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlink_transport::TransportCandidate;
    use scanlink_transport::mock::{MockDriver, MockHandle, MockRead};

    fn config() -> DeviceConfig {
        DeviceConfig::ranging(TransportCandidate::new("mock0", 230_400))
            .with_retry_delay(Duration::from_millis(1))
    }

    fn session() -> (DeviceSession, MockHandle) {
        let driver = MockDriver::new();
        let handle = driver.handle();
        (DeviceSession::new(Box::new(driver)), handle)
    }

    fn scanning() -> (DeviceSession, MockHandle) {
        let (mut s, handle) = session();
        s.configure(config()).unwrap();
        s.open().unwrap();
        s.start().unwrap();
        (s, handle)
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut s, handle) = session();
        assert_eq!(s.state(), SessionState::Unconfigured);

        s.configure(config()).unwrap();
        assert_eq!(s.state(), SessionState::Configured);
        assert!(handle.settings().is_some());

        s.open().unwrap();
        assert_eq!(s.state(), SessionState::Initialized);
        assert!(s.holds_transport());

        s.start().unwrap();
        assert_eq!(s.state(), SessionState::Scanning);
        assert!(handle.is_started());

        s.stop().unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(!handle.is_started());

        s.close().unwrap();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(!handle.is_open());
        assert!(!s.holds_transport());
    }

    #[test]
    fn test_configure_rejects_bad_frequency() {
        let (mut s, handle) = session();
        let err = s.configure(config().with_scan_frequency(0.0)).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(s.state(), SessionState::Unconfigured);
        assert_eq!(handle.configure_calls(), 0);
    }

    #[test]
    fn test_invalid_transitions() {
        let (mut s, _handle) = session();
        assert!(matches!(s.open(), Err(SessionError::InvalidState { op: "open", .. })));
        assert!(matches!(s.start(), Err(SessionError::InvalidState { op: "start", .. })));
        assert!(matches!(
            s.read_once(Duration::from_millis(1)),
            Err(SessionError::InvalidState { op: "read", .. })
        ));
        s.configure(config()).unwrap();
        assert!(s.configure(config()).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut s, handle) = scanning();
        s.close().unwrap();
        s.close().unwrap();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(handle.close_calls(), 1);
        assert_eq!(handle.stop_calls(), 1);
    }

    #[test]
    fn test_close_from_unconfigured() {
        let (mut s, handle) = session();
        s.close().unwrap();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(handle.close_calls(), 0);
    }

    #[test]
    fn test_close_failure_reported_once() {
        let (mut s, handle) = scanning();
        handle.fail_close(true);
        assert!(matches!(s.close(), Err(SessionError::Close { .. })));
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.close().is_ok());
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn test_stop_is_noop_outside_scanning() {
        let (mut s, handle) = session();
        s.stop().unwrap();
        s.configure(config()).unwrap();
        s.stop().unwrap();
        assert_eq!(handle.stop_calls(), 0);

        let (mut s, handle) = scanning();
        s.stop().unwrap();
        s.stop().unwrap();
        s.close().unwrap();
        s.stop().unwrap();
        assert_eq!(handle.stop_calls(), 1);
    }

    #[test]
    fn test_open_failure_leaves_configured_and_releases_lease() {
        let (mut s, handle) = session();
        s.configure(config()).unwrap();
        handle.fail_open(1);

        let err = s.open().unwrap_err();
        assert!(err.is_device_unreachable());
        assert_eq!(s.state(), SessionState::Configured);
        assert!(!s.holds_transport());
        assert_eq!(handle.close_calls(), 1);

        s.open().unwrap();
        assert_eq!(s.state(), SessionState::Initialized);
    }

    #[test]
    fn test_transport_lease_is_exclusive() {
        let leases = TransportLeases::new();
        let mut a = DeviceSession::with_leases(Box::new(MockDriver::new()), leases.clone());
        let mut b = DeviceSession::with_leases(Box::new(MockDriver::new()), leases.clone());
        a.configure(config()).unwrap();
        b.configure(config()).unwrap();

        a.open().unwrap();
        assert!(matches!(b.open(), Err(SessionError::TransportInUse(_))));

        a.close().unwrap();
        assert!(leases.is_empty());
        b.open().unwrap();
    }

    #[test]
    fn test_start_retries_busy() {
        let (mut s, handle) = session();
        s.configure(config().with_busy_retries(2)).unwrap();
        s.open().unwrap();
        handle.start_busy(2);

        s.start().unwrap();
        assert_eq!(handle.start_calls(), 3);
        assert_eq!(s.state(), SessionState::Scanning);
    }

    #[test]
    fn test_start_busy_exhausted() {
        let (mut s, handle) = session();
        s.configure(config().with_busy_retries(1)).unwrap();
        s.open().unwrap();
        handle.start_busy(5);

        let err = s.start().unwrap_err();
        assert!(matches!(err, SessionError::DeviceBusy { attempts: 2, .. }), "{:?}", err);
        assert_eq!(s.state(), SessionState::Initialized);

        s.close().unwrap();
        assert!(!handle.is_open());
    }

    #[test]
    fn test_read_classification() {
        let (mut s, handle) = scanning();
        handle.push_reads([
            MockRead::Scan(RawScan::from_pairs(&[(0.0, 1.0)])),
            MockRead::NoData,
            MockRead::Fail(scanlink_transport::DeviceErrorKind::InvalidResponse),
            MockRead::Disconnect,
        ]);
        let t = Duration::from_millis(5);

        assert_eq!(s.read_once(t).unwrap().unwrap().len(), 1);
        assert!(s.read_once(t).unwrap().is_none());
        assert!(matches!(s.read_once(t), Err(SessionError::Driver { .. })));
        assert!(s.read_once(t).unwrap_err().is_transport_disconnect());
    }

    #[test]
    fn test_reconnect_restores_scanning() {
        let (mut s, handle) = scanning();
        handle.push_reads([MockRead::Disconnect]);
        assert!(s.read_once(Duration::from_millis(1)).is_err());

        handle.fail_open(1);
        s.reconnect().unwrap();
        assert_eq!(s.state(), SessionState::Scanning);
        assert!(handle.is_started());
        assert!(s.holds_transport());
        assert_eq!(s.metrics().snapshot().reconnects, 1);
    }

    #[test]
    fn test_reconnect_exhausted() {
        let (mut s, handle) = session();
        s.configure(config().with_max_reconnect_attempts(2)).unwrap();
        s.open().unwrap();
        s.start().unwrap();
        let opens_before = handle.open_calls();

        handle.fail_open(usize::MAX);
        let err = s.reconnect().unwrap_err();
        assert!(err.is_device_unreachable());
        assert_eq!(handle.open_calls() - opens_before, 2);
        assert_eq!(s.state(), SessionState::Configured);
        assert!(!s.holds_transport());
        assert!(!handle.is_open());
    }

    #[test]
    fn test_drop_closes() {
        let (s, handle) = scanning();
        drop(s);
        assert!(!handle.is_open());
        assert!(!handle.is_started());
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn test_warmup_delays_start() {
        let (mut s, _handle) = session();
        s.configure(config().with_warmup(Duration::from_millis(30))).unwrap();
        s.open().unwrap();
        let begin = std::time::Instant::now();
        s.start().unwrap();
        assert!(begin.elapsed() >= Duration::from_millis(30));
    }
}
