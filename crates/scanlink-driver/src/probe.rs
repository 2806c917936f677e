//! Transport and bit-rate discovery
//!
//! Tries every `(transport, bit_rate)` pair in order with a throwaway
//! session and stops at the first device that starts sampling. Failed pairs
//! are logged as progress; running out of pairs is [`Discovery::NotFound`],
//! an ordinary outcome.

use crate::config::{ConfigError, DeviceConfig};
use crate::error::SessionError;
use crate::session::DeviceSession;
use scanlink_transport::{
    DriverFactory, TransportCandidate, TransportEnumerator, TransportError, TransportLeases,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bit rates tried when the caller gives none, most common first
pub const DEFAULT_BIT_RATES: [u32; 2] = [230_400, 115_200];

/// Result of a probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Found(TransportCandidate),
    NotFound {
        /// Pairs actually tried
        attempts: usize,
    },
}

impl Discovery {
    pub fn found(self) -> Option<TransportCandidate> {
        match self {
            Discovery::Found(candidate) => Some(candidate),
            Discovery::NotFound { .. } => None,
        }
    }
}

/// Finds the transport a sensor answers on
///
/// # Example
///
/// ```no_run
/// use scanlink_driver::{
///     DeviceKind, Discovery, ScanDriver, TransportCandidate, TransportError, TransportProbe,
/// };
///
/// fn vendor_driver(
///     _candidate: &TransportCandidate,
///     _kind: DeviceKind,
/// ) -> Result<Box<dyn ScanDriver>, TransportError> {
///     Err(TransportError::NotStarted)
/// }
///
/// let probe = TransportProbe::new(vendor_driver);
/// match probe.discover(&[], &[]).unwrap() {
///     Discovery::Found(candidate) => println!("sensor on {}", candidate),
///     Discovery::NotFound { attempts } => println!("device not found ({} attempts)", attempts),
/// }
/// ```
pub struct TransportProbe<F> {
    factory: F,
    enumerator: Box<dyn TransportEnumerator>,
    leases: TransportLeases,
    template: DeviceConfig,
    confirm_timeout: Option<Duration>,
}

impl<F: DriverFactory> TransportProbe<F> {
    /// Probe over the live serial ports (none without the `serial` feature)
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            enumerator: default_enumerator(),
            leases: TransportLeases::new(),
            template: DeviceConfig::default(),
            confirm_timeout: None,
        }
    }

    /// Source of transports when `discover` is given none
    pub fn with_enumerator(mut self, enumerator: impl TransportEnumerator + 'static) -> Self {
        self.enumerator = Box::new(enumerator);
        self
    }

    /// Share leases with running sessions; their transports are skipped
    pub fn with_leases(mut self, leases: TransportLeases) -> Self {
        self.leases = leases;
        self
    }

    /// Configuration used for every probe session (its transport is replaced)
    pub fn with_template(mut self, template: DeviceConfig) -> Self {
        self.template = template;
        self
    }

    /// Also require one scan within `timeout` before accepting a pair
    pub fn confirm_scan(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = Some(timeout);
        self
    }

    /// Walk the candidates and return the first working pair
    ///
    /// Empty `transports` → enumerate; empty `bit_rates` → [`DEFAULT_BIT_RATES`].
    /// Every probe session is closed before this returns, so no candidate is
    /// left open or sampling.
    ///
    /// # Errors
    /// Only a template configuration the session would reject.
    pub fn discover(
        &self,
        transports: &[String],
        bit_rates: &[u32],
    ) -> Result<Discovery, ConfigError> {
        // The template must be valid apart from its transport
        self.template
            .clone()
            .with_transport(TransportCandidate::new("probe", 1))
            .validate()?;

        let transports = if transports.is_empty() {
            match self.enumerator.list() {
                Ok(found) => found,
                Err(e) => {
                    warn!("Transport enumeration failed: {}", e);
                    Vec::new()
                },
            }
        } else {
            transports.to_vec()
        };
        let bit_rates: &[u32] = if bit_rates.is_empty() {
            &DEFAULT_BIT_RATES
        } else {
            bit_rates
        };

        if transports.is_empty() {
            info!("No transports to probe");
            return Ok(Discovery::NotFound { attempts: 0 });
        }

        let mut attempts = 0;
        for path in &transports {
            if self.leases.is_held(path) {
                debug!("Skipping {}: held by an active session", path);
                continue;
            }
            for &bit_rate in bit_rates {
                let candidate = TransportCandidate::new(path.clone(), bit_rate);
                attempts += 1;
                info!("Probing {} (attempt {})", candidate, attempts);
                match self.try_candidate(&candidate) {
                    Ok(()) => {
                        info!("Found device on {}", candidate);
                        return Ok(Discovery::Found(candidate));
                    },
                    Err(e) => info!("No device on {}: {}", candidate, e),
                }
            }
        }

        info!("Device not found after {} attempt(s)", attempts);
        Ok(Discovery::NotFound { attempts })
    }

    /// Full bring-up on one pair; the session is closed on every path
    fn try_candidate(&self, candidate: &TransportCandidate) -> Result<(), SessionError> {
        let mut config = self.template.clone().with_transport(candidate.clone());
        config.warmup = Duration::ZERO;
        config.auto_reconnect = false;

        let driver = self
            .factory
            .create(candidate, config.device_kind)
            .map_err(|e| SessionError::DeviceUnreachable {
                transport: candidate.to_string(),
                source: e,
            })?;
        let mut session = DeviceSession::with_leases(driver, self.leases.clone());
        session.configure(config)?;
        session.open()?;
        session.start()?;

        if let Some(timeout) = self.confirm_timeout {
            if session.read_once(timeout)?.is_none() {
                return Err(SessionError::DeviceUnreachable {
                    transport: candidate.to_string(),
                    source: TransportError::Timeout,
                });
            }
        }

        if let Err(e) = session.stop() {
            debug!("Stop after probing {} failed: {}", candidate, e);
        }
        if let Err(e) = session.close() {
            warn!("Close after probing {} failed: {}", candidate, e);
        }
        Ok(())
    }
}

#[cfg(feature = "serial")]
fn default_enumerator() -> Box<dyn TransportEnumerator> {
    Box::new(scanlink_transport::SerialPortEnumerator::new())
}

#[cfg(not(feature = "serial"))]
fn default_enumerator() -> Box<dyn TransportEnumerator> {
    Box::new(scanlink_transport::StaticEnumerator::default())
}
