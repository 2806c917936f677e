//! # scanlink transport layer
//!
//! Hardware abstraction for scan sensors: which transports exist, who holds
//! them, and the narrow capability interface a vendor driver must satisfy.
//!
//! Every vendor-variant quirk (option numbering, `disconnect` vs
//! `disconnecting`, scan container construction) belongs inside a
//! [`ScanDriver`] implementation. Nothing above this crate branches on SDK
//! variants.

use std::time::Duration;
use thiserror::Error;

pub use scanlink_protocol::{DeviceKind, RawPoint, RawScan};

pub mod candidate;
pub mod enumerate;
pub mod lease;

#[cfg(feature = "mock")]
pub mod mock;

pub use candidate::TransportCandidate;
pub use enumerate::{StaticEnumerator, TransportEnumerator, is_sensor_port_name};
#[cfg(feature = "serial")]
pub use enumerate::SerialPortEnumerator;
pub use lease::{TransportLease, TransportLeases};

/// Transport layer error type
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Transport disconnected")]
    Disconnected,
    #[error("Device not started")]
    NotStarted,
}

impl TransportError {
    /// Whether the link itself is gone (cable pulled, port vanished)
    ///
    /// Link loss is what the session's reconnect path reacts to; every other
    /// error is reported as a driver fault.
    pub fn is_link_loss(&self) -> bool {
        match self {
            TransportError::Io(_) | TransportError::Disconnected => true,
            #[cfg(feature = "serial")]
            TransportError::Serial(e) => matches!(
                e.kind(),
                serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(_)
            ),
            TransportError::Device(e) => e.kind == DeviceErrorKind::NoDevice,
            TransportError::Timeout | TransportError::NotStarted => false,
        }
    }

    /// Whether retrying on the same transport is pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Device(e) if e.is_fatal())
    }

    /// Whether the device refused to start sampling for a transient reason
    pub fn is_busy(&self) -> bool {
        matches!(self, TransportError::Device(e) if e.kind == DeviceErrorKind::Busy)
    }
}

/// Structured classification of device/backend errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    NoResponse,
    UnsupportedConfig,
    InvalidResponse,
    Backend,
}

/// Structured device error
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Errors that retrying on the same transport cannot fix
    ///
    /// `NoDevice` is not among them: a port that vanished can come back
    /// when the adapter re-enumerates.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, DeviceErrorKind::AccessDenied | DeviceErrorKind::NotFound)
    }
}

/// Settings handed to a driver at configure time
///
/// A subset of the session configuration: only what the device itself needs.
/// Filtering bounds are repeated here so that drivers able to crop in
/// hardware can do so.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub transport: TransportCandidate,
    pub device_kind: DeviceKind,
    pub scan_frequency_hz: f64,
    /// Sample rate in kHz
    pub sample_rate: f64,
    pub angle_min_deg: f64,
    pub angle_max_deg: f64,
    pub range_min_m: f64,
    pub range_max_m: f64,
    pub single_channel: bool,
    pub intensity: bool,
    pub fixed_angle: bool,
    pub reversed: bool,
    /// Upper bound for every blocking call the driver makes
    pub io_timeout: Duration,
}

impl DriverSettings {
    /// Settings with common triangle-lidar defaults for a transport
    pub fn for_transport(transport: TransportCandidate) -> Self {
        Self {
            transport,
            device_kind: DeviceKind::RangingSensor,
            scan_frequency_hz: 10.0,
            sample_rate: 5.0,
            angle_min_deg: -180.0,
            angle_max_deg: 180.0,
            range_min_m: 0.1,
            range_max_m: 16.0,
            single_channel: false,
            intensity: false,
            fixed_angle: true,
            reversed: false,
            io_timeout: Duration::from_millis(500),
        }
    }
}

/// Capability interface of a vendor scan driver
///
/// Call order is `configure → open → start → read_once* → stop → close`.
/// Implementations must honor `DriverSettings::io_timeout` in `open`/`start`
/// and the `timeout` argument in `read_once`: no call may block indefinitely.
/// `stop` and `close` must tolerate being called in any state.
pub trait ScanDriver: Send {
    fn configure(&mut self, settings: &DriverSettings) -> Result<(), TransportError>;
    /// Bring up the hardware handle
    fn open(&mut self) -> Result<(), TransportError>;
    /// Begin sampling
    fn start(&mut self) -> Result<(), TransportError>;
    /// One read cycle; `Ok(None)` when no scan arrived within `timeout`
    fn read_once(&mut self, timeout: Duration) -> Result<Option<RawScan>, TransportError>;
    fn stop(&mut self) -> Result<(), TransportError>;
    /// Release the hardware handle
    fn close(&mut self) -> Result<(), TransportError>;
}

impl<D: ScanDriver + ?Sized> ScanDriver for Box<D> {
    fn configure(&mut self, settings: &DriverSettings) -> Result<(), TransportError> {
        (**self).configure(settings)
    }
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }
    fn start(&mut self) -> Result<(), TransportError> {
        (**self).start()
    }
    fn read_once(&mut self, timeout: Duration) -> Result<Option<RawScan>, TransportError> {
        (**self).read_once(timeout)
    }
    fn stop(&mut self) -> Result<(), TransportError> {
        (**self).stop()
    }
    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// Builds a fresh driver for a transport
///
/// The probe asks for a new driver per (transport, bit rate) attempt; closures
/// of the matching shape implement this trait.
pub trait DriverFactory {
    fn create(
        &self,
        candidate: &TransportCandidate,
        kind: DeviceKind,
    ) -> Result<Box<dyn ScanDriver>, TransportError>;
}

impl<F> DriverFactory for F
where
    F: Fn(&TransportCandidate, DeviceKind) -> Result<Box<dyn ScanDriver>, TransportError>,
{
    fn create(
        &self,
        candidate: &TransportCandidate,
        kind: DeviceKind,
    ) -> Result<Box<dyn ScanDriver>, TransportError> {
        self(candidate, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "Read timeout");
        assert_eq!(TransportError::Disconnected.to_string(), "Transport disconnected");

        let err = TransportError::Device(DeviceError::new(DeviceErrorKind::Busy, "motor spin-up"));
        let msg = err.to_string();
        assert!(msg.contains("Busy") && msg.contains("motor spin-up"), "{}", msg);
    }

    #[test]
    fn test_link_loss_classification() {
        assert!(TransportError::Disconnected.is_link_loss());
        assert!(TransportError::Io(std::io::Error::other("eio")).is_link_loss());
        assert!(
            TransportError::Device(DeviceError::new(DeviceErrorKind::NoDevice, "gone"))
                .is_link_loss()
        );
        assert!(!TransportError::Timeout.is_link_loss());
        assert!(
            !TransportError::Device(DeviceError::new(DeviceErrorKind::Busy, "x")).is_link_loss()
        );
    }

    #[test]
    fn test_busy_classification() {
        assert!(TransportError::Device(DeviceError::new(DeviceErrorKind::Busy, "x")).is_busy());
        assert!(!TransportError::NotStarted.is_busy());
    }

    #[test]
    fn test_device_error_fatal() {
        assert!(DeviceError::new(DeviceErrorKind::AccessDenied, "perm").is_fatal());
        assert!(DeviceError::new(DeviceErrorKind::NotFound, "gone").is_fatal());
        assert!(!DeviceError::new(DeviceErrorKind::NoResponse, "silent").is_fatal());
        assert!(!DeviceError::new(DeviceErrorKind::NoDevice, "replugging").is_fatal());

        let denied =
            TransportError::Device(DeviceError::new(DeviceErrorKind::AccessDenied, "perm"));
        assert!(denied.is_fatal());
        assert!(!TransportError::Disconnected.is_fatal());
        assert!(!TransportError::Timeout.is_fatal());
    }
}
