//! Driver layer
//!
//! Owns the lifecycle of one scan sensor and the per-cycle read path:
//! - `config`: immutable device configuration and its validation
//! - `session`: the `DeviceSession` state machine with idempotent teardown
//! - `probe`: transport/bit-rate discovery
//! - `reader`: one read cycle → filtered, normalized `ScanBatch`
//! - `stream`: session + reader with the auto-reconnect policy
//! - `metrics`: lock-free counters per session
//!
//! Most callers want [`ScanStream::connect`] after a [`TransportProbe::discover`].

pub mod config;
mod error;
pub mod metrics;
pub mod probe;
pub mod reader;
pub mod session;
pub mod stream;

pub use config::{ConfigError, DeviceConfig};
pub use error::SessionError;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use probe::{DEFAULT_BIT_RATES, Discovery, TransportProbe};
pub use reader::{SampleFilter, ScanOutcome, ScanReader};
pub use session::{DeviceSession, SessionState};
pub use stream::ScanStream;

pub use scanlink_protocol::{
    CaptureTime, DeviceKind, DeviceTag, DistanceUnit, RawPoint, RawScan, Sample, ScanBatch,
};
pub use scanlink_transport::{
    DriverFactory, DriverSettings, ScanDriver, TransportCandidate, TransportError,
    TransportLeases,
};
