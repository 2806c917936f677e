//! Session error types

use crate::config::ConfigError;
use crate::session::SessionState;
use scanlink_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by a device session to its immediate caller
///
/// "No data this cycle" is not an error; see [`crate::ScanOutcome::NoData`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// Configuration rejected (never retried)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport present but the device did not come up
    #[error("Device unreachable on {transport}: {source}")]
    DeviceUnreachable {
        transport: String,
        #[source]
        source: TransportError,
    },

    /// Device refused to begin sampling after the bounded retries
    #[error("Device busy on {transport} after {attempts} attempt(s): {source}")]
    DeviceBusy {
        transport: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Link lost mid-session
    #[error("Transport disconnected on {transport}: {source}")]
    TransportDisconnect {
        transport: String,
        #[source]
        source: TransportError,
    },

    /// Another session holds the transport
    #[error("Transport {0} is already held by another session")]
    TransportInUse(String),

    /// Operation not allowed in the current state
    #[error("Cannot {op} while {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    /// Driver fault that is not a link loss
    #[error("Driver error on {transport}: {source}")]
    Driver {
        transport: String,
        #[source]
        source: TransportError,
    },

    /// The driver failed to release its handle
    #[error("Failed to close {transport}: {source}")]
    Close {
        transport: String,
        #[source]
        source: TransportError,
    },
}

impl SessionError {
    /// Whether the session's reconnect path applies
    pub fn is_transport_disconnect(&self) -> bool {
        matches!(self, SessionError::TransportDisconnect { .. })
    }

    pub fn is_device_unreachable(&self) -> bool {
        matches!(self, SessionError::DeviceUnreachable { .. })
    }

    pub fn is_device_busy(&self) -> bool {
        matches!(self, SessionError::DeviceBusy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::DeviceUnreachable {
            transport: "/dev/ttyUSB0@230400".into(),
            source: TransportError::Timeout,
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyUSB0@230400") && msg.contains("Read timeout"), "{}", msg);
        assert!(err.is_device_unreachable());

        let err = SessionError::InvalidState {
            op: "start",
            state: SessionState::Unconfigured,
        };
        assert_eq!(err.to_string(), "Cannot start while Unconfigured");

        let err = SessionError::TransportInUse("A".into());
        assert!(err.to_string().contains("already held"));
    }

    #[test]
    fn test_from_config_error() {
        let err: SessionError = ConfigError::MissingTransport.into();
        assert!(matches!(err, SessionError::Config(ConfigError::MissingTransport)));
        assert!(!err.is_transport_disconnect());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as _;
        let err = SessionError::TransportDisconnect {
            transport: "A@9600".into(),
            source: TransportError::Disconnected,
        };
        assert!(err.is_transport_disconnect());
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("Transport disconnected"));
    }
}
