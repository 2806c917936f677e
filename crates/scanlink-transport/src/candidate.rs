//! Transport candidates

use std::fmt;

/// A (transport path, bit rate) pair to try
///
/// Ephemeral: produced by enumeration, consumed by probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportCandidate {
    /// Serial device path or identifier, e.g. `/dev/ttyUSB0` or `COM3`
    pub path: String,
    pub bit_rate: u32,
}

impl TransportCandidate {
    pub fn new(path: impl Into<String>, bit_rate: u32) -> Self {
        Self {
            path: path.into(),
            bit_rate,
        }
    }
}

impl fmt::Display for TransportCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.bit_rate)
    }
}
