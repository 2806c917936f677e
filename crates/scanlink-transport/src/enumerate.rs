//! Transport enumeration
//!
//! Lists the transports a probe should try when the caller does not name any.
//! Order is stable (sorted, deduplicated) so that discovery is reproducible.

use crate::TransportError;

/// Source of candidate transport paths
pub trait TransportEnumerator: Send + Sync {
    fn list(&self) -> Result<Vec<String>, TransportError>;
}

impl<E: TransportEnumerator + ?Sized> TransportEnumerator for Box<E> {
    fn list(&self) -> Result<Vec<String>, TransportError> {
        (**self).list()
    }
}

/// Whether a port name looks like a USB-serial bridge a scan sensor sits behind
///
/// Matches the usual CP210x/CH340/FTDI device names on Linux (`ttyUSB*`,
/// `ttyACM*`), macOS (`*usbserial*`, `*usbmodem*`, `*SLAB_USBtoUART*`) and
/// Windows (`COM*`).
pub fn is_sensor_port_name(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.starts_with("ttyUSB")
        || base.starts_with("ttyACM")
        || base.contains("usbserial")
        || base.contains("usbmodem")
        || base.contains("SLAB_USBtoUART")
        || (base.len() > 3
            && base.starts_with("COM")
            && base[3..].chars().all(|c| c.is_ascii_digit()))
}

#[cfg_attr(not(feature = "serial"), allow(dead_code))]
fn sorted_unique(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.dedup();
    names
}

/// Live serial ports reported by the OS
#[cfg(feature = "serial")]
#[derive(Debug, Clone, Default)]
pub struct SerialPortEnumerator {
    /// Keep every port instead of only USB-serial looking ones
    pub include_all: bool,
}

#[cfg(feature = "serial")]
impl SerialPortEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }
}

#[cfg(feature = "serial")]
impl TransportEnumerator for SerialPortEnumerator {
    fn list(&self) -> Result<Vec<String>, TransportError> {
        let ports = serialport::available_ports()?;
        let names: Vec<String> = ports
            .into_iter()
            .map(|p| p.port_name)
            .filter(|name| self.include_all || is_sensor_port_name(name))
            .collect();
        tracing::debug!("Serial enumeration found {} candidate port(s)", names.len());
        Ok(sorted_unique(names))
    }
}

/// Fixed list of transports (configuration files, tests)
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    paths: Vec<String>,
}

impl StaticEnumerator {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl TransportEnumerator for StaticEnumerator {
    /// Paths in the order given; duplicates after the first are dropped
    fn list(&self) -> Result<Vec<String>, TransportError> {
        let mut seen = std::collections::HashSet::new();
        Ok(self.paths.iter().filter(|p| seen.insert(p.as_str())).cloned().collect())
    }
}
