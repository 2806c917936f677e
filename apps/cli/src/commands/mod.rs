//! Subcommands

pub mod ports;
pub mod probe;
pub mod record;

pub use ports::PortsCommand;
pub use probe::ProbeCommand;
pub use record::RecordCommand;

use crate::backend::Backend;
use anyhow::{Result, bail};
use scanlink_driver::{DeviceConfig, Discovery, TransportCandidate, TransportLeases, TransportProbe};
use std::time::Duration;

/// Probe `transports × bit_rates` (enumerating when `transports` is empty)
///
/// Transports held in `leases` are skipped.
pub(crate) fn find_device(
    backend: &Backend,
    template: &DeviceConfig,
    transports: &[String],
    bit_rates: &[u32],
    leases: &TransportLeases,
    confirm: Option<Duration>,
) -> Result<TransportCandidate> {
    let mut probe = TransportProbe::new(backend.clone())
        .with_enumerator(backend.enumerator(false))
        .with_leases(leases.clone())
        .with_template(template.clone());
    if let Some(timeout) = confirm {
        probe = probe.confirm_scan(timeout);
    }

    match probe.discover(transports, bit_rates)? {
        Discovery::Found(candidate) => Ok(candidate),
        Discovery::NotFound { attempts } => {
            bail!("device not found ({} transport/bit-rate pair(s) tried)", attempts)
        },
    }
}

/// Fail early when no driver can be created
pub(crate) fn require_driver(backend: &Backend) -> Result<()> {
    if !backend.is_simulated() {
        bail!("no vendor scan driver is built into scanlink-cli; rerun with --simulate");
    }
    Ok(())
}
