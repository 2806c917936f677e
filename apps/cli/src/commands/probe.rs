//! `probe`: find the transport a sensor answers on

use super::{find_device, require_driver};
use crate::backend::Backend;
use crate::config::CliConfig;
use anyhow::Result;
use clap::Args;
use scanlink_driver::{DeviceConfig, DeviceKind, TransportLeases};
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ProbeCommand {
    /// Port to try (repeatable); enumerated when omitted
    #[arg(short, long = "port")]
    pub ports: Vec<String>,

    /// Bit rate to try (repeatable, in priority order)
    #[arg(short, long = "baud")]
    pub bauds: Vec<u32>,

    /// Device kind: ranging or depth
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Also require one scan within this many milliseconds
    #[arg(long)]
    pub confirm_ms: Option<u64>,
}

impl ProbeCommand {
    pub fn execute(&self, backend: &Backend, config: &CliConfig) -> Result<()> {
        require_driver(backend)?;

        // First configured device supplies defaults
        let entry = config.devices.first().cloned().unwrap_or_default();
        let mut template = entry.to_device_config()?;
        if let Some(kind) = &self.kind {
            template = DeviceConfig::preset(kind.parse::<DeviceKind>()?);
        }
        let ports = if self.ports.is_empty() {
            entry.port.iter().cloned().collect()
        } else {
            self.ports.clone()
        };
        let bauds = if self.bauds.is_empty() {
            entry.bit_rates()
        } else {
            self.bauds.clone()
        };

        let candidate = find_device(
            backend,
            &template,
            &ports,
            &bauds,
            &TransportLeases::new(),
            self.confirm_ms.map(Duration::from_millis),
        )?;
        println!("{}", candidate);
        Ok(())
    }
}
