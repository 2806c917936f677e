//! `record`: acquire scans into a CSV file

use super::{find_device, require_driver};
use crate::backend::Backend;
use crate::config::{CliConfig, DeviceEntry};
use crate::csv_sink::CsvSink;
use anyhow::{Context, Result, bail};
use clap::Args;
use scanlink_client::{
    AcquisitionLimits, AcquisitionSummary, MultiSensorCoordinator, SampleSink, StopSignal,
    run_coordinated, run_single,
};
use scanlink_driver::{DriverFactory, ScanStream, TransportLeases};
use std::fs::File;
use std::io::{self, BufWriter};
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug)]
pub struct RecordCommand {
    /// Output CSV file ("-" for stdout)
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Port to record from (repeatable); replaces the configured devices
    #[arg(short, long = "port")]
    pub ports: Vec<String>,

    /// Bit rate to try (repeatable, in priority order)
    #[arg(short, long = "baud")]
    pub bauds: Vec<u32>,

    /// Device kind: ranging or depth
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Devices to probe for when neither ports nor a config file name any
    #[arg(long, default_value_t = 1)]
    pub devices: usize,

    /// Stop after this many scans (all devices together)
    #[arg(long)]
    pub max_scans: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Per-device read timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Reopen a device after link loss
    #[arg(long)]
    pub auto_reconnect: bool,
}

impl RecordCommand {
    pub fn execute(&self, backend: &Backend, config: &CliConfig) -> Result<()> {
        require_driver(backend)?;

        let stop = StopSignal::new();
        let handler_stop = stop.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStopping...");
            handler_stop.request_stop();
        })
        .context("Failed to install Ctrl-C handler")?;

        let limits = self.limits(config)?;
        let mut coordinator_config = config.coordinator.to_config();
        if let Some(ms) = self.timeout_ms {
            coordinator_config.per_device_timeout = Duration::from_millis(ms);
        }

        let leases = TransportLeases::new();
        let mut streams = Vec::new();
        for entry in self.device_entries(config) {
            if stop.is_requested() {
                // Dropping the streams closes them
                bail!("interrupted while connecting");
            }
            streams.push(self.connect(backend, &entry, &leases)?);
        }

        let mut sink = self.open_sink()?;
        let summary = if streams.len() == 1 {
            let mut stream = streams.remove(0);
            let summary = run_single(&mut stream, sink.as_mut(), &limits, &stop)?;
            let metrics = stream.metrics().snapshot();
            info!(
                "{}: {} scan(s), {} dropped sample(s), {} reconnect(s)",
                stream.tag(),
                metrics.scans,
                metrics.samples_dropped,
                metrics.reconnects
            );
            summary
        } else {
            let mut coordinator = MultiSensorCoordinator::new(streams, coordinator_config)?;
            let summary = run_coordinated(&mut coordinator, sink.as_mut(), &limits, &stop)?;
            for tag in coordinator.lost_devices() {
                eprintln!("Warning: {} stopped answering during the run", tag);
            }
            summary
        };

        print_summary(&summary);
        Ok(())
    }

    fn limits(&self, config: &CliConfig) -> Result<AcquisitionLimits> {
        let mut limits = config.acquisition.to_limits()?;
        if let Some(max) = self.max_scans {
            limits.max_scans = Some(max);
        }
        if let Some(secs) = self.duration {
            limits.max_duration = Some(
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid --duration {}", secs))?,
            );
        }
        if let Some(ms) = self.timeout_ms {
            limits.read_timeout = Duration::from_millis(ms);
        }
        Ok(limits)
    }

    /// Command-line ports win over the file; with neither, probe `--devices` times
    fn device_entries(&self, config: &CliConfig) -> Vec<DeviceEntry> {
        let mut entries: Vec<DeviceEntry> = if !self.ports.is_empty() {
            self.ports
                .iter()
                .map(|port| DeviceEntry {
                    port: Some(port.clone()),
                    ..DeviceEntry::default()
                })
                .collect()
        } else if !config.devices.is_empty() {
            config.devices.clone()
        } else {
            vec![DeviceEntry::default(); self.devices.max(1)]
        };

        for entry in &mut entries {
            if self.kind.is_some() {
                entry.kind = self.kind.clone();
            }
            if !self.bauds.is_empty() {
                entry.baud = None;
                entry.bauds = self.bauds.clone();
            }
            if self.auto_reconnect {
                entry.auto_reconnect = Some(true);
            }
        }
        entries
    }

    fn connect(
        &self,
        backend: &Backend,
        entry: &DeviceEntry,
        leases: &TransportLeases,
    ) -> Result<ScanStream> {
        let template = entry.to_device_config()?;
        let transports: Vec<String> = entry.port.iter().cloned().collect();
        let bit_rates = entry.bit_rates();
        let candidate = find_device(backend, &template, &transports, &bit_rates, leases, None)?;

        let driver = backend.create(&candidate, template.device_kind)?;
        let stream = ScanStream::connect(driver, template.with_transport(candidate.clone()), leases)
            .with_context(|| format!("Failed to start {}", candidate))?;
        info!("Streaming from {} as {}", candidate, stream.tag());
        Ok(stream)
    }

    fn open_sink(&self) -> Result<Box<dyn SampleSink>> {
        if self.output == "-" {
            return Ok(Box::new(CsvSink::new(io::stdout())?));
        }
        let file = File::create(&self.output)
            .with_context(|| format!("Failed to create {}", self.output))?;
        Ok(Box::new(CsvSink::new(BufWriter::new(file))?))
    }
}

fn print_summary(summary: &AcquisitionSummary) {
    eprintln!(
        "Recorded {} scan(s), {} sample(s) in {} cycle(s) ({:?})",
        summary.batches, summary.samples, summary.cycles, summary.reason
    );
    if summary.errors > 0 {
        eprintln!("{} read error(s) were skipped", summary.errors);
    }
}
