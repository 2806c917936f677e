//! # scanlink CLI
//!
//! Discover serial range sensors and record their scans to CSV.
//!
//! ```bash
//! # List candidate serial ports
//! scanlink-cli ports
//!
//! # Find the port and bit rate a sensor answers on
//! scanlink-cli --simulate probe
//!
//! # Record two sensors for ten seconds
//! scanlink-cli --simulate record --devices 2 --duration 10 -o scans.csv
//!
//! # Devices, coordinator and limits from a file
//! scanlink-cli --config scanlink.toml --simulate record -o scans.csv
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `scanlink=info`); logs go to
//! stderr so CSV output on stdout stays clean.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod backend;
mod commands;
mod config;
mod csv_sink;

use backend::Backend;
use commands::{PortsCommand, ProbeCommand, RecordCommand};
use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "scanlink-cli")]
#[command(about = "Acquisition tool for serial range sensors and depth cameras", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use simulated sensors instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List candidate serial ports
    Ports {
        #[command(flatten)]
        args: PortsCommand,
    },

    /// Find the transport a sensor answers on
    Probe {
        #[command(flatten)]
        args: ProbeCommand,
    },

    /// Record scans to CSV
    Record {
        #[command(flatten)]
        args: RecordCommand,
    },
}

impl Cli {
    /// Ports the simulated sensors sit on: those named on the command line or
    /// in the file, else the defaults
    fn simulated_ports(&self, config: &CliConfig) -> Vec<String> {
        let named = match &self.command {
            Commands::Probe { args } => args.ports.clone(),
            Commands::Record { args } => args.ports.clone(),
            Commands::Ports { .. } => Vec::new(),
        };
        if !named.is_empty() {
            return named;
        }
        config.devices.iter().filter_map(|d| d.port.clone()).collect()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scanlink=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let backend = if cli.simulate {
        Backend::simulated(&cli.simulated_ports(&config))
    } else {
        Backend::hardware()
    };

    match &cli.command {
        Commands::Ports { args } => args.execute(&backend),
        Commands::Probe { args } => args.execute(&backend, &config),
        Commands::Record { args } => args.execute(&backend, &config),
    }
}
