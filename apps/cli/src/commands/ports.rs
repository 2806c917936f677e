//! `ports`: list candidate transports

use crate::backend::Backend;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct PortsCommand {
    /// List every serial port, not only USB-serial bridges
    #[arg(short, long)]
    pub all: bool,
}

impl PortsCommand {
    pub fn execute(&self, backend: &Backend) -> Result<()> {
        let ports = backend.enumerator(self.all).list()?;
        if ports.is_empty() {
            eprintln!("No candidate ports found");
            return Ok(());
        }
        for port in ports {
            println!("{}", port);
        }
        Ok(())
    }
}
