//! CSV record output
//!
//! One row per sample: `timestamp, device, angle_deg, distance_m, intensity`.
//! `timestamp` is seconds since the UNIX epoch; `intensity` is empty when the
//! device does not report one.

use scanlink_client::SampleSink;
use scanlink_protocol::ScanBatch;
use std::io::{self, Write};

pub const CSV_HEADER: [&str; 5] = ["timestamp", "device", "angle_deg", "distance_m", "intensity"];

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> CsvSink<W> {
    /// Writes the header immediately
    pub fn new(inner: W) -> io::Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CSV_HEADER).map_err(io::Error::other)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl<W: Write + Send> SampleSink for CsvSink<W> {
    fn accept(&mut self, batch: ScanBatch) -> io::Result<()> {
        let timestamp = format!("{:.6}", batch.capture_time().as_secs_f64());
        let device = batch.device_tag().as_str();
        for sample in batch.samples() {
            let angle = sample.angle_deg.to_string();
            let distance = sample.distance_m.to_string();
            let intensity = sample.intensity.map(|i| i.to_string()).unwrap_or_default();
            self.writer
                .write_record([
                    timestamp.as_str(),
                    device,
                    angle.as_str(),
                    distance.as_str(),
                    intensity.as_str(),
                ])
                .map_err(io::Error::other)?;
            self.rows += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
