//! Configuration file
//!
//! ```toml
//! [[device]]
//! kind = "ranging"
//! tag = "front"
//! port = "/dev/ttyUSB0"     # omit to probe
//! bauds = [230400, 115200]
//! range_min_m = 0.1
//! range_max_m = 8.0
//! auto_reconnect = true
//!
//! [coordinator]
//! per_device_timeout_ms = 200
//! loss_threshold = 10
//!
//! [acquisition]
//! max_scans = 1000
//! ```

use anyhow::{Context, Result};
use scanlink_client::{AcquisitionLimits, CoordinatorConfig};
use scanlink_driver::{DEFAULT_BIT_RATES, DeviceConfig, DeviceKind, DistanceUnit};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Whole file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub coordinator: CoordinatorEntry,
    #[serde(default)]
    pub acquisition: AcquisitionEntry,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// One `[[device]]` entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    pub kind: Option<String>,
    pub tag: Option<String>,
    /// Serial port; probed when absent
    pub port: Option<String>,
    /// Fixed bit rate (skips the bit-rate sweep when a port is set)
    pub baud: Option<u32>,
    /// Bit rates to probe, in priority order
    #[serde(default)]
    pub bauds: Vec<u32>,
    pub scan_frequency_hz: Option<f64>,
    pub sample_rate: Option<f64>,
    pub angle_min_deg: Option<f64>,
    pub angle_max_deg: Option<f64>,
    pub range_min_m: Option<f64>,
    pub range_max_m: Option<f64>,
    pub noise_floor_m: Option<f64>,
    pub distance_unit: Option<String>,
    pub intensity: Option<bool>,
    pub single_channel: Option<bool>,
    pub fixed_angle: Option<bool>,
    pub reversed: Option<bool>,
    pub auto_reconnect: Option<bool>,
    pub max_reconnect_attempts: Option<u32>,
    pub busy_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub io_timeout_ms: Option<u64>,
    pub warmup_ms: Option<u64>,
}

impl DeviceEntry {
    pub fn device_kind(&self) -> Result<DeviceKind> {
        match &self.kind {
            Some(kind) => Ok(kind.parse()?),
            None => Ok(DeviceKind::RangingSensor),
        }
    }

    /// Bit rates to try, highest priority first
    pub fn bit_rates(&self) -> Vec<u32> {
        match (self.baud, self.bauds.is_empty()) {
            (Some(baud), _) => vec![baud],
            (None, false) => self.bauds.clone(),
            (None, true) => DEFAULT_BIT_RATES.to_vec(),
        }
    }

    /// Device configuration without a transport; probing or the port fills it in
    pub fn to_device_config(&self) -> Result<DeviceConfig> {
        let mut config = DeviceConfig::preset(self.device_kind()?);

        if let Some(tag) = &self.tag {
            config.tag = Some(tag.clone());
        }
        if let Some(v) = self.scan_frequency_hz {
            config.scan_frequency_hz = v;
        }
        if let Some(v) = self.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = self.angle_min_deg {
            config.angle_min_deg = v;
        }
        if let Some(v) = self.angle_max_deg {
            config.angle_max_deg = v;
        }
        if let Some(v) = self.range_min_m {
            config.range_min_m = v;
        }
        if let Some(v) = self.range_max_m {
            config.range_max_m = v;
        }
        if let Some(v) = self.noise_floor_m {
            config.noise_floor_m = v;
        }
        if let Some(unit) = &self.distance_unit {
            config.distance_unit = unit.parse::<DistanceUnit>()?;
        }
        if let Some(v) = self.intensity {
            config.intensity = v;
        }
        if let Some(v) = self.single_channel {
            config.single_channel = v;
        }
        if let Some(v) = self.fixed_angle {
            config.fixed_angle = v;
        }
        if let Some(v) = self.reversed {
            config.reversed = v;
        }
        if let Some(v) = self.auto_reconnect {
            config.auto_reconnect = v;
        }
        if let Some(v) = self.max_reconnect_attempts {
            config.max_reconnect_attempts = v;
        }
        if let Some(v) = self.busy_retries {
            config.busy_retries = v;
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.io_timeout_ms {
            config.io_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.warmup_ms {
            config.warmup = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

/// `[coordinator]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorEntry {
    pub per_device_timeout_ms: Option<u64>,
    pub reply_grace_ms: Option<u64>,
    pub loss_threshold: Option<u32>,
    pub join_timeout_ms: Option<u64>,
}

impl CoordinatorEntry {
    pub fn to_config(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::default();
        if let Some(ms) = self.per_device_timeout_ms {
            config.per_device_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reply_grace_ms {
            config.reply_grace = Duration::from_millis(ms);
        }
        if let Some(n) = self.loss_threshold {
            config.loss_threshold = n;
        }
        if let Some(ms) = self.join_timeout_ms {
            config.join_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// `[acquisition]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionEntry {
    pub max_scans: Option<u64>,
    pub max_duration_s: Option<f64>,
    pub read_timeout_ms: Option<u64>,
    pub cycle_interval_ms: Option<u64>,
}

impl AcquisitionEntry {
    pub fn to_limits(&self) -> Result<AcquisitionLimits> {
        let mut limits = AcquisitionLimits::unbounded();
        limits.max_scans = self.max_scans;
        if let Some(secs) = self.max_duration_s {
            limits.max_duration = Some(
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("Invalid max_duration_s {}", secs))?,
            );
        }
        if let Some(ms) = self.read_timeout_ms {
            limits.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.cycle_interval_ms {
            limits.cycle_interval = Duration::from_millis(ms);
        }
        Ok(limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[device]]
kind = "lidar"
tag = "front"
port = "/dev/ttyUSB0"
baud = 115200
range_min_m = 0.1
range_max_m = 8.0
distance_unit = "mm"
auto_reconnect = true

[[device]]
kind = "depth"
bauds = [921600]

[coordinator]
per_device_timeout_ms = 150
loss_threshold = 5

[acquisition]
max_scans = 20
max_duration_s = 1.5
"#;

    #[test]
    fn test_parse_sample() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.devices.len(), 2);

        let front = &config.devices[0];
        assert_eq!(front.bit_rates(), vec![115_200]);
        let device = front.to_device_config().unwrap();
        assert_eq!(device.device_kind, DeviceKind::RangingSensor);
        assert_eq!(device.range_max_m, 8.0);
        assert_eq!(device.distance_unit, DistanceUnit::Millimeters);
        assert!(device.auto_reconnect);
        assert!(device.transport.is_none());

        let depth = config.devices[1].to_device_config().unwrap();
        assert_eq!(depth.device_kind, DeviceKind::DepthCamera);
        assert_eq!(depth.warmup, Duration::from_secs(2));
        assert_eq!(config.devices[1].bit_rates(), vec![921_600]);

        let coordinator = config.coordinator.to_config();
        assert_eq!(coordinator.per_device_timeout, Duration::from_millis(150));
        assert_eq!(coordinator.loss_threshold, 5);

        let limits = config.acquisition.to_limits().unwrap();
        assert_eq!(limits.max_scans, Some(20));
        assert_eq!(limits.max_duration, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(DeviceEntry::default().bit_rates(), DEFAULT_BIT_RATES.to_vec());
        assert_eq!(config.coordinator.to_config(), CoordinatorConfig::default());
    }

    #[test]
    fn test_rejects_unknown_fields_and_kinds() {
        assert!(CliConfig::parse("[[device]]\nbaudrate = 9600\n").is_err());

        let entry = DeviceEntry {
            kind: Some("sonar".into()),
            ..DeviceEntry::default()
        };
        assert!(entry.to_device_config().is_err());

        let entry = DeviceEntry {
            distance_unit: Some("feet".into()),
            ..DeviceEntry::default()
        };
        let err = entry.to_device_config().unwrap_err();
        assert!(err.to_string().contains("unknown distance unit 'feet'"));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let entry = AcquisitionEntry {
            max_duration_s: Some(-1.0),
            ..AcquisitionEntry::default()
        };
        assert!(entry.to_limits().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanlink.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(CliConfig::load(&path).unwrap().devices.len(), 2);
        assert!(CliConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
