//! Device configuration
//!
//! A `DeviceConfig` is validated once, when a session is configured, and is
//! immutable for the rest of that session's life.

use scanlink_protocol::{DeviceKind, DeviceTag, DistanceUnit};
use scanlink_transport::{DriverSettings, TransportCandidate};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors (caller mistakes, never retried)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No transport configured")]
    MissingTransport,

    #[error("Transport path is empty")]
    EmptyTransportPath,

    #[error("Bit rate must be non-zero")]
    ZeroBitRate,

    #[error("{field} must be a finite value > 0 (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be a finite value >= 0 (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("Invalid {field} range: min {min} must be below max {max}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Angle window [{min}, {max}] exceeds [-180, 180]")]
    AngleOutOfBounds { min: f64, max: f64 },

    #[error("{field} must be non-zero")]
    ZeroDuration { field: &'static str },

    #[error("auto_reconnect needs at least one reconnect attempt")]
    NoReconnectAttempts,

    #[error("Driver rejected the configuration: {0}")]
    Rejected(String),
}

/// Configuration of one scan device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Required at configure time
    pub transport: Option<TransportCandidate>,
    /// Device tag for output batches (defaults to the transport path)
    pub tag: Option<String>,
    pub device_kind: DeviceKind,
    pub scan_frequency_hz: f64,
    /// Sample rate in kHz
    pub sample_rate: f64,
    pub angle_min_deg: f64,
    pub angle_max_deg: f64,
    pub range_min_m: f64,
    pub range_max_m: f64,
    /// Samples at or below this distance are noise
    pub noise_floor_m: f64,
    pub distance_unit: DistanceUnit,
    pub single_channel: bool,
    pub intensity: bool,
    pub fixed_angle: bool,
    pub reversed: bool,
    pub auto_reconnect: bool,
    /// Total open/start attempts of one reconnect
    pub max_reconnect_attempts: u32,
    /// Extra `start()` attempts when the device reports busy
    pub busy_retries: u32,
    pub retry_delay: Duration,
    /// Bound for blocking driver calls (open/start)
    pub io_timeout: Duration,
    /// Settle time after sampling starts
    pub warmup: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            transport: None,
            tag: None,
            device_kind: DeviceKind::RangingSensor,
            scan_frequency_hz: 10.0,
            sample_rate: 5.0,
            angle_min_deg: -180.0,
            angle_max_deg: 180.0,
            range_min_m: 0.1,
            range_max_m: 16.0,
            noise_floor_m: 0.0,
            distance_unit: DistanceUnit::Auto,
            single_channel: false,
            intensity: false,
            fixed_angle: true,
            reversed: false,
            auto_reconnect: false,
            max_reconnect_attempts: 3,
            busy_retries: 2,
            retry_delay: Duration::from_millis(100),
            io_timeout: Duration::from_millis(500),
            warmup: Duration::ZERO,
        }
    }
}

impl DeviceConfig {
    /// Ranging sensor on a transport, defaults elsewhere
    pub fn ranging(transport: TransportCandidate) -> Self {
        Self::default().with_transport(transport)
    }

    /// Depth camera read as a virtual scan line
    ///
    /// 30 frames/s, 0.2–10 m, and a 2 s warm-up for the sensors to settle.
    pub fn depth_camera(transport: TransportCandidate) -> Self {
        Self::preset(DeviceKind::DepthCamera).with_transport(transport)
    }

    /// Defaults for a device kind, without a transport
    pub fn preset(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::RangingSensor => Self::default(),
            DeviceKind::DepthCamera => Self {
                device_kind: DeviceKind::DepthCamera,
                scan_frequency_hz: 30.0,
                range_min_m: 0.2,
                range_max_m: 10.0,
                distance_unit: DistanceUnit::Millimeters,
                warmup: Duration::from_secs(2),
                ..Self::default()
            },
        }
    }

    pub fn with_transport(mut self, transport: TransportCandidate) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.device_kind = kind;
        self
    }

    pub fn with_scan_frequency(mut self, hz: f64) -> Self {
        self.scan_frequency_hz = hz;
        self
    }

    pub fn with_range(mut self, min_m: f64, max_m: f64) -> Self {
        self.range_min_m = min_m;
        self.range_max_m = max_m;
        self
    }

    pub fn with_angle_window(mut self, min_deg: f64, max_deg: f64) -> Self {
        self.angle_min_deg = min_deg;
        self.angle_max_deg = max_deg;
        self
    }

    pub fn with_noise_floor(mut self, floor_m: f64) -> Self {
        self.noise_floor_m = floor_m;
        self
    }

    pub fn with_distance_unit(mut self, unit: DistanceUnit) -> Self {
        self.distance_unit = unit;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_busy_retries(mut self, retries: u32) -> Self {
        self.busy_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Device tag: explicit tag, else transport path
    pub fn device_tag(&self) -> DeviceTag {
        match (&self.tag, &self.transport) {
            (Some(tag), _) => DeviceTag::new(tag.clone()),
            (None, Some(t)) => DeviceTag::new(t.path.clone()),
            (None, None) => DeviceTag::new(self.device_kind.as_str()),
        }
    }

    /// Check every field; the first violation wins
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transport = self.transport.as_ref().ok_or(ConfigError::MissingTransport)?;
        if transport.path.trim().is_empty() {
            return Err(ConfigError::EmptyTransportPath);
        }
        if transport.bit_rate == 0 {
            return Err(ConfigError::ZeroBitRate);
        }

        positive("scan_frequency_hz", self.scan_frequency_hz)?;
        positive("sample_rate", self.sample_rate)?;

        if !self.angle_min_deg.is_finite() || !self.angle_max_deg.is_finite() {
            return Err(ConfigError::AngleOutOfBounds {
                min: self.angle_min_deg,
                max: self.angle_max_deg,
            });
        }
        if self.angle_min_deg < -180.0 || self.angle_max_deg > 180.0 {
            return Err(ConfigError::AngleOutOfBounds {
                min: self.angle_min_deg,
                max: self.angle_max_deg,
            });
        }
        if self.angle_min_deg >= self.angle_max_deg {
            return Err(ConfigError::InvalidRange {
                field: "angle",
                min: self.angle_min_deg,
                max: self.angle_max_deg,
            });
        }

        non_negative("range_min_m", self.range_min_m)?;
        positive("range_max_m", self.range_max_m)?;
        if self.range_min_m >= self.range_max_m {
            return Err(ConfigError::InvalidRange {
                field: "range",
                min: self.range_min_m,
                max: self.range_max_m,
            });
        }
        non_negative("noise_floor_m", self.noise_floor_m)?;

        if self.io_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "io_timeout",
            });
        }
        if self.auto_reconnect && self.max_reconnect_attempts == 0 {
            return Err(ConfigError::NoReconnectAttempts);
        }
        Ok(())
    }

    /// The part of the configuration the driver sees
    ///
    /// # Errors
    /// `ConfigError::MissingTransport` when no transport is set.
    pub fn driver_settings(&self) -> Result<DriverSettings, ConfigError> {
        let transport = self.transport.clone().ok_or(ConfigError::MissingTransport)?;
        Ok(DriverSettings {
            transport,
            device_kind: self.device_kind,
            scan_frequency_hz: self.scan_frequency_hz,
            sample_rate: self.sample_rate,
            angle_min_deg: self.angle_min_deg,
            angle_max_deg: self.angle_max_deg,
            range_min_m: self.range_min_m,
            range_max_m: self.range_max_m,
            single_channel: self.single_channel,
            intensity: self.intensity,
            fixed_angle: self.fixed_angle,
            reversed: self.reversed,
            io_timeout: self.io_timeout,
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}
