//! Driver backends
//!
//! Vendor wire protocols are not part of this workspace: a hardware build
//! links a vendor `ScanDriver`. Without one, `--simulate` runs the whole
//! pipeline against simulated sensors.

use scanlink_driver::{DeviceKind, DriverFactory, ScanDriver, TransportCandidate, TransportError};
use scanlink_transport::mock::{MockBench, MockIdle, SyntheticDepthCamera, SyntheticRoom};
use scanlink_transport::{
    DeviceError, DeviceErrorKind, SerialPortEnumerator, StaticEnumerator, TransportEnumerator,
};
use std::time::Duration;

/// Bit rate every simulated sensor answers on
pub const SIMULATED_BIT_RATE: u32 = 115_200;

const SIMULATED_PORTS: [&str; 2] = ["/dev/ttyUSB0", "/dev/ttyUSB1"];

#[derive(Debug, Clone)]
pub enum Backend {
    Hardware,
    Simulated(MockBench, Vec<String>),
}

impl Backend {
    pub fn hardware() -> Self {
        Backend::Hardware
    }

    /// Simulated sensors on `ports` (two USB ports when empty)
    pub fn simulated(ports: &[String]) -> Self {
        let ports: Vec<String> = if ports.is_empty() {
            SIMULATED_PORTS.iter().map(|p| p.to_string()).collect()
        } else {
            ports.to_vec()
        };
        let bench = ports
            .iter()
            .fold(MockBench::new(), |bench, port| bench.responsive(port, SIMULATED_BIT_RATE));
        Backend::Simulated(bench, ports)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Backend::Simulated(..))
    }

    pub fn enumerator(&self, include_all: bool) -> Box<dyn TransportEnumerator> {
        match self {
            Backend::Hardware => Box::new(SerialPortEnumerator::new().include_all(include_all)),
            Backend::Simulated(_, ports) => Box::new(StaticEnumerator::new(ports.clone())),
        }
    }
}

impl DriverFactory for Backend {
    fn create(
        &self,
        candidate: &TransportCandidate,
        kind: DeviceKind,
    ) -> Result<Box<dyn ScanDriver>, TransportError> {
        match self {
            Backend::Hardware => Err(TransportError::Device(DeviceError::new(
                DeviceErrorKind::Backend,
                "no vendor scan driver is built into scanlink-cli",
            ))),
            Backend::Simulated(bench, _) => {
                let driver = bench.create(candidate, kind)?;
                if let Some(handle) = bench.handles_for(&candidate.path).last() {
                    let (idle, cadence) = match kind {
                        DeviceKind::RangingSensor => (
                            MockIdle::Synthetic(SyntheticRoom::default()),
                            Duration::from_millis(100),
                        ),
                        DeviceKind::DepthCamera => (
                            MockIdle::Depth(SyntheticDepthCamera::default()),
                            Duration::from_millis(33),
                        ),
                    };
                    handle.set_idle(idle);
                    handle.set_read_latency(cadence);
                }
                Ok(driver)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlink_driver::{DeviceConfig, Discovery, ScanStream, TransportLeases, TransportProbe};

    #[test]
    fn test_simulated_ports_default() {
        let backend = Backend::simulated(&[]);
        assert!(backend.is_simulated());
        assert_eq!(backend.enumerator(false).list().unwrap(), SIMULATED_PORTS.to_vec());
    }

    #[test]
    fn test_simulated_probe_finds_first_port() {
        let backend = Backend::simulated(&[]);
        let probe = TransportProbe::new(backend.clone())
            .with_enumerator(StaticEnumerator::new(SIMULATED_PORTS));
        assert_eq!(
            probe.discover(&[], &[]).unwrap(),
            Discovery::Found(TransportCandidate::new("/dev/ttyUSB0", SIMULATED_BIT_RATE))
        );
    }

    #[test]
    fn test_simulated_stream_delivers_room() {
        let backend = Backend::simulated(&["sim0".to_string()]);
        let candidate = TransportCandidate::new("sim0", SIMULATED_BIT_RATE);
        let driver = backend.create(&candidate, DeviceKind::RangingSensor).unwrap();
        let config = DeviceConfig::ranging(candidate);
        let mut stream = ScanStream::connect(driver, config, &TransportLeases::new()).unwrap();

        let batch = stream.next(Duration::from_millis(500)).unwrap().into_batch().unwrap();
        assert!(batch.len() > 300);
        assert!(batch.samples().iter().all(|s| s.distance_m < 5.0));
    }

    #[test]
    fn test_simulated_depth_camera_in_meters() {
        let backend = Backend::simulated(&["sim0".to_string()]);
        let candidate = TransportCandidate::new("sim0", SIMULATED_BIT_RATE);
        let driver = backend.create(&candidate, DeviceKind::DepthCamera).unwrap();
        let config = DeviceConfig::preset(DeviceKind::DepthCamera)
            .with_transport(candidate)
            .with_warmup(Duration::ZERO);
        let mut stream = ScanStream::connect(driver, config, &TransportLeases::new()).unwrap();

        let batch = stream.next(Duration::from_millis(500)).unwrap().into_batch().unwrap();
        assert!(batch.len() > 100);
        for sample in batch.samples() {
            assert!(sample.angle_deg.abs() <= 43.5 + 1e-9);
            assert!(sample.distance_m > 2.0 && sample.distance_m < 4.0);
        }
    }

    #[test]
    fn test_hardware_backend_refuses() {
        let candidate = TransportCandidate::new("/dev/ttyUSB0", 230_400);
        assert!(Backend::hardware().create(&candidate, DeviceKind::RangingSensor).is_err());
    }
}
