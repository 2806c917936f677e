//! Coordinator liveness and shutdown
//!
//! A stalled device must never hold back a healthy one, and a stop request
//! must close every device. Scan limits hold across devices.

use scanlink_client::{
    AcquisitionLimits, CollectingSink, CoordinatorConfig, MultiSensorCoordinator, PollResult,
    StopReason, StopSignal, run_coordinated,
};
use scanlink_driver::{DeviceConfig, ScanStream, TransportCandidate, TransportLeases};
use scanlink_transport::RawScan;
use scanlink_transport::mock::{MockDriver, MockHandle};
use std::time::{Duration, Instant};

fn connect(driver: MockDriver, path: &str, leases: &TransportLeases) -> (ScanStream, MockHandle) {
    let handle = driver.handle();
    let config = DeviceConfig::ranging(TransportCandidate::new(path, 115_200)).with_tag(path);
    let stream = ScanStream::connect(Box::new(driver), config, leases).unwrap();
    (stream, handle)
}

fn scan() -> RawScan {
    RawScan::from_pairs(&[(0.0, 1.0), (120.0, 2.0), (240.0, 3.0)])
}

#[test]
fn stalled_device_does_not_block_healthy_one() {
    let leases = TransportLeases::new();
    let (a, _a_handle) = connect(MockDriver::stalled(), "A", &leases);
    let (b, _b_handle) = connect(MockDriver::repeating(scan()), "B", &leases);

    let per_device_timeout = Duration::from_millis(40);
    let config = CoordinatorConfig {
        per_device_timeout,
        reply_grace: Duration::from_millis(20),
        loss_threshold: 3,
        ..CoordinatorConfig::default()
    };
    let mut coordinator = MultiSensorCoordinator::new(vec![a, b], config).unwrap();

    let mut losses = Vec::new();
    for _ in 0..5 {
        let started = Instant::now();
        let cycle = coordinator.poll_all(per_device_timeout);
        let elapsed = started.elapsed();

        assert!(
            elapsed < per_device_timeout + Duration::from_millis(200),
            "cycle took {:?}",
            elapsed
        );
        match cycle.result_for("B") {
            Some(PollResult::Batch(batch)) => {
                assert_eq!(batch.len(), 3);
                assert_eq!(batch.capture_time(), cycle.capture_time);
            },
            other => panic!("B delivered nothing: {:?}", other),
        }
        assert!(matches!(cycle.result_for("A"), Some(PollResult::NoData)));
        losses.extend(cycle.losses);
    }

    assert_eq!(losses.len(), 1);
    assert_eq!(losses[0].tag.as_str(), "A");
    assert_eq!(losses[0].consecutive_misses, 3);
}

#[test]
fn stop_signal_closes_every_session() {
    let leases = TransportLeases::new();
    let (a, a_handle) = connect(MockDriver::repeating(scan()), "/dev/ttyUSB0", &leases);
    let (b, b_handle) = connect(MockDriver::stalled(), "/dev/ttyUSB1", &leases);
    assert_eq!(leases.len(), 2);

    let mut coordinator =
        MultiSensorCoordinator::new(vec![a, b], CoordinatorConfig::default()).unwrap();
    let stop = StopSignal::new();
    let remote = stop.clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(60));
        remote.request_stop();
    });

    let mut sink = CollectingSink::new();
    let limits = AcquisitionLimits::unbounded()
        .with_read_timeout(Duration::from_millis(10))
        .with_cycle_interval(Duration::from_millis(1));
    let summary = run_coordinated(&mut coordinator, &mut sink, &limits, &stop).unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.reason, StopReason::Requested);
    assert!(summary.batches > 0);
    assert!(!a_handle.is_open() && !a_handle.is_started());
    assert!(!b_handle.is_open() && !b_handle.is_started());
    assert!(leases.is_empty());

    // Batches from one device keep their capture order
    let sequences: Vec<u64> = sink
        .batches()
        .iter()
        .filter(|b| b.device_tag().as_str() == "/dev/ttyUSB0")
        .map(|b| b.sequence())
        .collect();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn scan_limit_holds_across_devices() {
    let leases = TransportLeases::new();
    let (a, a_handle) = connect(MockDriver::repeating(scan()), "A", &leases);
    let (b, b_handle) = connect(MockDriver::repeating(scan()), "B", &leases);
    let mut coordinator =
        MultiSensorCoordinator::new(vec![a, b], CoordinatorConfig::default()).unwrap();
    let mut sink = CollectingSink::new();

    let limits = AcquisitionLimits::scans(3).with_cycle_interval(Duration::from_millis(1));
    let summary =
        run_coordinated(&mut coordinator, &mut sink, &limits, &StopSignal::new()).unwrap();

    assert_eq!(summary.reason, StopReason::MaxScans);
    assert_eq!(summary.batches, 3);
    assert_eq!(sink.len(), 3);
    assert!(!a_handle.is_open());
    assert!(!b_handle.is_open());
}
