//! # scanlink client
//!
//! The acquisition side of scanlink:
//! - [`MultiSensorCoordinator`]: polls several independently clocked devices,
//!   one worker thread per device, with a shared per-cycle capture time
//! - [`SampleSink`]: where batches go, plus in-process sinks
//! - [`StopSignal`]: cooperative stop request checked once per cycle
//! - [`run_single`] / [`run_coordinated`]: acquisition loops that close every
//!   session on exit
//!
//! # Example
//!
//! ```no_run
//! use scanlink_client::{AcquisitionLimits, CollectingSink, StopSignal, run_single};
//! use scanlink_driver::{DeviceConfig, ScanStream, TransportCandidate, TransportLeases};
//! # fn driver() -> Box<dyn scanlink_driver::ScanDriver> { unimplemented!() }
//!
//! let config = DeviceConfig::ranging(TransportCandidate::new("/dev/ttyUSB0", 230_400));
//! let mut stream = ScanStream::connect(driver(), config, &TransportLeases::new())?;
//!
//! let mut sink = CollectingSink::new();
//! let stop = StopSignal::new();
//! let summary = run_single(&mut stream, &mut sink, &AcquisitionLimits::scans(100), &stop)?;
//! println!("{} batches", summary.batches);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acquisition;
pub mod coordinator;
pub mod sink;
pub mod stop;
mod thread;

pub use acquisition::{
    AcquisitionError, AcquisitionLimits, AcquisitionSummary, StopReason, run_coordinated,
    run_single,
};
pub use coordinator::{
    CoordinatorConfig, CoordinatorError, MultiSensorCoordinator, PartialSensorLoss, PollCycle,
    PollResult,
};
pub use sink::{ChannelSink, CollectingSink, FanOutSink, SampleSink};
pub use stop::StopSignal;
