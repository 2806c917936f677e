//! # scanlink protocol
//!
//! Data types exchanged between the acquisition layers (no hardware dependency).
//!
//! ## Modules
//!
//! - `kind`: device categories and device tags
//! - `raw`: driver-level scan records, as handed over by a vendor driver
//! - `sample`: normalized samples and per-cycle scan batches
//! - `time`: capture timestamps
//! - `units`: distance unit normalization
//! - `depth`: depth-row to virtual scan conversion
//!
//! ## Layering
//!
//! ```text
//! vendor driver ──RawScan──▶ ScanReader ──ScanBatch──▶ SampleSink
//!                  (raw)       (filter + units)          (consumer)
//! ```

pub mod depth;
pub mod kind;
pub mod raw;
pub mod sample;
pub mod time;
pub mod units;

pub use depth::{DepthRow, depth_row_to_scan};
pub use kind::{DeviceKind, DeviceTag, ParseDeviceKindError};
pub use raw::{RawPoint, RawScan};
pub use sample::{Sample, ScanBatch};
pub use time::CaptureTime;
pub use units::{
    DistanceUnit, MILLIMETER_HEURISTIC_THRESHOLD, ParseDistanceUnitError, normalize_distance,
};
