//! Partition tracking, cursor codec, and the batch-streaming scan engine.

mod cursor;
pub mod scan;
mod set;

pub use cursor::ScanCursor;
pub use scan::{run_scan, ScanConfig, ScanMode, ScanOutcome, ScanPayload};
pub use set::PartitionSet;
