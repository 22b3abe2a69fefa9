//! Execution module.
//!
//! This module drives a single benchmark run and reports its progress.

pub mod harness;
pub mod progress;

pub use harness::{BenchmarkReport, Harness, Measurement, RunRequest};
pub use progress::{ProgressCallback, ProgressTracker, Stage, StageUpdate};
