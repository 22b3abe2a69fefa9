//! Benchmark harness.
//!
//! Runs one transform on one backend for one image: decode, select backend,
//! invoke under a wall clock, collect timings, encode. Every failure aborts
//! the run.

use crate::backend::{Backend, BackendKind, BackendRegistry};
use crate::core::error::{ImgtransError, ImgtransResult};
use crate::core::io;
use crate::core::transform::{Status, Surface, Transform, TransformOutput};
use crate::execution::progress::{ProgressCallback, ProgressTracker, Stage};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Transform and its parameter.
    pub transform: Transform,
    /// Backend to run it on.
    pub backend: BackendKind,
    /// Image to decode.
    pub input: PathBuf,
    /// Where the result is written.
    pub output: PathBuf,
}

/// Result of a single timed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// What the backend returned.
    pub output: TransformOutput,
    /// Time spent inside [`Backend::apply`], as seen by the caller.
    pub wall_clock: Duration,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkReport {
    /// Transform that ran.
    pub transform: Transform,
    /// Backend it ran on.
    pub backend: BackendKind,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Where the output lived.
    pub status: Status,
    /// Harness-measured time around the call.
    pub wall_clock_us: i64,
    /// Backend-measured time, or `-1` when the backend cannot measure it.
    pub device_us: i64,
}

impl BenchmarkReport {
    /// Serialize the report as a single JSON line.
    pub fn to_json(&self) -> ImgtransResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} ({}x{}): wall clock {} us, device {} us",
            self.transform, self.backend, self.width, self.height, self.wall_clock_us, self.device_us
        )
    }
}

/// Drives runs against a backend registry.
pub struct Harness {
    registry: BackendRegistry,
    progress: Option<ProgressCallback>,
}

impl Harness {
    /// Create a harness over the built-in backends.
    pub fn new() -> Self {
        Self {
            registry: BackendRegistry::with_builtins(),
            progress: None,
        }
    }

    /// Use a custom registry.
    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Receive a [`StageUpdate`](crate::execution::progress::StageUpdate) per stage.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Backends this harness selects from.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Time a single invocation of `transform` on `backend`.
    pub fn measure(
        backend: &dyn Backend,
        transform: Transform,
        surface: &mut Surface,
    ) -> ImgtransResult<Measurement> {
        let start = Instant::now();
        let output = backend.apply(transform, surface);
        let wall_clock = start.elapsed();

        Ok(Measurement {
            output: output?,
            wall_clock,
        })
    }

    /// Execute a full run and write the output file.
    pub fn run(&mut self, request: &RunRequest) -> ImgtransResult<BenchmarkReport> {
        let mut tracker = ProgressTracker::new();
        if let Some(callback) = self.progress.take() {
            tracker = tracker.with_callback(callback);
        }

        tracker.start();
        let result = self.run_stages(request, &tracker);
        match &result {
            Ok(_) => tracker.complete(),
            Err(err) => tracker.report_error(err.to_string()),
        }

        self.progress = tracker.into_callback();
        result
    }

    fn run_stages(&self, request: &RunRequest, tracker: &ProgressTracker) -> ImgtransResult<BenchmarkReport> {
        let mut surface = io::decode_surface(&request.input)?;
        tracker.stage_completed(Stage::Decoded);

        let backend = self.registry.create(request.backend)?;
        tracker.stage_completed(Stage::BackendSelected);

        log::debug!(
            "Running {} on the {} backend over {}x{}",
            request.transform,
            request.backend,
            surface.width(),
            surface.height()
        );
        let measurement = Self::measure(backend.as_ref(), request.transform, &mut surface)?;
        tracker.stage_completed(Stage::Invoked);

        let status = measurement.output.status;
        if status == Status::NoResult {
            return Err(ImgtransError::Unimplemented {
                transform: request.transform.kind(),
                backend: request.backend,
            });
        }

        let report = BenchmarkReport {
            transform: request.transform,
            backend: request.backend,
            width: surface.width(),
            height: surface.height(),
            status,
            wall_clock_us: measurement.wall_clock.as_micros().min(i64::MAX as u128) as i64,
            device_us: measurement.output.device_elapsed_micros(),
        };
        tracker.stage_completed(Stage::Timed);

        if let Some(image) = surface.into_output(status) {
            io::encode(&request.output, &image)?;
        }
        tracker.stage_completed(Stage::Encoded);

        Ok(report)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LibraryBackend, SequentialBackend};
    use crate::core::pixel::{pack, PixelBuffer};
    use crate::core::transform::{BlurArea, NOT_MEASURED};

    #[test]
    fn test_measure_reports_wall_clock_and_status() {
        let pixels = PixelBuffer::from_pixels(2, 1, vec![pack(1, 2, 3, 4), pack(5, 6, 7, 8)]).unwrap();
        let mut surface = Surface::from_pixels(pixels);

        let measurement = Harness::measure(&SequentialBackend, Transform::Swap, &mut surface).unwrap();
        assert_eq!(measurement.output.status, Status::Array);
        assert_eq!(measurement.output.device_elapsed_micros(), NOT_MEASURED);
        assert_eq!(surface.pixels.get(0, 0), pack(1, 3, 2, 4));
    }

    #[test]
    fn test_measure_propagates_no_result() {
        let mut surface = Surface::from_pixels(PixelBuffer::new(3, 3));
        let measurement = Harness::measure(&LibraryBackend, Transform::Emboss, &mut surface).unwrap();
        assert!(!measurement.output.has_result());
    }

    #[test]
    fn test_report_display_and_json() {
        let report = BenchmarkReport {
            transform: Transform::Blur { area: BlurArea::DEFAULT },
            backend: BackendKind::Parallel,
            width: 640,
            height: 480,
            status: Status::Array,
            wall_clock_us: 1500,
            device_us: NOT_MEASURED,
        };

        assert_eq!(
            report.to_string(),
            "blur(area=11) on parallel (640x480): wall clock 1500 us, device -1 us"
        );

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["transform"]["name"], "blur");
        assert_eq!(json["transform"]["area"], 11);
        assert_eq!(json["backend"], "parallel");
        assert_eq!(json["status"], "array");
        assert_eq!(json["device_us"], -1);
    }

    #[test]
    fn test_run_missing_input_is_decode_error() {
        let mut harness = Harness::new();
        let request = RunRequest {
            transform: Transform::Gray,
            backend: BackendKind::Sequential,
            input: PathBuf::from("/nonexistent/in.png"),
            output: PathBuf::from("/nonexistent/out.png"),
        };
        assert!(matches!(harness.run(&request), Err(ImgtransError::Decode { .. })));
    }
}
