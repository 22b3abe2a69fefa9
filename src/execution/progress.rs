//! Progress tracking for a harness run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A step of one run, in the order the harness performs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The input image has been decoded.
    Decoded,
    /// A backend instance has been created.
    BackendSelected,
    /// The transform has been invoked.
    Invoked,
    /// Timings have been collected.
    Timed,
    /// The output image has been written.
    Encoded,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Decoded,
        Stage::BackendSelected,
        Stage::Invoked,
        Stage::Timed,
        Stage::Encoded,
    ];

    /// Position of this stage in [`Stage::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decoded => "decoded",
            Stage::BackendSelected => "backend selected",
            Stage::Invoked => "invoked",
            Stage::Timed => "timed",
            Stage::Encoded => "encoded",
        };
        f.write_str(name)
    }
}

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum StageUpdate {
    /// The run has started.
    Started,
    /// A stage has completed.
    StageCompleted {
        /// Stage that finished.
        stage: Stage,
        /// Milliseconds since the run started.
        elapsed_ms: u64,
        /// Zero-based position of the stage.
        index: usize,
        /// Number of stages in a run.
        total: usize,
    },
    /// The run has completed.
    Completed {
        /// Milliseconds for the whole run.
        total_duration_ms: u64,
    },
    /// The run failed after the last completed stage.
    Error {
        /// Last stage that completed, if any.
        last_stage: Option<Stage>,
        /// Error text.
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(StageUpdate) + Send + Sync>;

/// Tracks how far a run has progressed.
pub struct ProgressTracker {
    /// Number of stages completed.
    completed: AtomicU64,
    /// Start time.
    start_time: Option<Instant>,
    /// Progress callback.
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            start_time: None,
            callback: None,
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start tracking.
    pub fn start(&mut self) {
        self.completed.store(0, Ordering::Relaxed);
        self.start_time = Some(Instant::now());
        self.send_update(StageUpdate::Started);
    }

    /// Report that a stage has completed.
    pub fn stage_completed(&self, stage: Stage) {
        let index = self.completed.fetch_add(1, Ordering::Relaxed) as usize + 1;
        log::info!("Stage {}/{}: {}", index, Stage::ALL.len(), stage);

        self.send_update(StageUpdate::StageCompleted {
            stage,
            elapsed_ms: self.elapsed_ms(),
            index,
            total: Stage::ALL.len(),
        });
    }

    /// Report an error.
    pub fn report_error(&self, message: String) {
        self.send_update(StageUpdate::Error {
            last_stage: self.last_stage(),
            message,
        });
    }

    /// Complete tracking.
    pub fn complete(&self) {
        self.send_update(StageUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
        });
    }

    /// Release the callback so it can be reused for the next run.
    pub fn into_callback(self) -> Option<ProgressCallback> {
        self.callback
    }

    /// The most recently completed stage.
    pub fn last_stage(&self) -> Option<Stage> {
        let completed = self.completed.load(Ordering::Relaxed) as usize;
        completed.checked_sub(1).and_then(|i| Stage::ALL.get(i).copied())
    }

    /// Get current progress percentage.
    pub fn progress_percent(&self) -> f32 {
        let completed = self.completed.load(Ordering::Relaxed);
        (completed as f32 / Stage::ALL.len() as f32) * 100.0
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn send_update(&self, update: StageUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_stage_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
        assert_eq!(Stage::BackendSelected.to_string(), "backend selected");
    }

    #[test]
    fn test_progress_calculation() {
        let mut tracker = ProgressTracker::new();
        tracker.start();
        assert_eq!(tracker.progress_percent(), 0.0);
        assert_eq!(tracker.last_stage(), None);

        tracker.stage_completed(Stage::Decoded);
        tracker.stage_completed(Stage::BackendSelected);
        assert_eq!(tracker.progress_percent(), 40.0);
        assert_eq!(tracker.last_stage(), Some(Stage::BackendSelected));
    }

    #[test]
    fn test_callback_invoked() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();

        let mut tracker = ProgressTracker::new().with_callback(Box::new(move |update| {
            sink.lock().unwrap().push(update);
        }));

        tracker.start();
        tracker.stage_completed(Stage::Decoded);
        tracker.report_error("boom".to_string());

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0], StageUpdate::Started);
        assert!(matches!(
            updates[1],
            StageUpdate::StageCompleted { stage: Stage::Decoded, index: 1, total: 5, .. }
        ));
        assert!(matches!(
            &updates[2],
            StageUpdate::Error { last_stage: Some(Stage::Decoded), message } if message == "boom"
        ));
    }
}
