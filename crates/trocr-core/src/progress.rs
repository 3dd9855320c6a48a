//! Progress tracking for the single pipeline run.
//!
//! The pipeline updates a shared tracker; the CLI polls `snapshot()` and
//! renders transitions. Python subprocesses report through JSON lines on
//! stdout (see `ScriptProgressLine`).

use std::sync::Mutex;

use crate::types::ScriptProgressLine;

/// Coarse stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    CheckingCapabilities,
    Downloading,
    Exporting,
    Converting,
    Writing,
    Completed,
    Error,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::CheckingCapabilities => "checking capabilities",
            PipelineStage::Downloading => "downloading",
            PipelineStage::Exporting => "exporting",
            PipelineStage::Converting => "converting",
            PipelineStage::Writing => "writing",
            PipelineStage::Completed => "completed",
            PipelineStage::Error => "error",
        }
    }
}

/// Snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    pub stage: PipelineStage,
    /// Free-form detail for the current stage (script message, file name).
    pub message: Option<String>,
    /// File currently being downloaded.
    pub current_file: Option<String>,
    /// Bytes downloaded for the current file.
    pub bytes_downloaded: u64,
    /// Total bytes for the current file, when the server reports one.
    pub total_bytes: Option<u64>,
    /// Size of the artifact reported by a completed subprocess.
    pub output_size: Option<u64>,
    /// Error message when `stage == Error`.
    pub error: Option<String>,
}

impl Default for PipelineProgress {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Idle,
            message: None,
            current_file: None,
            bytes_downloaded: 0,
            total_bytes: None,
            output_size: None,
            error: None,
        }
    }
}

/// Thread-safe tracker shared between the pipeline and its observer.
#[derive(Default)]
pub struct ProgressTracker {
    state: Mutex<PipelineProgress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PipelineProgress {
        self.state.lock().expect("progress lock poisoned").clone()
    }

    /// Enter a new stage, clearing per-stage detail.
    pub fn set_stage(&self, stage: PipelineStage) {
        let mut state = self.state.lock().expect("progress lock poisoned");
        state.stage = stage;
        state.message = None;
        state.current_file = None;
        state.bytes_downloaded = 0;
        state.total_bytes = None;
    }

    /// Update download progress for a file.
    pub fn update_download(&self, file: &str, bytes_downloaded: u64, total_bytes: Option<u64>) {
        let mut state = self.state.lock().expect("progress lock poisoned");
        state.stage = PipelineStage::Downloading;
        state.current_file = Some(file.to_string());
        state.bytes_downloaded = bytes_downloaded;
        state.total_bytes = total_bytes;
    }

    /// Fold a subprocess JSON progress line into the state.
    ///
    /// Scripts report `loading`/`exporting`/`preparing`/`saving`/`converting`
    /// as work stages, `writing` when serializing output, `complete` with the
    /// artifact size, and `error` with a message.
    pub fn update_from_script(&self, line: &ScriptProgressLine) {
        let mut state = self.state.lock().expect("progress lock poisoned");
        match line.stage.as_str() {
            "loading" | "exporting" => {
                state.stage = PipelineStage::Exporting;
                state.message = line.message.clone();
            }
            "preparing" | "saving" | "converting" => {
                state.stage = PipelineStage::Converting;
                state.message = line.message.clone();
            }
            "writing" => {
                state.stage = PipelineStage::Writing;
                state.message = line.message.clone();
            }
            "complete" => {
                state.message = line.message.clone();
                state.output_size = line.output_size;
            }
            "error" => {
                state.stage = PipelineStage::Error;
                state.error = line.message.clone();
            }
            _ => {}
        }
    }

    pub fn set_error(&self, message: String) {
        let mut state = self.state.lock().expect("progress lock poisoned");
        state.stage = PipelineStage::Error;
        state.error = Some(message);
    }

    /// Error message reported by a subprocess, if any.
    pub fn script_error(&self) -> Option<String> {
        self.state
            .lock()
            .expect("progress lock poisoned")
            .error
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(stage: &str, message: Option<&str>, output_size: Option<u64>) -> ScriptProgressLine {
        ScriptProgressLine {
            stage: stage.to_string(),
            message: message.map(String::from),
            output_path: None,
            output_size,
        }
    }

    #[test]
    fn test_stage_transition_clears_detail() {
        let tracker = ProgressTracker::new();
        tracker.update_download("model.safetensors", 1024, Some(4096));
        tracker.set_stage(PipelineStage::Exporting);

        let snap = tracker.snapshot();
        assert_eq!(snap.stage, PipelineStage::Exporting);
        assert!(snap.current_file.is_none());
        assert_eq!(snap.bytes_downloaded, 0);
    }

    #[test]
    fn test_update_from_script_export_stages() {
        let tracker = ProgressTracker::new();
        tracker.update_from_script(&line("loading", Some("Loading checkpoint"), None));
        assert_eq!(tracker.snapshot().stage, PipelineStage::Exporting);

        tracker.update_from_script(&line("converting", Some("Building TF graph"), None));
        let snap = tracker.snapshot();
        assert_eq!(snap.stage, PipelineStage::Converting);
        assert_eq!(snap.message.as_deref(), Some("Building TF graph"));
    }

    #[test]
    fn test_update_from_script_complete_records_size() {
        let tracker = ProgressTracker::new();
        tracker.update_from_script(&line("complete", None, Some(157_286_400)));
        assert_eq!(tracker.snapshot().output_size, Some(157_286_400));
    }

    #[test]
    fn test_update_from_script_error() {
        let tracker = ProgressTracker::new();
        tracker.update_from_script(&line("error", Some("export is not supported"), None));
        let snap = tracker.snapshot();
        assert_eq!(snap.stage, PipelineStage::Error);
        assert_eq!(snap.error.as_deref(), Some("export is not supported"));
        assert_eq!(
            tracker.script_error().as_deref(),
            Some("export is not supported")
        );
    }

    #[test]
    fn test_unknown_stage_ignored() {
        let tracker = ProgressTracker::new();
        tracker.set_stage(PipelineStage::Exporting);
        tracker.update_from_script(&line("telemetry", None, None));
        assert_eq!(tracker.snapshot().stage, PipelineStage::Exporting);
    }
}
