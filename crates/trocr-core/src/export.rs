//! ONNX export stage.
//!
//! Serializes the downloaded checkpoint to an ONNX graph through the
//! embedded export script. This is the only stage whose failure propagates
//! out of the pipeline instead of degrading to a partial result: without
//! the interchange artifact nothing downstream can run.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::cancel::CancellationToken;
use crate::config::ExportConfig;
use crate::error::{ConvertError, Result};
use crate::progress::{PipelineStage, ProgressTracker};
use crate::scripts;
use crate::subprocess;
use crate::types::OnnxArtifact;

/// Exporter for the ONNX interchange stage.
pub struct OnnxExporter {
    python: String,
    cache_root: PathBuf,
}

impl OnnxExporter {
    pub fn new(python: impl Into<String>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            cache_root: cache_root.into(),
        }
    }

    /// Export the checkpoint in `model_dir` to `output`.
    ///
    /// Uses the fixed dummy input shape and declares batch size and output
    /// sequence length as dynamic axes. The seq2seq export path is known to
    /// be imperfect upstream; a failure here carries the script's own error
    /// message when one was reported.
    pub async fn export(
        &self,
        model_dir: &Path,
        output: &Path,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<OnnxArtifact> {
        scripts::ensure_scripts_deployed(&self.cache_root)?;
        progress.set_stage(PipelineStage::Exporting);

        let script = scripts::scripts_dir(&self.cache_root).join(scripts::EXPORT_SCRIPT_NAME);
        info!(
            "Exporting {} to ONNX (opset {})",
            model_dir.display(),
            ExportConfig::OPSET_VERSION
        );

        let mut child = subprocess::spawn_python(
            &self.python,
            &script,
            [
                "--model-dir".to_string(),
                model_dir.to_string_lossy().to_string(),
                "--output".to_string(),
                output.to_string_lossy().to_string(),
                "--height".to_string(),
                ExportConfig::INPUT_HEIGHT.to_string(),
                "--width".to_string(),
                ExportConfig::INPUT_WIDTH.to_string(),
                "--opset".to_string(),
                ExportConfig::OPSET_VERSION.to_string(),
            ],
        )
        .map_err(|e| ConvertError::ExportFailed {
            message: format!("failed to spawn export process: {e}"),
        })?;

        subprocess::stream_output(&mut child, "onnx-export", progress, cancel_token).await?;
        subprocess::wait_and_check_exit(&mut child, "onnx-export", progress, |message| {
            ConvertError::ExportFailed { message }
        })
        .await?;

        let size_bytes = std::fs::metadata(output)
            .map_err(|e| ConvertError::ExportFailed {
                message: format!("export reported success but {} is missing: {e}", output.display()),
            })?
            .len();
        if size_bytes == 0 {
            return Err(ConvertError::ExportFailed {
                message: format!("export produced an empty file: {}", output.display()),
            });
        }

        info!("ONNX model saved: {} ({} bytes)", output.display(), size_bytes);
        Ok(OnnxArtifact {
            path: output.to_path_buf(),
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_export_with_missing_interpreter_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let exporter = OnnxExporter::new("/nonexistent/python-interpreter", tmp.path());

        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let err = exporter
            .export(
                &tmp.path().join("model"),
                &tmp.path().join("trocr_model.onnx"),
                &progress,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::ExportFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_fails_when_no_artifact_is_produced() {
        // /bin/true exits 0 without writing anything; the missing artifact
        // must still be treated as a failure.
        let tmp = tempfile::tempdir().unwrap();
        let exporter = OnnxExporter::new("/bin/true", tmp.path());

        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let err = exporter
            .export(
                &tmp.path().join("model"),
                &tmp.path().join("trocr_model.onnx"),
                &progress,
                &cancel,
            )
            .await
            .unwrap_err();

        match err {
            ConvertError::ExportFailed { message } => {
                assert!(message.contains("missing"), "unexpected message: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
