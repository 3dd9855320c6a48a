//! onnx-tf conversion backend.
//!
//! The working path to a mobile artifact: load the ONNX graph, prepare a
//! TensorFlow representation with onnx-tf, export a SavedModel directory,
//! then run the TFLite converter with default (quantizing) optimizations.
//! All of that happens inside the embedded Python script; this module
//! manages the subprocess and validates the artifact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::cancel::CancellationToken;
use crate::capability;
use crate::error::{ConvertError, Result};
use crate::progress::{PipelineStage, ProgressTracker};
use crate::scripts;
use crate::subprocess;
use crate::types::MobileArtifact;

use super::{MobileBackend, MobileOutputPaths};

pub struct OnnxTfBackend {
    python: String,
    cache_root: PathBuf,
}

impl OnnxTfBackend {
    pub fn new(python: impl Into<String>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            cache_root: cache_root.into(),
        }
    }
}

#[async_trait]
impl MobileBackend for OnnxTfBackend {
    fn name(&self) -> &'static str {
        "onnx-tf"
    }

    async fn is_available(&self) -> bool {
        capability::module_available(&self.python, "onnx_tf").await
    }

    async fn convert(
        &self,
        onnx_path: &Path,
        paths: &MobileOutputPaths,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<MobileArtifact> {
        scripts::ensure_scripts_deployed(&self.cache_root)?;
        progress.set_stage(PipelineStage::Converting);

        let script = scripts::scripts_dir(&self.cache_root).join(scripts::TFLITE_SCRIPT_NAME);
        info!(
            "Converting {} to TFLite via onnx-tf",
            onnx_path.display()
        );

        let mut child = subprocess::spawn_python(
            &self.python,
            &script,
            [
                "--input".to_string(),
                onnx_path.to_string_lossy().to_string(),
                "--saved-model-dir".to_string(),
                paths.saved_model_dir.to_string_lossy().to_string(),
                "--output".to_string(),
                paths.tflite_path.to_string_lossy().to_string(),
            ],
        )
        .map_err(|e| ConvertError::ConversionFailed {
            backend: "onnx-tf".to_string(),
            message: format!("failed to spawn conversion process: {e}"),
        })?;

        subprocess::stream_output(&mut child, "onnx-tf", progress, cancel_token).await?;
        subprocess::wait_and_check_exit(&mut child, "onnx-tf", progress, |message| {
            ConvertError::ConversionFailed {
                backend: "onnx-tf".to_string(),
                message,
            }
        })
        .await?;

        let size_bytes = std::fs::metadata(&paths.tflite_path)
            .map_err(|e| ConvertError::ConversionFailed {
                backend: "onnx-tf".to_string(),
                message: format!(
                    "conversion reported success but {} is missing: {e}",
                    paths.tflite_path.display()
                ),
            })?
            .len();

        Ok(MobileArtifact {
            path: paths.tflite_path.clone(),
            size_bytes,
            backend: self.name(),
        })
    }
}
