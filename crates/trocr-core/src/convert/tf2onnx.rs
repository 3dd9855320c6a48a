//! tf2onnx conversion backend.
//!
//! tf2onnx converts TensorFlow graphs *to* ONNX — the opposite of what this
//! stage needs. The backend exists so the availability probe and the typed
//! failure show up in the conversion report instead of silently skipping a
//! tool operators often expect to help here.

use std::path::Path;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::capability;
use crate::error::{ConvertError, Result};
use crate::progress::ProgressTracker;
use crate::types::MobileArtifact;

use super::{MobileBackend, MobileOutputPaths};

pub struct Tf2OnnxBackend {
    python: String,
}

impl Tf2OnnxBackend {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl MobileBackend for Tf2OnnxBackend {
    fn name(&self) -> &'static str {
        "tf2onnx"
    }

    async fn is_available(&self) -> bool {
        capability::module_available(&self.python, "tf2onnx").await
    }

    async fn convert(
        &self,
        _onnx_path: &Path,
        _paths: &MobileOutputPaths,
        _progress: &ProgressTracker,
        _cancel_token: &CancellationToken,
    ) -> Result<MobileArtifact> {
        Err(ConvertError::BackendUnsupported {
            backend: "tf2onnx".to_string(),
            message: "tf2onnx converts TensorFlow graphs to ONNX, not the reverse".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_convert_always_reports_unsupported() {
        let backend = Tf2OnnxBackend::new("python3");
        let paths = MobileOutputPaths {
            saved_model_dir: PathBuf::from("trocr_tf_model"),
            tflite_path: PathBuf::from("trocr_model.tflite"),
        };

        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let err = backend
            .convert(Path::new("trocr_model.onnx"), &paths, &progress, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::BackendUnsupported { .. }));
        assert!(err.is_soft());
    }

    #[tokio::test]
    async fn test_unavailable_with_missing_interpreter() {
        let backend = Tf2OnnxBackend::new("/nonexistent/python-interpreter");
        assert!(!backend.is_available().await);
    }
}
