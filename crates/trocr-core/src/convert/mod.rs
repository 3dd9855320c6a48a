//! Mobile-format conversion backends.
//!
//! The ONNX-to-TFLite step has no single reliable path, so conversion is an
//! ordered list of backends tried in priority order. Each backend reports a
//! typed success or failure; when every backend fails the stage degrades to
//! "no mobile artifact" instead of aborting the pipeline. Only cancellation
//! propagates as an error.

mod onnx_tf;
mod tf2onnx;

pub use onnx_tf::OnnxTfBackend;
pub use tf2onnx::Tf2OnnxBackend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::error::{ConvertError, Result};
use crate::progress::ProgressTracker;
use crate::types::MobileArtifact;

/// Output locations for the conversion stage.
#[derive(Debug, Clone)]
pub struct MobileOutputPaths {
    /// Intermediate SavedModel directory.
    pub saved_model_dir: PathBuf,
    /// Final TFLite file.
    pub tflite_path: PathBuf,
}

/// A converter from the ONNX interchange format to a mobile-format file.
#[async_trait]
pub trait MobileBackend: Send + Sync {
    /// Short backend name for logs and provenance.
    fn name(&self) -> &'static str;

    /// Whether the backend's Python module can be imported.
    async fn is_available(&self) -> bool;

    /// Convert `onnx_path` into a TFLite artifact.
    async fn convert(
        &self,
        onnx_path: &Path,
        paths: &MobileOutputPaths,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<MobileArtifact>;
}

/// The default backend priority order.
///
/// tf2onnx is probed first to mirror the conversion tools commonly
/// installed alongside TensorFlow, but it only converts in the opposite
/// direction; onnx-tf is the backend that can actually produce the
/// artifact.
pub fn default_backends(python: &str, cache_root: &Path) -> Vec<Box<dyn MobileBackend>> {
    vec![
        Box::new(Tf2OnnxBackend::new(python)),
        Box::new(OnnxTfBackend::new(python, cache_root)),
    ]
}

/// Try each backend in order; `Ok(None)` when none produced an artifact.
///
/// Backend failures are logged and swallowed — the mobile stage is
/// best-effort by design. Cancellation is the one failure that propagates.
pub async fn convert_with_backends(
    backends: &[Box<dyn MobileBackend>],
    onnx_path: &Path,
    paths: &MobileOutputPaths,
    progress: &ProgressTracker,
    cancel_token: &CancellationToken,
) -> Result<Option<MobileArtifact>> {
    for backend in backends {
        cancel_token.check()?;

        if !backend.is_available().await {
            info!("Backend {} is not available, skipping", backend.name());
            continue;
        }

        info!("Trying conversion backend: {}", backend.name());
        match backend.convert(onnx_path, paths, progress, cancel_token).await {
            Ok(artifact) => {
                info!(
                    "Backend {} produced {} ({} bytes)",
                    backend.name(),
                    artifact.path.display(),
                    artifact.size_bytes
                );
                return Ok(Some(artifact));
            }
            Err(ConvertError::Cancelled) => return Err(ConvertError::Cancelled),
            Err(e) => {
                warn!("Backend {} failed: {}", backend.name(), e);
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend {
        name: &'static str,
        available: bool,
        result: fn() -> Result<MobileArtifact>,
    }

    #[async_trait]
    impl MobileBackend for StubBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn convert(
            &self,
            _onnx_path: &Path,
            _paths: &MobileOutputPaths,
            _progress: &ProgressTracker,
            _cancel_token: &CancellationToken,
        ) -> Result<MobileArtifact> {
            (self.result)()
        }
    }

    fn paths() -> MobileOutputPaths {
        MobileOutputPaths {
            saved_model_dir: PathBuf::from("trocr_tf_model"),
            tflite_path: PathBuf::from("trocr_model.tflite"),
        }
    }

    fn ok_artifact() -> Result<MobileArtifact> {
        Ok(MobileArtifact {
            path: PathBuf::from("trocr_model.tflite"),
            size_bytes: 42,
            backend: "stub",
        })
    }

    fn failing() -> Result<MobileArtifact> {
        Err(ConvertError::ConversionFailed {
            backend: "stub".into(),
            message: "graph not supported".into(),
        })
    }

    #[tokio::test]
    async fn test_all_backends_failing_yields_none_not_err() {
        let backends: Vec<Box<dyn MobileBackend>> = vec![
            Box::new(StubBackend {
                name: "a",
                available: false,
                result: ok_artifact,
            }),
            Box::new(StubBackend {
                name: "b",
                available: true,
                result: failing,
            }),
        ];

        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let result = convert_with_backends(
            &backends,
            Path::new("trocr_model.onnx"),
            &paths(),
            &progress,
            &cancel,
        )
        .await
        .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_second_backend_succeeds_after_first_fails() {
        let backends: Vec<Box<dyn MobileBackend>> = vec![
            Box::new(StubBackend {
                name: "a",
                available: true,
                result: failing,
            }),
            Box::new(StubBackend {
                name: "b",
                available: true,
                result: ok_artifact,
            }),
        ];

        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let result = convert_with_backends(
            &backends,
            Path::new("trocr_model.onnx"),
            &paths(),
            &progress,
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(result.unwrap().size_bytes, 42);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let backends: Vec<Box<dyn MobileBackend>> = vec![Box::new(StubBackend {
            name: "a",
            available: true,
            result: ok_artifact,
        })];

        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = convert_with_backends(
            &backends,
            Path::new("trocr_model.onnx"),
            &paths(),
            &progress,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
    }

    #[tokio::test]
    async fn test_empty_backend_list_yields_none() {
        let backends: Vec<Box<dyn MobileBackend>> = vec![];
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let result = convert_with_backends(
            &backends,
            Path::new("trocr_model.onnx"),
            &paths(),
            &progress,
            &cancel,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }
}
