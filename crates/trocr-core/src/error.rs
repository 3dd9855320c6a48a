//! Error types for the conversion pipeline.
//!
//! Every stage returns a typed error instead of relying on broad exception
//! capture; the orchestrator pattern-matches to decide which failures are
//! fatal and which degrade to a partial result.

use std::path::PathBuf;
use thiserror::Error;

use crate::capability::Capability;

/// Main error type for the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    // Capability errors
    #[error("missing Python packages: {}", format_capability_list(.missing))]
    MissingCapabilities { missing: Vec<Capability> },

    #[error("Python interpreter not found: {exe}")]
    PythonNotFound { exe: String },

    // Network errors
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("model repository not found on the hub: {repo_id}")]
    ModelNotFound { repo_id: String },

    #[error("no usable weights in {repo_id}: expected model.safetensors or pytorch_model.bin")]
    WeightsNotFound { repo_id: String },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Stage errors
    #[error("ONNX export failed: {message}")]
    ExportFailed { message: String },

    #[error("backend {backend} is unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("backend {backend} cannot perform this conversion: {message}")]
    BackendUnsupported { backend: String, message: String },

    #[error("mobile-format conversion failed in {backend}: {message}")]
    ConversionFailed { backend: String, message: String },

    #[error("script deployment failed: {message}")]
    ScriptDeployFailed { message: String },

    // Cancellation
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

fn format_capability_list(missing: &[Capability]) -> String {
    missing
        .iter()
        .map(|c| c.module_name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        ConvertError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ConvertError {
    fn from(err: reqwest::Error) -> Self {
        ConvertError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ConvertError {
    /// Create an IO error with operation and path context.
    pub fn io(context: &str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ConvertError::Io {
            message: format!("{context}: {err}"),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a download retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConvertError::Network { source, .. } => {
                source.as_ref().map_or(true, |e| !e.is_builder())
            }
            _ => false,
        }
    }

    /// Whether this failure only degrades the mobile-format stage.
    ///
    /// Soft failures leave the ONNX artifact intact; the orchestrator reports
    /// an incomplete conversion instead of aborting.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ConvertError::BackendUnavailable { .. }
                | ConvertError::BackendUnsupported { .. }
                | ConvertError::ConversionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_capabilities_display() {
        let err = ConvertError::MissingCapabilities {
            missing: vec![Capability::Torch, Capability::Onnx],
        };
        assert_eq!(err.to_string(), "missing Python packages: torch, onnx");
    }

    #[test]
    fn test_soft_classification() {
        assert!(ConvertError::ConversionFailed {
            backend: "onnx-tf".into(),
            message: "boom".into(),
        }
        .is_soft());
        assert!(ConvertError::BackendUnavailable {
            backend: "tf2onnx".into(),
            message: "not importable".into(),
        }
        .is_soft());
        assert!(!ConvertError::ExportFailed {
            message: "boom".into(),
        }
        .is_soft());
        assert!(!ConvertError::Cancelled.is_soft());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ConvertError::Network {
            message: "connection reset".into(),
            source: None,
        }
        .is_retryable());
        // A definitive HTTP failure (404 and friends) is not worth retrying.
        assert!(!ConvertError::DownloadFailed {
            url: "https://example.com/x".into(),
            message: "status 404".into(),
        }
        .is_retryable());
        assert!(!ConvertError::Cancelled.is_retryable());
        assert!(!ConvertError::ModelNotFound {
            repo_id: "microsoft/trocr-base-handwritten".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_io_helper_keeps_path() {
        let err = ConvertError::io(
            "creating cache dir",
            "/tmp/cache",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        match err {
            ConvertError::Io { path, .. } => {
                assert_eq!(path.as_deref(), Some(std::path::Path::new("/tmp/cache")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
