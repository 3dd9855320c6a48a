//! Centralized configuration for the conversion pipeline.
//!
//! Constant groups for network operations and export parameters, plus the
//! `PipelineConfig` struct the orchestrator is driven by. The interactive
//! CLI is only a thin layer that fills in a `PipelineConfig`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConvertError, Result};
use crate::types::ModelChoice;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "trocr-convert";
    pub const USER_AGENT: &'static str = "trocr-convert/0.1";
    /// Subdirectory of the user cache dir holding models and scripts.
    pub const CACHE_DIR_NAME: &'static str = "trocr-convert";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const HF_API_BASE: &'static str = "https://huggingface.co/api";
    pub const HF_HUB_BASE: &'static str = "https://huggingface.co";
}

/// Export parameters for the ONNX stage.
///
/// TrOCR takes a `(batch, 3, height, width)` pixel tensor; the checkpoint
/// processors are configured for 384x384 input. Batch size and output
/// sequence length are declared as dynamic axes.
pub struct ExportConfig;

impl ExportConfig {
    pub const INPUT_BATCH: u64 = 1;
    pub const INPUT_CHANNELS: u64 = 3;
    pub const INPUT_HEIGHT: u64 = 384;
    pub const INPUT_WIDTH: u64 = 384;
    pub const OPSET_VERSION: u32 = 14;
    pub const INPUT_NAME: &'static str = "pixel_values";
    pub const OUTPUT_NAME: &'static str = "logits";
    pub const DYNAMIC_BATCH_AXIS: &'static str = "batch_size";
    pub const DYNAMIC_SEQUENCE_AXIS: &'static str = "sequence_length";

    pub const DEFAULT_ONNX_PATH: &'static str = "trocr_model.onnx";
    pub const DEFAULT_SAVED_MODEL_DIR: &'static str = "trocr_tf_model";
    pub const DEFAULT_TFLITE_PATH: &'static str = "trocr_model.tflite";
}

/// Explicit configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Which pretrained checkpoint to convert.
    pub model: ModelChoice,
    /// Python interpreter used for the export and conversion subprocesses.
    pub python: String,
    /// Output path for the ONNX interchange artifact.
    pub onnx_path: PathBuf,
    /// Intermediate SavedModel directory used by the onnx-tf backend.
    pub saved_model_dir: PathBuf,
    /// Output path for the TFLite artifact.
    pub tflite_path: PathBuf,
    /// Override for the cache root (models and deployed scripts).
    pub cache_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: ModelChoice::default(),
            python: "python3".to_string(),
            onnx_path: PathBuf::from(ExportConfig::DEFAULT_ONNX_PATH),
            saved_model_dir: PathBuf::from(ExportConfig::DEFAULT_SAVED_MODEL_DIR),
            tflite_path: PathBuf::from(ExportConfig::DEFAULT_TFLITE_PATH),
            cache_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve the cache root, creating it if necessary.
    ///
    /// Defaults to `{user cache dir}/trocr-convert/`, falling back to
    /// `.trocr-convert/` in the working directory when the platform cache
    /// dir cannot be determined.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        let root = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .map(|d| d.join(AppConfig::CACHE_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", AppConfig::CACHE_DIR_NAME))),
        };
        std::fs::create_dir_all(&root)
            .map_err(|e| ConvertError::io("creating cache dir", &root, e))?;
        Ok(root)
    }
}
