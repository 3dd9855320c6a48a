//! Pipeline orchestrator.
//!
//! Runs the stages in order: capability check, model acquisition, ONNX
//! export, mobile-format conversion, result assembly. Error handling is
//! tiered: missing capabilities and download failures abort the run, an
//! export failure propagates to the caller, and conversion failures only
//! degrade the outcome to `mobile: None`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::capability::{self, CapabilityReport};
use crate::config::{ExportConfig, PipelineConfig};
use crate::convert::{self, MobileBackend, MobileOutputPaths};
use crate::error::{ConvertError, Result};
use crate::export::OnnxExporter;
use crate::hub::HubClient;
use crate::progress::{PipelineStage, ProgressTracker};
use crate::types::{ConversionRecord, MobileArtifact, PipelineOutcome};

/// One-shot conversion pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    cache_root: PathBuf,
    progress: Arc<ProgressTracker>,
    cancel_token: CancellationToken,
    hub: HubClient,
    exporter: OnnxExporter,
    backends: Vec<Box<dyn MobileBackend>>,
}

impl Pipeline {
    /// Build a pipeline from explicit configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let cache_root = config.resolve_cache_dir()?;
        let hub = HubClient::new(&cache_root)?;
        let exporter = OnnxExporter::new(config.python.clone(), cache_root.clone());
        let backends = convert::default_backends(&config.python, &cache_root);

        Ok(Self {
            config,
            cache_root,
            progress: Arc::new(ProgressTracker::new()),
            cancel_token: CancellationToken::new(),
            hub,
            exporter,
            backends,
        })
    }

    /// Replace the conversion backend list (used by tests and embedders).
    pub fn with_backends(mut self, backends: Vec<Box<dyn MobileBackend>>) -> Self {
        self.backends = backends;
        self
    }

    /// Shared progress tracker for observers to poll.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    /// Cancellation token; wire this to a ctrl-c handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Run the startup capability check.
    ///
    /// Callers gate their prompts on this so a missing toolchain stops the
    /// process before any interaction.
    pub async fn verify_capabilities(&self) -> Result<CapabilityReport> {
        self.progress.set_stage(PipelineStage::CheckingCapabilities);
        capability::check_capabilities(&self.config.python).await
    }

    /// Run the full pipeline.
    pub async fn run(&self) -> Result<PipelineOutcome> {
        match self.run_stages().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Observers polling the tracker see the failure too.
                self.progress.set_error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_stages(&self) -> Result<PipelineOutcome> {
        // Re-verify so non-interactive embedders get the same gate.
        self.verify_capabilities().await?.into_result()?;
        self.cancel_token.check()?;

        // Model acquisition: failure here is fatal.
        self.progress.set_stage(PipelineStage::Downloading);
        let model_dir = self
            .hub
            .fetch_model(
                self.config.model.repo_id(),
                &self.progress,
                &self.cancel_token,
            )
            .await?;

        // Interchange export: failure propagates to the caller.
        let onnx = self
            .exporter
            .export(
                &model_dir,
                &self.config.onnx_path,
                &self.progress,
                &self.cancel_token,
            )
            .await?;

        // Mobile-format conversion: best-effort.
        let paths = MobileOutputPaths {
            saved_model_dir: self.config.saved_model_dir.clone(),
            tflite_path: self.config.tflite_path.clone(),
        };
        let mobile = convert::convert_with_backends(
            &self.backends,
            &onnx.path,
            &paths,
            &self.progress,
            &self.cancel_token,
        )
        .await?;

        match &mobile {
            Some(artifact) => {
                if let Err(e) = self.write_conversion_record(artifact) {
                    warn!("Failed to write conversion record: {}", e);
                }
                info!(
                    "Conversion completed: {} ({} bytes)",
                    artifact.path.display(),
                    artifact.size_bytes
                );
            }
            None => {
                info!(
                    "Mobile-format conversion incomplete; ONNX artifact kept at {}",
                    onnx.path.display()
                );
            }
        }

        self.progress.set_stage(PipelineStage::Completed);
        Ok(PipelineOutcome { onnx, mobile })
    }

    /// Write the provenance record next to the mobile artifact.
    fn write_conversion_record(&self, artifact: &MobileArtifact) -> Result<PathBuf> {
        let record = ConversionRecord {
            source_repo: self.config.model.repo_id().to_string(),
            onnx_opset: ExportConfig::OPSET_VERSION,
            input_shape: [
                ExportConfig::INPUT_BATCH,
                ExportConfig::INPUT_CHANNELS,
                ExportConfig::INPUT_HEIGHT,
                ExportConfig::INPUT_WIDTH,
            ],
            backend: artifact.backend.to_string(),
            conversion_date: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let record_path = record_path_for(&artifact.path);
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&record_path, json)
            .map_err(|e| ConvertError::io("writing conversion record", &record_path, e))?;
        Ok(record_path)
    }

    /// Cache root in use (models and deployed scripts live under it).
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

/// Sidecar path for the provenance record (`trocr_model.tflite.json`).
fn record_path_for(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "model".to_string());
    name.push_str(".json");
    artifact_path.with_file_name(name)
}
