//! TrOCR Convert Core - Headless pipeline for converting TrOCR checkpoints
//! to mobile formats.
//!
//! This crate downloads a pretrained TrOCR checkpoint from the HuggingFace
//! Hub, exports it to ONNX through the operator's Python toolchain, and
//! tries an ordered list of backends to produce a TFLite artifact. It can
//! be driven programmatically without the interactive CLI.
//!
//! # Example
//!
//! ```rust,ignore
//! use trocr_core::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> trocr_core::Result<()> {
//!     let pipeline = Pipeline::new(PipelineConfig::default())?;
//!
//!     // Stop before doing any work if the Python toolchain is incomplete.
//!     pipeline.verify_capabilities().await?.into_result()?;
//!
//!     let outcome = pipeline.run().await?;
//!     println!("ONNX artifact: {}", outcome.onnx.path.display());
//!     if let Some(mobile) = outcome.mobile {
//!         println!("TFLite artifact: {}", mobile.path.display());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod capability;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod hub;
pub mod pipeline;
pub mod progress;
pub mod scripts;
pub mod subprocess;
pub mod types;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use capability::{check_capabilities, Capability, CapabilityReport};
pub use config::{AppConfig, ExportConfig, NetworkConfig, PipelineConfig};
pub use convert::{default_backends, MobileBackend, MobileOutputPaths, OnnxTfBackend, Tf2OnnxBackend};
pub use error::{ConvertError, Result};
pub use export::OnnxExporter;
pub use hub::HubClient;
pub use pipeline::Pipeline;
pub use progress::{PipelineProgress, PipelineStage, ProgressTracker};
pub use types::{
    format_size_mb, ConversionRecord, MobileArtifact, ModelChoice, OnnxArtifact, PipelineOutcome,
};
