//! Shared types for the conversion pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The three pretrained TrOCR checkpoints the pipeline knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    /// English handwritten model (default).
    #[default]
    BaseHandwritten,
    /// English printed-text model.
    BasePrinted,
    /// Small English handwritten model.
    SmallHandwritten,
}

impl ModelChoice {
    /// HuggingFace repository id for this checkpoint.
    pub fn repo_id(&self) -> &'static str {
        match self {
            ModelChoice::BaseHandwritten => "microsoft/trocr-base-handwritten",
            ModelChoice::BasePrinted => "microsoft/trocr-base-printed",
            ModelChoice::SmallHandwritten => "microsoft/trocr-small-handwritten",
        }
    }

    /// Short human-readable description for menus.
    pub fn description(&self) -> &'static str {
        match self {
            ModelChoice::BaseHandwritten => "English handwritten",
            ModelChoice::BasePrinted => "English printed text",
            ModelChoice::SmallHandwritten => "small English handwritten",
        }
    }

    /// Map an interactive menu answer to a choice.
    ///
    /// "2" selects the printed-text model, "3" the small handwritten model;
    /// anything else (including empty input) selects the default.
    pub fn from_menu_choice(input: &str) -> Self {
        match input.trim() {
            "2" => ModelChoice::BasePrinted,
            "3" => ModelChoice::SmallHandwritten,
            _ => ModelChoice::BaseHandwritten,
        }
    }
}

impl std::fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repo_id())
    }
}

/// The exported ONNX interchange artifact.
#[derive(Debug, Clone)]
pub struct OnnxArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// The final mobile-format artifact.
#[derive(Debug, Clone)]
pub struct MobileArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Name of the backend that produced the file.
    pub backend: &'static str,
}

/// Result of a full pipeline run.
///
/// The ONNX stage is mandatory; the mobile stage is best-effort and `None`
/// when every conversion backend reported failure.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub onnx: OnnxArtifact,
    pub mobile: Option<MobileArtifact>,
}

/// Provenance record written next to a successfully converted model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversionRecord {
    /// Source repository id on the hub.
    pub source_repo: String,
    /// ONNX opset used for the export.
    pub onnx_opset: u32,
    /// Dummy input shape used for tracing, `[batch, channels, height, width]`.
    pub input_shape: [u64; 4],
    /// Backend that produced the mobile artifact.
    pub backend: String,
    /// ISO 8601 timestamp of the conversion.
    pub conversion_date: String,
    /// Version of this tool.
    pub tool_version: String,
}

/// JSON progress line emitted by the Python subprocesses on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptProgressLine {
    pub stage: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub output_size: Option<u64>,
}

/// Format a byte count as megabytes with two decimal places.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_choice_mapping() {
        assert_eq!(ModelChoice::from_menu_choice("2"), ModelChoice::BasePrinted);
        assert_eq!(
            ModelChoice::from_menu_choice("3"),
            ModelChoice::SmallHandwritten
        );
        // Default on "1", empty, whitespace, and garbage input.
        assert_eq!(ModelChoice::from_menu_choice("1"), ModelChoice::BaseHandwritten);
        assert_eq!(ModelChoice::from_menu_choice(""), ModelChoice::BaseHandwritten);
        assert_eq!(ModelChoice::from_menu_choice("  "), ModelChoice::BaseHandwritten);
        assert_eq!(ModelChoice::from_menu_choice("4"), ModelChoice::BaseHandwritten);
        assert_eq!(ModelChoice::from_menu_choice("abc"), ModelChoice::BaseHandwritten);
        // Trimmed before matching.
        assert_eq!(ModelChoice::from_menu_choice(" 2 "), ModelChoice::BasePrinted);
    }

    #[test]
    fn test_repo_ids() {
        assert_eq!(
            ModelChoice::BaseHandwritten.repo_id(),
            "microsoft/trocr-base-handwritten"
        );
        assert_eq!(
            ModelChoice::BasePrinted.repo_id(),
            "microsoft/trocr-base-printed"
        );
        assert_eq!(
            ModelChoice::SmallHandwritten.repo_id(),
            "microsoft/trocr-small-handwritten"
        );
    }

    #[test]
    fn test_format_size_mb() {
        assert_eq!(format_size_mb(0), "0.00");
        assert_eq!(format_size_mb(1024 * 1024), "1.00");
        assert_eq!(format_size_mb(1536 * 1024), "1.50");
        // 150 MB model, the typical size range for a TrOCR export.
        assert_eq!(format_size_mb(150 * 1024 * 1024), "150.00");
        assert_eq!(format_size_mb(1_000_000), "0.95");
    }

    #[test]
    fn test_progress_line_parses_with_missing_fields() {
        let line: ScriptProgressLine =
            serde_json::from_str(r#"{"stage": "exporting"}"#).unwrap();
        assert_eq!(line.stage, "exporting");
        assert!(line.message.is_none());

        let line: ScriptProgressLine = serde_json::from_str(
            r#"{"stage": "complete", "output_path": "trocr_model.onnx", "output_size": 42}"#,
        )
        .unwrap();
        assert_eq!(line.output_size, Some(42));
    }
}
