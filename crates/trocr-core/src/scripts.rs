//! Embedded Python scripts and deployment utilities.
//!
//! The export and conversion stages are direct calls into torch/onnx-tf/
//! TensorFlow APIs, so they run as Python subprocesses. Scripts are stored
//! as string constants and written to the cache dir on first use or when
//! the embedded version changes (detected via hash comparison).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{ConvertError, Result};

/// Python script exporting a TrOCR checkpoint to ONNX.
///
/// TrOCR is a seq2seq model; tracing it through a single `torch.onnx.export`
/// call is documented as imperfect upstream, which is why the export failure
/// path carries remediation guidance instead of retrying.
pub const EXPORT_ONNX_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Export a TrOCR vision-encoder-decoder checkpoint to ONNX.

Loads the checkpoint from a local directory, traces it with a fixed-shape
dummy input, and declares batch size and output sequence length as dynamic
axes. Reports progress as JSON lines on stdout.
"""
import argparse
import json
import os
import sys

def progress(stage, **kwargs):
    """Emit a JSON progress line to stdout."""
    print(json.dumps({"stage": stage, **kwargs}), flush=True)

def main():
    parser = argparse.ArgumentParser(description="Export TrOCR to ONNX")
    parser.add_argument("--model-dir", required=True, help="Local checkpoint directory")
    parser.add_argument("--output", required=True, help="Output ONNX file path")
    parser.add_argument("--height", type=int, default=384)
    parser.add_argument("--width", type=int, default=384)
    parser.add_argument("--opset", type=int, default=14)
    args = parser.parse_args()

    try:
        import torch
        from transformers import VisionEncoderDecoderModel
    except ImportError as e:
        progress("error", message=f"Missing required package: {e}")
        sys.exit(1)

    try:
        progress("loading", message="Loading checkpoint...")
        model = VisionEncoderDecoderModel.from_pretrained(args.model_dir)
        model.eval()

        # TrOCR input format: (batch_size, 3, height, width)
        dummy_input = torch.randn(1, 3, args.height, args.width)

        progress("exporting", message="Running torch.onnx.export...")
        torch.onnx.export(
            model,
            dummy_input,
            args.output,
            input_names=["pixel_values"],
            output_names=["logits"],
            dynamic_axes={
                "pixel_values": {0: "batch_size"},
                "logits": {0: "batch_size", 1: "sequence_length"},
            },
            opset_version=args.opset,
            do_constant_folding=True,
        )

        output_size = os.path.getsize(args.output)
        progress("complete", output_path=args.output, output_size=output_size)
    except Exception as e:
        progress("error", message=str(e))
        sys.exit(1)

if __name__ == "__main__":
    main()
"#;

/// Python script converting an ONNX graph to TFLite via onnx-tf.
pub const ONNX_TO_TFLITE_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Convert an ONNX graph to a quantized TFLite model.

Loads the ONNX file, prepares a TensorFlow representation with onnx-tf,
exports it as a SavedModel directory, then runs the TFLite converter with
default optimizations. Reports progress as JSON lines on stdout.
"""
import argparse
import json
import sys

def progress(stage, **kwargs):
    """Emit a JSON progress line to stdout."""
    print(json.dumps({"stage": stage, **kwargs}), flush=True)

def main():
    parser = argparse.ArgumentParser(description="Convert ONNX to TFLite")
    parser.add_argument("--input", required=True, help="Input ONNX file path")
    parser.add_argument("--saved-model-dir", required=True, help="Intermediate SavedModel directory")
    parser.add_argument("--output", required=True, help="Output TFLite file path")
    args = parser.parse_args()

    try:
        import onnx
        import onnx_tf.backend
        import tensorflow as tf
    except ImportError as e:
        progress("error", message=f"Missing required package: {e}")
        sys.exit(1)

    try:
        progress("loading", message="Loading ONNX graph...")
        onnx_model = onnx.load(args.input)

        progress("preparing", message="Preparing TensorFlow representation...")
        tf_rep = onnx_tf.backend.prepare(onnx_model)

        progress("saving", message="Exporting SavedModel...")
        tf_rep.export_graph(args.saved_model_dir)

        progress("converting", message="Running TFLite converter...")
        converter = tf.lite.TFLiteConverter.from_saved_model(args.saved_model_dir)
        converter.optimizations = [tf.lite.Optimize.DEFAULT]
        tflite_model = converter.convert()

        progress("writing", message="Writing TFLite file...")
        with open(args.output, "wb") as f:
            f.write(tflite_model)

        import os
        output_size = os.path.getsize(args.output)
        progress("complete", output_path=args.output, output_size=output_size)
    except Exception as e:
        progress("error", message=str(e))
        sys.exit(1)

if __name__ == "__main__":
    main()
"#;

/// File name of the deployed export script.
pub const EXPORT_SCRIPT_NAME: &str = "export_trocr_to_onnx.py";

/// File name of the deployed TFLite conversion script.
pub const TFLITE_SCRIPT_NAME: &str = "convert_onnx_to_tflite.py";

/// Compute a short hash of a string for staleness checking.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

/// Path of the scripts directory under the cache root.
pub fn scripts_dir(cache_root: &Path) -> PathBuf {
    cache_root.join("scripts")
}

/// Deploy embedded scripts to disk if missing or outdated.
///
/// Uses a `.hash` sidecar file to detect when the embedded script has
/// changed and needs to be rewritten.
pub fn ensure_scripts_deployed(cache_root: &Path) -> Result<()> {
    let dir = scripts_dir(cache_root);
    std::fs::create_dir_all(&dir).map_err(|e| ConvertError::io("creating scripts dir", &dir, e))?;

    deploy_script(&dir, EXPORT_SCRIPT_NAME, EXPORT_ONNX_SCRIPT)?;
    deploy_script(&dir, TFLITE_SCRIPT_NAME, ONNX_TO_TFLITE_SCRIPT)?;

    info!("Conversion scripts deployed to {}", dir.display());
    Ok(())
}

fn deploy_script(dir: &Path, filename: &str, content: &str) -> Result<()> {
    let script_path = dir.join(filename);
    let hash_path = dir.join(format!("{filename}.hash"));
    let current_hash = content_hash(content);

    if script_path.exists() {
        if let Ok(stored_hash) = std::fs::read_to_string(&hash_path) {
            if stored_hash.trim() == current_hash {
                return Ok(());
            }
        }
    }

    std::fs::write(&script_path, content).map_err(|e| ConvertError::ScriptDeployFailed {
        message: format!("writing {}: {e}", script_path.display()),
    })?;
    std::fs::write(&hash_path, &current_hash).map_err(|e| ConvertError::ScriptDeployFailed {
        message: format!("writing {}: {e}", hash_path.display()),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_writes_scripts_and_sidecars() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_scripts_deployed(tmp.path()).unwrap();

        let dir = scripts_dir(tmp.path());
        assert!(dir.join(EXPORT_SCRIPT_NAME).is_file());
        assert!(dir.join(TFLITE_SCRIPT_NAME).is_file());
        assert!(dir.join(format!("{EXPORT_SCRIPT_NAME}.hash")).is_file());

        let deployed = std::fs::read_to_string(dir.join(EXPORT_SCRIPT_NAME)).unwrap();
        assert_eq!(deployed, EXPORT_ONNX_SCRIPT);
    }

    #[test]
    fn test_deploy_skips_when_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_scripts_deployed(tmp.path()).unwrap();

        let script = scripts_dir(tmp.path()).join(EXPORT_SCRIPT_NAME);
        let before = std::fs::metadata(&script).unwrap().modified().unwrap();
        ensure_scripts_deployed(tmp.path()).unwrap();
        let after = std::fs::metadata(&script).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_deploy_rewrites_on_content_change() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = scripts_dir(tmp.path());
        std::fs::create_dir_all(&dir).unwrap();

        // Simulate a stale deployment from an older build.
        std::fs::write(dir.join(EXPORT_SCRIPT_NAME), "print('old')").unwrap();
        std::fs::write(dir.join(format!("{EXPORT_SCRIPT_NAME}.hash")), "stale").unwrap();

        ensure_scripts_deployed(tmp.path()).unwrap();
        let deployed = std::fs::read_to_string(dir.join(EXPORT_SCRIPT_NAME)).unwrap();
        assert_eq!(deployed, EXPORT_ONNX_SCRIPT);
    }

    #[test]
    fn test_scripts_emit_expected_export_parameters() {
        // The export script must carry the fixed tensor names and dynamic axes.
        assert!(EXPORT_ONNX_SCRIPT.contains("pixel_values"));
        assert!(EXPORT_ONNX_SCRIPT.contains("logits"));
        assert!(EXPORT_ONNX_SCRIPT.contains("sequence_length"));
        assert!(EXPORT_ONNX_SCRIPT.contains("do_constant_folding=True"));
        assert!(ONNX_TO_TFLITE_SCRIPT.contains("tf.lite.Optimize.DEFAULT"));
    }
}
