//! Startup capability check for the Python toolchain.
//!
//! The export and conversion stages run inside the operator's Python
//! interpreter, so the pipeline probes the required packages once up front
//! and reports everything that is missing in one structured list. Nothing
//! is installed automatically; the operator gets an install hint and the
//! process stops before any prompt or download.

use tokio::process::Command;
use tracing::debug;

use crate::error::{ConvertError, Result};

/// A Python package the pipeline cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Torch,
    Transformers,
    TensorFlow,
    Onnx,
}

impl Capability {
    /// All required capabilities, probed in this order.
    pub const REQUIRED: [Capability; 4] = [
        Capability::Torch,
        Capability::Transformers,
        Capability::TensorFlow,
        Capability::Onnx,
    ];

    /// Importable module name.
    pub fn module_name(&self) -> &'static str {
        match self {
            Capability::Torch => "torch",
            Capability::Transformers => "transformers",
            Capability::TensorFlow => "tensorflow",
            Capability::Onnx => "onnx",
        }
    }

    /// Package name as passed to pip (identical to the module name for all
    /// four required packages).
    pub fn pip_name(&self) -> &'static str {
        self.module_name()
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.module_name())
    }
}

/// Outcome of the startup capability check.
#[derive(Debug, Clone, Default)]
pub struct CapabilityReport {
    /// Required packages that failed to import, in probe order.
    pub missing: Vec<Capability>,
}

impl CapabilityReport {
    pub fn all_present(&self) -> bool {
        self.missing.is_empty()
    }

    /// One-line install hint for everything that is missing.
    pub fn install_hint(&self) -> String {
        let names: Vec<&str> = self.missing.iter().map(|c| c.pip_name()).collect();
        format!("pip install {}", names.join(" "))
    }

    /// Convert to an error when anything is missing.
    pub fn into_result(self) -> Result<()> {
        if self.all_present() {
            Ok(())
        } else {
            Err(ConvertError::MissingCapabilities {
                missing: self.missing,
            })
        }
    }
}

/// Probe whether a module is importable in the given interpreter.
///
/// Returns `PythonNotFound` when the interpreter itself cannot be spawned.
async fn probe_module(python: &str, module: &str) -> Result<bool> {
    let output = Command::new(python)
        .args(["-c", &format!("import {module}")])
        .output()
        .await
        .map_err(|_| ConvertError::PythonNotFound {
            exe: python.to_string(),
        })?;

    if !output.status.success() {
        debug!(
            "import {} failed: {}",
            module,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.status.success())
}

/// Run the startup capability check against `python`.
pub async fn check_capabilities(python: &str) -> Result<CapabilityReport> {
    let mut missing = Vec::new();
    for capability in Capability::REQUIRED {
        if !probe_module(python, capability.module_name()).await? {
            missing.push(capability);
        }
    }
    Ok(CapabilityReport { missing })
}

/// Probe a single optional module (used by conversion backends).
pub async fn module_available(python: &str, module: &str) -> bool {
    probe_module(python, module).await.unwrap_or(false)
}
