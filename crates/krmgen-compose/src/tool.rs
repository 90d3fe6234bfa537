//! External tool execution
//!
//! Helm and kubectl are driven as child processes. The [`ToolRunner`] seam
//! lets tests record invocations instead of spawning anything.

use std::process::Command;

use crate::error::{ComposeError, Result};

pub const DEFAULT_HELM: &str = "helm";
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// Captured output of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`.
    ///
    /// A non-zero exit status is an error carrying the captured stderr.
    fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput>;
}

/// Spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        tracing::debug!("running {} {}", program, redact(args).join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ComposeError::ToolSpawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ComposeError::ToolFailed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Executables used by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub helm: String,
    pub kubectl: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            helm: DEFAULT_HELM.to_string(),
            kubectl: DEFAULT_KUBECTL.to_string(),
        }
    }
}

/// Arguments safe to log, the value following `--password` is masked
pub fn redact(args: &[String]) -> Vec<String> {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            masked.push("******".to_string());
        } else {
            masked.push(arg.clone());
        }
        hide_next = arg == "--password";
    }
    masked
}
