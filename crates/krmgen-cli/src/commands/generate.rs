//! Generate command - render a source directory to stdout

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use krmgen_compose::{Pipeline, SystemRunner, Tools};
use krmgen_engine::ProviderContext;

use crate::error::{CliError, Result};

pub fn run(path: &Path, tools: Tools) -> Result<()> {
    if !path.is_dir() {
        return Err(CliError::io(format!(
            "source directory {} does not exist",
            path.display()
        )));
    }
    tracing::debug!(
        "generating from {} with {} and {}",
        path.display(),
        tools.helm,
        tools.kubectl
    );

    let ctx = ProviderContext::from_process(path)?;
    let pipeline = Pipeline::new(ctx, Arc::new(SystemRunner), tools);
    let manifests = pipeline.generate(path)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(manifests.as_bytes()).map_err(CliError::io)?;
    if !manifests.is_empty() && !manifests.ends_with('\n') {
        stdout.write_all(b"\n").map_err(CliError::io)?;
    }
    stdout.flush().map_err(CliError::io)
}
