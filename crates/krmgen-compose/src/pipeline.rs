//! Composition pipeline
//!
//! For each configuration document of the working tree: evaluate and decode
//! it, render its charts, then prepare and build the overlay if the tree has
//! one. Without an overlay the Helm output is the result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use krmgen_core::{ConfigDocument, WorkingTree, is_config_document, parse_config};
use krmgen_engine::{Evaluator, ProviderContext};

use crate::error::{ComposeError, Result};
use crate::helm::HelmStage;
use crate::kustomize::{OverlayStage, find_descriptor};
use crate::tool::{ToolRunner, Tools};

pub struct Pipeline {
    ctx: ProviderContext,
    runner: Arc<dyn ToolRunner>,
    tools: Tools,
}

impl Pipeline {
    pub fn new(ctx: ProviderContext, runner: Arc<dyn ToolRunner>, tools: Tools) -> Self {
        Self { ctx, runner, tools }
    }

    /// Render `source` through a private copy; the copy is removed on return
    pub fn generate(&self, source: &Path) -> Result<String> {
        let tree = WorkingTree::copy_from(source)?;
        self.process(tree.path())
    }

    /// Render the working tree at `root`, mutating it in place
    pub fn process(&self, root: &Path) -> Result<String> {
        let evaluator = Evaluator::new(&self.ctx.with_root(root));

        let configs = config_documents(root)?;
        if configs.is_empty() {
            tracing::warn!("no configuration document found in {}", root.display());
        }

        // Shared by every document so a values file is expanded only once
        let helm = HelmStage::new(
            self.runner.as_ref(),
            self.ctx.env(),
            &evaluator,
            &self.tools.helm,
        );

        let mut output = String::new();
        for path in configs {
            let config = load_config(&evaluator, &path)?;
            tracing::info!("processing {}", path.display());
            output.push_str(&self.process_config(&helm, &evaluator, &config, root)?);
        }
        Ok(output)
    }

    fn process_config(
        &self,
        helm: &HelmStage<'_>,
        evaluator: &Evaluator,
        config: &ConfigDocument,
        root: &Path,
    ) -> Result<String> {
        let helm_output = if config.has_helm() {
            helm.render(config.charts().unwrap_or_default(), root)?
        } else {
            String::new()
        };

        let Some(descriptor) = find_descriptor(root)? else {
            tracing::debug!("no kustomization found, returning Helm output");
            return Ok(helm_output);
        };

        let overlay = OverlayStage::new(self.runner.as_ref(), evaluator, &self.tools.kubectl);
        overlay.prepare(&descriptor, &helm_output)?;
        overlay.build(&descriptor)
    }
}

/// Top-level configuration documents of `root`, sorted by file name
pub fn config_documents(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| ComposeError::io(root, e))?;

    let mut configs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ComposeError::io(root, e))?.path();
        if path.is_file() && is_config_document(&path) {
            configs.push(path);
        }
    }
    configs.sort();
    Ok(configs)
}

/// Read, evaluate and decode one configuration document
pub fn load_config(evaluator: &Evaluator, path: &Path) -> Result<ConfigDocument> {
    let content = fs::read_to_string(path).map_err(|e| ComposeError::io(path, e))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expanded = evaluator.evaluate_named(&name, &content)?;
    Ok(parse_config(path, &expanded)?)
}
