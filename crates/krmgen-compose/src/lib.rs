//! krmgen Compose - Helm and Kustomize composition
//!
//! This crate turns a working tree into manifests:
//! - `ChartSource`: where a chart comes from and how Helm reaches it
//! - `HelmStage`: renders declared charts with `helm template`
//! - `OverlayStage`: prepares and builds the Kustomize overlay
//! - `Pipeline`: runs both stages for every configuration document

pub mod chart_source;
pub mod error;
pub mod helm;
pub mod kustomize;
pub mod pipeline;
mod rewrite;
pub mod tool;

pub use chart_source::{ChartSource, credentials_args, credentials_provided};
pub use error::{ComposeError, Result};
pub use helm::HelmStage;
pub use kustomize::{DESCRIPTOR_NAMES, OverlayStage, find_descriptor};
pub use pipeline::Pipeline;
pub use tool::{SystemRunner, ToolOutput, ToolRunner, Tools};
