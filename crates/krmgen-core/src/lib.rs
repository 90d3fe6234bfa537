//! krmgen Core - Core types and utilities for the KRM generator
//!
//! This crate provides the foundational types used throughout krmgen:
//! - `ConfigDocument`: The `kind: KrmGen` configuration file model
//! - `EnvLookup`: Environment variable access, swappable in tests
//! - `WorkingTree`: The scoped temporary copy of an input directory

pub mod config;
pub mod env;
pub mod error;
pub mod workdir;

pub use config::{
    ConfigDocument, HelmChartSpec, HelmSpec, KustomizeRef, Metadata, CONFIG_KIND,
    is_config_document, parse_config,
};
pub use env::{EnvLookup, MapEnv, ProcessEnv};
pub use error::{CoreError, Result};
pub use workdir::WorkingTree;
