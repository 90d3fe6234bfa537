//! krmgen CLI - Kubernetes resource manifests from templated Helm and Kustomize sources

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use krmgen_compose::tool::{DEFAULT_HELM, DEFAULT_KUBECTL};
use krmgen_core::env::{ENV_HELM_EXECUTABLE, ENV_KUBECTL_EXECUTABLE};

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "krmgen")]
#[command(author = "krmgen Contributors")]
#[command(version)]
#[command(
    about = "Generate Kubernetes resource manifests from templated Helm and Kustomize sources",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a source directory to manifests on stdout
    #[command(visible_alias = "g")]
    Generate {
        /// Source directory holding config documents and a kustomization
        #[arg(default_value = ".")]
        path: PathBuf,

        /// helm executable
        #[arg(long, env = ENV_HELM_EXECUTABLE, default_value = DEFAULT_HELM)]
        helm_executable: String,

        /// kubectl executable
        #[arg(long, env = ENV_KUBECTL_EXECUTABLE, default_value = DEFAULT_KUBECTL)]
        kubectl_executable: String,
    },
}

/// Log to stderr, stdout carries the manifests only
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_logging(cli.debug);

    let result = match cli.command {
        Commands::Generate {
            path,
            helm_executable,
            kubectl_executable,
        } => commands::generate::run(
            &path,
            krmgen_compose::Tools {
                helm: helm_executable,
                kubectl: kubectl_executable,
            },
        ),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
