//! Kustomize overlay stage
//!
//! The working tree may hold one kustomization descriptor. Before it is built
//! the descriptor and the local files it references are template-expanded in
//! place, and the Helm output is added to its resources.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use krmgen_engine::Evaluator;
use krmgen_engine::providers::files::is_local;

use crate::error::{ComposeError, Result};
use crate::rewrite::{backup_file, expand_in_place};
use crate::tool::ToolRunner;

/// File names recognised as a kustomization descriptor, compared case-insensitively
pub const DESCRIPTOR_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "kustomization"];

pub const RESOURCES_FIELD: &str = "resources";
pub const PATCHES_FIELD: &str = "patchesStrategicMerge";

/// Locate the single descriptor below `root`.
///
/// Returns `None` when there is none; more than one is an error.
pub fn find_descriptor(root: &Path) -> Result<Option<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            ComposeError::io(&path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if DESCRIPTOR_NAMES.contains(&name.as_str()) {
            found.push(entry.into_path());
        }
    }

    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        _ => Err(ComposeError::MultipleKustomizations {
            root: root.display().to_string(),
            files: found.iter().map(|p| p.display().to_string()).collect(),
        }),
    }
}

/// Prepares and builds the overlay through an external `kubectl`
pub struct OverlayStage<'a> {
    runner: &'a dyn ToolRunner,
    evaluator: &'a Evaluator,
    kubectl: &'a str,
}

impl<'a> OverlayStage<'a> {
    pub fn new(runner: &'a dyn ToolRunner, evaluator: &'a Evaluator, kubectl: &'a str) -> Self {
        Self {
            runner,
            evaluator,
            kubectl,
        }
    }

    /// Expand the descriptor and its local files, then add the Helm bundle
    pub fn prepare(&self, descriptor: &Path, helm_output: &str) -> Result<()> {
        let dir = parent_dir(descriptor);

        let bundle = if helm_output.is_empty() {
            None
        } else {
            Some(write_bundle(dir, helm_output)?)
        };

        expand_in_place(self.evaluator, descriptor)?;
        let mut kustomization = read_descriptor(descriptor)?;

        let mut resources = string_list(&kustomization, RESOURCES_FIELD, descriptor)?;
        let patches = string_list(&kustomization, PATCHES_FIELD, descriptor)?;

        // A file listed twice is still expanded once
        let references: BTreeSet<&str> = resources
            .iter()
            .chain(patches.iter())
            .map(String::as_str)
            .collect();
        for reference in references {
            self.expand_reference(dir, reference)?;
        }

        if let Some(bundle) = bundle {
            resources.push(bundle);
            kustomization.insert(
                Value::from(RESOURCES_FIELD),
                Value::Sequence(resources.into_iter().map(Value::from).collect()),
            );
            let yaml = serde_yaml::to_string(&kustomization)?;
            fs::write(descriptor, yaml).map_err(|e| ComposeError::io(descriptor, e))?;
            tracing::debug!("added Helm output to {}", descriptor.display());
        }
        Ok(())
    }

    /// `kubectl kustomize <descriptor dir>`
    pub fn build(&self, descriptor: &Path) -> Result<String> {
        let dir = parent_dir(descriptor);
        tracing::info!("building kustomization in {}", dir.display());
        let args = vec!["kustomize".to_string(), dir.display().to_string()];
        Ok(self.runner.run(self.kubectl, &args)?.stdout)
    }

    fn expand_reference(&self, dir: &Path, reference: &str) -> Result<()> {
        if reference.starts_with("http") {
            tracing::debug!("skipping remote resource {}", reference);
            return Ok(());
        }
        if !is_local(reference) {
            tracing::warn!("skipping {}: outside the working tree", reference);
            return Ok(());
        }

        let path = dir.join(reference);
        if path.is_dir() {
            return Ok(());
        }
        if !path.exists() {
            tracing::warn!("skipping {}: no such file", reference);
            return Ok(());
        }
        expand_in_place(self.evaluator, &path)
    }
}

fn parent_dir(descriptor: &Path) -> &Path {
    descriptor.parent().unwrap_or(Path::new("."))
}

/// Write the Helm output next to the descriptor, returns its file name
fn write_bundle(dir: &Path, helm_output: &str) -> Result<String> {
    let file = tempfile::Builder::new()
        .prefix("krmgen-helm-")
        .suffix(".yml")
        .tempfile_in(dir)
        .map_err(|e| ComposeError::io(dir, e))?;
    let (mut file, path) = file
        .keep()
        .map_err(|e| ComposeError::io(dir, e.error))?;
    file.write_all(helm_output.as_bytes())
        .map_err(|e| ComposeError::io(&path, e))?;

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!("wrote Helm output to {}", path.display());
    Ok(name)
}

fn read_descriptor(descriptor: &Path) -> Result<Mapping> {
    let content = fs::read_to_string(descriptor).map_err(|e| ComposeError::io(descriptor, e))?;
    let value: Value =
        serde_yaml::from_str(&content).map_err(|source| ComposeError::DescriptorParse {
            path: descriptor.display().to_string(),
            source,
        })?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ComposeError::InvalidDescriptor {
            path: descriptor.display().to_string(),
        }),
    }
}

/// A list-of-strings field, empty when absent
fn string_list(kustomization: &Mapping, field: &str, descriptor: &Path) -> Result<Vec<String>> {
    let invalid = || ComposeError::InvalidListField {
        field: field.to_string(),
        path: descriptor.display().to_string(),
    };

    match kustomization.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::tests::evaluator;
    use crate::tool::tests::RecordingRunner;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn descriptor_resources(descriptor: &Path) -> Vec<String> {
        let mapping = read_descriptor(descriptor).unwrap();
        string_list(&mapping, RESOURCES_FIELD, descriptor).unwrap()
    }

    #[test]
    fn test_find_descriptor_none() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deployment.yaml", "kind: Deployment\n");
        assert_eq!(find_descriptor(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_find_descriptor_nested_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "overlays/prod/Kustomization.YAML", "resources: []\n");
        assert_eq!(find_descriptor(dir.path()).unwrap(), Some(path));
    }

    #[test]
    fn test_find_descriptor_multiple() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "kustomization.yaml", "resources: []\n");
        write(dir.path(), "base/kustomization.yml", "resources: []\n");

        let err = find_descriptor(dir.path()).unwrap_err();
        match err {
            ComposeError::MultipleKustomizations { files, .. } => assert_eq!(files.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_string_list() {
        let descriptor = Path::new("kustomization.yaml");
        let mapping: Mapping =
            serde_yaml::from_str("resources: [a.yaml, b.yaml]\nbroken: [a, {b: c}]\nscalar: x\n")
                .unwrap();

        assert_eq!(
            string_list(&mapping, "resources", descriptor).unwrap(),
            vec!["a.yaml".to_string(), "b.yaml".to_string()]
        );
        assert!(string_list(&mapping, "missing", descriptor).unwrap().is_empty());
        assert!(matches!(
            string_list(&mapping, "broken", descriptor),
            Err(ComposeError::InvalidListField { .. })
        ));
        assert!(matches!(
            string_list(&mapping, "scalar", descriptor),
            Err(ComposeError::InvalidListField { .. })
        ));
    }

    #[test]
    fn test_prepare_expands_references_and_adds_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write(
            dir.path(),
            "kustomization.yaml",
            concat!(
                "namespace: {{ lower(\"PROD\") }}\n",
                "resources:\n  - cm.yaml\n  - base\n  - https://example.com/remote.yaml\n",
                "patchesStrategicMerge:\n  - patch.yaml\n",
            ),
        );
        write(dir.path(), "cm.yaml", "data: {{ upper(\"x\") }}\n");
        write(dir.path(), "patch.yaml", "replicas: {{ 2 * 2 }}\n");
        write(dir.path(), "base/keep.yaml", "raw: {{ untouched }}\n");

        let runner = RecordingRunner::printing("");
        let evaluator = evaluator(dir.path());
        let stage = OverlayStage::new(&runner, &evaluator, "kubectl");
        stage.prepare(&descriptor, "kind: Service\n").unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("cm.yaml")).unwrap(), "data: X\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("patch.yaml")).unwrap(),
            "replicas: 4\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("base/keep.yaml")).unwrap(),
            "raw: {{ untouched }}\n"
        );

        let mapping = read_descriptor(&descriptor).unwrap();
        assert_eq!(mapping.get("namespace").and_then(Value::as_str), Some("prod"));

        let resources = descriptor_resources(&descriptor);
        assert_eq!(resources.len(), 4);
        assert_eq!(&resources[..3], ["cm.yaml", "base", "https://example.com/remote.yaml"]);
        let bundle = &resources[3];
        assert!(bundle.starts_with("krmgen-helm-") && bundle.ends_with(".yml"));
        assert_eq!(
            fs::read_to_string(dir.path().join(bundle)).unwrap(),
            "kind: Service\n"
        );
    }

    #[test]
    fn test_prepare_expands_shared_reference_once() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write(
            dir.path(),
            "kustomization.yaml",
            "resources:\n  - shared.yaml\npatchesStrategicMerge:\n  - shared.yaml\n",
        );
        write(dir.path(), "shared.yaml", "raw: {{ \"{{ x }}\" }}\n");

        let runner = RecordingRunner::printing("");
        let evaluator = evaluator(dir.path());
        OverlayStage::new(&runner, &evaluator, "kubectl")
            .prepare(&descriptor, "")
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("shared.yaml")).unwrap(),
            "raw: {{ x }}\n"
        );
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("shared.yaml_"))
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_prepare_without_helm_output_keeps_resources() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write(dir.path(), "kustomization.yaml", "resources:\n  - cm.yaml\n");
        write(dir.path(), "cm.yaml", "kind: ConfigMap\n");

        let runner = RecordingRunner::printing("");
        let evaluator = evaluator(dir.path());
        OverlayStage::new(&runner, &evaluator, "kubectl")
            .prepare(&descriptor, "")
            .unwrap();

        assert_eq!(descriptor_resources(&descriptor), vec!["cm.yaml".to_string()]);
    }

    #[test]
    fn test_prepare_adds_resources_field() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write(dir.path(), "kustomization.yaml", "namePrefix: dev-\n");

        let runner = RecordingRunner::printing("");
        let evaluator = evaluator(dir.path());
        OverlayStage::new(&runner, &evaluator, "kubectl")
            .prepare(&descriptor, "kind: Service\n")
            .unwrap();

        assert_eq!(descriptor_resources(&descriptor).len(), 1);
    }

    #[test]
    fn test_prepare_rejects_non_list_resources() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write(dir.path(), "kustomization.yaml", "resources: cm.yaml\n");

        let runner = RecordingRunner::printing("");
        let evaluator = evaluator(dir.path());
        let err = OverlayStage::new(&runner, &evaluator, "kubectl")
            .prepare(&descriptor, "")
            .unwrap_err();
        assert!(err.to_string().contains("resources"));
    }

    #[test]
    fn test_prepare_never_touches_files_outside_tree() {
        let outer = tempfile::tempdir().unwrap();
        let outside = write(outer.path(), "outside.yaml", "x: {{ upper(\"a\") }}\n");
        let descriptor = write(
            outer.path(),
            "tree/kustomization.yaml",
            "resources:\n  - ../outside.yaml\n",
        );

        let runner = RecordingRunner::printing("");
        let evaluator = evaluator(outer.path());
        OverlayStage::new(&runner, &evaluator, "kubectl")
            .prepare(&descriptor, "")
            .unwrap();

        assert_eq!(fs::read_to_string(outside).unwrap(), "x: {{ upper(\"a\") }}\n");
    }

    #[test]
    fn test_build_runs_kubectl_on_descriptor_dir() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write(dir.path(), "kustomization.yaml", "resources: []\n");

        let runner = RecordingRunner::printing("kind: ConfigMap\n");
        let evaluator = evaluator(dir.path());
        let output = OverlayStage::new(&runner, &evaluator, "/usr/local/bin/kubectl")
            .build(&descriptor)
            .unwrap();

        assert_eq!(output, "kind: ConfigMap\n");
        let calls = runner.calls();
        assert_eq!(calls[0].0, "/usr/local/bin/kubectl");
        assert_eq!(
            calls[0].1,
            vec!["kustomize".to_string(), dir.path().display().to_string()]
        );
    }
}
