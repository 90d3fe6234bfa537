//! Helm stage
//!
//! Every declared chart is rendered with `helm template` and the outputs are
//! concatenated in declaration order.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use krmgen_core::{EnvLookup, HelmChartSpec};
use krmgen_engine::Evaluator;
use krmgen_engine::providers::files::is_local;

use crate::chart_source::{ChartSource, credentials_args, credentials_provided};
use crate::error::{ComposeError, Result};
use crate::rewrite::expand_in_place;
use crate::tool::ToolRunner;

/// Renders charts through an external `helm`
pub struct HelmStage<'a> {
    runner: &'a dyn ToolRunner,
    env: &'a dyn EnvLookup,
    evaluator: &'a Evaluator,
    helm: &'a str,
    /// Values files already expanded, a second pass would evaluate escaped text
    expanded: RefCell<BTreeSet<PathBuf>>,
}

impl<'a> HelmStage<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        env: &'a dyn EnvLookup,
        evaluator: &'a Evaluator,
        helm: &'a str,
    ) -> Self {
        Self {
            runner,
            env,
            evaluator,
            helm,
            expanded: RefCell::new(BTreeSet::new()),
        }
    }

    /// Render `charts` in order, values files resolved against `root`
    pub fn render(&self, charts: &[HelmChartSpec], root: &Path) -> Result<String> {
        let mut output = String::new();
        for chart in charts {
            output.push_str(&self.render_chart(chart, root)?);
        }
        Ok(output)
    }

    /// Render a single chart
    pub fn render_chart(&self, chart: &HelmChartSpec, root: &Path) -> Result<String> {
        let source = ChartSource::resolve(chart)?;
        tracing::info!(
            "rendering chart {} as release {}",
            source.chart_id(),
            chart.release_name
        );

        let mut args = template_args(&source);

        if credentials_provided(chart, self.env) {
            if let Some(login) = source.login_args(self.env) {
                self.runner.run(self.helm, &login)?;
            }
            args.extend(credentials_args(chart, self.env));
        }

        if !chart.values_file.is_empty() {
            let values_file = root.join(&chart.values_file);
            if is_local(&chart.values_file) {
                if self.expanded.borrow_mut().insert(values_file.clone()) {
                    expand_in_place(self.evaluator, &values_file)?;
                } else {
                    tracing::debug!("values file {} already expanded", chart.values_file);
                }
            } else {
                tracing::warn!(
                    "values file {} is outside the working tree, using it unexpanded",
                    chart.values_file
                );
            }
            args.push("--values".to_string());
            args.push(values_file.display().to_string());
        }

        // Kept alive until helm has read it
        let inline_values = write_inline_values(chart)?;
        if let Some(file) = &inline_values {
            args.push("--values".to_string());
            args.push(file.path().display().to_string());
        }

        Ok(self.runner.run(self.helm, &args)?.stdout)
    }
}

/// `template <release> --include-crds [--version v] <repo args>`
pub fn template_args(source: &ChartSource<'_>) -> Vec<String> {
    let chart = source.chart();
    let mut args = vec![
        "template".to_string(),
        chart.release_name.clone(),
        "--include-crds".to_string(),
    ];
    if !chart.version.is_empty() {
        args.push("--version".to_string());
        args.push(chart.version.clone());
    }
    args.extend(source.repo_args());
    args
}

/// Inline values as a YAML file with a unique name, `None` when there are none
fn write_inline_values(chart: &HelmChartSpec) -> Result<Option<NamedTempFile>> {
    if chart.values_inline.is_empty() {
        return Ok(None);
    }

    let file = tempfile::Builder::new()
        .prefix(&format!("helm-values-{}-", chart.release_name))
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| ComposeError::io(&std::env::temp_dir(), e))?;

    let yaml = serde_yaml::to_string(&chart.values_inline)?;
    fs::write(file.path(), yaml).map_err(|e| ComposeError::io(file.path(), e))?;
    tracing::debug!("inline values of {} written to {}", chart.name, file.path().display());
    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use krmgen_core::MapEnv;
    use krmgen_core::env::ENV_HELM_PASSWORD;

    use crate::pipeline::tests::evaluator;
    use crate::tool::tests::{RecordingRunner, output};

    fn chart(repo: &str) -> HelmChartSpec {
        HelmChartSpec {
            name: "app".to_string(),
            repo_url: repo.to_string(),
            release_name: "app1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_template_args_http() {
        let chart = HelmChartSpec {
            version: "1.2.3".to_string(),
            ..chart("https://charts.example.com/stable")
        };
        let source = ChartSource::resolve(&chart).unwrap();
        insta::assert_snapshot!(
            template_args(&source).join(" "),
            @"template app1 --include-crds --version 1.2.3 --repo https://charts.example.com/stable --release-name app"
        );
    }

    #[test]
    fn test_template_args_oci() {
        let chart = chart("oci://registry.example.com/charts/app");
        let source = ChartSource::resolve(&chart).unwrap();
        insta::assert_snapshot!(
            template_args(&source).join(" "),
            @"template app1 --include-crds oci://registry.example.com/charts/app"
        );
    }

    #[test]
    fn test_oci_login_before_render() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::printing("kind: Service\n");
        let env = MapEnv::new().with(ENV_HELM_PASSWORD, "envPass");
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let chart = HelmChartSpec {
            username: "user".to_string(),
            ..chart("oci://registry.example.com/charts")
        };
        assert_eq!(stage.render_chart(&chart, dir.path()).unwrap(), "kind: Service\n");

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].1.join(" "),
            "registry login registry.example.com --username user --password envPass"
        );
        assert_eq!(
            calls[1].1.join(" "),
            "template app1 --include-crds oci://registry.example.com/charts --username user --password envPass"
        );
    }

    #[test]
    fn test_http_repo_has_no_login() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::printing("");
        let env = MapEnv::new();
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let chart = HelmChartSpec {
            username: "user".to_string(),
            ..chart("https://charts.example.com")
        };
        stage.render_chart(&chart, dir.path()).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1[0], "template");
        assert!(calls[0].1.ends_with(&["--username".to_string(), "user".to_string()]));
    }

    #[test]
    fn test_values_file_and_inline_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("values.yaml"),
            "replicas: {{ 1 + 1 }}\n",
        )
        .unwrap();

        // The inline values file is gone once rendering returns, so read it
        // while helm "runs"
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_runner = Arc::clone(&seen);
        let runner = RecordingRunner::new(move |_, args| {
            let files: Vec<String> = args
                .iter()
                .skip_while(|arg| *arg != "--values")
                .filter(|arg| *arg != "--values")
                .map(|path| fs::read_to_string(path).unwrap())
                .collect();
            seen_by_runner.lock().unwrap().extend(files);
            output("rendered\n")
        });
        let env = MapEnv::new();
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let mut values = serde_yaml::Mapping::new();
        values.insert("name".into(), "test".into());
        let chart = HelmChartSpec {
            values_file: "values.yaml".to_string(),
            values_inline: values,
            ..chart("https://charts.example.com")
        };
        stage.render_chart(&chart, dir.path()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec!["replicas: 2\n".to_string(), "name: test\n".to_string()]);

        let args = &runner.calls()[0].1;
        let inline = args.last().unwrap();
        assert!(
            Path::new(inline)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("helm-values-app1-")
        );
        assert!(!Path::new(inline).exists());
    }

    #[test]
    fn test_render_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(|_, args| output(&format!("# {}\n", args[1])));
        let env = MapEnv::new();
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let first = chart("https://charts.example.com");
        let second = HelmChartSpec {
            release_name: "app2".to_string(),
            ..chart("https://charts.example.com")
        };
        assert_eq!(
            stage.render(&[first, second], dir.path()).unwrap(),
            "# app1\n# app2\n"
        );
    }

    #[test]
    fn test_shared_values_file_expanded_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("values.yaml"), "raw: {{ \"{{ x }}\" }}\n").unwrap();

        let runner = RecordingRunner::new(|_, args| {
            output(&fs::read_to_string(args.last().unwrap()).unwrap())
        });
        let env = MapEnv::new();
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let first = HelmChartSpec {
            values_file: "values.yaml".to_string(),
            ..chart("https://charts.example.com")
        };
        let second = HelmChartSpec {
            release_name: "app2".to_string(),
            ..first.clone()
        };
        assert_eq!(
            stage.render(&[first, second], dir.path()).unwrap(),
            "raw: {{ x }}\nraw: {{ x }}\n"
        );

        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("values.yaml_"))
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_helm_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new(|program, _| {
            Err(ComposeError::ToolFailed {
                program: program.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "chart not found".to_string(),
            })
        });
        let env = MapEnv::new();
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let err = stage
            .render_chart(&chart("https://charts.example.com"), dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("chart not found"));
    }

    #[test]
    fn test_unsupported_repository_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::printing("");
        let env = MapEnv::new();
        let evaluator = evaluator(dir.path());
        let stage = HelmStage::new(&runner, &env, &evaluator, "helm");

        let err = stage
            .render_chart(&chart("ftp://example.com"), dir.path())
            .unwrap_err();
        assert!(matches!(err, ComposeError::UnsupportedRepository { .. }));
        assert!(runner.calls().is_empty());
    }
}
