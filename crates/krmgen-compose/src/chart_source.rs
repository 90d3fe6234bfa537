//! Chart sources
//!
//! A chart is fetched either from an OCI registry or from a classic HTTP
//! chart repository. The two differ in how Helm is pointed at them and in
//! whether a separate login is needed.

use once_cell::sync::Lazy;
use regex::Regex;

use krmgen_core::env::{ENV_HELM_PASSWORD, ENV_HELM_USERNAME};
use krmgen_core::{EnvLookup, HelmChartSpec};

use crate::error::{ComposeError, Result};

static OCI_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+://([0-9a-zA-Z\-_.]+)/.*").expect("valid regex"));

static HTTP_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+://([0-9a-zA-Z\-_]+).*").expect("valid regex"));

/// Where a chart comes from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartSource<'a> {
    /// `oci://registry/path`
    Oci(&'a HelmChartSpec),
    /// `http://` or `https://` chart repository
    HttpRepo(&'a HelmChartSpec),
}

impl<'a> ChartSource<'a> {
    /// Select the source for a chart from its repository URL
    pub fn resolve(chart: &'a HelmChartSpec) -> Result<Self> {
        let url = chart.repo_url.to_lowercase();

        if url.starts_with("oci://") {
            Ok(Self::Oci(chart))
        } else if url.starts_with("http") {
            Ok(Self::HttpRepo(chart))
        } else {
            Err(ComposeError::UnsupportedRepository {
                url: chart.repo_url.clone(),
            })
        }
    }

    pub fn chart(&self) -> &'a HelmChartSpec {
        match self {
            Self::Oci(chart) | Self::HttpRepo(chart) => chart,
        }
    }

    /// Full chart reference
    pub fn chart_id(&self) -> String {
        match self {
            Self::Oci(chart) => {
                let mut id = chart.repo_url.clone();
                if !id.ends_with('/') {
                    id.push('/');
                }
                id.push_str(&chart.name);
                id
            }
            Self::HttpRepo(chart) => format!("{}/{}", self.short_id(), chart.name),
        }
    }

    /// Registry or repository host
    pub fn short_id(&self) -> String {
        match self {
            Self::Oci(_) => {
                let id = self.chart_id();
                first_capture(&OCI_HOST, &id).unwrap_or(id)
            }
            Self::HttpRepo(chart) => {
                first_capture(&HTTP_HOST, &chart.repo_url).unwrap_or_else(|| chart.repo_url.clone())
            }
        }
    }

    /// Arguments of the login command, `None` when the source needs no login
    pub fn login_args(&self, env: &dyn EnvLookup) -> Option<Vec<String>> {
        match self {
            Self::Oci(chart) => {
                let mut args = vec![
                    "registry".to_string(),
                    "login".to_string(),
                    self.short_id(),
                ];
                args.extend(credentials_args(chart, env));
                Some(args)
            }
            Self::HttpRepo(_) => None,
        }
    }

    /// Arguments telling `helm template` where the chart lives
    pub fn repo_args(&self) -> Vec<String> {
        match self {
            Self::Oci(chart) => vec![chart.repo_url.clone()],
            Self::HttpRepo(chart) => vec![
                "--repo".to_string(),
                chart.repo_url.clone(),
                "--release-name".to_string(),
                chart.name.clone(),
            ],
        }
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Credential arguments for a chart.
///
/// Blank fields fall back to `KRMGEN_HELM_USERNAME` / `KRMGEN_HELM_PASSWORD`;
/// only non-empty values are emitted, username first. Nothing is emitted when
/// the chart ignores credentials.
pub fn credentials_args(chart: &HelmChartSpec, env: &dyn EnvLookup) -> Vec<String> {
    if chart.ignore_credentials {
        return Vec::new();
    }

    let resolve = |value: &str, fallback: &str| {
        if value.is_empty() {
            env.non_empty(fallback)
        } else {
            Some(value.to_string())
        }
    };

    let mut args = Vec::new();
    if let Some(username) = resolve(&chart.username, ENV_HELM_USERNAME) {
        args.push("--username".to_string());
        args.push(username);
    }
    if let Some(password) = resolve(&chart.password, ENV_HELM_PASSWORD) {
        args.push("--password".to_string());
        args.push(password);
    }
    args
}

pub fn credentials_provided(chart: &HelmChartSpec, env: &dyn EnvLookup) -> bool {
    !credentials_args(chart, env).is_empty()
}
