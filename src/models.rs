use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository the caller asked us to scan. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoRef {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_ref")]
    pub default_ref: String,
}

fn default_ref() -> String {
    "HEAD".to_string()
}

impl RepoRef {
    pub fn github(owner_repo: &str, reference: Option<&str>) -> Self {
        Self {
            id: format!("github:{}", owner_repo),
            name: owner_repo.to_string(),
            provider: Provider::GitHub,
            url: Some(format!("https://github.com/{}", owner_repo)),
            default_ref: reference.map(str::to_string).unwrap_or_else(default_ref),
        }
    }

    pub fn local(path: &std::path::Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id: format!("local:{}", path.display()),
            name,
            provider: Provider::Local,
            url: Some(path.display().to_string()),
            default_ref: default_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "github")]
    GitHub,
    Local,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::GitHub => write!(f, "github"),
            Provider::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDepth {
    #[default]
    Full,
    Incremental,
}

impl std::fmt::Display for ScanDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanDepth::Full => write!(f, "full"),
            ScanDepth::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Pending,
    Scanning,
    Completed,
    Failed,
}

impl RepoStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RepoStatus::Completed | RepoStatus::Failed)
    }
}

impl std::fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoStatus::Pending => write!(f, "pending"),
            RepoStatus::Scanning => write!(f, "scanning"),
            RepoStatus::Completed => write!(f, "completed"),
            RepoStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-repository progress inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub repo_id: String,
    pub repo_name: String,
    pub status: RepoStatus,
    pub percent: u8,
    pub message: String,
}

impl ScanProgress {
    pub fn pending(repo: &RepoRef) -> Self {
        Self {
            repo_id: repo.id.clone(),
            repo_name: repo.name.clone(),
            status: RepoStatus::Pending,
            percent: 0,
            message: "Queued".to_string(),
        }
    }
}

/// Snapshot of one orchestrated scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRun {
    pub id: String,
    pub repos: Vec<RepoRef>,
    pub depth: ScanDepth,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub progress: BTreeMap<String, ScanProgress>,
    pub total_repos: usize,
    pub completed_repos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Node,
    Java,
    Container,
    Perl,
    Python,
    Rust,
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ecosystem::Node => write!(f, "Node"),
            Ecosystem::Java => write!(f, "Java"),
            Ecosystem::Container => write!(f, "Container"),
            Ecosystem::Perl => write!(f, "Perl"),
            Ecosystem::Python => write!(f, "Python"),
            Ecosystem::Rust => write!(f, "Rust"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentType {
    Dependency,
    DevDependency,
    BuildDependency,
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::Dependency => write!(f, "dependency"),
            ComponentType::DevDependency => write!(f, "devDependency"),
            ComponentType::BuildDependency => write!(f, "buildDependency"),
        }
    }
}

/// One normalized third-party component of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceComponent {
    pub name: String,
    pub version: String,
    pub latest_version: Option<String>,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub scope: Option<String>,
    pub ecosystem: Ecosystem,
    pub eol: bool,
    pub vulnerabilities: u32,
    pub flagged: bool,
    pub flag_reason: Option<String>,
}

/// A buildable unit found in a repository: one directory with its manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedService {
    pub name: String,
    pub path: String,
    pub manifests: Vec<String>,
    pub runtime: Option<String>,
    pub runtime_version: Option<String>,
    pub components: Vec<ServiceComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoScanResult {
    pub repo_id: String,
    pub repo_name: String,
    pub ref_id: String,
    pub services: Vec<DetectedService>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTotals {
    pub services: usize,
    pub components: usize,
    pub flagged: usize,
    pub eol: usize,
}

/// Aggregate output of a finished run. Carries no run id or timestamps so
/// identical inputs serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub repositories: BTreeMap<String, RepoScanResult>,
    pub totals: ScanTotals,
    pub partial: bool,
}

impl ScanResults {
    pub fn from_repositories(repositories: BTreeMap<String, RepoScanResult>, partial: bool) -> Self {
        let mut totals = ScanTotals::default();
        for service in repositories.values().flat_map(|r| &r.services) {
            totals.services += 1;
            totals.components += service.components.len();
            totals.flagged += service.components.iter().filter(|c| c.flagged).count();
            totals.eol += service.components.iter().filter(|c| c.eol).count();
        }
        Self {
            repositories,
            totals,
            partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, flagged: bool, eol: bool) -> ServiceComponent {
        ServiceComponent {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            latest_version: None,
            component_type: ComponentType::Dependency,
            scope: None,
            ecosystem: Ecosystem::Node,
            eol,
            vulnerabilities: 0,
            flagged,
            flag_reason: None,
        }
    }

    #[test]
    fn test_totals_count_across_repositories() {
        let service = DetectedService {
            name: "api".to_string(),
            path: "api".to_string(),
            manifests: vec!["api/package.json".to_string()],
            runtime: Some("node".to_string()),
            runtime_version: None,
            components: vec![
                component("a", true, false),
                component("b", false, true),
                component("c", true, true),
            ],
        };
        let mut repos = BTreeMap::new();
        for id in ["one", "two"] {
            repos.insert(
                id.to_string(),
                RepoScanResult {
                    repo_id: id.to_string(),
                    repo_name: id.to_string(),
                    ref_id: "abc".to_string(),
                    services: vec![service.clone()],
                    warnings: Vec::new(),
                },
            );
        }

        let results = ScanResults::from_repositories(repos, false);
        assert_eq!(
            results.totals,
            ScanTotals {
                services: 2,
                components: 6,
                flagged: 4,
                eol: 4
            }
        );
    }

    #[test]
    fn test_component_type_serializes_camel_case() {
        let json = serde_json::to_string(&ComponentType::DevDependency).unwrap();
        assert_eq!(json, "\"devDependency\"");
        let json = serde_json::to_string(&Provider::GitHub).unwrap();
        assert_eq!(json, "\"github\"");
    }
}
