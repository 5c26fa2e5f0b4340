//! Turns parsed manifests into per-service component lists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::debug;

use crate::advisory::{Advisory, AdvisoryLookup};
use crate::batch::run_chunked;
use crate::models::{DetectedService, Ecosystem, ServiceComponent};
use crate::parser::{ManifestKind, ParseOutput, RawDependency};

/// A manifest that was fetched and parsed without error.
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub path: String,
    pub kind: ManifestKind,
    pub output: ParseOutput,
}

pub struct Normalizer {
    lookup: Arc<dyn AdvisoryLookup>,
    concurrency_limit: usize,
    timeout: Duration,
}

/// Directory part of a manifest path; `""` for the repository root.
fn service_path(manifest_path: &str) -> &str {
    manifest_path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn to_component(dep: RawDependency) -> ServiceComponent {
    ServiceComponent {
        flagged: dep.flag_reason.is_some(),
        name: dep.name,
        version: dep.version,
        latest_version: None,
        component_type: dep.component_type,
        scope: dep.scope,
        ecosystem: dep.ecosystem,
        eol: false,
        vulnerabilities: 0,
        flag_reason: dep.flag_reason,
    }
}

#[derive(Default)]
struct ServiceBuilder {
    path: String,
    manifests: Vec<String>,
    runtime: Option<String>,
    runtime_version: Option<String>,
    version_pinned: bool,
    components: Vec<ServiceComponent>,
    index: HashMap<(String, Ecosystem), usize>,
}

impl ServiceBuilder {
    fn add(&mut self, manifest: ParsedManifest) {
        self.manifests.push(manifest.path);
        let output = manifest.output;

        if manifest.kind.pins_runtime_version() && output.runtime_version.is_some() {
            if self.runtime.is_none() {
                self.runtime = output.runtime.clone();
            }
            self.runtime_version = output.runtime_version.clone();
            self.version_pinned = true;
        } else if self.runtime.is_none() && output.runtime.is_some() {
            self.runtime = output.runtime.clone();
            if !self.version_pinned {
                self.runtime_version = output.runtime_version.clone();
            }
        } else if self.runtime_version.is_none() && self.runtime == output.runtime {
            self.runtime_version = output.runtime_version.clone();
        }

        // Last write wins; the entry keeps the position of its first occurrence.
        for dep in output.components {
            let key = (dep.name.clone(), dep.ecosystem);
            let component = to_component(dep);
            match self.index.get(&key) {
                Some(&i) => self.components[i] = component,
                None => {
                    self.index.insert(key, self.components.len());
                    self.components.push(component);
                }
            }
        }
    }

    fn build(self, repo_name: &str) -> DetectedService {
        let name = if self.path.is_empty() {
            repo_name.to_string()
        } else {
            self.path.rsplit('/').next().unwrap_or(&self.path).to_string()
        };
        DetectedService {
            name,
            path: self.path,
            manifests: self.manifests,
            runtime: self.runtime,
            runtime_version: self.runtime_version,
            components: self.components,
        }
    }
}

impl Normalizer {
    pub fn new(lookup: Arc<dyn AdvisoryLookup>, concurrency_limit: usize, timeout: Duration) -> Self {
        Self {
            lookup,
            concurrency_limit,
            timeout,
        }
    }

    /// Group manifests by directory, in the order each directory first
    /// appears, and merge their components.
    pub fn normalize(&self, repo_name: &str, manifests: Vec<ParsedManifest>) -> Vec<DetectedService> {
        let mut services: Vec<ServiceBuilder> = Vec::new();
        let mut by_path: HashMap<String, usize> = HashMap::new();

        for manifest in manifests {
            let path = service_path(&manifest.path).to_string();
            let i = *by_path.entry(path.clone()).or_insert_with(|| {
                services.push(ServiceBuilder {
                    path,
                    ..ServiceBuilder::default()
                });
                services.len() - 1
            });
            services[i].add(manifest);
        }

        services.into_iter().map(|s| s.build(repo_name)).collect()
    }

    /// Copy advisory data onto every component. Each distinct
    /// (ecosystem, name, version) is looked up once.
    pub async fn annotate(&self, services: &mut [DetectedService], today: NaiveDate) {
        let mut keys: Vec<(Ecosystem, String, String)> = services
            .iter()
            .flat_map(|s| &s.components)
            .map(|c| (c.ecosystem, c.name.clone(), c.version.clone()))
            .collect();
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return;
        }

        let lookup = &self.lookup;
        let timeout = self.timeout;
        let answers = run_chunked(
            keys.clone(),
            self.concurrency_limit,
            |(ecosystem, name, version)| async move {
                tokio::time::timeout(timeout, lookup.lookup(ecosystem, &name, &version))
                    .await
                    .unwrap_or_else(|_| {
                        debug!(%ecosystem, name = %name, "advisory lookup timed out");
                        None
                    })
            },
            |_| {},
        )
        .await;

        let advisories: HashMap<(Ecosystem, String, String), Advisory> = keys
            .into_iter()
            .zip(answers)
            .filter_map(|(key, answer)| answer.map(|a| (key, a)))
            .collect();

        for component in services.iter_mut().flat_map(|s| s.components.iter_mut()) {
            let key = (component.ecosystem, component.name.clone(), component.version.clone());
            let Some(advisory) = advisories.get(&key) else {
                continue;
            };
            component.latest_version = advisory.latest_version.clone();
            component.vulnerabilities = advisory.vulnerabilities.unwrap_or(0);
            component.eol = advisory.is_eol(today);
        }
    }
}
