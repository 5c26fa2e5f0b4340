//! Entry point of the engine: validates run requests, dispatches one worker
//! per repository and serves snapshots and results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::advisory::AdvisoryLookup;
use crate::cache::RepoCache;
use crate::config::Config;
use crate::error::ScanError;
use crate::models::{Provider, RepoRef, ScanDepth, ScanResults, ScanRun};
use crate::normalizer::Normalizer;
use crate::source::RepositorySource;
use crate::store::{RunHandle, RunStore};
use crate::worker::{RepoScanWorker, WorkerContext};

pub struct RunCoordinator {
    config: Config,
    store: Arc<dyn RunStore>,
    sources: HashMap<Provider, Arc<dyn RepositorySource>>,
    normalizer: Arc<Normalizer>,
    cache: Arc<RepoCache>,
    repo_permits: Option<Arc<Semaphore>>,
}

impl RunCoordinator {
    pub fn new(config: Config, store: Arc<dyn RunStore>, advisory: Arc<dyn AdvisoryLookup>) -> Self {
        let normalizer = Arc::new(Normalizer::new(
            advisory,
            config.scan.concurrency_limit,
            config.scan.fetch_timeout(),
        ));
        let repo_permits = config
            .scan
            .max_concurrent_repos
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            config,
            store,
            sources: HashMap::new(),
            normalizer,
            cache: Arc::new(RepoCache::new()),
            repo_permits,
        }
    }

    /// Register the content provider for `provider`.
    pub fn with_source(mut self, provider: Provider, source: Arc<dyn RepositorySource>) -> Self {
        self.sources.insert(provider, source);
        self
    }

    fn validate(&self, repos: &[RepoRef]) -> Result<(), ScanError> {
        if repos.is_empty() {
            return Err(ScanError::Validation("at least one repository is required".to_string()));
        }
        let mut seen = HashSet::new();
        for repo in repos {
            if repo.id.trim().is_empty() {
                return Err(ScanError::Validation("repository id must not be empty".to_string()));
            }
            if !seen.insert(repo.id.as_str()) {
                return Err(ScanError::Validation(format!("duplicate repository id {}", repo.id)));
            }
            if !self.sources.contains_key(&repo.provider) {
                return Err(ScanError::Validation(format!(
                    "no source configured for provider {} ({})",
                    repo.provider, repo.id
                )));
            }
        }
        Ok(())
    }

    /// Create a run and dispatch its workers. Returns as soon as the run
    /// record exists; scanning continues in the background.
    pub async fn start_run(&self, repos: Vec<RepoRef>, depth: ScanDepth) -> Result<String, ScanError> {
        self.validate(&repos)?;

        let run_id = Uuid::new_v4().to_string();
        let (handle, slots) = RunHandle::create(
            run_id.clone(),
            repos.clone(),
            depth,
            self.config.scan.publish_partial_results,
        );
        self.store.put(handle).await;
        info!(run_id = %run_id, repos = repos.len(), %depth, "run started");

        for (repo, slot) in repos.into_iter().zip(slots) {
            let Some(source) = self.sources.get(&repo.provider).cloned() else {
                // Dropping the slot fails the repository.
                warn!(run_id = %run_id, repo = %repo.id, provider = %repo.provider, "no source for repository");
                continue;
            };
            let ctx = WorkerContext {
                source,
                normalizer: self.normalizer.clone(),
                cache: self.cache.clone(),
                settings: self.config.scan.clone(),
            };
            let permits = self.repo_permits.clone();
            tokio::spawn(async move {
                // The repository stays pending until a permit is free.
                let _permit = match permits {
                    Some(permits) => permits.acquire_owned().await.ok(),
                    None => None,
                };
                RepoScanWorker::new(repo, depth, slot, ctx).run().await;
            });
        }

        Ok(run_id)
    }

    async fn handle(&self, run_id: &str) -> Result<Arc<RunHandle>, ScanError> {
        self.store
            .get(run_id)
            .await
            .ok_or_else(|| ScanError::NotFound(format!("run {}", run_id)))
    }

    pub async fn get_run(&self, run_id: &str) -> Result<ScanRun, ScanError> {
        Ok(self.handle(run_id).await?.snapshot())
    }

    pub async fn get_results(&self, run_id: &str) -> Result<ScanResults, ScanError> {
        self.handle(run_id)
            .await?
            .results()
            .ok_or_else(|| ScanError::NotFound(format!("results for run {}", run_id)))
    }

    /// Poll until the run is terminal and return the final snapshot.
    pub async fn wait(&self, run_id: &str, poll_interval: Duration) -> Result<ScanRun, ScanError> {
        let handle = self.handle(run_id).await?;
        while !handle.is_terminal() {
            tokio::time::sleep(poll_interval).await;
        }
        Ok(handle.snapshot())
    }

    /// Periodically delete runs older than the configured retention.
    pub fn spawn_eviction(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let retention = self.config.store.retention();
        let mut ticker = tokio::time::interval(self.config.store.eviction_interval());
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let removed = store.delete_older_than(Utc::now() - retention).await;
                if removed > 0 {
                    info!(removed, "evicted expired runs");
                } else {
                    debug!("no runs to evict");
                }
            }
        })
    }
}
