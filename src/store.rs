//! Run records and their per-repository progress slots.
//!
//! Every run lives behind one [`std::sync::Mutex`]. Each repository gets a
//! single [`ProgressSlot`], the only writer of that repository's progress
//! entry and outcome. Every slot write recomputes `completed_repos` and the
//! run status under the run lock, so any snapshot is internally consistent.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::models::{
    RepoRef, RepoScanResult, RepoStatus, RunStatus, ScanDepth, ScanProgress, ScanResults, ScanRun,
};

struct RunState {
    run: ScanRun,
    outcomes: BTreeMap<String, RepoScanResult>,
    results: Option<ScanResults>,
}

pub struct RunHandle {
    id: String,
    started_at: DateTime<Utc>,
    publish_partial: bool,
    state: Mutex<RunState>,
}

impl RunHandle {
    /// Create a pending run with one progress slot per repository.
    pub fn create(
        id: String,
        repos: Vec<RepoRef>,
        depth: ScanDepth,
        publish_partial: bool,
    ) -> (Arc<RunHandle>, Vec<ProgressSlot>) {
        let started_at = Utc::now();
        let progress = repos
            .iter()
            .map(|repo| (repo.id.clone(), ScanProgress::pending(repo)))
            .collect();
        let repo_ids: Vec<String> = repos.iter().map(|r| r.id.clone()).collect();
        let run = ScanRun {
            id: id.clone(),
            total_repos: repos.len(),
            repos,
            depth,
            status: RunStatus::Pending,
            started_at,
            ended_at: None,
            progress,
            completed_repos: 0,
        };

        let handle = Arc::new(RunHandle {
            id,
            started_at,
            publish_partial,
            state: Mutex::new(RunState {
                run,
                outcomes: BTreeMap::new(),
                results: None,
            }),
        });
        let slots = repo_ids
            .into_iter()
            .map(|repo_id| ProgressSlot {
                run: handle.clone(),
                repo_id,
                finished: false,
            })
            .collect();
        (handle, slots)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        // No write panics halfway, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ScanRun {
        self.lock().run.clone()
    }

    pub fn results(&self) -> Option<ScanResults> {
        self.lock().results.clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().run.status.is_terminal()
    }
}

impl RunState {
    /// Recompute the derived fields after a slot write.
    fn settle(&mut self, publish_partial: bool) {
        let progress = &self.run.progress;
        let terminal = progress.values().filter(|p| p.status.is_terminal()).count();
        let any_failed = progress.values().any(|p| p.status == RepoStatus::Failed);
        let any_started = progress.values().any(|p| p.status != RepoStatus::Pending);

        self.run.completed_repos = terminal;
        if self.run.status.is_terminal() {
            return;
        }

        if terminal == self.run.total_repos {
            self.run.status = if any_failed {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            };
            self.run.ended_at = Some(Utc::now());
            if !any_failed || publish_partial {
                self.results = Some(ScanResults::from_repositories(
                    std::mem::take(&mut self.outcomes),
                    any_failed,
                ));
            }
            info!(
                run_id = %self.run.id,
                status = %self.run.status,
                completed = terminal,
                "run finished"
            );
        } else if any_started {
            self.run.status = RunStatus::Running;
        }
    }
}

/// The single writer of one repository's progress entry.
///
/// Not `Clone`; `complete` and `fail` consume the slot, so a repository
/// reaches a terminal state exactly once. A slot dropped before either is
/// called (a worker that panicked or was cancelled) fails its repository.
pub struct ProgressSlot {
    run: Arc<RunHandle>,
    repo_id: String,
    finished: bool,
}

impl std::fmt::Debug for ProgressSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSlot")
            .field("run", &self.run.id)
            .field("repo_id", &self.repo_id)
            .finish()
    }
}

impl ProgressSlot {
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    fn write(&self, status: RepoStatus, percent: u8, message: &str, outcome: Option<RepoScanResult>) {
        let mut state = self.run.lock();
        if let Some(entry) = state.run.progress.get_mut(&self.repo_id) {
            entry.status = status;
            entry.percent = entry.percent.max(percent.min(100));
            entry.message = message.to_string();
        }
        if let Some(result) = outcome {
            state.outcomes.insert(self.repo_id.clone(), result);
        }
        state.settle(self.run.publish_partial);
    }

    /// Record a scanning milestone. Percent never decreases.
    pub fn update(&self, percent: u8, message: &str) {
        self.write(RepoStatus::Scanning, percent, message, None);
    }

    pub fn complete(mut self, result: RepoScanResult, message: &str) {
        self.write(RepoStatus::Completed, 100, message, Some(result));
        self.finished = true;
    }

    pub fn fail(mut self, message: &str) {
        self.write(RepoStatus::Failed, 0, message, None);
        self.finished = true;
    }
}

impl Drop for ProgressSlot {
    fn drop(&mut self) {
        if !self.finished {
            self.write(RepoStatus::Failed, 0, "Scan stopped before finishing", None);
        }
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn put(&self, run: Arc<RunHandle>);
    async fn get(&self, id: &str) -> Option<Arc<RunHandle>>;
    async fn list_all(&self) -> Vec<Arc<RunHandle>>;
    /// Remove runs started before `cutoff`; returns how many were removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize;
}

/// Process-lifetime store.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, Arc<RunHandle>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn put(&self, run: Arc<RunHandle>) {
        self.runs.write().await.insert(run.id.clone(), run);
    }

    async fn get(&self, id: &str) -> Option<Arc<RunHandle>> {
        self.runs.read().await.get(id).cloned()
    }

    async fn list_all(&self) -> Vec<Arc<RunHandle>> {
        let mut runs: Vec<Arc<RunHandle>> = self.runs.read().await.values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, run| run.started_at >= cutoff);
        before - runs.len()
    }
}
