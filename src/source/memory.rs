//! In-memory [`RepositorySource`] used by worker and coordinator tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{RepositorySource, TreeEntry, TreeListing};
use crate::error::ScanError;
use crate::models::RepoRef;

#[derive(Default)]
struct Repo {
    files: BTreeMap<String, String>,
    ref_id: Option<String>,
    ref_error: Option<ScanError>,
}

/// Repositories are keyed by repo id; the builder methods without a repo id
/// apply to every repository.
#[derive(Default)]
pub struct MemorySource {
    repos: Mutex<BTreeMap<String, Repo>>,
    shared_files: Mutex<BTreeMap<String, String>>,
    failing_objects: HashMap<String, ScanError>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.set_shared_file(path, content);
        self
    }

    pub fn with_repo_file(self, repo_id: &str, path: &str, content: &str) -> Self {
        self.set_file(repo_id, path, content);
        self
    }

    pub fn with_ref_error(self, repo_id: &str, error: ScanError) -> Self {
        if let Ok(mut repos) = self.repos.lock() {
            repos.entry(repo_id.to_string()).or_default().ref_error = Some(error);
        }
        self
    }

    pub fn failing_object(self, path: &str) -> Self {
        let error = ScanError::transient(path, "connection reset");
        self.with_object_error(path, error)
    }

    pub fn with_object_error(mut self, path: &str, error: ScanError) -> Self {
        self.failing_objects.insert(path.to_string(), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_file(&self, repo_id: &str, path: &str, content: &str) {
        if let Ok(mut repos) = self.repos.lock() {
            repos
                .entry(repo_id.to_string())
                .or_default()
                .files
                .insert(path.to_string(), content.to_string());
        }
    }

    pub fn set_shared_file(&self, path: &str, content: &str) {
        if let Ok(mut shared) = self.shared_files.lock() {
            shared.insert(path.to_string(), content.to_string());
        }
    }

    /// Pin the ref id returned for `repo_id` instead of deriving it from content.
    pub fn set_ref_id(&self, repo_id: &str, ref_id: &str) {
        if let Ok(mut repos) = self.repos.lock() {
            repos.entry(repo_id.to_string()).or_default().ref_id = Some(ref_id.to_string());
        }
    }

    /// Number of `fetch_object` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn files_for(&self, repo_id: &str) -> BTreeMap<String, String> {
        let mut files = self.shared_files.lock().map(|s| s.clone()).unwrap_or_default();
        if let Ok(repos) = self.repos.lock() {
            if let Some(repo) = repos.get(repo_id) {
                files.extend(repo.files.clone());
            }
        }
        files
    }
}

fn digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[async_trait]
impl RepositorySource for MemorySource {
    async fn resolve_ref(&self, repo: &RepoRef, _ref_name: &str) -> Result<String, ScanError> {
        if let Ok(repos) = self.repos.lock() {
            if let Some(entry) = repos.get(&repo.id) {
                if let Some(err) = &entry.ref_error {
                    return Err(err.clone());
                }
                if let Some(ref_id) = &entry.ref_id {
                    return Ok(ref_id.clone());
                }
            }
        }
        let listing: String = self
            .files_for(&repo.id)
            .iter()
            .map(|(path, content)| format!("{}={}\n", path, digest(content)))
            .collect();
        Ok(digest(&listing))
    }

    async fn list_tree(&self, repo: &RepoRef, _ref_id: &str) -> Result<TreeListing, ScanError> {
        let entries = self
            .files_for(&repo.id)
            .iter()
            .map(|(path, content)| TreeEntry::blob(path.as_str(), digest(content), content.len() as u64))
            .collect();
        Ok(TreeListing {
            entries,
            truncated: false,
        })
    }

    async fn fetch_object(&self, repo: &RepoRef, entry: &TreeEntry) -> Result<String, ScanError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failing_objects.get(&entry.path) {
            return Err(error.clone());
        }
        self.files_for(&repo.id)
            .remove(&entry.path)
            .ok_or_else(|| ScanError::NotFound(entry.path.clone()))
    }
}
