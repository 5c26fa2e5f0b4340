//! Repository content providers.
//!
//! A [`RepositorySource`] resolves a ref, lists the tree at that ref and
//! fetches individual objects. [`RepositorySource::fetch_contents`] layers
//! the bounded-concurrency batch policy on top of `fetch_object`.

pub mod github;
pub mod local;
#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::batch::run_chunked;
use crate::error::ScanError;
use crate::models::RepoRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    Other,
}

/// One entry of a repository tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// Provider object id; equal ids mean equal content.
    pub object_id: String,
    pub size: u64,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, object_id: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            object_id: object_id.into(),
            size,
            kind: EntryKind::Blob,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeListing {
    pub entries: Vec<TreeEntry>,
    /// The provider cut the listing short.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct FetchedObject {
    pub path: String,
    pub content: Result<String, ScanError>,
}

#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Resolve a branch, tag or `HEAD` to an immutable ref id.
    async fn resolve_ref(&self, repo: &RepoRef, ref_name: &str) -> Result<String, ScanError>;

    async fn list_tree(&self, repo: &RepoRef, ref_id: &str) -> Result<TreeListing, ScanError>;

    async fn fetch_object(&self, repo: &RepoRef, entry: &TreeEntry) -> Result<String, ScanError>;

    /// Fetch `entries` in chunks of `concurrency_limit`, each fetch under
    /// `timeout`. Failures are reported per object; output order matches
    /// input order.
    async fn fetch_contents(
        &self,
        repo: &RepoRef,
        entries: &[TreeEntry],
        concurrency_limit: usize,
        timeout: Duration,
        on_progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Vec<FetchedObject> {
        let total = entries.len();
        run_chunked(
            entries.iter().collect(),
            concurrency_limit,
            |entry| async move {
                let content = match tokio::time::timeout(timeout, self.fetch_object(repo, entry)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScanError::transient(
                        &entry.path,
                        format!("timed out after {:?}", timeout),
                    )),
                };
                FetchedObject {
                    path: entry.path.clone(),
                    content,
                }
            },
            |done| on_progress(done, total),
        )
        .await
    }
}

/// Supplies the access token for a provider. `None` means anonymous access.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Reads the token from an environment variable on every request.
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredentials {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|t| !t.trim().is_empty())
    }
}

pub struct StaticCredentials(pub Option<String>);

impl CredentialProvider for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}
