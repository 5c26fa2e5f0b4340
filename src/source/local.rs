use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{RepositorySource, TreeEntry, TreeListing};
use crate::error::ScanError;
use crate::models::RepoRef;

/// Scans a directory on disk. Object ids are derived from path, size and
/// modification time, so an unchanged file keeps its fingerprint.
#[derive(Debug, Default)]
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }
}

fn root_of(repo: &RepoRef) -> PathBuf {
    PathBuf::from(repo.url.as_deref().unwrap_or(repo.id.as_str()))
}

/// Walk `root` and return every file, sorted by relative path.
fn walk(root: &Path) -> Vec<TreeEntry> {
    let git_dir = root.join(".git");
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .parents(false)
        .require_git(false)
        .filter_entry(move |entry| entry.path() != git_dir.as_path());

    let mut entries = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());

        let mut hasher = Sha256::new();
        hasher.update(rel.as_bytes());
        hasher.update(meta.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
        let object_id = hex::encode(hasher.finalize());

        entries.push(TreeEntry::blob(rel, object_id, meta.len()));
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// A named branch must exist when the directory is a git checkout.
fn branch_exists(root: &Path, branch: &str) -> bool {
    let git_dir = root.join(".git");
    if !git_dir.is_dir() {
        return true;
    }
    if git_dir.join("refs/heads").join(branch).is_file() {
        return true;
    }
    let wanted = format!("refs/heads/{}", branch);
    std::fs::read_to_string(git_dir.join("packed-refs"))
        .map(|packed| {
            packed
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(wanted.as_str()))
        })
        .unwrap_or(false)
}

async fn walk_blocking(root: PathBuf) -> Result<Vec<TreeEntry>, ScanError> {
    let display = root.display().to_string();
    tokio::task::spawn_blocking(move || walk(&root))
        .await
        .map_err(|e| ScanError::transient(display, e))
}

#[async_trait]
impl RepositorySource for LocalSource {
    async fn resolve_ref(&self, repo: &RepoRef, ref_name: &str) -> Result<String, ScanError> {
        let root = root_of(repo);
        if !root.is_dir() {
            return Err(ScanError::NotFound(format!("directory {}", root.display())));
        }
        if ref_name != "HEAD" && !branch_exists(&root, ref_name) {
            return Err(ScanError::NotFound(format!("branch {} in {}", ref_name, repo.name)));
        }

        let mut hasher = Sha256::new();
        for entry in walk_blocking(root).await? {
            hasher.update(entry.path.as_bytes());
            hasher.update([0u8]);
            hasher.update(entry.object_id.as_bytes());
            hasher.update([b'\n']);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    async fn list_tree(&self, repo: &RepoRef, _ref_id: &str) -> Result<TreeListing, ScanError> {
        let root = root_of(repo);
        if !root.is_dir() {
            return Err(ScanError::NotFound(format!("directory {}", root.display())));
        }
        Ok(TreeListing {
            entries: walk_blocking(root).await?,
            truncated: false,
        })
    }

    async fn fetch_object(&self, repo: &RepoRef, entry: &TreeEntry) -> Result<String, ScanError> {
        let path = root_of(repo).join(&entry.path);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ScanError::transient(&entry.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
