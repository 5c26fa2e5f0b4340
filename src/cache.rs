//! Last successful scan per repository, for incremental runs.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::models::RepoScanResult;
use crate::source::TreeEntry;

/// What the last successful scan of a repository saw and produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoCacheEntry {
    pub ref_id: String,
    pub manifest_paths: Vec<String>,
    /// Manifest path → provider object id.
    pub fingerprints: BTreeMap<String, String>,
    pub result: RepoScanResult,
}

impl RepoCacheEntry {
    pub fn new(ref_id: &str, manifests: &[TreeEntry], result: RepoScanResult) -> Self {
        Self {
            ref_id: ref_id.to_string(),
            manifest_paths: manifests.iter().map(|m| m.path.clone()).collect(),
            fingerprints: manifests
                .iter()
                .map(|m| (m.path.clone(), m.object_id.clone()))
                .collect(),
            result,
        }
    }

    /// The cached result still describes the repository: same ref, or the
    /// same manifest set with unchanged content.
    pub fn is_current(&self, ref_id: &str, manifests: &[TreeEntry]) -> bool {
        if self.ref_id == ref_id {
            return true;
        }
        manifests.len() == self.manifest_paths.len()
            && manifests.iter().zip(&self.manifest_paths).all(|(m, path)| {
                m.path == *path && self.fingerprints.get(&m.path) == Some(&m.object_id)
            })
    }
}

/// Last scan per repository id. Entries are overwritten, never merged.
#[derive(Debug, Default)]
pub struct RepoCache {
    entries: RwLock<HashMap<String, RepoCacheEntry>>,
}

impl RepoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, repo_id: &str) -> Option<RepoCacheEntry> {
        self.entries.read().await.get(repo_id).cloned()
    }

    pub async fn put(&self, repo_id: &str, entry: RepoCacheEntry) {
        self.entries.write().await.insert(repo_id.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> RepoScanResult {
        RepoScanResult {
            repo_id: "local:/r".to_string(),
            repo_name: "r".to_string(),
            ref_id: "ref-1".to_string(),
            services: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_is_current() {
        let manifests = vec![
            TreeEntry::blob("package.json", "aaa", 10),
            TreeEntry::blob("api/pom.xml", "bbb", 20),
        ];
        let entry = RepoCacheEntry::new("ref-1", &manifests, result());

        assert!(entry.is_current("ref-1", &[]));
        assert!(entry.is_current("ref-2", &manifests));

        let mut changed = manifests.clone();
        changed[1].object_id = "ccc".to_string();
        assert!(!entry.is_current("ref-2", &changed));

        assert!(!entry.is_current("ref-2", &manifests[..1]));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = RepoCache::new();
        assert!(cache.get("r").await.is_none());
        cache.put("r", RepoCacheEntry::new("ref-1", &[], result())).await;
        cache.put("r", RepoCacheEntry::new("ref-2", &[], result())).await;
        assert_eq!(cache.get("r").await.unwrap().ref_id, "ref-2");
    }
}
