//! Scans one repository and reports through its progress slot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{RepoCache, RepoCacheEntry};
use crate::classifier;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::models::{RepoRef, RepoScanResult, ScanDepth};
use crate::normalizer::{Normalizer, ParsedManifest};
use crate::parser::ManifestKind;
use crate::source::{EntryKind, RepositorySource, TreeEntry};
use crate::store::ProgressSlot;

// Progress milestones, in percent.
const DISPATCHED: u8 = 1;
const REF_RESOLVED: u8 = 5;
const TREE_LISTED: u8 = 15;
const FETCHED: u8 = 80;
const NORMALIZED: u8 = 90;
const ANNOTATED: u8 = 95;

/// Shared collaborators of every worker in a coordinator.
#[derive(Clone)]
pub struct WorkerContext {
    pub source: Arc<dyn RepositorySource>,
    pub normalizer: Arc<Normalizer>,
    pub cache: Arc<RepoCache>,
    pub settings: ScanConfig,
}

pub struct RepoScanWorker {
    repo: RepoRef,
    depth: ScanDepth,
    slot: ProgressSlot,
    ctx: WorkerContext,
}

/// Run a provider call under the fetch deadline.
async fn with_deadline<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, ScanError>>,
) -> Result<T, ScanError> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(ScanError::transient(what, format!("timed out after {:?}", timeout))))
}

/// Pro-rate fetch progress between the tree-listed and fetched milestones.
fn fetch_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return FETCHED;
    }
    let span = usize::from(FETCHED - TREE_LISTED);
    TREE_LISTED + (span * done.min(total) / total) as u8
}

impl RepoScanWorker {
    pub fn new(repo: RepoRef, depth: ScanDepth, slot: ProgressSlot, ctx: WorkerContext) -> Self {
        Self {
            repo,
            depth,
            slot,
            ctx,
        }
    }

    /// Drive the repository to a terminal state. Never panics on provider
    /// or parser errors; only ref resolution and tree listing can fail it.
    pub async fn run(self) {
        let RepoScanWorker {
            repo,
            depth,
            slot,
            ctx,
        } = self;
        info!(run_id = slot.run_id(), repo = %repo.id, %depth, "scanning repository");
        slot.update(DISPATCHED, "Resolving ref");

        let outcome = scan(&repo, depth, &slot, &ctx).await;
        match outcome {
            Ok((result, message)) => {
                info!(
                    run_id = slot.run_id(),
                    repo = %repo.id,
                    services = result.services.len(),
                    warnings = result.warnings.len(),
                    "repository scanned"
                );
                slot.complete(result, &message);
            }
            Err(err) => {
                warn!(run_id = slot.run_id(), repo = %repo.id, kind = err.kind(), error = %err, "repository failed");
                slot.fail(&err.help_message());
            }
        }
    }
}

async fn scan(
    repo: &RepoRef,
    depth: ScanDepth,
    slot: &ProgressSlot,
    ctx: &WorkerContext,
) -> Result<(RepoScanResult, String), ScanError> {
    let settings = &ctx.settings;
    let timeout = settings.fetch_timeout();

    let ref_id = with_deadline(
        timeout,
        &repo.default_ref,
        ctx.source.resolve_ref(repo, &repo.default_ref),
    )
    .await?;
    let short_ref: String = ref_id.chars().take(12).collect();
    slot.update(REF_RESOLVED, &format!("Resolved {} to {}", repo.default_ref, short_ref));

    let listing = with_deadline(timeout, &repo.name, ctx.source.list_tree(repo, &ref_id)).await?;
    let mut warnings = Vec::new();
    if listing.truncated {
        warnings.push("Tree listing was truncated by the provider; some manifests may be missing".to_string());
    }

    let mut manifests: Vec<(TreeEntry, ManifestKind)> = Vec::new();
    for entry in listing.entries {
        if entry.kind != EntryKind::Blob {
            continue;
        }
        let Some(kind) = classifier::match_path(&entry.path) else {
            continue;
        };
        if classifier::classify_with_limit(&entry.path, entry.size, settings.max_manifest_bytes).is_none() {
            warnings.push(format!(
                "Skipped {}: {} bytes exceeds the {} byte manifest limit",
                entry.path, entry.size, settings.max_manifest_bytes
            ));
            continue;
        }
        manifests.push((entry, kind));
    }
    slot.update(TREE_LISTED, &format!("Found {} manifests", manifests.len()));

    let entries: Vec<TreeEntry> = manifests.iter().map(|(e, _)| e.clone()).collect();

    if depth == ScanDepth::Incremental {
        if let Some(cached) = ctx.cache.get(&repo.id).await {
            if cached.is_current(&ref_id, &entries) {
                debug!(repo = %repo.id, "manifests unchanged, reusing cached scan");
                let mut result = cached.result;
                result.ref_id = ref_id.clone();
                slot.update(FETCHED, "Manifests unchanged");
                slot.update(NORMALIZED, "Reusing previous results");
                slot.update(ANNOTATED, "Reusing previous results");
                ctx.cache
                    .put(&repo.id, RepoCacheEntry::new(&ref_id, &entries, result.clone()))
                    .await;
                let message = summary(&result);
                return Ok((result, message));
            }
        }
    }

    let progress = |done: usize, total: usize| {
        slot.update(fetch_percent(done, total), &format!("Fetched {}/{} manifests", done, total));
    };
    let fetched = ctx
        .source
        .fetch_contents(repo, &entries, settings.concurrency_limit, timeout, &progress)
        .await;
    slot.update(FETCHED, "Parsing manifests");

    let mut parsed = Vec::new();
    let mut fetch_failed = false;
    for ((_, kind), object) in manifests.iter().zip(fetched) {
        let raw = match object.content {
            Ok(raw) => raw,
            Err(err) => {
                warn!(repo = %repo.id, path = %object.path, kind = err.kind(), error = %err, "manifest fetch failed");
                fetch_failed = true;
                warnings.push(fetch_warning(&object.path, &err));
                continue;
            }
        };
        let output = kind.parse(&raw);
        if let Some(message) = output.error {
            let err = ScanError::Parse {
                path: object.path.clone(),
                message,
            };
            warn!(repo = %repo.id, path = %object.path, error = %err, "manifest parse failed");
            warnings.push(err.to_string());
            continue;
        }
        parsed.push(ParsedManifest {
            path: object.path,
            kind: *kind,
            output,
        });
    }

    let mut services = ctx.normalizer.normalize(&repo.name, parsed);
    slot.update(NORMALIZED, "Checking advisories");
    ctx.normalizer.annotate(&mut services, Utc::now().date_naive()).await;
    slot.update(ANNOTATED, "Writing results");

    let result = RepoScanResult {
        repo_id: repo.id.clone(),
        repo_name: repo.name.clone(),
        ref_id: ref_id.clone(),
        services,
        warnings,
    };
    // A result missing fetched manifests must not be replayed by later incremental runs.
    if fetch_failed {
        debug!(repo = %repo.id, "not caching scan with failed fetches");
    } else {
        ctx.cache
            .put(&repo.id, RepoCacheEntry::new(&ref_id, &entries, result.clone()))
            .await;
    }
    let message = summary(&result);
    Ok((result, message))
}

/// Warning text for a manifest that could not be fetched. Quota and
/// credential errors carry their remediation hint.
fn fetch_warning(path: &str, err: &ScanError) -> String {
    match err {
        ScanError::TransientFetch { .. } => err.to_string(),
        _ => format!("Fetch failed for {}: {}", path, err.help_message()),
    }
}

fn summary(result: &RepoScanResult) -> String {
    let components: usize = result.services.iter().map(|s| s.components.len()).sum();
    let mut message = format!(
        "Found {} services, {} components",
        result.services.len(),
        components
    );
    if !result.warnings.is_empty() {
        message.push_str(&format!(" ({} warnings)", result.warnings.len()));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::NoAdvisory;
    use crate::models::{RepoStatus, RunStatus};
    use crate::source::memory::MemorySource;
    use crate::store::RunHandle;
    use std::path::Path;

    fn context(source: Arc<MemorySource>) -> WorkerContext {
        let settings = ScanConfig::default();
        WorkerContext {
            source,
            normalizer: Arc::new(Normalizer::new(
                Arc::new(NoAdvisory),
                settings.concurrency_limit,
                settings.fetch_timeout(),
            )),
            cache: Arc::new(RepoCache::new()),
            settings,
        }
    }

    async fn scan_once(repo: &RepoRef, ctx: &WorkerContext, depth: ScanDepth) -> Arc<RunHandle> {
        let (run, mut slots) = RunHandle::create("run".into(), vec![repo.clone()], depth, false);
        let slot = slots.remove(0);
        RepoScanWorker::new(repo.clone(), depth, slot, ctx.clone()).run().await;
        run
    }

    #[test]
    fn test_fetch_percent() {
        assert_eq!(fetch_percent(0, 4), 15);
        assert_eq!(fetch_percent(2, 4), 47);
        assert_eq!(fetch_percent(4, 4), 80);
        assert_eq!(fetch_percent(0, 0), 80);
    }

    #[tokio::test]
    async fn test_parse_failure_is_isolated() {
        let repo = RepoRef::local(Path::new("/repos/mixed"));
        let source = Arc::new(
            MemorySource::new()
                .with_file("web/package.json", "{ not json")
                .with_file("api/requirements.txt", "flask==2.0.0\n")
                .with_file("README.md", "# docs"),
        );
        let run = scan_once(&repo, &context(source), ScanDepth::Full).await;

        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, RunStatus::Completed);
        let progress = &snapshot.progress[&repo.id];
        assert_eq!(progress.status, RepoStatus::Completed);
        assert_eq!(progress.percent, 100);

        let results = run.results().unwrap();
        let result = &results.repositories[&repo.id];
        assert_eq!(result.services.len(), 1);
        assert_eq!(result.services[0].path, "api");
        assert_eq!(result.services[0].components[0].name, "flask");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("web/package.json"));
    }

    #[tokio::test]
    async fn test_fetch_failure_becomes_warning() {
        let repo = RepoRef::local(Path::new("/repos/flaky"));
        let source = Arc::new(
            MemorySource::new()
                .with_file("package.json", r#"{"dependencies":{"left-pad":"1.3.0"}}"#)
                .with_file("Dockerfile", "FROM node:18\n")
                .failing_object("Dockerfile"),
        );
        let run = scan_once(&repo, &context(source), ScanDepth::Full).await;
        let results = run.results().unwrap();
        let result = &results.repositories[&repo.id];
        assert_eq!(result.services[0].components.len(), 1);
        assert_eq!(result.services[0].manifests, vec!["package.json"]);
        assert!(result.warnings[0].contains("Dockerfile"));
    }

    #[tokio::test]
    async fn test_ref_failure_fails_repository() {
        let repo = RepoRef::local(Path::new("/repos/gone"));
        let source = Arc::new(
            MemorySource::new().with_ref_error(&repo.id, ScanError::NotFound("branch nope".into())),
        );
        let run = scan_once(&repo, &context(source), ScanDepth::Full).await;
        let snapshot = run.snapshot();
        assert_eq!(snapshot.status, RunStatus::Failed);
        let progress = &snapshot.progress[&repo.id];
        assert_eq!(progress.status, RepoStatus::Failed);
        assert_eq!(progress.message, "Not found: branch nope");
        assert!(run.results().is_none());
    }

    #[tokio::test]
    async fn test_oversize_manifest_is_skipped_with_warning() {
        let repo = RepoRef::local(Path::new("/repos/big"));
        let source = Arc::new(MemorySource::new().with_file("package.json", &"x".repeat(64)));
        let mut ctx = context(source.clone());
        ctx.settings.max_manifest_bytes = 32;
        let run = scan_once(&repo, &ctx, ScanDepth::Full).await;

        let results = run.results().unwrap();
        let result = &results.repositories[&repo.id];
        assert!(result.services.is_empty());
        assert!(result.warnings[0].contains("Skipped package.json"));
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_incremental_reuses_unchanged_manifests() {
        let repo = RepoRef::local(Path::new("/repos/steady"));
        let source = Arc::new(
            MemorySource::new().with_file("package.json", r#"{"dependencies":{"express":"4.18.2"}}"#),
        );
        let ctx = context(source.clone());

        scan_once(&repo, &ctx, ScanDepth::Full).await;
        assert_eq!(source.fetch_count(), 1);

        // A non-manifest change moves the ref but leaves fingerprints alone.
        source.set_shared_file("docs/notes.md", "changed");
        let run = scan_once(&repo, &ctx, ScanDepth::Incremental).await;
        assert_eq!(source.fetch_count(), 1);
        let snapshot = run.snapshot();
        assert_eq!(snapshot.progress[&repo.id].percent, 100);
        assert_eq!(run.results().unwrap().repositories[&repo.id].services.len(), 1);

        // A manifest change forces a fetch.
        source.set_shared_file("package.json", r#"{"dependencies":{"express":"4.19.0"}}"#);
        let run = scan_once(&repo, &ctx, ScanDepth::Incremental).await;
        assert_eq!(source.fetch_count(), 2);
        let results = run.results().unwrap();
        assert_eq!(results.repositories[&repo.id].services[0].components[0].version, "4.19.0");
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_reused_incrementally() {
        let repo = RepoRef::local(Path::new("/repos/recovering"));
        let manifest = r#"{"dependencies":{"left-pad":"1.3.0"}}"#;
        let failing = Arc::new(
            MemorySource::new()
                .with_file("package.json", manifest)
                .failing_object("package.json"),
        );
        let ctx = context(failing);
        let run = scan_once(&repo, &ctx, ScanDepth::Full).await;
        assert!(run.results().unwrap().repositories[&repo.id].services.is_empty());
        assert!(ctx.cache.get(&repo.id).await.is_none());

        // Same files, so the same ref id; the shared cache must not short-circuit.
        let healthy = Arc::new(MemorySource::new().with_file("package.json", manifest));
        let ctx = WorkerContext {
            source: healthy.clone(),
            ..ctx
        };
        let run = scan_once(&repo, &ctx, ScanDepth::Incremental).await;
        assert_eq!(healthy.fetch_count(), 1);
        let results = run.results().unwrap();
        let result = &results.repositories[&repo.id];
        assert_eq!(result.services[0].components[0].name, "left-pad");
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_fetch_warns_with_retry_hint() {
        let repo = RepoRef::local(Path::new("/repos/throttled"));
        let source = Arc::new(
            MemorySource::new()
                .with_file("package.json", r#"{"dependencies":{"left-pad":"1.3.0"}}"#)
                .with_object_error(
                    "package.json",
                    ScanError::RateLimit {
                        message: "package.json returned 403".to_string(),
                        retry_after: Some(Duration::from_secs(42)),
                    },
                ),
        );
        let run = scan_once(&repo, &context(source), ScanDepth::Full).await;

        let snapshot = run.snapshot();
        assert_eq!(snapshot.progress[&repo.id].status, RepoStatus::Completed);
        let results = run.results().unwrap();
        let warnings = &results.repositories[&repo.id].warnings;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("package.json"));
        assert!(warnings[0].contains("Retry in 42 seconds"));
    }
}
