use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CredentialProvider, EntryKind, RepositorySource, TreeEntry, TreeListing};
use crate::error::ScanError;
use crate::models::RepoRef;

const USER_AGENT_VALUE: &str = concat!("depscan/", env!("CARGO_PKG_VERSION"));

/// GitHub REST v3 provider.
pub struct GitHubSource {
    client: Client,
    api_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
}

impl GitHubSource {
    pub fn new(client: Client, api_url: &str, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn request(&self, url: &str, accept: &str) -> RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = self.credentials.token() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
    }

    /// Send a request and map any non-success status to a [`ScanError`].
    async fn send(&self, url: &str, accept: &str, subject: &str) -> Result<reqwest::Response, ScanError> {
        debug!(url, "GitHub request");
        let response = self
            .request(url, accept)
            .send()
            .await
            .map_err(|e| ScanError::transient(subject, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let err = map_status(status, response.headers(), subject);
        debug!(url, %status, kind = err.kind(), "GitHub request failed");
        Err(err)
    }

    fn repo_base(&self, repo: &RepoRef) -> Result<String, ScanError> {
        let coordinate = repo_coordinate(repo)
            .ok_or_else(|| ScanError::Validation(format!("not a GitHub repository: {}", repo.id)))?;
        Ok(format!("{}/repos/{}", self.api_url, coordinate))
    }
}

/// `owner/name` from the repository URL, falling back to the display name.
fn repo_coordinate(repo: &RepoRef) -> Option<String> {
    let from_url = repo.url.as_deref().and_then(|url| {
        let rest = url
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .split_once("github.com/")?
            .1;
        let mut parts = rest.split('/');
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty())?;
        Some(format!("{}/{}", owner, name))
    });
    from_url.or_else(|| {
        let (owner, name) = repo.name.split_once('/')?;
        (!owner.is_empty() && !name.is_empty()).then(|| repo.name.clone())
    })
}

/// Map an unsuccessful GitHub response status onto the error taxonomy.
fn map_status(status: StatusCode, headers: &HeaderMap, subject: &str) -> ScanError {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    match status {
        StatusCode::UNAUTHORIZED => ScanError::Auth(format!("{} returned {}", subject, status)),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = header("retry-after").and_then(|v| v.parse::<u64>().ok());
            let exhausted = header("x-ratelimit-remaining") == Some("0");
            if retry_after.is_some() || exhausted {
                let reset_in = header("x-ratelimit-reset")
                    .and_then(|v| v.parse::<i64>().ok())
                    .map(|reset| (reset - chrono::Utc::now().timestamp()).max(0) as u64);
                ScanError::RateLimit {
                    message: format!("{} returned {}", subject, status),
                    retry_after: retry_after.or(reset_in).map(Duration::from_secs),
                }
            } else if status == StatusCode::FORBIDDEN {
                ScanError::Auth(format!("{} returned {}", subject, status))
            } else {
                ScanError::RateLimit {
                    message: format!("{} returned {}", subject, status),
                    retry_after: None,
                }
            }
        }
        StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => ScanError::NotFound(subject.to_string()),
        other => ScanError::transient(subject, format!("unexpected status {}", other)),
    }
}

#[async_trait]
impl RepositorySource for GitHubSource {
    async fn resolve_ref(&self, repo: &RepoRef, ref_name: &str) -> Result<String, ScanError> {
        let url = format!("{}/commits/{}", self.repo_base(repo)?, ref_name);
        let subject = format!("{}@{}", repo.name, ref_name);
        let response = self.send(&url, "application/vnd.github.sha", &subject).await?;
        let sha = response
            .text()
            .await
            .map_err(|e| ScanError::transient(&subject, e))?;
        Ok(sha.trim().to_string())
    }

    async fn list_tree(&self, repo: &RepoRef, ref_id: &str) -> Result<TreeListing, ScanError> {
        let url = format!("{}/git/trees/{}?recursive=1", self.repo_base(repo)?, ref_id);
        let subject = format!("{} tree", repo.name);
        let response = self.send(&url, "application/vnd.github+json", &subject).await?;
        let body: TreeResponse = response
            .json()
            .await
            .map_err(|e| ScanError::transient(&subject, e))?;

        if body.truncated {
            warn!(repo = %repo.id, "GitHub truncated the tree listing");
        }

        let entries = body
            .tree
            .into_iter()
            .map(|item| TreeEntry {
                kind: match item.kind.as_str() {
                    "blob" => EntryKind::Blob,
                    "tree" => EntryKind::Tree,
                    _ => EntryKind::Other,
                },
                path: item.path,
                object_id: item.sha,
                size: item.size,
            })
            .collect();

        Ok(TreeListing {
            entries,
            truncated: body.truncated,
        })
    }

    async fn fetch_object(&self, repo: &RepoRef, entry: &TreeEntry) -> Result<String, ScanError> {
        let url = format!("{}/git/blobs/{}", self.repo_base(repo)?, entry.object_id);
        let response = self
            .send(&url, "application/vnd.github.raw", &entry.path)
            .await
            .map_err(|err| match err {
                // A missing blob at a resolved ref is a per-file problem.
                ScanError::NotFound(_) => ScanError::transient(&entry.path, "blob not found"),
                other => other,
            })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScanError::transient(&entry.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
