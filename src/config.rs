use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::classifier::MAX_MANIFEST_BYTES;

/// Root configuration structure, deserialized from `.depscan/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

/// Knobs for the repository workers.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Objects fetched concurrently per chunk.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Deadline applied to every outbound request.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Manifests larger than this are skipped.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: u64,
    /// Caps simultaneously scanning repositories. Unset means one worker per
    /// repository, all started at once.
    #[serde(default)]
    pub max_concurrent_repos: Option<usize>,
    /// Publish results for the repositories that succeeded when a run fails.
    #[serde(default)]
    pub publish_partial_results: bool,
}

impl ScanConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_manifest_bytes: default_max_manifest_bytes(),
            max_concurrent_repos: None,
            publish_partial_results: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Runs older than this are evicted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

impl StoreConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
        }
    }
}

fn default_concurrency_limit() -> usize {
    6
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_manifest_bytes() -> u64 {
    MAX_MANIFEST_BYTES
}

fn default_retention_days() -> u32 {
    7
}

fn default_eviction_interval_secs() -> u64 {
    3600
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Config {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scan.concurrency_limit == 0 {
            bail!("scan.concurrency_limit must be at least 1");
        }
        if self.scan.fetch_timeout_secs == 0 {
            bail!("scan.fetch_timeout_secs must be at least 1");
        }
        if self.scan.max_concurrent_repos == Some(0) {
            bail!("scan.max_concurrent_repos must be at least 1 when set");
        }
        if self.store.eviction_interval_secs == 0 {
            bail!("store.eviction_interval_secs must be at least 1");
        }
        Ok(())
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `<project_path>/.depscan/config.toml`
/// 3. `~/.config/depscan/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = config_override {
        read_config(path)?
    } else {
        let project_config = project_path.join(".depscan").join("config.toml");
        let home_config = dirs::home_dir().map(|home| {
            home.join(".config").join("depscan").join("config.toml")
        });

        if project_config.exists() {
            read_config(&project_config)?
        } else if let Some(home_config) = home_config.filter(|p| p.exists()) {
            read_config(&home_config)?
        } else {
            Config::default()
        }
    };

    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.scan.concurrency_limit, 6);
        assert_eq!(cfg.scan.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.scan.max_manifest_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.store.retention_days, 7);
        assert!(!cfg.scan.publish_partial_results);
        assert_eq!(cfg.github.token_env, "GITHUB_TOKEN");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[scan]\nconcurrency_limit = 3\n\n[github]\napi_url = \"http://ghe.local/api/v3\"\n").unwrap();

        let cfg = load_config(Path::new("/nonexistent"), Some(f.path())).unwrap();
        assert_eq!(cfg.scan.concurrency_limit, 3);
        assert_eq!(cfg.scan.fetch_timeout_secs, 30);
        assert_eq!(cfg.github.api_url, "http://ghe.local/api/v3");
        assert_eq!(cfg.github.token_env, "GITHUB_TOKEN");
    }

    #[test]
    fn test_project_config_is_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".depscan")).unwrap();
        std::fs::write(
            dir.path().join(".depscan").join("config.toml"),
            "[store]\nretention_days = 1\n",
        )
        .unwrap();

        let cfg = load_config(dir.path(), None).unwrap();
        assert_eq!(cfg.store.retention_days, 1);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[scan]\nconcurrency_limit = 0\n").unwrap();
        assert!(load_config(Path::new("/nonexistent"), Some(f.path())).is_err());
    }

    #[test]
    fn test_zero_eviction_interval_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[store]\neviction_interval_secs = 0\n").unwrap();
        let err = load_config(Path::new("/nonexistent"), Some(f.path())).unwrap_err();
        assert!(err.to_string().contains("eviction_interval_secs"));
    }
}
