use std::path::{Path, PathBuf};

use clap::Parser;

use depscan::models::{RepoRef, ScanDepth};

#[derive(Parser, Debug)]
#[command(
    name = "depscan",
    about = "Scan repositories and build an inventory of their dependencies",
    version
)]
pub struct Cli {
    /// Repositories to scan: `owner/name[@ref]`, `github:owner/name[@ref]` or a local path
    #[arg(default_value = ".", value_name = "REPO")]
    pub repos: Vec<String>,

    /// Scan depth; incremental reuses unchanged results from earlier runs
    #[arg(long, default_value = "full", value_name = "DEPTH")]
    pub depth: DepthArg,

    /// Look up latest versions, vulnerabilities and end-of-life dates online
    #[arg(long)]
    pub online: bool,

    /// Config file [default: ./.depscan/config.toml, fallback ~/.config/depscan/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Log level used when RUST_LOG is unset [default: warn, info with -v, error with -q]
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Exit with status 1 when any component is flagged
    #[arg(long)]
    pub fail_on_flagged: bool,

    /// Show every component (not just flagged and end-of-life ones)
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum DepthArg {
    Full,
    Incremental,
}

impl Cli {
    pub fn effective_log_level(&self) -> &str {
        match (&self.log_level, self.quiet, self.verbose) {
            (Some(level), _, _) => level.as_str(),
            (None, true, _) => "error",
            (None, false, true) => "info",
            (None, false, false) => "warn",
        }
    }
}

impl From<DepthArg> for ScanDepth {
    fn from(arg: DepthArg) -> Self {
        match arg {
            DepthArg::Full => ScanDepth::Full,
            DepthArg::Incremental => ScanDepth::Incremental,
        }
    }
}

/// Interpret one positional argument. Existing paths win over the
/// `owner/name` shorthand.
pub fn parse_repo_arg(arg: &str) -> RepoRef {
    if let Some(rest) = arg.strip_prefix("github:") {
        return github_ref(rest);
    }
    let path = Path::new(arg);
    if path.exists() {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        return RepoRef::local(&path);
    }
    if looks_like_owner_repo(arg) {
        return github_ref(arg);
    }
    RepoRef::local(path)
}

fn github_ref(spec: &str) -> RepoRef {
    match spec.split_once('@') {
        Some((repo, reference)) if !reference.is_empty() => RepoRef::github(repo, Some(reference)),
        Some((repo, _)) => RepoRef::github(repo, None),
        None => RepoRef::github(spec, None),
    }
}

fn looks_like_owner_repo(arg: &str) -> bool {
    let repo = arg.split_once('@').map_or(arg, |(repo, _)| repo);
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None)
            if !owner.is_empty() && !name.is_empty() && !owner.starts_with('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use depscan::models::Provider;

    #[test]
    fn test_github_shorthand() {
        let repo = parse_repo_arg("acme/widgets@release/2.x");
        assert_eq!(repo.provider, Provider::GitHub);
        assert_eq!(repo.id, "github:acme/widgets");
        assert_eq!(repo.default_ref, "release/2.x");

        let repo = parse_repo_arg("github:acme/widgets");
        assert_eq!(repo.default_ref, "HEAD");
    }

    #[test]
    fn test_existing_path_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let repo = parse_repo_arg(dir.path().to_str().unwrap());
        assert_eq!(repo.provider, Provider::Local);
    }

    #[test]
    fn test_log_level_follows_verbosity() {
        let cli = Cli::parse_from(["depscan", "-q"]);
        assert_eq!(cli.effective_log_level(), "error");
        let cli = Cli::parse_from(["depscan", "-v", "--log-level", "trace"]);
        assert_eq!(cli.effective_log_level(), "trace");
        let cli = Cli::parse_from(["depscan", "acme/web", "--depth", "incremental"]);
        assert_eq!(cli.effective_log_level(), "warn");
        assert!(matches!(cli.depth, DepthArg::Incremental));
    }

    #[test]
    fn test_relative_paths_are_not_github() {
        assert_eq!(parse_repo_arg("./does-not-exist/x").provider, Provider::Local);
        assert_eq!(parse_repo_arg("a/b/c").provider, Provider::Local);
    }
}
