//! `depscan` command line: scan the given repositories as one run and print
//! the inventory.
//!
//! Exits `0` when every repository was scanned, `1` when the run failed or
//! (with `--fail-on-flagged`) when any component is flagged.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{parse_repo_arg, Cli, ReportFormat};
use depscan::advisory::{AdvisoryLookup, NoAdvisory, OnlineAdvisory};
use depscan::config::load_config;
use depscan::coordinator::RunCoordinator;
use depscan::models::{Provider, RepoRef, RunStatus};
use depscan::report;
use depscan::source::github::GitHubSource;
use depscan::source::local::LocalSource;
use depscan::source::EnvCredentials;
use depscan::store::MemoryRunStore;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.effective_log_level())?;

    let repos: Vec<RepoRef> = cli.repos.iter().map(|arg| parse_repo_arg(arg)).collect();

    // Project config is looked up next to the first local repository.
    let project = repos
        .iter()
        .find(|r| r.provider == Provider::Local)
        .and_then(|r| r.url.as_deref())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = load_config(&project, cli.config.as_deref())?;

    let client = reqwest::Client::builder()
        .timeout(config.scan.fetch_timeout())
        .build()?;
    let credentials = Arc::new(EnvCredentials::new(config.github.token_env.clone()));
    let github = GitHubSource::new(client, &config.github.api_url, credentials);

    let advisory: Arc<dyn AdvisoryLookup> = if cli.online {
        Arc::new(OnlineAdvisory::new(config.scan.fetch_timeout())?)
    } else {
        Arc::new(NoAdvisory)
    };

    let coordinator = RunCoordinator::new(config, Arc::new(MemoryRunStore::new()), advisory)
        .with_source(Provider::GitHub, Arc::new(github))
        .with_source(Provider::Local, Arc::new(LocalSource::new()));

    let run_id = match coordinator.start_run(repos, cli.depth.into()).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e.help_message());
            std::process::exit(1);
        }
    };
    info!(run_id = %run_id, "waiting for run");

    let run = if cli.quiet {
        coordinator.wait(&run_id, POLL_INTERVAL).await?
    } else {
        let run = coordinator.get_run(&run_id).await?;
        let pb = ProgressBar::new(run.total_repos as u64 * 100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}",
                )?
                .progress_chars("#>-"),
        );
        loop {
            let run = coordinator.get_run(&run_id).await?;
            let done: u64 = run.progress.values().map(|p| u64::from(p.percent)).sum();
            pb.set_position(done);
            pb.set_message(format!("{}/{} repositories", run.completed_repos, run.total_repos));
            if run.status.is_terminal() {
                pb.finish_with_message("Done");
                break run;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    let results = coordinator.get_results(&run_id).await.ok();

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&run, results.as_ref(), cli.verbose, cli.quiet)?;
        }
        ReportFormat::Json => {
            println!("{}", report::json::render(&run, results.as_ref())?);
        }
    }

    let flagged = results.as_ref().map_or(0, |r| r.totals.flagged);
    if run.status == RunStatus::Failed || (cli.fail_on_flagged && flagged > 0) {
        std::process::exit(1);
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `--log-level`.
fn init_logging(level: &str) -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        filter = filter
            .add_directive(format!("depscan={}", level).parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("reqwest=warn".parse()?);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
    Ok(())
}
