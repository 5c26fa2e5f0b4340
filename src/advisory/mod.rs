//! Advisory data for normalized components: latest published version,
//! known-vulnerability count and end-of-life date.
//!
//! The engine never invents this data. [`NoAdvisory`] answers nothing;
//! [`OnlineAdvisory`] asks the public package registries, the OSV database
//! and endoflife.date. Network failures degrade to "no data".

pub mod crates_io;
pub mod eol;
pub mod maven;
pub mod npm;
pub mod osv;
pub mod pypi;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use tracing::debug;

use crate::models::Ecosystem;

pub(crate) const USER_AGENT: &str = concat!("depscan/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advisory {
    pub latest_version: Option<String>,
    pub vulnerabilities: Option<u32>,
    pub end_of_life: Option<NaiveDate>,
}

impl Advisory {
    /// End of life has been reached on `today`.
    pub fn is_eol(&self, today: NaiveDate) -> bool {
        self.end_of_life.is_some_and(|date| date <= today)
    }
}

#[async_trait]
pub trait AdvisoryLookup: Send + Sync {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str, version: &str) -> Option<Advisory>;
}

/// Answers nothing. The default when `--online` is not given.
#[derive(Debug, Default)]
pub struct NoAdvisory;

#[async_trait]
impl AdvisoryLookup for NoAdvisory {
    async fn lookup(&self, _ecosystem: Ecosystem, _name: &str, _version: &str) -> Option<Advisory> {
        None
    }
}

/// Queries package registries, OSV and endoflife.date.
pub struct OnlineAdvisory {
    client: Client,
}

impl OnlineAdvisory {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

/// A version string precise enough to query vulnerability data for.
pub(crate) fn is_concrete_version(version: &str) -> bool {
    version.starts_with(|c: char| c.is_ascii_digit())
        && !version.contains(['*', ' ', ',', '<', '>', '=', '|'])
}

#[async_trait]
impl AdvisoryLookup for OnlineAdvisory {
    async fn lookup(&self, ecosystem: Ecosystem, name: &str, version: &str) -> Option<Advisory> {
        let client = &self.client;
        let latest = async {
            match ecosystem {
                Ecosystem::Node => npm::latest_version(client, name).await,
                Ecosystem::Python => pypi::latest_version(client, name).await,
                Ecosystem::Rust => crates_io::latest_version(client, name).await,
                Ecosystem::Java => maven::latest_version(client, name).await,
                Ecosystem::Container | Ecosystem::Perl => Ok(None),
            }
        };
        let (latest, vulns, eol) = tokio::join!(
            latest,
            osv::vulnerability_count(client, ecosystem, name, version),
            eol::end_of_life(client, ecosystem, name, version),
        );

        let advisory = Advisory {
            latest_version: latest.unwrap_or_else(|err| {
                debug!(%ecosystem, name, error = %err, "latest version lookup failed");
                None
            }),
            vulnerabilities: vulns.unwrap_or_else(|err| {
                debug!(%ecosystem, name, error = %err, "vulnerability lookup failed");
                None
            }),
            end_of_life: eol.unwrap_or_else(|err| {
                debug!(%ecosystem, name, error = %err, "end-of-life lookup failed");
                None
            }),
        };

        if advisory == Advisory::default() {
            None
        } else {
            Some(advisory)
        }
    }
}
