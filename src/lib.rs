//! `depscan`: scan many repositories for dependency manifests and build a
//! normalized inventory of the components each service uses.
//!
//! # Flow
//! 1. [`coordinator::RunCoordinator::start_run`] validates the request and
//!    records a pending [`models::ScanRun`].
//! 2. One [`worker::RepoScanWorker`] per repository resolves the ref, lists
//!    the tree through a [`source::RepositorySource`] and fetches the files
//!    the [`classifier`] recognizes, in bounded batches ([`batch`]).
//! 3. Each manifest goes through its [`parser`]; failures become warnings.
//! 4. The [`normalizer`] groups manifests into services, merges components
//!    and annotates them from the [`advisory`] sources.
//! 5. Progress and outcomes land in the [`store`]; the run settles once every
//!    repository is terminal and its [`models::ScanResults`] are published.
//!
//! Incremental runs reuse the last result from the [`cache`] when the
//! repository ref or its manifest fingerprints are unchanged.

pub mod advisory;
pub mod batch;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod parser;
pub mod report;
pub mod source;
pub mod store;
pub mod worker;
