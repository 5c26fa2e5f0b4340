//! Report renderers for finished runs.
//!
//! - [`terminal`]: colored, tabular output with a summary box; respects `--verbose` / `--quiet`.
//! - [`json`]: the run snapshot and its results as one JSON document.

pub mod json;
pub mod terminal;
