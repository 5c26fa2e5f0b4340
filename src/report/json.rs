use anyhow::Result;
use serde::Serialize;

use crate::models::{ScanResults, ScanRun};

#[derive(Serialize)]
struct RunReport<'a> {
    run: &'a ScanRun,
    results: Option<&'a ScanResults>,
}

pub fn render(run: &ScanRun, results: Option<&ScanResults>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&RunReport { run, results })?)
}
