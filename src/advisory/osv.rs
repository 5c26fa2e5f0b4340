use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{is_concrete_version, USER_AGENT};
use crate::models::Ecosystem;

const QUERY_URL: &str = "https://api.osv.dev/v1/query";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    vulns: Vec<serde_json::Value>,
}

/// OSV ecosystem identifier, if OSV tracks the ecosystem.
fn osv_ecosystem(ecosystem: Ecosystem) -> Option<&'static str> {
    match ecosystem {
        Ecosystem::Node => Some("npm"),
        Ecosystem::Java => Some("Maven"),
        Ecosystem::Python => Some("PyPI"),
        Ecosystem::Rust => Some("crates.io"),
        Ecosystem::Container | Ecosystem::Perl => None,
    }
}

/// Number of known vulnerabilities affecting `name@version`.
///
/// Ranges and unresolved versions are not queried.
pub async fn vulnerability_count(
    client: &Client,
    ecosystem: Ecosystem,
    name: &str,
    version: &str,
) -> Result<Option<u32>> {
    let Some(osv_name) = osv_ecosystem(ecosystem) else {
        return Ok(None);
    };
    if !is_concrete_version(version) {
        return Ok(None);
    }

    let body = json!({
        "package": { "name": name, "ecosystem": osv_name },
        "version": version,
    });
    let response = client
        .post(QUERY_URL)
        .header("User-Agent", USER_AGENT)
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: QueryResponse = response.json().await?;
    Ok(Some(data.vulns.len() as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_counts_vulns() {
        let data: QueryResponse =
            serde_json::from_str(r#"{"vulns":[{"id":"GHSA-1"},{"id":"GHSA-2"}]}"#).unwrap();
        assert_eq!(data.vulns.len(), 2);
        let empty: QueryResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.vulns.is_empty());
    }

    #[tokio::test]
    async fn test_untracked_ecosystem_is_not_queried() {
        let client = Client::new();
        let count = vulnerability_count(&client, Ecosystem::Perl, "DBI", "1.643")
            .await
            .unwrap();
        assert_eq!(count, None);
        let count = vulnerability_count(&client, Ecosystem::Node, "left-pad", "*")
            .await
            .unwrap();
        assert_eq!(count, None);
    }
}
