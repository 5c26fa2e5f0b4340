use anyhow::Result;
use reqwest::Client;

use super::USER_AGENT;

/// Latest release of a Python package from PyPI.
pub async fn latest_version(client: &Client, name: &str) -> Result<Option<String>> {
    let url = format!("https://pypi.org/pypi/{}/json", name);

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: serde_json::Value = response.json().await?;
    Ok(data
        .get("info")
        .and_then(|i| i.get("version"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}
