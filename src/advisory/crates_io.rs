use anyhow::Result;
use reqwest::Client;

use super::USER_AGENT;

/// Latest stable version of a crate from crates.io.
pub async fn latest_version(client: &Client, name: &str) -> Result<Option<String>> {
    let url = format!("https://crates.io/api/v1/crates/{}", name);

    // crates.io rejects requests without a descriptive User-Agent.
    let response = client
        .get(&url)
        .header("User-Agent", format!("{} (dependency inventory tool)", USER_AGENT))
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: serde_json::Value = response.json().await?;
    let krate = data.get("crate");
    Ok(krate
        .and_then(|c| c.get("max_stable_version"))
        .and_then(|v| v.as_str())
        .or_else(|| krate.and_then(|c| c.get("max_version")).and_then(|v| v.as_str()))
        .map(str::to_string))
}
