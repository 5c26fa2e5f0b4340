use anyhow::Result;
use reqwest::Client;

use super::USER_AGENT;

/// Latest published version of an npm package (`dist-tags.latest`).
pub async fn latest_version(client: &Client, name: &str) -> Result<Option<String>> {
    // Scoped packages need URL encoding: @scope/pkg → %40scope%2Fpkg
    let encoded_name = name.replace('@', "%40").replace('/', "%2F");
    let url = format!("https://registry.npmjs.org/{}/latest", encoded_name);

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let data: serde_json::Value = response.json().await?;
    Ok(data
        .get("version")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}
