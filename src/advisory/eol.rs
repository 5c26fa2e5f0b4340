use anyhow::Result;
use chrono::NaiveDate;
use reqwest::Client;

use super::USER_AGENT;
use crate::models::Ecosystem;

/// (ecosystem, component name, endoflife.date product, release-cycle depth).
///
/// The cycle is the first `depth` dot-separated parts of the version.
const PRODUCTS: &[(Ecosystem, &str, &str, usize)] = &[
    (Ecosystem::Container, "node", "nodejs", 1),
    (Ecosystem::Container, "python", "python", 2),
    (Ecosystem::Container, "nginx", "nginx", 2),
    (Ecosystem::Container, "postgres", "postgresql", 1),
    (Ecosystem::Container, "redis", "redis", 2),
    (Ecosystem::Container, "alpine", "alpine", 2),
    (Ecosystem::Container, "ubuntu", "ubuntu", 2),
    (Ecosystem::Container, "debian", "debian", 1),
    (Ecosystem::Container, "eclipse-temurin", "eclipse-temurin", 1),
    (Ecosystem::Container, "openjdk", "openjdk-builds-from-oracle", 1),
    (Ecosystem::Container, "golang", "go", 2),
    (Ecosystem::Container, "ruby", "ruby", 2),
    (Ecosystem::Container, "php", "php", 2),
    (Ecosystem::Node, "@angular/core", "angular", 1),
    (Ecosystem::Node, "vue", "vue", 1),
    (Ecosystem::Node, "react", "react", 1),
    (Ecosystem::Java, "org.springframework:spring-core", "spring-framework", 2),
    (Ecosystem::Java, "org.springframework.boot:spring-boot", "spring-boot", 2),
    (Ecosystem::Java, "org.springframework.boot", "spring-boot", 2),
    (Ecosystem::Python, "django", "django", 2),
];

/// Map a component onto an endoflife.date product and release cycle.
fn product_cycle(ecosystem: Ecosystem, name: &str, version: &str) -> Option<(&'static str, String)> {
    let short = name.rsplit('/').next().unwrap_or(name);
    let (_, _, product, depth) = PRODUCTS.iter().find(|(eco, n, _, _)| {
        *eco == ecosystem && (*n == name || (ecosystem == Ecosystem::Container && *n == short))
    })?;

    let numeric: String = version
        .trim_start_matches('v')
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cycle: Vec<&str> = numeric.split('.').filter(|p| !p.is_empty()).take(*depth).collect();
    if cycle.len() < *depth {
        return None;
    }
    Some((*product, cycle.join(".")))
}

/// The `eol` field is either a date or a boolean.
fn parse_eol(data: &serde_json::Value) -> Option<NaiveDate> {
    data.get("eol")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

/// End-of-life date of the release cycle `version` belongs to.
pub async fn end_of_life(
    client: &Client,
    ecosystem: Ecosystem,
    name: &str,
    version: &str,
) -> Result<Option<NaiveDate>> {
    let Some((product, cycle)) = product_cycle(ecosystem, name, version) else {
        return Ok(None);
    };
    let url = format!("https://endoflife.date/api/{}/{}.json", product, cycle);

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
    Ok(parse_eol(&data))
}
