use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use super::USER_AGENT;

/// Latest release of a Maven artifact from Maven Central's `maven-metadata.xml`.
///
/// The `name` is expected in `groupId:artifactId` format (as stored in our models).
pub async fn latest_version(client: &Client, name: &str) -> Result<Option<String>> {
    let Some((group_id, artifact_id)) = name.split_once(':') else {
        return Ok(None);
    };

    let group_path = group_id.replace('.', "/");
    let url = format!(
        "https://repo1.maven.org/maven2/{}/{}/maven-metadata.xml",
        group_path, artifact_id
    );

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let xml = response.text().await?;
    Ok(extract_release(&xml))
}

/// `<versioning><release>`, falling back to `<versioning><latest>`.
fn extract_release(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current = String::new();
    let mut release = None;
    let mut latest = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                current = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
            }
            Ok(Event::Text(ref e)) => {
                if let Ok(text) = e.unescape() {
                    match current.as_str() {
                        "release" => release = Some(text.to_string()),
                        "latest" => latest = Some(text.to_string()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => current.clear(),
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    release.or(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_release() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.apache.logging.log4j</groupId>
  <artifactId>log4j-core</artifactId>
  <versioning>
    <latest>3.0.0-beta2</latest>
    <release>2.23.1</release>
    <versions>
      <version>2.23.1</version>
    </versions>
  </versioning>
</metadata>"#;
        assert_eq!(extract_release(xml), Some("2.23.1".to_string()));
    }

    #[test]
    fn test_extract_release_falls_back_to_latest() {
        let xml = "<metadata><versioning><latest>1.0-SNAPSHOT</latest></versioning></metadata>";
        assert_eq!(extract_release(xml), Some("1.0-SNAPSHOT".to_string()));
        assert_eq!(extract_release("<metadata/>"), None);
    }
}
