use anyhow::Result;

use super::ParseOutput;

/// Parse `.nvmrc`. The first non-comment line is the pinned Node version.
pub fn parse_nvmrc(raw: &str) -> Result<ParseOutput> {
    let mut output = ParseOutput::for_runtime("node");
    output.runtime_version = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches('v').to_string())
        .filter(|version| !version.is_empty());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvmrc() {
        let out = parse_nvmrc("v18.17.1\n").unwrap();
        assert_eq!(out.runtime.as_deref(), Some("node"));
        assert_eq!(out.runtime_version.as_deref(), Some("18.17.1"));
        assert!(out.components.is_empty());

        assert_eq!(parse_nvmrc("lts/hydrogen").unwrap().runtime_version.as_deref(), Some("lts/hydrogen"));
        assert_eq!(parse_nvmrc("\n  \n").unwrap().runtime_version, None);
    }
}
