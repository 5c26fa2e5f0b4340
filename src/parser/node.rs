use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{strip_range_prefix, version_hint, ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

// Per-group entry caps. Entries past the cap are dropped in declaration order.
const MAX_PRODUCTION_DEPS: usize = 50;
const MAX_DEVELOPMENT_DEPS: usize = 30;
const MAX_PEER_DEPS: usize = 20;

/// Parse `package.json`: `dependencies`, `devDependencies` and
/// `peerDependencies`, plus the `engines.node` runtime hint.
pub fn parse_package_json(raw: &str) -> Result<ParseOutput> {
    let json: Value = serde_json::from_str(raw)?;
    if !json.is_object() {
        return Err(anyhow!("expected a JSON object at the top level"));
    }

    let mut output = ParseOutput::for_runtime("node");
    output.runtime_version = json
        .get("engines")
        .and_then(|e| e.get("node"))
        .and_then(|v| v.as_str())
        .and_then(version_hint);

    let groups = [
        ("dependencies", ComponentType::Dependency, None, MAX_PRODUCTION_DEPS),
        ("devDependencies", ComponentType::DevDependency, None, MAX_DEVELOPMENT_DEPS),
        ("peerDependencies", ComponentType::Dependency, Some("peer"), MAX_PEER_DEPS),
    ];

    for (section, component_type, scope, cap) in groups {
        let Some(pkgs) = json.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, range) in pkgs.iter().take(cap) {
            let version = range
                .as_str()
                .map(strip_range_prefix)
                .unwrap_or_else(|| "*".to_string());
            let dep = RawDependency::new(Ecosystem::Node, name.as_str(), version, component_type);
            output.components.push(match scope {
                Some(scope) => dep.with_scope(scope),
                None => dep,
            });
        }
    }

    Ok(output)
}
