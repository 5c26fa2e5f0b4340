use anyhow::Result;
use regex::Regex;

use super::{ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

/// Parse a `cpanfile`.
///
/// Phase blocks (`on 'test' => sub { ... };`) are tracked by brace depth.
/// `requires 'perl', '5.010'` sets the runtime version instead of adding a
/// component.
pub fn parse_cpanfile(raw: &str) -> Result<ParseOutput> {
    let phase_re = Regex::new(r#"^\s*on\s+['"]?(\w+)['"]?\s*=>\s*sub\s*\{"#)?;
    let statement_re = Regex::new(
        r#"^\s*(requires|recommends|suggests|test_requires|build_requires|configure_requires|author_requires)\s*\(?\s*['"]([^'"]+)['"]\s*(?:(?:,|=>)\s*['"]?([^'";\s)]+)['"]?)?"#,
    )?;

    let mut output = ParseOutput::for_runtime("perl");
    let mut phase: Option<String> = None;
    let mut depth: i32 = 0;

    for line in raw.lines() {
        let code = line.split('#').next().unwrap_or("");

        if let Some(caps) = phase_re.captures(code) {
            phase = Some(caps[1].to_string());
            depth = 0;
        }

        if let Some(caps) = statement_re.captures(code) {
            let relation = &caps[1];
            let module = &caps[2];
            let version = caps
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "*".to_string());

            if module == "perl" {
                output.runtime_version = Some(version.trim_start_matches('v').to_string());
            } else {
                let (component_type, scope) = classify(relation, phase.as_deref());
                let dep = RawDependency::new(Ecosystem::Perl, module, version, component_type);
                output.components.push(match scope {
                    Some(scope) => dep.with_scope(scope),
                    None => dep,
                });
            }
        }

        if phase.is_some() {
            depth += code.matches('{').count() as i32;
            depth -= code.matches('}').count() as i32;
            if depth <= 0 {
                phase = None;
            }
        }
    }

    Ok(output)
}

fn classify(relation: &str, phase: Option<&str>) -> (ComponentType, Option<String>) {
    let phase = match relation {
        "test_requires" => Some("test"),
        "author_requires" => Some("develop"),
        "build_requires" => Some("build"),
        "configure_requires" => Some("configure"),
        _ => phase,
    };
    let component_type = match phase {
        Some("test" | "develop") => ComponentType::DevDependency,
        Some("build" | "configure") => ComponentType::BuildDependency,
        _ => ComponentType::Dependency,
    };
    let scope = match (relation, phase) {
        ("recommends" | "suggests", _) => Some(relation.to_string()),
        (_, Some(phase)) if phase != "runtime" => Some(phase.to_string()),
        _ => None,
    };
    (component_type, scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpanfile() {
        let content = r#"
requires 'perl', '5.010001';
requires 'Mojolicious', '9.31';
requires 'DBI';   # any version
recommends 'JSON::XS', '4.0';

on 'test' => sub {
    requires 'Test::More', '0.98';
};

build_requires 'Module::Build' => '0.42';
requires 'Plack' => '1.0047';
"#;
        let out = parse_cpanfile(content).unwrap();
        assert_eq!(out.runtime.as_deref(), Some("perl"));
        assert_eq!(out.runtime_version.as_deref(), Some("5.010001"));
        let names: Vec<&str> = out.components.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Mojolicious", "DBI", "JSON::XS", "Test::More", "Module::Build", "Plack"]
        );
        assert_eq!(out.components[1].version, "*");
        assert_eq!(out.components[2].scope.as_deref(), Some("recommends"));
        assert_eq!(out.components[3].component_type, ComponentType::DevDependency);
        assert_eq!(out.components[4].component_type, ComponentType::BuildDependency);
        // The phase block has closed by the time Plack is declared.
        assert_eq!(out.components[5].component_type, ComponentType::Dependency);
        assert_eq!(out.components[5].version, "1.0047");
    }

    #[test]
    fn test_duplicate_requires_are_all_reported() {
        let content = "requires 'DBI', '1.0';\nrequires 'DBI', '1.643';\n";
        let out = parse_cpanfile(content).unwrap();
        assert_eq!(out.components.len(), 2);
        assert_eq!(out.components[1].version, "1.643");
    }
}
