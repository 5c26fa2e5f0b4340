use anyhow::Result;
use serde::Deserialize;

use super::{ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

#[derive(Debug, Deserialize)]
struct CargoManifest {
    package: Option<CargoPackage>,
    #[serde(default)]
    dependencies: toml::Table,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: toml::Table,
    #[serde(default, rename = "build-dependencies")]
    build_dependencies: toml::Table,
    workspace: Option<CargoWorkspace>,
}

#[derive(Debug, Deserialize)]
struct CargoPackage {
    #[serde(rename = "rust-version")]
    rust_version: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct CargoWorkspace {
    #[serde(default)]
    dependencies: toml::Table,
}

/// Parse `Cargo.toml` declared dependencies.
///
/// A table entry with `package = "real-name"` is reported under the real
/// crate name. Path and git dependencies without a version get `*`.
pub fn parse_cargo_toml(raw: &str) -> Result<ParseOutput> {
    let manifest: CargoManifest = toml::from_str(raw)?;
    let mut output = ParseOutput::for_runtime("rust");

    output.runtime_version = manifest
        .package
        .and_then(|p| p.rust_version)
        .and_then(|v| v.as_str().map(str::to_string));

    let sections = [
        (&manifest.dependencies, ComponentType::Dependency, None),
        (&manifest.dev_dependencies, ComponentType::DevDependency, None),
        (&manifest.build_dependencies, ComponentType::BuildDependency, None),
    ];
    for (table, component_type, scope) in sections {
        push_section(&mut output, table, component_type, scope);
    }
    if let Some(workspace) = &manifest.workspace {
        push_section(
            &mut output,
            &workspace.dependencies,
            ComponentType::Dependency,
            Some("workspace"),
        );
    }

    Ok(output)
}

fn push_section(
    output: &mut ParseOutput,
    table: &toml::Table,
    component_type: ComponentType,
    scope: Option<&str>,
) {
    for (key, value) in table {
        let (name, version) = match value {
            toml::Value::String(version) => (key.as_str(), version.as_str()),
            toml::Value::Table(spec) => (
                spec.get("package").and_then(|v| v.as_str()).unwrap_or(key.as_str()),
                spec.get("version").and_then(|v| v.as_str()).unwrap_or("*"),
            ),
            _ => (key.as_str(), "*"),
        };
        let dep = RawDependency::new(Ecosystem::Rust, name, version, component_type);
        output.components.push(match scope {
            Some(scope) => dep.with_scope(scope),
            None => dep,
        });
    }
}
