use std::collections::BTreeMap;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;

use super::{strip_range_prefix, version_hint, ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

/// Parse `requirements.txt`: `name[extras] <specifier>` lines.
///
/// `==` pins become the version; any other specifier is kept verbatim.
/// Options (`-r`, `--hash`), VCS and URL requirements are skipped.
pub fn parse_requirements_txt(raw: &str) -> Result<ParseOutput> {
    let re = requirement_regex()?;
    let mut output = ParseOutput::for_runtime("python");

    for line in raw.lines() {
        let line = line.split(" #").next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') || line.contains("://") {
            continue;
        }
        if let Some((name, version)) = parse_requirement(&re, line) {
            output.components.push(RawDependency::new(
                Ecosystem::Python,
                name,
                version,
                ComponentType::Dependency,
            ));
        }
    }

    Ok(output)
}

fn requirement_regex() -> Result<Regex> {
    Ok(Regex::new(
        r"^([A-Za-z0-9][A-Za-z0-9._\-]*)\s*(?:\[[^\]]*\])?\s*\(?([^;)]*)\)?",
    )?)
}

/// Split a PEP 508 requirement into `(name, version)`.
fn parse_requirement(re: &Regex, requirement: &str) -> Option<(String, String)> {
    let caps = re.captures(requirement.trim())?;
    let name = caps[1].to_string();
    let spec = caps.get(2).map_or("", |m| m.as_str()).trim();

    let version = if spec.is_empty() {
        "*".to_string()
    } else if !spec.contains(',') {
        spec.strip_prefix("===")
            .or_else(|| spec.strip_prefix("=="))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| spec.replace(' ', ""))
    } else {
        spec.replace(' ', "")
    };
    Some((name, version))
}

#[derive(Debug, Deserialize)]
struct Pyproject {
    project: Option<PyprojectProject>,
    tool: Option<PyprojectTool>,
}

#[derive(Debug, Deserialize)]
struct PyprojectProject {
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, rename = "optional-dependencies")]
    optional_dependencies: BTreeMap<String, Vec<String>>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PyprojectTool {
    poetry: Option<Poetry>,
}

#[derive(Debug, Deserialize)]
struct Poetry {
    #[serde(default)]
    dependencies: toml::Table,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: toml::Table,
    #[serde(default)]
    group: BTreeMap<String, PoetryGroup>,
}

#[derive(Debug, Deserialize)]
struct PoetryGroup {
    #[serde(default)]
    dependencies: toml::Table,
}

/// Parse `pyproject.toml`: PEP 621 `[project]` tables and Poetry's
/// `[tool.poetry]` dependency tables.
pub fn parse_pyproject_toml(raw: &str) -> Result<ParseOutput> {
    let pyproject: Pyproject = toml::from_str(raw)?;
    let re = requirement_regex()?;
    let mut output = ParseOutput::for_runtime("python");

    if let Some(project) = pyproject.project {
        output.runtime_version = project.requires_python.as_deref().and_then(version_hint);
        for dep_str in &project.dependencies {
            if let Some((name, version)) = parse_requirement(&re, dep_str) {
                output.components.push(RawDependency::new(
                    Ecosystem::Python,
                    name,
                    version,
                    ComponentType::Dependency,
                ));
            }
        }
        for (extra, deps) in &project.optional_dependencies {
            for dep_str in deps {
                if let Some((name, version)) = parse_requirement(&re, dep_str) {
                    output.components.push(
                        RawDependency::new(
                            Ecosystem::Python,
                            name,
                            version,
                            ComponentType::DevDependency,
                        )
                        .with_scope(extra.as_str()),
                    );
                }
            }
        }
    }

    if let Some(poetry) = pyproject.tool.and_then(|t| t.poetry) {
        for (name, value) in &poetry.dependencies {
            if name == "python" {
                if output.runtime_version.is_none() {
                    output.runtime_version = poetry_version(value).as_deref().and_then(version_hint);
                }
                continue;
            }
            push_poetry_dep(&mut output, name, value, ComponentType::Dependency, None);
        }
        for (name, value) in &poetry.dev_dependencies {
            push_poetry_dep(&mut output, name, value, ComponentType::DevDependency, Some("dev"));
        }
        for (group, table) in &poetry.group {
            for (name, value) in &table.dependencies {
                push_poetry_dep(&mut output, name, value, ComponentType::DevDependency, Some(group));
            }
        }
    }

    Ok(output)
}

fn poetry_version(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

fn push_poetry_dep(
    output: &mut ParseOutput,
    name: &str,
    value: &toml::Value,
    component_type: ComponentType,
    scope: Option<&str>,
) {
    let version = poetry_version(value)
        .map(|v| strip_range_prefix(&v))
        .unwrap_or_else(|| "*".to_string());
    let dep = RawDependency::new(Ecosystem::Python, name, version, component_type);
    output.components.push(match scope {
        Some(scope) => dep.with_scope(scope),
        None => dep,
    });
}
