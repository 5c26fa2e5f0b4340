use std::collections::HashMap;

use anyhow::{anyhow, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::{Captures, Regex};

use super::{ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

/// Nested `${a}` → `${b}` → value chains are followed this many times.
const MAX_RESOLUTION_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
enum EntryKind {
    Dependency,
    Managed,
    Plugin,
}

#[derive(Debug, Default)]
struct PomEntry {
    group_id: String,
    artifact_id: String,
    version: String,
    scope: String,
}

/// Paths (below the root `project`) that open an entry we collect.
fn entry_kind(path: &[String]) -> Option<EntryKind> {
    let path: Vec<&str> = path.iter().map(String::as_str).collect();
    match path.as_slice() {
        ["project", "dependencies", "dependency"] => Some(EntryKind::Dependency),
        ["project", "dependencyManagement", "dependencies", "dependency"] => {
            Some(EntryKind::Managed)
        }
        ["project", "build", "plugins", "plugin"] => Some(EntryKind::Plugin),
        _ => None,
    }
}

/// Parse `pom.xml` using the quick-xml event API.
///
/// Versions are resolved against `<properties>` and the well-known
/// `project.*` coordinates; unresolved references are kept literally.
pub fn parse_pom_xml(raw: &str) -> Result<ParseOutput> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut properties: HashMap<String, String> = HashMap::new();
    let mut entries: Vec<(EntryKind, PomEntry)> = Vec::new();
    let mut current: Option<(EntryKind, usize, PomEntry)> = None;
    let mut saw_project = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                path.push(name);
                if path.len() == 1 && path[0] == "project" {
                    saw_project = true;
                }
                if current.is_none() {
                    if let Some(kind) = entry_kind(&path) {
                        current = Some((kind, path.len(), PomEntry::default()));
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some((_, depth, _)) = &current {
                    if *depth == path.len() {
                        if let Some((kind, _, entry)) = current.take() {
                            entries.push((kind, entry));
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape()?.trim().to_string();
                record_text(&path, text, &mut properties, current.as_mut());
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(anyhow!(
                    "invalid XML at byte {}: {}",
                    reader.buffer_position(),
                    err
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_project {
        return Err(anyhow!("missing <project> root element"));
    }

    let property_re = Regex::new(r"\$\{([^}]+)\}")?;
    let resolve = |value: &str| resolve_properties(&property_re, value, &properties);

    let mut output = ParseOutput::for_runtime("java");
    output.runtime_version = ["maven.compiler.release", "maven.compiler.source", "java.version"]
        .iter()
        .find_map(|key| properties.get(*key))
        .map(|v| resolve(v));

    for (kind, entry) in entries {
        if entry.artifact_id.is_empty() {
            continue;
        }
        let group_id = match (kind, entry.group_id.is_empty()) {
            (EntryKind::Plugin, true) => "org.apache.maven.plugins".to_string(),
            _ => resolve(&entry.group_id),
        };
        let name = if group_id.is_empty() {
            resolve(&entry.artifact_id)
        } else {
            format!("{}:{}", group_id, resolve(&entry.artifact_id))
        };
        let version = if entry.version.is_empty() {
            "*".to_string()
        } else {
            resolve(&entry.version)
        };

        let dep = match kind {
            EntryKind::Plugin => {
                RawDependency::new(Ecosystem::Java, name, version, ComponentType::BuildDependency)
                    .with_scope("plugin")
            }
            EntryKind::Managed => {
                RawDependency::new(Ecosystem::Java, name, version, ComponentType::Dependency)
                    .with_scope("managed")
            }
            EntryKind::Dependency => {
                let scope = if entry.scope.is_empty() {
                    "compile"
                } else {
                    entry.scope.as_str()
                };
                let component_type = if scope == "test" {
                    ComponentType::DevDependency
                } else {
                    ComponentType::Dependency
                };
                RawDependency::new(Ecosystem::Java, name, version, component_type).with_scope(scope)
            }
        };
        output.components.push(dep);
    }

    Ok(output)
}

fn record_text(
    path: &[String],
    text: String,
    properties: &mut HashMap<String, String>,
    current: Option<&mut (EntryKind, usize, PomEntry)>,
) {
    if let Some((_, depth, entry)) = current {
        if path.len() == *depth + 1 {
            match path[*depth].as_str() {
                "groupId" => entry.group_id = text,
                "artifactId" => entry.artifact_id = text,
                "version" => entry.version = text,
                "scope" => entry.scope = text,
                _ => {}
            }
        }
        return;
    }

    let path: Vec<&str> = path.iter().map(String::as_str).collect();
    match path.as_slice() {
        ["project", "properties", key] => {
            properties.insert(key.to_string(), text);
        }
        ["project", "version"] => {
            properties.insert("project.version".to_string(), text.clone());
            properties.insert("pom.version".to_string(), text);
        }
        ["project", "groupId"] => {
            properties.insert("project.groupId".to_string(), text);
        }
        ["project", "artifactId"] => {
            properties.insert("project.artifactId".to_string(), text);
        }
        ["project", "parent", "version"] => {
            properties.insert("project.parent.version".to_string(), text.clone());
            properties
                .entry("project.version".to_string())
                .or_insert(text);
        }
        ["project", "parent", "groupId"] => {
            properties
                .entry("project.groupId".to_string())
                .or_insert(text);
        }
        _ => {}
    }
}

/// Substitute `${name}` references, following nested references up to
/// [`MAX_RESOLUTION_DEPTH`] levels. Unknown names stay as written.
fn resolve_properties(re: &Regex, value: &str, properties: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..MAX_RESOLUTION_DEPTH {
        let mut changed = false;
        let next = re
            .replace_all(&current, |caps: &Captures| match properties.get(&caps[1]) {
                Some(v) => {
                    changed = true;
                    v.clone()
                }
                None => caps[0].to_string(),
            })
            .into_owned();
        if !changed {
            break;
        }
        current = next;
    }
    current
}
