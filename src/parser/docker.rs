use std::collections::{HashMap, HashSet};

use anyhow::Result;
use regex::{Captures, Regex};

use super::{ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

/// Image repository (last path segment) → runtime family.
const RUNTIME_IMAGES: &[(&str, &str)] = &[
    ("node", "node"),
    ("python", "python"),
    ("pypy", "python"),
    ("openjdk", "java"),
    ("eclipse-temurin", "java"),
    ("amazoncorretto", "java"),
    ("ibmjava", "java"),
    ("zulu-openjdk", "java"),
    ("maven", "java"),
    ("gradle", "java"),
    ("golang", "go"),
    ("ruby", "ruby"),
    ("php", "php"),
    ("perl", "perl"),
    ("rust", "rust"),
    ("elixir", "elixir"),
];

/// A `FROM` image reference split into its parts.
#[derive(Debug, PartialEq)]
struct ImageRef {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    fn parse(reference: &str) -> Self {
        let (rest, digest) = match reference.split_once('@') {
            Some((rest, digest)) => (rest, Some(digest.to_string())),
            None => (reference, None),
        };
        // A ':' after the last '/' separates the tag; earlier ones are registry ports.
        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => (
                rest[..last_slash + i].to_string(),
                Some(rest[last_slash + i + 1..].to_string()),
            ),
            None => (rest.to_string(), None),
        };
        Self {
            repository,
            tag,
            digest,
        }
    }

    fn version(&self) -> String {
        self.tag
            .clone()
            .or_else(|| self.digest.clone())
            .unwrap_or_else(|| "latest".to_string())
    }

    fn short_name(&self) -> &str {
        self.repository.rsplit('/').next().unwrap_or(&self.repository)
    }
}

/// Parse a Dockerfile: every `FROM` image becomes a component, and the first
/// one is used to guess the runtime.
pub fn parse_dockerfile(raw: &str) -> Result<ParseOutput> {
    let arg_re = Regex::new(r"\$\{(\w+)(?::-([^}]*))?\}|\$(\w+)")?;
    let version_re = Regex::new(r"^v?(\d+(?:\.\d+){0,2})")?;
    let jdk_re = Regex::new(r"(?:jdk|temurin|openjdk|corretto)-?(\d+)")?;

    let mut global_args: HashMap<String, String> = HashMap::new();
    let mut stage_aliases: HashSet<String> = HashSet::new();
    let mut stages: Vec<ImageRef> = Vec::new();
    let mut seen_from = false;

    for line in logical_lines(raw) {
        let mut tokens = line.split_whitespace();
        let Some(instruction) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        match instruction.to_ascii_uppercase().as_str() {
            "ARG" if !seen_from => {
                for arg in &args {
                    if let Some((name, default)) = arg.split_once('=') {
                        global_args.insert(name.to_string(), default.trim_matches('"').to_string());
                    }
                }
            }
            "FROM" => {
                seen_from = true;
                let mut positional = args.iter().filter(|a| !a.starts_with("--"));
                let Some(reference) = positional.next() else {
                    continue;
                };
                let reference = arg_re.replace_all(reference, |caps: &Captures| {
                    let name = caps.get(1).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                    global_args
                        .get(name)
                        .cloned()
                        .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                        .unwrap_or_default()
                });
                let is_stage_ref = stage_aliases.contains(&reference.to_ascii_lowercase());
                if let (Some(keyword), Some(alias)) = (positional.next(), positional.next()) {
                    if keyword.eq_ignore_ascii_case("as") {
                        stage_aliases.insert(alias.to_ascii_lowercase());
                    }
                }
                if is_stage_ref || reference.eq_ignore_ascii_case("scratch") || reference.is_empty() {
                    continue;
                }
                stages.push(ImageRef::parse(&reference));
            }
            _ => {}
        }
    }

    let mut output = ParseOutput::default();
    if let Some(first) = stages.first() {
        if let Some(runtime) = classify_runtime(first) {
            output.runtime = Some(runtime.to_string());
            let tag = first.tag.as_deref().unwrap_or("");
            output.runtime_version = if matches!(first.short_name(), "maven" | "gradle") {
                jdk_re.captures(tag).map(|caps| caps[1].to_string())
            } else {
                version_re.captures(tag).map(|caps| caps[1].to_string())
            };
        }
    }

    let last = stages.len().saturating_sub(1);
    for (i, image) in stages.iter().enumerate() {
        let component_type = if i == last {
            ComponentType::Dependency
        } else {
            ComponentType::BuildDependency
        };
        output.components.push(
            RawDependency::new(
                Ecosystem::Container,
                image.repository.clone(),
                image.version(),
                component_type,
            )
            .with_scope("base-image"),
        );
    }

    Ok(output)
}

/// Join continuation lines and drop comments and blank lines.
fn logical_lines(raw: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(continued) = trimmed.strip_suffix('\\') {
            current.push_str(continued.trim_end());
            current.push(' ');
            continue;
        }
        current.push_str(trimmed);
        lines.push(std::mem::take(&mut current));
    }

    if !current.trim().is_empty() {
        lines.push(current.trim().to_string());
    }
    lines
}

fn classify_runtime(image: &ImageRef) -> Option<&'static str> {
    if image.repository.contains("dotnet/") {
        return Some("dotnet");
    }
    let short = image.short_name();
    RUNTIME_IMAGES
        .iter()
        .find(|(name, _)| *name == short)
        .map(|(_, runtime)| *runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_stage_with_continuation() {
        let content = r#"
# syntax=docker/dockerfile:1
ARG NODE_VERSION=18.17
FROM --platform=linux/amd64 node:${NODE_VERSION}-alpine AS build
RUN npm ci \
    && npm run build
FROM build AS test
FROM nginx:1.25 \
    AS runtime
COPY --from=build /app/dist /usr/share/nginx/html
"#;
        let out = parse_dockerfile(content).unwrap();
        assert_eq!(out.components.len(), 2);
        assert_eq!(out.components[0].name, "node");
        assert_eq!(out.components[0].version, "18.17-alpine");
        assert_eq!(out.components[0].component_type, ComponentType::BuildDependency);
        assert_eq!(out.components[1].name, "nginx");
        assert_eq!(out.components[1].component_type, ComponentType::Dependency);
        assert_eq!(out.runtime.as_deref(), Some("node"));
        assert_eq!(out.runtime_version.as_deref(), Some("18.17"));
    }

    #[test]
    fn test_image_ref_parsing() {
        let image = ImageRef::parse("registry.local:5000/team/python:3.11-slim");
        assert_eq!(image.repository, "registry.local:5000/team/python");
        assert_eq!(image.tag.as_deref(), Some("3.11-slim"));
        assert_eq!(classify_runtime(&image), Some("python"));

        let pinned = ImageRef::parse("alpine@sha256:abcd");
        assert_eq!(pinned.repository, "alpine");
        assert_eq!(pinned.version(), "sha256:abcd");

        assert_eq!(ImageRef::parse("ubuntu").version(), "latest");
    }

    #[test]
    fn test_runtime_from_first_from_only() {
        let content = "FROM mcr.microsoft.com/dotnet/sdk:8.0 AS build\nFROM python:3.12\n";
        let out = parse_dockerfile(content).unwrap();
        assert_eq!(out.runtime.as_deref(), Some("dotnet"));
        assert_eq!(out.runtime_version.as_deref(), Some("8.0"));
        assert_eq!(out.components.len(), 2);
    }

    #[test]
    fn test_build_tool_images_take_jdk_from_tag() {
        let out = parse_dockerfile("FROM maven:3.9-eclipse-temurin-17\n").unwrap();
        assert_eq!(out.runtime.as_deref(), Some("java"));
        assert_eq!(out.runtime_version.as_deref(), Some("17"));
    }

    #[test]
    fn test_scratch_and_empty() {
        let out = parse_dockerfile("FROM scratch\nCOPY app /app\n").unwrap();
        assert!(out.components.is_empty());
        assert!(out.error.is_none());
        assert!(parse_dockerfile("").unwrap().components.is_empty());
    }
}
