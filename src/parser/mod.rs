//! Per-ecosystem manifest parsers.
//!
//! [`ManifestKind`] is the closed set of manifests the engine understands.
//! Each variant owns one parser; [`ManifestKind::parse`] never fails; a
//! malformed manifest produces an empty [`ParseOutput`] carrying the error.

use crate::models::{ComponentType, Ecosystem};

pub mod cargo;
pub mod cpanfile;
pub mod docker;
pub mod flags;
pub mod gradle;
pub mod maven;
pub mod node;
pub mod nvmrc;
pub mod python;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    PackageJson,
    MavenPom,
    Gradle,
    Dockerfile,
    Cpanfile,
    Requirements,
    Pyproject,
    CargoToml,
    Nvmrc,
}

impl ManifestKind {
    pub fn ecosystem(self) -> Ecosystem {
        match self {
            ManifestKind::PackageJson | ManifestKind::Nvmrc => Ecosystem::Node,
            ManifestKind::MavenPom | ManifestKind::Gradle => Ecosystem::Java,
            ManifestKind::Dockerfile => Ecosystem::Container,
            ManifestKind::Cpanfile => Ecosystem::Perl,
            ManifestKind::Requirements | ManifestKind::Pyproject => Ecosystem::Python,
            ManifestKind::CargoToml => Ecosystem::Rust,
        }
    }

    /// Version-pin files whose runtime version overrides any other hint.
    pub fn pins_runtime_version(self) -> bool {
        matches!(self, ManifestKind::Nvmrc)
    }

    /// Parse raw manifest text. Errors are captured in the output.
    pub fn parse(self, raw: &str) -> ParseOutput {
        let result = match self {
            ManifestKind::PackageJson => node::parse_package_json(raw),
            ManifestKind::MavenPom => maven::parse_pom_xml(raw),
            ManifestKind::Gradle => gradle::parse_build_gradle(raw),
            ManifestKind::Dockerfile => docker::parse_dockerfile(raw),
            ManifestKind::Cpanfile => cpanfile::parse_cpanfile(raw),
            ManifestKind::Requirements => python::parse_requirements_txt(raw),
            ManifestKind::Pyproject => python::parse_pyproject_toml(raw),
            ManifestKind::CargoToml => cargo::parse_cargo_toml(raw),
            ManifestKind::Nvmrc => nvmrc::parse_nvmrc(raw),
        };
        result.unwrap_or_else(|err| ParseOutput::failed(format!("{:#}", err)))
    }
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestKind::PackageJson => write!(f, "package.json"),
            ManifestKind::MavenPom => write!(f, "pom.xml"),
            ManifestKind::Gradle => write!(f, "gradle"),
            ManifestKind::Dockerfile => write!(f, "Dockerfile"),
            ManifestKind::Cpanfile => write!(f, "cpanfile"),
            ManifestKind::Requirements => write!(f, "requirements.txt"),
            ManifestKind::Pyproject => write!(f, "pyproject.toml"),
            ManifestKind::CargoToml => write!(f, "Cargo.toml"),
            ManifestKind::Nvmrc => write!(f, ".nvmrc"),
        }
    }
}

/// A dependency as declared in one manifest, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDependency {
    pub name: String,
    pub version: String,
    pub ecosystem: Ecosystem,
    pub component_type: ComponentType,
    pub scope: Option<String>,
    pub flag_reason: Option<String>,
}

impl RawDependency {
    /// Build a record and run the flagged-coordinate check on it.
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version: impl Into<String>,
        component_type: ComponentType,
    ) -> Self {
        let name = name.into();
        let version = version.into();
        let flag_reason = flags::check(ecosystem, &name, &version).map(str::to_string);
        Self {
            name,
            version,
            ecosystem,
            component_type,
            scope: None,
            flag_reason,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub components: Vec<RawDependency>,
    pub runtime: Option<String>,
    pub runtime_version: Option<String>,
    pub error: Option<String>,
}

impl ParseOutput {
    pub fn for_runtime(runtime: &str) -> Self {
        Self {
            runtime: Some(runtime.to_string()),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Strip leading semver range operators (`^`, `~`) from a declared version.
pub fn strip_range_prefix(version: &str) -> String {
    version.trim().trim_start_matches(['^', '~']).to_string()
}

/// Keep the leading version-looking part of a constraint like `>=18.0`.
pub(crate) fn version_hint(constraint: &str) -> Option<String> {
    let trimmed = constraint
        .trim()
        .trim_start_matches(|c: char| !c.is_ascii_digit());
    let hint: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    if hint.is_empty() {
        None
    } else {
        Some(hint)
    }
}
