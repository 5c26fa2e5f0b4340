use crate::parser::ManifestKind;

/// Files above this size are never parsed.
pub const MAX_MANIFEST_BYTES: u64 = 10 * 1024 * 1024;

/// Directories holding third-party or generated code, skipped entirely.
const VENDORED_DIRS: &[&str] = &["node_modules", "vendor", ".git", "target", "bower_components"];

/// Exact file-name rules. Checked before any pattern rule.
const EXACT_RULES: &[(&str, ManifestKind)] = &[
    ("package.json", ManifestKind::PackageJson),
    ("pom.xml", ManifestKind::MavenPom),
    ("build.gradle", ManifestKind::Gradle),
    ("build.gradle.kts", ManifestKind::Gradle),
    ("Dockerfile", ManifestKind::Dockerfile),
    ("cpanfile", ManifestKind::Cpanfile),
    ("requirements.txt", ManifestKind::Requirements),
    ("pyproject.toml", ManifestKind::Pyproject),
    ("Cargo.toml", ManifestKind::CargoToml),
    (".nvmrc", ManifestKind::Nvmrc),
];

enum Pattern {
    Suffix(&'static str),
    Prefix(&'static str),
    Wrapped(&'static str, &'static str),
}

impl Pattern {
    fn matches(&self, file_name: &str) -> bool {
        match self {
            Pattern::Suffix(suffix) => file_name.ends_with(suffix),
            Pattern::Prefix(prefix) => file_name.starts_with(prefix),
            Pattern::Wrapped(prefix, suffix) => {
                file_name.len() > prefix.len() + suffix.len()
                    && file_name.starts_with(prefix)
                    && file_name.ends_with(suffix)
            }
        }
    }
}

/// Pattern rules, in priority order.
const PATTERN_RULES: &[(Pattern, ManifestKind)] = &[
    (Pattern::Suffix("build.gradle"), ManifestKind::Gradle),
    (Pattern::Suffix("build.gradle.kts"), ManifestKind::Gradle),
    (Pattern::Suffix(".Dockerfile"), ManifestKind::Dockerfile),
    (Pattern::Prefix("Dockerfile."), ManifestKind::Dockerfile),
    (Pattern::Wrapped("requirements-", ".txt"), ManifestKind::Requirements),
    (Pattern::Suffix(".nvmrc"), ManifestKind::Nvmrc),
];

/// Decide whether `path` is a manifest we know how to parse, ignoring size.
pub fn match_path(path: &str) -> Option<ManifestKind> {
    let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
    let mut file_name = None;
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            file_name = Some(component);
        } else if VENDORED_DIRS.contains(&component) {
            return None;
        }
    }
    let file_name = file_name?;

    if let Some((_, kind)) = EXACT_RULES.iter().find(|(name, _)| *name == file_name) {
        return Some(*kind);
    }

    PATTERN_RULES
        .iter()
        .find(|(pattern, _)| pattern.matches(file_name))
        .map(|(_, kind)| *kind)
}

/// Classify a tree entry using the default size ceiling.
pub fn classify(path: &str, size: u64) -> Option<ManifestKind> {
    classify_with_limit(path, size, MAX_MANIFEST_BYTES)
}

pub fn classify_with_limit(path: &str, size: u64, max_bytes: u64) -> Option<ManifestKind> {
    if size > max_bytes {
        return None;
    }
    match_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_names() {
        assert_eq!(classify("package.json", 10), Some(ManifestKind::PackageJson));
        assert_eq!(classify("api/pom.xml", 10), Some(ManifestKind::MavenPom));
        assert_eq!(classify("svc/build.gradle.kts", 10), Some(ManifestKind::Gradle));
        assert_eq!(classify("Dockerfile", 10), Some(ManifestKind::Dockerfile));
        assert_eq!(classify("tools/cpanfile", 10), Some(ManifestKind::Cpanfile));
        assert_eq!(classify("web/.nvmrc", 10), Some(ManifestKind::Nvmrc));
    }

    #[test]
    fn test_patterns() {
        assert_eq!(classify("app-build.gradle", 10), Some(ManifestKind::Gradle));
        assert_eq!(classify("settings.gradle", 10), None);
        assert_eq!(classify("docker/api.Dockerfile", 10), Some(ManifestKind::Dockerfile));
        assert_eq!(classify("Dockerfile.prod", 10), Some(ManifestKind::Dockerfile));
        assert_eq!(classify("requirements-dev.txt", 10), Some(ManifestKind::Requirements));
        assert_eq!(classify("requirements-.txt", 10), None);
    }

    #[test]
    fn test_non_manifests() {
        assert_eq!(classify("README.md", 10), None);
        assert_eq!(classify("src/package.json.bak", 10), None);
        assert_eq!(classify("", 10), None);
    }

    #[test]
    fn test_vendored_directories_skipped() {
        assert_eq!(classify("node_modules/left-pad/package.json", 10), None);
        assert_eq!(classify("a/vendor/b/pom.xml", 10), None);
        assert_eq!(classify("vendor-tools/package.json", 10), Some(ManifestKind::PackageJson));
    }

    #[test]
    fn test_size_ceiling() {
        assert_eq!(classify("package.json", MAX_MANIFEST_BYTES), Some(ManifestKind::PackageJson));
        assert_eq!(classify("package.json", MAX_MANIFEST_BYTES + 1), None);
        assert_eq!(match_path("package.json"), Some(ManifestKind::PackageJson));
        assert_eq!(classify_with_limit("package.json", 100, 50), None);
    }
}
