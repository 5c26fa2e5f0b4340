use std::collections::HashMap;

use anyhow::Result;
use regex::{Captures, Regex};

use super::{ParseOutput, RawDependency};
use crate::models::{ComponentType, Ecosystem};

const CONFIGURATIONS: &str = "implementation|api|compile|compileOnly|runtimeOnly|runtime|\
testImplementation|testCompile|testCompileOnly|testRuntimeOnly|androidTestImplementation|\
annotationProcessor|kapt|classpath|developmentOnly";

/// Parse `build.gradle` or `build.gradle.kts` with regex.
///
/// Handles string, map and Kotlin named-argument notation, the `plugins`
/// block, and `$var` / `${var}` interpolation against variables declared in
/// the same file.
pub fn parse_build_gradle(raw: &str) -> Result<ParseOutput> {
    let content = strip_comments(raw)?;
    let variables = collect_variables(&content)?;
    let interpolation_re = Regex::new(r"\$\{([\w.]+)\}|\$(\w+)")?;
    let interpolate = |value: &str| {
        interpolation_re
            .replace_all(value, |caps: &Captures| {
                let key = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                lookup_variable(&variables, key).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    };

    // (offset, dependency) pairs so declarations come out in source order.
    let mut found: Vec<(usize, RawDependency)> = Vec::new();

    // Matches: implementation 'group:artifact:version'
    //          implementation("group:artifact:version")
    //          implementation platform("group:artifact:version")
    let re_shorthand = Regex::new(&format!(
        r#"\b({})\s*\(?\s*(?:(?:enforcedPlatform|platform)\s*\(\s*)?['"]([^'":\s]+):([^'":\s]+)(?::([^'"\s]+))?['"]"#,
        CONFIGURATIONS
    ))?;
    for caps in re_shorthand.captures_iter(&content) {
        let version = caps
            .get(4)
            .map(|m| m.as_str().split(':').next().unwrap_or("*"))
            .unwrap_or("*");
        let offset = caps.get(0).map_or(0, |m| m.start());
        found.push((
            offset,
            make_dep(&caps[1], &interpolate(&caps[2]), &interpolate(&caps[3]), &interpolate(version)),
        ));
    }

    // Matches: implementation group: 'g', name: 'a', version: 'v'
    //          implementation(group = "g", name = "a", version = "v")
    let re_map = Regex::new(&format!(
        r#"\b({})\s*\(?\s*group\s*[:=]\s*['"]([^'"]+)['"]\s*,\s*name\s*[:=]\s*['"]([^'"]+)['"](?:\s*,\s*version\s*[:=]\s*['"]([^'"]+)['"])?"#,
        CONFIGURATIONS
    ))?;
    for caps in re_map.captures_iter(&content) {
        let version = caps.get(4).map_or("*", |m| m.as_str());
        let offset = caps.get(0).map_or(0, |m| m.start());
        found.push((
            offset,
            make_dep(&caps[1], &interpolate(&caps[2]), &interpolate(&caps[3]), &interpolate(version)),
        ));
    }

    // Matches: id 'org.springframework.boot' version '3.1.0'
    //          id("org.springframework.boot") version "3.1.0"
    //          kotlin("jvm") version "1.9.0"
    let re_plugin = Regex::new(
        r#"\b(id|kotlin)\s*\(?\s*['"]([^'"]+)['"]\s*\)?\s*version\s*\(?\s*['"]([^'"]+)['"]"#,
    )?;
    for caps in re_plugin.captures_iter(&content) {
        let id = if &caps[1] == "kotlin" {
            format!("org.jetbrains.kotlin.{}", &caps[2])
        } else {
            caps[2].to_string()
        };
        let offset = caps.get(0).map_or(0, |m| m.start());
        found.push((
            offset,
            RawDependency::new(
                Ecosystem::Java,
                id,
                interpolate(&caps[3]),
                ComponentType::BuildDependency,
            )
            .with_scope("plugin"),
        ));
    }

    found.sort_by_key(|(offset, _)| *offset);

    let mut output = ParseOutput::for_runtime("java");
    output.components = found.into_iter().map(|(_, dep)| dep).collect();
    output.runtime_version = java_version(&content)?;
    Ok(output)
}

fn make_dep(configuration: &str, group: &str, artifact: &str, version: &str) -> RawDependency {
    let component_type = match configuration {
        c if c.starts_with("test") || c.starts_with("androidTest") => ComponentType::DevDependency,
        "classpath" | "annotationProcessor" | "kapt" => ComponentType::BuildDependency,
        _ => ComponentType::Dependency,
    };
    RawDependency::new(
        Ecosystem::Java,
        format!("{}:{}", group, artifact),
        version,
        component_type,
    )
    .with_scope(configuration)
}

fn strip_comments(raw: &str) -> Result<String> {
    let block_re = Regex::new(r"(?s)/\*.*?\*/")?;
    let without_blocks = block_re.replace_all(raw, "");
    Ok(without_blocks
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Collect `def`/`val`/`var` declarations, `ext.x = ..`, `extra["x"] = ..`
/// and assignments inside `ext { .. }` blocks.
fn collect_variables(content: &str) -> Result<HashMap<String, String>> {
    let mut variables = HashMap::new();

    let patterns = [
        r#"(?m)^\s*(?:def|val|var)\s+(\w+)\s*(?::\s*\w+\s*)?=\s*['"]([^'"]*)['"]"#,
        r#"\bext\.(\w+)\s*=\s*['"]([^'"]*)['"]"#,
        r#"\bextra\[\s*"(\w+)"\s*\]\s*=\s*"([^"]*)""#,
        r#"\bset\(\s*"(\w+)"\s*,\s*"([^"]*)"\s*\)"#,
    ];
    for pattern in patterns {
        let re = Regex::new(pattern)?;
        for caps in re.captures_iter(content) {
            variables.insert(caps[1].to_string(), caps[2].to_string());
        }
    }

    let assignment_re = Regex::new(r#"(?m)^\s*(\w+)\s*=\s*['"]([^'"]*)['"]"#)?;
    for block in ext_blocks(content) {
        for caps in assignment_re.captures_iter(block) {
            variables.insert(caps[1].to_string(), caps[2].to_string());
        }
    }

    Ok(variables)
}

/// Bodies of every `ext { ... }` block, matched by brace depth.
fn ext_blocks(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut search_from = 0;
    while let Some(found) = content[search_from..].find("ext {") {
        let body_start = search_from + found + "ext {".len();
        let mut depth = 1;
        let mut end = None;
        for (i, c) in content[body_start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(body_start + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else { break };
        blocks.push(&content[body_start..end]);
        search_from = end;
    }
    blocks
}

fn lookup_variable(variables: &HashMap<String, String>, key: &str) -> Option<String> {
    variables.get(key).cloned().or_else(|| {
        // rootProject.ext.foo, project.foo
        key.rsplit('.').next().and_then(|last| variables.get(last).cloned())
    })
}

fn java_version(content: &str) -> Result<Option<String>> {
    let patterns = [
        r#"JavaLanguageVersion\.of\(\s*(\d+)\s*\)"#,
        r#"jvmToolchain\(\s*(\d+)\s*\)"#,
        r#"sourceCompatibility\s*=\s*(?:JavaVersion\.VERSION_)?['"]?(\d[\d_.]*)"#,
    ];
    for pattern in patterns {
        let re = Regex::new(pattern)?;
        if let Some(caps) = re.captures(content) {
            return Ok(Some(caps[1].replace('_', ".")));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_gradle() {
        let content = r#"
def springVersion = '5.3.23'
ext {
    guavaVersion = "31.1-jre"
}
sourceCompatibility = JavaVersion.VERSION_1_8

dependencies {
    implementation "org.springframework:spring-core:${springVersion}"
    implementation "com.google.guava:guava:$guavaVersion"
    // implementation 'commented:out:1.0'
    testImplementation 'junit:junit:4.13.2'
    implementation group: 'org.slf4j', name: 'slf4j-api', version: '2.0.7'
}
"#;
        let out = parse_build_gradle(content).unwrap();
        assert_eq!(out.components.len(), 4);
        assert_eq!(out.components[0].name, "org.springframework:spring-core");
        assert_eq!(out.components[0].version, "5.3.23");
        assert_eq!(out.components[1].version, "31.1-jre");
        assert_eq!(out.components[2].component_type, ComponentType::DevDependency);
        assert_eq!(out.components[3].name, "org.slf4j:slf4j-api");
        assert_eq!(out.runtime_version.as_deref(), Some("1.8"));
    }

    #[test]
    fn test_kotlin_dsl() {
        let content = r#"
val ktorVersion = "2.3.4"
plugins {
    id("org.springframework.boot") version "3.1.0"
    kotlin("jvm") version "1.9.0"
}
java {
    toolchain {
        languageVersion.set(JavaLanguageVersion.of(17))
    }
}
dependencies {
    implementation("io.ktor:ktor-server-core:$ktorVersion")
    implementation(platform("org.springframework.cloud:spring-cloud-dependencies:2022.0.4"))
    implementation("org.jetbrains.kotlin:kotlin-stdlib")
    runtimeOnly("org.postgresql:postgresql:${missingVersion}")
}
"#;
        let out = parse_build_gradle(content).unwrap();
        let names: Vec<&str> = out.components.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "org.springframework.boot",
                "org.jetbrains.kotlin.jvm",
                "io.ktor:ktor-server-core",
                "org.springframework.cloud:spring-cloud-dependencies",
                "org.jetbrains.kotlin:kotlin-stdlib",
                "org.postgresql:postgresql",
            ]
        );
        assert_eq!(out.components[0].component_type, ComponentType::BuildDependency);
        assert_eq!(out.components[2].version, "2.3.4");
        assert_eq!(out.components[4].version, "*");
        assert_eq!(out.components[5].version, "${missingVersion}");
        assert_eq!(out.runtime_version.as_deref(), Some("17"));
    }

    #[test]
    fn test_classpath_is_build_dependency() {
        let content = "buildscript { dependencies { classpath 'com.android.tools.build:gradle:8.1.0' } }";
        let out = parse_build_gradle(content).unwrap();
        assert_eq!(out.components.len(), 1);
        assert_eq!(out.components[0].component_type, ComponentType::BuildDependency);
        assert_eq!(out.components[0].scope.as_deref(), Some("classpath"));
    }
}
