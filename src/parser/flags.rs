use std::cmp::Ordering;

use crate::models::Ecosystem;

/// Which declared versions of a coordinate are affected.
enum Affected {
    All,
    Exact(&'static [&'static str]),
    /// Every version strictly below the given one.
    Below(&'static str),
}

struct FlaggedCoordinate {
    ecosystem: Ecosystem,
    name: &'static str,
    affected: Affected,
    reason: &'static str,
}

const DENYLIST: &[FlaggedCoordinate] = &[
    FlaggedCoordinate {
        ecosystem: Ecosystem::Node,
        name: "event-stream",
        affected: Affected::Exact(&["3.3.6"]),
        reason: "Compromised release bundling the flatmap-stream backdoor",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Node,
        name: "flatmap-stream",
        affected: Affected::All,
        reason: "Malicious package from the event-stream incident",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Node,
        name: "ua-parser-js",
        affected: Affected::Exact(&["0.7.29", "0.8.0", "1.0.0"]),
        reason: "Hijacked release installing a cryptominer",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Node,
        name: "node-ipc",
        affected: Affected::Exact(&["10.1.1", "10.1.2", "10.1.3"]),
        reason: "Protestware release that overwrites files",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Node,
        name: "colors",
        affected: Affected::Exact(&["1.4.1", "1.4.2", "1.4.44-liberty-2"]),
        reason: "Sabotaged release with an infinite loop",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Node,
        name: "request",
        affected: Affected::All,
        reason: "Deprecated and unmaintained since 2020",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Java,
        name: "org.apache.logging.log4j:log4j-core",
        affected: Affected::Below("2.17.1"),
        reason: "Log4Shell remote code execution (CVE-2021-44228 and follow-ups)",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Java,
        name: "log4j:log4j",
        affected: Affected::All,
        reason: "Log4j 1.x is end-of-life with unpatched RCE (CVE-2019-17571)",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Java,
        name: "commons-collections:commons-collections",
        affected: Affected::Below("3.2.2"),
        reason: "Unsafe deserialization gadget chain (CVE-2015-7501)",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Java,
        name: "org.springframework:spring-beans",
        affected: Affected::Below("5.3.18"),
        reason: "Spring4Shell remote code execution (CVE-2022-22965)",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Python,
        name: "pyyaml",
        affected: Affected::Below("5.4"),
        reason: "Arbitrary code execution via full_load (CVE-2020-14343)",
    },
    FlaggedCoordinate {
        ecosystem: Ecosystem::Perl,
        name: "YAML::Syck",
        affected: Affected::All,
        reason: "Unmaintained YAML parser with known memory-safety issues",
    },
];

/// Return the reason if `name@version` matches a denylisted coordinate.
///
/// Versions that cannot be compared numerically (`*`, `${prop}`, ranges) only
/// match entries that affect every version.
pub fn check(ecosystem: Ecosystem, name: &str, version: &str) -> Option<&'static str> {
    DENYLIST
        .iter()
        .filter(|entry| entry.ecosystem == ecosystem && entry.name.eq_ignore_ascii_case(name))
        .find(|entry| match entry.affected {
            Affected::All => true,
            Affected::Exact(versions) => versions.contains(&version.trim()),
            Affected::Below(bound) => {
                compare_versions(version, bound) == Some(Ordering::Less)
            }
        })
        .map(|entry| entry.reason)
}

/// Compare dotted numeric versions, padding the shorter one with zeros.
fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = numeric_parts(a)?;
    let b = numeric_parts(b)?;
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

fn numeric_parts(version: &str) -> Option<Vec<u64>> {
    let core = version.trim().trim_start_matches(['v', '=']);
    let core = core.split(['-', '+']).next().unwrap_or(core);
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_versions() {
        assert!(check(Ecosystem::Node, "event-stream", "3.3.6").is_some());
        assert!(check(Ecosystem::Node, "event-stream", "4.0.1").is_none());
    }

    #[test]
    fn test_below_bound() {
        let log4j = "org.apache.logging.log4j:log4j-core";
        assert!(check(Ecosystem::Java, log4j, "2.14.1").is_some());
        assert!(check(Ecosystem::Java, log4j, "2.17.1").is_none());
        assert!(check(Ecosystem::Java, log4j, "2.20.0").is_none());
        // Unresolved property references are not guessed at.
        assert!(check(Ecosystem::Java, log4j, "${log4j.version}").is_none());
    }

    #[test]
    fn test_all_versions_and_case() {
        assert!(check(Ecosystem::Node, "request", "*").is_some());
        assert!(check(Ecosystem::Python, "PyYAML", "5.3.1").is_some());
    }

    #[test]
    fn test_ecosystem_must_match() {
        assert!(check(Ecosystem::Python, "request", "2.88.0").is_none());
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Some(Ordering::Equal));
        assert_eq!(compare_versions("1.10.0", "1.9"), Some(Ordering::Greater));
        assert_eq!(compare_versions("2.0.0-rc1", "2.0.0"), Some(Ordering::Equal));
        assert_eq!(compare_versions("latest", "1.0"), None);
    }
}
