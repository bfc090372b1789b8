//! Version Resolver
//!
//! Decides which compiler family a requested framework version belongs to and
//! whether moving between two versions needs a full environment reload.

use semver::Version;
use serde::{Deserialize, Serialize};

/// The two structurally incompatible compiler code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    V3,
    V2,
}

impl CompilerFamily {
    pub fn of(version: &str) -> Self {
        if is_major_v3(version) {
            CompilerFamily::V3
        } else {
            CompilerFamily::V2
        }
    }
}

/// Empty means "latest", which is a v3 build. Only the leading numeral before
/// the first `.` is inspected; anything unparsable is not v3.
pub fn is_major_v3(version: &str) -> bool {
    if version.is_empty() {
        return true;
    }
    let major = version.split('.').next().unwrap_or("");
    matches!(major.trim().parse::<f64>(), Ok(n) if n == 3.0)
}

/// Crossing the v2/v3 boundary in either direction cannot be done in place.
pub fn requires_reload(current: &str, requested: &str) -> bool {
    CompilerFamily::of(current) != CompilerFamily::of(requested)
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERSION LIST FILTERS
// ═══════════════════════════════════════════════════════════════════════════════

const PRE_RELEASE_IDENTIFIERS: [&str; 3] = ["-alpha", "-beta", "-rc"];

pub fn is_stable_version(version: &str) -> bool {
    !PRE_RELEASE_IDENTIFIERS.iter().any(|id| version.contains(id))
}

/// Vue 2 is pinned to 2.6.14; Vue 3 needs a stable release from 3.2.22 on.
pub fn supported_vue_versions(versions: &[String]) -> Vec<String> {
    versions
        .iter()
        .filter(|v| {
            if v.starts_with("2.") {
                v.as_str() == "2.6.14"
            } else if v.starts_with("3.") {
                is_stable_version(v) && version_gte(v, "3.2.22")
            } else {
                false
            }
        })
        .cloned()
        .collect()
}

pub fn supported_ts_versions(versions: &[String]) -> Vec<String> {
    versions
        .iter()
        .filter(|v| !v.contains("dev") && !v.contains("insiders") && version_gte(v, "3.9.10"))
        .cloned()
        .collect()
}

/// SemVer precedence, so `3.3.0-beta.10` sorts after `3.3.0-beta.2`.
/// Strings that are not SemVer never satisfy the bound.
pub fn version_gte(version: &str, min: &str) -> bool {
    match (Version::parse(version.trim()), Version::parse(min.trim())) {
        (Ok(version), Ok(min)) => version >= min,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_major_v3() {
        assert!(is_major_v3(""));
        assert!(is_major_v3("3"));
        assert!(is_major_v3("3.4.21"));
        assert!(!is_major_v3("2.6.14"));
        assert!(!is_major_v3("4.0.0"));
        assert!(!is_major_v3("latest"));
        assert!(!is_major_v3(".3"));
    }

    #[test]
    fn test_family_and_reload() {
        assert_eq!(CompilerFamily::of("2.7.0"), CompilerFamily::V2);
        assert_eq!(CompilerFamily::of(""), CompilerFamily::V3);
        assert!(requires_reload("3.3.4", "2.6.14"));
        assert!(requires_reload("2.6.14", "3.3.4"));
        assert!(!requires_reload("3.3.4", "3.4.0"));
        assert!(!requires_reload("", "3.4.0"));
    }

    #[test]
    fn test_supported_vue_versions() {
        let list: Vec<String> = ["2.6.13", "2.6.14", "3.2.21", "3.2.22", "3.3.0-beta.1", "3.4.0", "1.0.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(supported_vue_versions(&list), vec!["2.6.14", "3.2.22", "3.4.0"]);
    }

    #[test]
    fn test_supported_ts_versions() {
        let list: Vec<String> = ["3.9.9", "3.9.10", "5.0.0-dev.2023", "5.3.3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(supported_ts_versions(&list), vec!["3.9.10", "5.3.3"]);
    }

    #[test]
    fn test_version_gte_uses_semver_precedence() {
        assert!(version_gte("3.3.0-beta.10", "3.3.0-beta.2"));
        assert!(!version_gte("3.3.0-beta.2", "3.3.0-beta.10"));
        assert!(!version_gte("3.3.0-rc.1", "3.3.0"));
        assert!(version_gte("3.10.0", "3.9.10"));
        assert!(!version_gte("latest", "3.0.0"));
    }
}
