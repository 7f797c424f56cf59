//! Version parsing and comparison
//!
//! Used for engine/blueprint compatibility and for resolving dependency
//! version disagreements.

use anyhow::Result;
use semver::Version;
use std::cmp::Ordering;

/// Compare the engine version against the version a blueprint was written for
/// Returns a warning message if the engine is older than the blueprint expects
pub fn check_compatibility(
    engine_version: &str,
    blueprint_version: &str,
    upgrade_command: &str,
) -> Option<String> {
    let engine_ver = parse_version(engine_version).ok()?;
    let blueprint_ver = parse_version(blueprint_version).ok()?;

    if engine_ver < blueprint_ver {
        Some(format!(
            "Warning: This blueprint was written for engine version {} or newer.\n\
             You are running version {}.\n\
             Consider updating: {}",
            blueprint_version, engine_version, upgrade_command
        ))
    } else {
        None
    }
}

/// Parse version string, tolerating a leading 'v'
pub fn parse_version(version_str: &str) -> Result<Version> {
    let cleaned = version_str.strip_prefix('v').unwrap_or(version_str);
    Version::parse(cleaned).map_err(|e| anyhow::anyhow!("Invalid version '{}': {}", version_str, e))
}

/// Go pseudo-versions encode a commit, not a release
///
/// `v0.0.0-20240101120000-abcdef123456`, `v1.2.4-0.20240101120000-abcdef123456`
/// and `v1.2.3-pre.0.20240101120000-abcdef123456` all qualify.
pub fn is_pseudo_version(version: &Version) -> bool {
    let pre = version.pre.as_str();
    let mut parts = pre.rsplitn(2, '-');
    let (Some(hash), Some(rest)) = (parts.next(), parts.next()) else {
        return false;
    };
    let timestamp = rest.rsplit('.').next().unwrap_or(rest);
    hash.len() == 12
        && hash.chars().all(|c| c.is_ascii_hexdigit())
        && timestamp.len() == 14
        && timestamp.chars().all(|c| c.is_ascii_digit())
}

/// Order two release versions; `None` when either is not a comparable release
pub fn compare_releases(left: &str, right: &str) -> Option<Ordering> {
    let left = parse_version(left).ok()?;
    let right = parse_version(right).ok()?;
    if is_pseudo_version(&left) || is_pseudo_version(&right) {
        return None;
    }
    Some(left.cmp(&right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_older_than_blueprint() {
        let warning = check_compatibility("0.1.0", "0.2.0", "cargo install blueprint-tools --force");
        assert!(warning.is_some());
        assert!(warning.unwrap().contains("0.2.0"));
    }

    #[test]
    fn test_engine_same_as_blueprint() {
        let warning = check_compatibility("0.1.0", "0.1.0", "cargo install blueprint-tools --force");
        assert!(warning.is_none());
    }

    #[test]
    fn test_engine_newer_than_blueprint() {
        let warning = check_compatibility("0.2.0", "v0.1.0", "cargo install blueprint-tools --force");
        assert!(warning.is_none());
    }

    #[test]
    fn test_invalid_versions() {
        let warning = check_compatibility("invalid", "0.1.0", "cargo install blueprint-tools --force");
        assert!(warning.is_none());
    }

    #[test]
    fn test_pseudo_versions() {
        for pseudo in [
            "v0.0.0-20240101120000-abcdef123456",
            "v1.2.4-0.20240101120000-abcdef123456",
            "v1.2.3-pre.0.20240101120000-abcdef123456",
        ] {
            assert!(is_pseudo_version(&parse_version(pseudo).unwrap()), "{}", pseudo);
        }
        assert!(!is_pseudo_version(&parse_version("v1.2.3-rc.1").unwrap()));
        assert!(!is_pseudo_version(&parse_version("v1.27.0").unwrap()));
    }

    #[test]
    fn test_compare_releases() {
        assert_eq!(compare_releases("v1.9.0", "v1.10.0"), Some(Ordering::Less));
        assert_eq!(compare_releases("1.0.0", "v1.0.0"), Some(Ordering::Equal));
        assert_eq!(compare_releases("v1.0.0", "latest"), None);
        assert_eq!(
            compare_releases("v0.0.0-20240101120000-abcdef123456", "v0.1.0"),
            None
        );
    }
}
