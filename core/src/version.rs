//! Next-release version computation for the `release_creation` step (§4.H).
use regex::Regex;
use std::sync::OnceLock;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)$").unwrap())
}

/// Parses a `v?N.N.N` string into `(major, minor, patch)`.
pub fn parse_semver(input: &str) -> Option<(u64, u64, u64)> {
    let caps = version_re().captures(input.trim())?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Computes the next release version per §4.H `release_creation`: if
/// `fix_version` already has the `v?N.N.N` shape, use it as-is (normalized
/// to carry the `v` prefix); otherwise derive the next version from the
/// highest existing tag by incrementing the major component.
pub fn next_release_version(fix_version: &str, existing_tags: &[String]) -> String {
    if let Some((major, minor, patch)) = parse_semver(fix_version) {
        return format!("v{major}.{minor}.{patch}");
    }

    let highest = existing_tags
        .iter()
        .filter_map(|t| parse_semver(t))
        .max_by_key(|&(maj, min, patch)| (maj, min, patch));

    match highest {
        Some((major, _, _)) => format!("v{}.0.0", major + 1),
        None => "v1.0.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_v_prefix() {
        assert_eq!(parse_semver("v2.0.0"), Some((2, 0, 0)));
        assert_eq!(parse_semver("2.0.0"), Some((2, 0, 0)));
        assert_eq!(parse_semver("not-a-version"), None);
    }

    #[test]
    fn uses_fix_version_verbatim_when_already_semver_shaped() {
        assert_eq!(next_release_version("v2.0.0", &[]), "v2.0.0");
    }

    #[test]
    fn increments_major_from_existing_tags_when_fix_version_is_not_semver() {
        let tags = vec!["v1.0.0".to_string(), "v1.2.0".to_string()];
        assert_eq!(next_release_version("sprint-42", &tags), "v2.0.0");
    }

    #[test]
    fn falls_back_to_v1_0_0_with_no_tags_and_no_semver_fix_version() {
        assert_eq!(next_release_version("sprint-42", &[]), "v1.0.0");
    }
}
