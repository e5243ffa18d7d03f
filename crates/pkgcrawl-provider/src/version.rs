//! Release version parsing for tag and branch based releases.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use semver::Version;

static DATE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}\.\d{2}\.\d{2}(?:\.\d{2}\.\d{2}\.\d{2})?$").expect("valid date regex")
});

static LOOSE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?([-+][0-9A-Za-z.+-]*)?$")
        .expect("valid version regex")
});

/// Parses a release version, accepting a leading `v` and missing minor/patch parts.
///
/// Date based versions (`2020.07.15.10.50.38`) sort below any explicit version,
/// so a package can move from branch releases to tagged releases.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.strip_prefix('v').unwrap_or(version);

    if DATE_VERSION.is_match(version) {
        return Version::parse(&format!("0.0.1+{version}")).ok();
    }

    let caps = LOOSE_VERSION.captures(version)?;
    let part = |idx: usize| {
        caps.get(idx)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };
    let (major, minor, patch) = (part(1)?, part(2)?, part(3)?);
    let rest = caps.get(4).map_or("", |m| m.as_str());

    Version::parse(&format!("{major}.{minor}.{patch}{rest}")).ok()
}

/// A tag that parsed as a release version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagMatch<T> {
    pub version: Version,
    /// Version as written in the tag, prefix and leading `v` removed.
    pub label: String,
    pub tag: String,
    pub data: T,
}

/// Strips `prefix` (when given) and parses what is left of `tag`.
///
/// Without a prefix, only tags that parse as-is match.
pub fn version_match_prefix(tag: &str, prefix: Option<&str>) -> Option<(Version, String)> {
    let rest = match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => tag.strip_prefix(prefix)?,
        None => tag,
    };
    let version = parse_version(rest)?;
    let label = rest.strip_prefix('v').unwrap_or(rest).to_string();
    Some((version, label))
}

/// Keeps the tags that are versions, drops duplicate versions and sorts newest first.
pub fn newest_tags<T>(
    tags: impl IntoIterator<Item = (String, T)>,
    prefix: Option<&str>,
) -> Vec<TagMatch<T>> {
    let mut seen = HashSet::new();
    let mut matches: Vec<TagMatch<T>> = tags
        .into_iter()
        .filter_map(|(tag, data)| {
            let (version, label) = version_match_prefix(&tag, prefix)?;
            seen.insert(version.clone()).then_some(TagMatch {
                version,
                label,
                tag,
                data,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.version.cmp(&a.version));
    matches
}

/// Counts final releases against `max_releases` (0 means unlimited).
///
/// Pre-releases are emitted but do not count.
#[derive(Debug)]
pub struct ReleaseLimit {
    max: usize,
    finals: usize,
}

impl ReleaseLimit {
    pub fn new(max: usize) -> Self {
        Self { max, finals: 0 }
    }

    /// Records an emitted release and reports whether the limit is now reached.
    pub fn record(&mut self, version: &Version) -> bool {
        if version.pre.is_empty() {
            self.finals += 1;
        }
        self.max > 0 && self.finals >= self.max
    }
}

/// Turns an ISO-8601 commit date into `YYYY-MM-DD HH:MM:SS`.
pub fn commit_timestamp(date: &str) -> String {
    date.get(..19).unwrap_or(date).replace('T', " ")
}

/// Branch release version derived from the commit timestamp.
pub fn version_from_timestamp(timestamp: &str) -> String {
    timestamp.replace(['-', ':', ' '], ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("v2.0"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_version("3"), Some(Version::new(3, 0, 0)));
        assert!(parse_version("1.0.0-beta.1").unwrap().pre.as_str() == "beta.1");
        assert!(parse_version("release-candidate").is_none());
        assert!(parse_version("1.2.3.4").is_none());
    }

    #[test]
    fn test_date_versions_sort_below_explicit() {
        let dated = parse_version("2020.07.15.10.50.38").unwrap();
        let explicit = parse_version("0.1.0").unwrap();
        assert!(dated < explicit);
    }

    #[test]
    fn test_version_match_prefix() {
        let (version, label) = version_match_prefix("st3-v1.4.0", Some("st3-")).unwrap();
        assert_eq!(version, Version::new(1, 4, 0));
        assert_eq!(label, "1.4.0");

        assert!(version_match_prefix("1.4.0", Some("st3-")).is_none());
        assert!(version_match_prefix("st3-1.4.0", None).is_none());
    }

    #[test]
    fn test_newest_tags() {
        let tags = vec![
            ("1.0.0".to_string(), "a"),
            ("v1.2.0".to_string(), "b"),
            ("1.2".to_string(), "c"),
            ("nightly".to_string(), "d"),
            ("1.1.0".to_string(), "e"),
        ];
        let matches = newest_tags(tags, None);
        let names: Vec<_> = matches.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(names, vec!["v1.2.0", "1.1.0", "1.0.0"]);
        assert_eq!(matches[0].label, "1.2.0");
    }

    #[test]
    fn test_release_limit_counts_finals() {
        let mut limit = ReleaseLimit::new(2);
        assert!(!limit.record(&parse_version("2.0.0-rc.1").unwrap()));
        assert!(!limit.record(&parse_version("1.1.0").unwrap()));
        assert!(limit.record(&parse_version("1.0.0").unwrap()));

        let mut unlimited = ReleaseLimit::new(0);
        for _ in 0..10 {
            assert!(!unlimited.record(&Version::new(1, 0, 0)));
        }
    }

    #[test]
    fn test_timestamps() {
        let ts = commit_timestamp("2021-03-04T05:06:07Z");
        assert_eq!(ts, "2021-03-04 05:06:07");
        assert_eq!(version_from_timestamp(&ts), "2021.03.04.05.06.07");
    }
}
