//! Canonical forms for release selectors, platforms and download URLs.
//!
//! Every provider runs its records through [`normalize_record`] so the
//! catalog only ever sees one spelling of each selector and platform.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::{PackageRecord, ReleaseRecord};

pub const ALL_PLATFORMS: [&str; 3] = ["windows", "osx", "linux"];

const ALL_ST_VERSIONS: [u8; 3] = [2, 3, 4];

static ARCH_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-x(32|64)$").expect("valid arch regex"));

static SELECTOR_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([234])\d+ - ([234])\d+").expect("valid range regex"));

/// Rewrites the known spellings of a selector into its canonical form.
pub fn canonical_selector(selector: &str) -> String {
    let selector = selector.trim();
    match selector {
        ">2999" | ">3000" => ">=3000".into(),
        "<=2999" | "<=3000" => "<3000".into(),
        "" => "*".into(),
        other => other.into(),
    }
}

/// Expands `*` into the explicit platform triple, dropping duplicates.
pub fn expand_platforms(platforms: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::with_capacity(platforms.len());
    for platform in platforms {
        let platform = platform.trim();
        if platform == "*" {
            for p in ALL_PLATFORMS {
                if !expanded.iter().any(|e| e == p) {
                    expanded.push(p.into());
                }
            }
        } else if !platform.is_empty() && !expanded.iter().any(|e| e == platform) {
            expanded.push(platform.into());
        }
    }
    if expanded.is_empty() {
        return ALL_PLATFORMS.iter().map(|p| p.to_string()).collect();
    }
    expanded
}

/// Old GitHub archive host, still found in legacy manifests.
pub fn rewrite_download_url(url: &str) -> String {
    url.replace(
        "https://nodeload.github.com/",
        "https://codeload.github.com/",
    )
}

/// Platforms supported by any release, architecture suffixes stripped.
///
/// The known platforms come first in their fixed order.
pub fn summary_platforms(releases: &[ReleaseRecord]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for release in releases {
        for platform in &release.platforms {
            if platform == "*" {
                for p in ALL_PLATFORMS {
                    if !seen.iter().any(|s| s == p) {
                        seen.push(p.into());
                    }
                }
                continue;
            }
            let stripped = ARCH_SUFFIX.replace(platform, "").into_owned();
            if !seen.contains(&stripped) {
                seen.push(stripped);
            }
        }
    }

    let mut ordered: Vec<String> = ALL_PLATFORMS
        .iter()
        .filter(|p| seen.iter().any(|s| s == *p))
        .map(|p| p.to_string())
        .collect();
    ordered.extend(
        seen.into_iter()
            .filter(|s| !ALL_PLATFORMS.contains(&s.as_str())),
    );
    ordered
}

/// Major editor versions matched by one selector.
pub fn st_versions(selector: &str) -> Vec<u8> {
    let st = canonical_selector(selector);
    let st = st.as_str();

    let starts = |prefixes: &[&str], digit: char| {
        prefixes.iter().any(|p| {
            st.strip_prefix(p)
                .is_some_and(|rest| rest.starts_with(digit))
        })
    };
    let greater = [">=", ">"];
    let less = ["<=", "<"];

    if st == "<4000" {
        vec![2, 3]
    } else if st == "<3000" {
        vec![2]
    } else if starts(&greater, '2') {
        vec![2, 3, 4]
    } else if starts(&greater, '3') {
        vec![3, 4]
    } else if starts(&greater, '4') {
        vec![4]
    } else if starts(&less, '2') {
        vec![2]
    } else if starts(&less, '3') {
        vec![2, 3]
    } else if starts(&less, '4') {
        vec![2, 3, 4]
    } else if let Some(caps) = SELECTOR_RANGE.captures(st) {
        let low = caps[1].parse::<u8>().unwrap_or(2);
        let high = caps[2].parse::<u8>().unwrap_or(4);
        if low <= high {
            (low..=high).collect()
        } else {
            ALL_ST_VERSIONS.to_vec()
        }
    } else {
        ALL_ST_VERSIONS.to_vec()
    }
}

/// Union of [`st_versions`] over every release, sorted.
pub fn record_st_versions(releases: &[ReleaseRecord]) -> Vec<u8> {
    let mut versions: Vec<u8> = releases
        .iter()
        .flat_map(|r| st_versions(&r.sublime_text))
        .collect();
    versions.sort_unstable();
    versions.dedup();
    versions
}

pub fn normalize_release(release: &mut ReleaseRecord) {
    release.sublime_text = canonical_selector(&release.sublime_text);
    release.platforms = expand_platforms(&release.platforms);
    release.url = rewrite_download_url(&release.url);
}

/// Normalizes every release and sets `last_modified` to the newest release date.
pub fn normalize_record(record: &mut PackageRecord) {
    for release in &mut record.releases {
        normalize_release(release);
    }

    if let Some(newest) = record
        .releases
        .iter()
        .map(|r| r.date.as_str())
        .filter(|d| !d.is_empty())
        .max()
    {
        record.last_modified = Some(newest.to_string());
    }
}

/// Splits a comma separated author string.
pub fn split_authors(author: &str) -> Vec<String> {
    author
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_canonical_selector() {
        assert_eq!(canonical_selector(">2999"), ">=3000");
        assert_eq!(canonical_selector("<=2999"), "<3000");
        assert_eq!(canonical_selector(">3000"), ">=3000");
        assert_eq!(canonical_selector("<=3000"), "<3000");
        assert_eq!(canonical_selector(">=3000"), ">=3000");
        assert_eq!(canonical_selector("3000 - 3999"), "3000 - 3999");
        assert_eq!(canonical_selector(""), "*");
    }

    #[test]
    fn test_expand_platforms() {
        assert_eq!(
            expand_platforms(&strings(&["*"])),
            strings(&["windows", "osx", "linux"])
        );
        assert_eq!(
            expand_platforms(&strings(&["linux", "*"])),
            strings(&["linux", "windows", "osx"])
        );
        assert_eq!(
            expand_platforms(&strings(&["osx-x64"])),
            strings(&["osx-x64"])
        );
        assert_eq!(expand_platforms(&[]), strings(&["windows", "osx", "linux"]));
    }

    #[test]
    fn test_st_versions_table() {
        assert_eq!(st_versions("<4000"), vec![2, 3]);
        assert_eq!(st_versions("<3000"), vec![2]);
        assert_eq!(st_versions("<=2999"), vec![2]);
        assert_eq!(st_versions(">2999"), vec![3, 4]);
        assert_eq!(st_versions(">=2000"), vec![2, 3, 4]);
        assert_eq!(st_versions(">=3000"), vec![3, 4]);
        assert_eq!(st_versions(">=4050"), vec![4]);
        assert_eq!(st_versions("<3100"), vec![2, 3]);
        assert_eq!(st_versions("<4100"), vec![2, 3, 4]);
        assert_eq!(st_versions("3000 - 3999"), vec![3]);
        assert_eq!(st_versions("2000 - 4100"), vec![2, 3, 4]);
        assert_eq!(st_versions("3000 - 4100"), vec![3, 4]);
        assert_eq!(st_versions("*"), vec![2, 3, 4]);
        assert_eq!(st_versions("garbage"), vec![2, 3, 4]);
    }

    #[test]
    fn test_normalize_record() {
        let mut record = PackageRecord {
            name: "Foo".into(),
            releases: vec![
                ReleaseRecord {
                    version: "1.0.0".into(),
                    sublime_text: ">2999".into(),
                    platforms: strings(&["*"]),
                    url: "https://nodeload.github.com/foo/bar/zip/1.0.0".into(),
                    date: "2019-05-01 10:00:00".into(),
                    ..Default::default()
                },
                ReleaseRecord {
                    version: "1.1.0".into(),
                    sublime_text: "*".into(),
                    platforms: strings(&["linux"]),
                    url: "https://codeload.github.com/foo/bar/zip/1.1.0".into(),
                    date: "2020-02-03 04:05:06".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        normalize_record(&mut record);

        let first = &record.releases[0];
        assert_eq!(first.sublime_text, ">=3000");
        assert_eq!(first.platforms, strings(&["windows", "osx", "linux"]));
        assert_eq!(first.url, "https://codeload.github.com/foo/bar/zip/1.0.0");
        assert_eq!(record.last_modified.as_deref(), Some("2020-02-03 04:05:06"));
    }

    #[test]
    fn test_split_authors() {
        assert_eq!(
            split_authors("alice , bob,carol"),
            strings(&["alice", "bob", "carol"])
        );
    }
}
