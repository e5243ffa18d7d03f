use std::sync::LazyLock;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use pkgcrawl_fetch::FetchError;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{
    description_or_default, empty_is_none, DownloadInfo, HostingClient, RepoInfo, RepoRef,
};
use crate::{
    error::{ProviderError, Result},
    provider::ProviderContext,
    version::{commit_timestamp, newest_tags, version_from_timestamp, ReleaseLimit},
};

static REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://github\.com/([^/#?]+)(?:/([^/#?]+?)(?:\.git|/tree/([^#?]*[^/#?])/?|/?)|/?)$",
    )
    .expect("valid github repo regex")
});

static USER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://github\.com/([^/#?]+)/?$").expect("valid github user regex")
});

static TAGS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://github\.com/([^/#?]+/[^/#?]+)(?:/tags)?/?$")
        .expect("valid github tags regex")
});

const API_ROOT: &str = "https://api.github.com";
const TAGS_PAGE_SIZE: usize = 100;
const MAX_TAG_PAGES: usize = 10;

#[derive(Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    owner: ApiOwner,
    #[serde(default, deserialize_with = "empty_is_none")]
    description: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    homepage: Option<String>,
    html_url: String,
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct ApiCommitter {
    date: String,
}

#[derive(Deserialize)]
struct ApiCommitDetails {
    committer: ApiCommitter,
}

#[derive(Deserialize)]
struct ApiCommit {
    commit: ApiCommitDetails,
}

#[derive(Deserialize)]
struct ApiBranch {
    commit: ApiCommit,
}

#[derive(Deserialize)]
struct ApiTagCommit {
    url: String,
}

#[derive(Deserialize)]
struct ApiTag {
    name: String,
    commit: ApiTagCommit,
}

#[derive(Deserialize)]
struct ApiReadme {
    path: Option<String>,
}

/// Parses `https://github.com/{user}[/{repo}[.git|/tree/{branch}]]`.
pub fn user_repo_branch(url: &str) -> Option<RepoRef> {
    let caps = REPO_URL.captures(url)?;
    Some(RepoRef {
        user: caps[1].to_string(),
        repo: caps.get(2).map(|m| m.as_str().to_string()),
        branch: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

pub fn is_repo_url(url: &str) -> bool {
    user_repo_branch(url).is_some_and(|r| r.repo.is_some())
}

pub fn is_user_url(url: &str) -> bool {
    USER_URL.is_match(url)
}

pub struct GitHubClient<'a> {
    ctx: &'a ProviderContext,
}

impl<'a> GitHubClient<'a> {
    pub fn new(ctx: &'a ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_url(user_repo: &str, suffix: &str) -> String {
        format!("{API_ROOT}/repos/{user_repo}{suffix}")
    }

    fn readme_url(&self, user_repo: &str, branch: &str) -> Result<Option<String>> {
        let branch_query = utf8_percent_encode(branch, NON_ALPHANUMERIC);
        let url = Self::api_url(user_repo, &format!("/readme?ref={branch_query}"));

        match self.ctx.fetch_json::<ApiReadme>(&url) {
            Ok(readme) => {
                Ok(readme.path.filter(|p| !p.is_empty()).map(|path| {
                    format!("https://raw.githubusercontent.com/{user_repo}/{branch}/{path}")
                }))
            }
            Err(ProviderError::Fetch(FetchError::NotFound { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn extract_repo_info(&self, branch: &str, repo: ApiRepo) -> Result<RepoInfo> {
        let user_repo = format!("{}/{}", repo.owner.login, repo.name);
        let issues = repo
            .has_issues
            .then(|| format!("https://github.com/{user_repo}/issues"));

        Ok(RepoInfo {
            readme: self.readme_url(&user_repo, branch)?,
            description: description_or_default(repo.description),
            homepage: repo.homepage.or(Some(repo.html_url)),
            author: repo.owner.login,
            name: repo.name,
            issues,
            donate: None,
            default_branch: branch.to_string(),
        })
    }

    fn make_download_info(user_repo: &str, ref_name: &str, version: String, date: String) -> DownloadInfo {
        DownloadInfo {
            version,
            url: format!("https://codeload.github.com/{user_repo}/zip/{ref_name}"),
            date,
        }
    }
}

impl HostingClient for GitHubClient<'_> {
    fn name(&self) -> &'static str {
        "GitHubClient"
    }

    fn repo_url(&self, user: &str, repo: &str) -> String {
        format!(
            "https://github.com/{}/{}",
            utf8_percent_encode(user, NON_ALPHANUMERIC),
            utf8_percent_encode(repo, NON_ALPHANUMERIC)
        )
    }

    fn repo_info(&self, url: &str) -> Result<Option<RepoInfo>> {
        let Some(repo_ref) = user_repo_branch(url) else {
            return Ok(None);
        };
        let Some(user_repo) = repo_ref.user_repo() else {
            return Ok(None);
        };

        let repo: ApiRepo = self.ctx.fetch_json(&Self::api_url(&user_repo, ""))?;
        let branch = repo_ref
            .branch
            .or_else(|| repo.default_branch.clone())
            .unwrap_or_else(|| "master".to_string());

        self.extract_repo_info(&branch, repo).map(Some)
    }

    fn user_info(&self, url: &str) -> Result<Option<Vec<RepoInfo>>> {
        let Some(caps) = USER_URL.captures(url) else {
            return Ok(None);
        };
        let api_url = format!("{API_ROOT}/users/{}/repos", &caps[1]);

        let repos: Vec<ApiRepo> = self.ctx.fetch_json(&api_url)?;
        repos
            .into_iter()
            .map(|repo| {
                let branch = repo
                    .default_branch
                    .clone()
                    .unwrap_or_else(|| "master".to_string());
                self.extract_repo_info(&branch, repo)
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn download_info_from_branch(
        &self,
        url: &str,
        default_branch: Option<&str>,
    ) -> Result<Option<Vec<DownloadInfo>>> {
        let Some(repo_ref) = user_repo_branch(url) else {
            return Ok(None);
        };
        let Some(user_repo) = repo_ref.user_repo() else {
            return Ok(None);
        };

        let branch = match (repo_ref.branch, default_branch) {
            (Some(branch), _) => branch,
            (None, Some(branch)) => branch.to_string(),
            (None, None) => {
                let repo: ApiRepo = self.ctx.fetch_json(&Self::api_url(&user_repo, ""))?;
                repo.default_branch.unwrap_or_else(|| "master".to_string())
            }
        };

        let branch_url = Self::api_url(&user_repo, &format!("/branches/{branch}"));
        let info: ApiBranch = self.ctx.fetch_json(&branch_url)?;
        let timestamp = commit_timestamp(&info.commit.commit.committer.date);

        Ok(Some(vec![Self::make_download_info(
            &user_repo,
            &branch,
            version_from_timestamp(&timestamp),
            timestamp,
        )]))
    }

    fn download_info_from_tags(
        &self,
        url: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Option<Vec<DownloadInfo>>> {
        let Some(caps) = TAGS_URL.captures(url) else {
            return Ok(None);
        };
        let user_repo = caps[1].to_string();

        let mut tags = Vec::new();
        for page in 1..=MAX_TAG_PAGES {
            let tags_url = Self::api_url(
                &user_repo,
                &format!("/tags?per_page={TAGS_PAGE_SIZE}&page={page}"),
            );
            let page_tags: Vec<ApiTag> = self.ctx.fetch_json(&tags_url)?;
            let count = page_tags.len();
            tags.extend(page_tags.into_iter().map(|t| (t.name, t.commit.url)));
            if count < TAGS_PAGE_SIZE {
                break;
            }
        }

        let mut limit = ReleaseLimit::new(self.ctx.max_releases);
        let mut output = Vec::new();
        for tag in newest_tags(tags, tag_prefix) {
            let timestamp = if self.ctx.min_api_calls {
                "1970-01-01 00:00:00".to_string()
            } else {
                let commit: ApiCommit = self.ctx.fetch_json(&tag.data)?;
                commit_timestamp(&commit.commit.committer.date)
            };

            output.push(Self::make_download_info(
                &user_repo,
                &tag.tag,
                tag.label,
                timestamp,
            ));

            if limit.record(&tag.version) {
                break;
            }
        }

        debug!("Found {} tag releases for {}", output.len(), user_repo);
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::test_support::context;

    const REPO_JSON: &str = r#"{
        "name": "bar",
        "owner": {"login": "foo"},
        "description": "",
        "homepage": null,
        "html_url": "https://github.com/foo/bar",
        "has_issues": true,
        "default_branch": "main"
    }"#;

    #[test]
    fn test_user_repo_branch() {
        let r = user_repo_branch("https://github.com/foo/bar.git").unwrap();
        assert_eq!((r.user.as_str(), r.repo.as_deref()), ("foo", Some("bar")));

        let r = user_repo_branch("https://github.com/foo/bar/tree/feature/x/").unwrap();
        assert_eq!(r.branch.as_deref(), Some("feature/x"));

        let r = user_repo_branch("https://github.com/foo").unwrap();
        assert!(r.repo.is_none());

        assert!(user_repo_branch("https://gitlab.com/foo/bar").is_none());
        assert!(is_repo_url("https://github.com/foo/bar/"));
        assert!(!is_repo_url("https://github.com/foo/"));
        assert!(is_user_url("https://github.com/foo/"));
    }

    #[test]
    fn test_repo_info() {
        let (transport, ctx) = context();
        transport.insert_json("https://api.github.com/repos/foo/bar", REPO_JSON);
        transport.insert_json(
            "https://api.github.com/repos/foo/bar/readme?ref=main",
            r#"{"path": "README.md"}"#,
        );

        let info = GitHubClient::new(&ctx)
            .repo_info("https://github.com/foo/bar")
            .unwrap()
            .unwrap();

        assert_eq!(info.name, "bar");
        assert_eq!(info.author, "foo");
        assert_eq!(info.description, "No description provided");
        assert_eq!(info.homepage.as_deref(), Some("https://github.com/foo/bar"));
        assert_eq!(
            info.readme.as_deref(),
            Some("https://raw.githubusercontent.com/foo/bar/main/README.md")
        );
        assert_eq!(info.issues.as_deref(), Some("https://github.com/foo/bar/issues"));
        assert_eq!(info.default_branch, "main");
    }

    #[test]
    fn test_repo_info_without_readme() {
        let (transport, ctx) = context();
        transport.insert_json("https://api.github.com/repos/foo/bar", REPO_JSON);

        let info = GitHubClient::new(&ctx)
            .repo_info("https://github.com/foo/bar/tree/dev")
            .unwrap()
            .unwrap();
        assert!(info.readme.is_none());
        assert_eq!(info.default_branch, "dev");
    }

    #[test]
    fn test_download_info_from_branch() {
        let (transport, ctx) = context();
        transport.insert_json(
            "https://api.github.com/repos/foo/bar/branches/main",
            r#"{"commit": {"commit": {"committer": {"date": "2021-03-04T05:06:07Z"}}}}"#,
        );

        let downloads = GitHubClient::new(&ctx)
            .download_info_from_branch("https://github.com/foo/bar", Some("main"))
            .unwrap()
            .unwrap();

        assert_eq!(
            downloads,
            vec![DownloadInfo {
                version: "2021.03.04.05.06.07".into(),
                url: "https://codeload.github.com/foo/bar/zip/main".into(),
                date: "2021-03-04 05:06:07".into(),
            }]
        );
    }

    #[test]
    fn test_download_info_from_tags() {
        let (transport, mut ctx) = context();
        ctx.max_releases = 2;
        transport.insert_json(
            "https://api.github.com/repos/foo/bar/tags?per_page=100&page=1",
            r#"[
                {"name": "v1.0.0", "commit": {"url": "https://api.github.com/repos/foo/bar/commits/a"}},
                {"name": "1.2.0", "commit": {"url": "https://api.github.com/repos/foo/bar/commits/b"}},
                {"name": "2.0.0-beta", "commit": {"url": "https://api.github.com/repos/foo/bar/commits/c"}},
                {"name": "latest", "commit": {"url": "https://api.github.com/repos/foo/bar/commits/d"}}
            ]"#,
        );
        for (sha, date) in [
            ("a", "2020-01-01T00:00:00Z"),
            ("b", "2020-06-01T00:00:00Z"),
            ("c", "2020-07-01T00:00:00Z"),
        ] {
            transport.insert_json(
                format!("https://api.github.com/repos/foo/bar/commits/{sha}"),
                &format!(r#"{{"commit": {{"committer": {{"date": "{date}"}}}}}}"#),
            );
        }

        let downloads = GitHubClient::new(&ctx)
            .download_info_from_tags("https://github.com/foo/bar/tags", None)
            .unwrap()
            .unwrap();

        let versions: Vec<_> = downloads.iter().map(|d| d.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0.0-beta", "1.2.0", "1.0.0"]);
        assert_eq!(downloads[2].url, "https://codeload.github.com/foo/bar/zip/v1.0.0");
        assert_eq!(downloads[1].date, "2020-06-01 00:00:00");
    }

    #[test]
    fn test_tags_skip_commit_lookup_with_min_api_calls() {
        let (transport, mut ctx) = context();
        ctx.min_api_calls = true;
        transport.insert_json(
            "https://api.github.com/repos/foo/bar/tags?per_page=100&page=1",
            r#"[{"name": "1.0.0", "commit": {"url": "https://api.github.com/repos/foo/bar/commits/a"}}]"#,
        );

        let downloads = GitHubClient::new(&ctx)
            .download_info("https://github.com/foo/bar/tags", None)
            .unwrap()
            .unwrap();
        assert_eq!(downloads[0].date, "1970-01-01 00:00:00");
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_user_info() {
        let (transport, ctx) = context();
        transport.insert_json(
            "https://api.github.com/users/foo/repos",
            &format!("[{REPO_JSON}]"),
        );

        let repos = GitHubClient::new(&ctx)
            .user_info("https://github.com/foo")
            .unwrap()
            .unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "bar");
        assert!(GitHubClient::new(&ctx)
            .user_info("https://github.com/foo/bar")
            .unwrap()
            .is_none());
    }
}
