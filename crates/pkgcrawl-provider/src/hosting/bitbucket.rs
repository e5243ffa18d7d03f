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
        r"^https?://bitbucket\.org/([^/#?]+)(?:/([^/#?]+?)(?:\.git|/src/([^#?]*[^/#?])/?|/?)|/?)$",
    )
    .expect("valid bitbucket repo regex")
});

static TAGS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://bitbucket\.org/([^/#?]+/[^/#?]+)/?(?:#tags)?$")
        .expect("valid bitbucket tags regex")
});

const API_ROOT: &str = "https://api.bitbucket.org/2.0/repositories";

/// Upper bound on followed `next` links of a paginated listing.
const MAX_PAGES: usize = 50;

const README_FILENAMES: [&str; 9] = [
    "readme",
    "readme.txt",
    "readme.md",
    "readme.mkd",
    "readme.mdown",
    "readme.markdown",
    "readme.textile",
    "readme.creole",
    "readme.rst",
];

#[derive(Deserialize)]
struct ApiBranchName {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct ApiOwner {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    #[serde(default, deserialize_with = "empty_is_none")]
    description: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    website: Option<String>,
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    mainbranch: Option<ApiBranchName>,
    owner: ApiOwner,
}

impl ApiRepo {
    fn main_branch(&self) -> String {
        self.mainbranch
            .as_ref()
            .and_then(|b| b.name.clone())
            .unwrap_or_else(|| "master".to_string())
    }
}

#[derive(Deserialize)]
struct ApiTarget {
    date: String,
}

#[derive(Deserialize)]
struct ApiRef {
    name: String,
    target: ApiTarget,
}

#[derive(Deserialize)]
struct ApiPage<T> {
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct ApiEntry {
    path: String,
}

/// Parses `https://bitbucket.org/{user}[/{repo}[.git|/src/{branch}]]`.
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

pub struct BitbucketClient<'a> {
    ctx: &'a ProviderContext,
}

impl<'a> BitbucketClient<'a> {
    pub fn new(ctx: &'a ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_url(user_repo: &str, suffix: &str) -> String {
        format!("{API_ROOT}/{user_repo}{suffix}")
    }

    fn make_download_info(user_repo: &str, ref_name: &str, version: String, date: String) -> DownloadInfo {
        DownloadInfo {
            version,
            url: format!("https://bitbucket.org/{user_repo}/get/{ref_name}.zip"),
            date,
        }
    }

    /// Fetches every page of a paginated listing.
    fn fetch_pages<T: serde::de::DeserializeOwned>(&self, first: String) -> Result<Vec<T>> {
        let mut values = Vec::new();
        let mut next = Some(first);
        for _ in 0..MAX_PAGES {
            let Some(url) = next.take() else {
                break;
            };
            let page: ApiPage<T> = self.ctx.fetch_json(&url)?;
            values.extend(page.values);
            next = page.next;
        }
        Ok(values)
    }

    /// Finds a readme in the root directory listing of `branch`.
    fn readme_url(&self, user_repo: &str, branch: &str) -> Result<Option<String>> {
        let mut next = Some(Self::api_url(user_repo, &format!("/src/{branch}/?pagelen=100")));
        for _ in 0..MAX_PAGES {
            let Some(url) = next.take() else {
                break;
            };
            let page: ApiPage<ApiEntry> = match self.ctx.fetch_json(&url) {
                Ok(page) => page,
                Err(ProviderError::Fetch(FetchError::NotFound { .. })) => return Ok(None),
                Err(err) => return Err(err),
            };
            if let Some(entry) = page
                .values
                .iter()
                .find(|e| README_FILENAMES.contains(&e.path.to_lowercase().as_str()))
            {
                return Ok(Some(format!(
                    "https://bitbucket.org/{user_repo}/raw/{branch}/{}",
                    entry.path
                )));
            }
            next = page.next;
        }
        Ok(None)
    }
}

impl HostingClient for BitbucketClient<'_> {
    fn name(&self) -> &'static str {
        "BitbucketClient"
    }

    fn repo_url(&self, user: &str, repo: &str) -> String {
        format!(
            "https://bitbucket.org/{}/{}",
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
        let branch = repo_ref.branch.unwrap_or_else(|| repo.main_branch());

        let readme = if self.ctx.min_api_calls {
            None
        } else {
            self.readme_url(&user_repo, &branch)?
        };
        let issues = repo
            .has_issues
            .then(|| format!("https://bitbucket.org/{user_repo}/issues"));

        Ok(Some(RepoInfo {
            name: repo.name,
            description: description_or_default(repo.description),
            homepage: repo.website.or_else(|| Some(url.to_string())),
            author: repo
                .owner
                .nickname
                .or(repo.owner.username)
                .unwrap_or_default(),
            readme,
            issues,
            donate: None,
            default_branch: branch,
        }))
    }

    fn user_info(&self, _url: &str) -> Result<Option<Vec<RepoInfo>>> {
        Ok(None)
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
                repo.main_branch()
            }
        };

        let branch_url = Self::api_url(&user_repo, &format!("/refs/branches/{branch}"));
        let info: ApiRef = self.ctx.fetch_json(&branch_url)?;
        let timestamp = commit_timestamp(&info.target.date);

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

        let refs: Vec<ApiRef> =
            self.fetch_pages(Self::api_url(&user_repo, "/refs/tags?pagelen=100"))?;
        let tags = refs
            .into_iter()
            .map(|r| (r.name, commit_timestamp(&r.target.date)));

        let mut limit = ReleaseLimit::new(self.ctx.max_releases);
        let mut output = Vec::new();
        for tag in newest_tags(tags, tag_prefix) {
            output.push(Self::make_download_info(
                &user_repo, &tag.tag, tag.label, tag.data,
            ));
            if limit.record(&tag.version) {
                break;
            }
        }

        debug!("Found {} tag releases for {}", output.len(), user_repo);
        Ok(Some(output))
    }
}
