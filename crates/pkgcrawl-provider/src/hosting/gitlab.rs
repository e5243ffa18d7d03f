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
        r"^https?://gitlab\.com/([^/#?]+)(?:/([^/#?]+?)(?:\.git|/-/tree/([^#?]*[^/#?])/?|/?)|/?)$",
    )
    .expect("valid gitlab repo regex")
});

static USER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://gitlab\.com/([^/#?]+)/?$").expect("valid gitlab user regex")
});

static TAGS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://gitlab\.com/([^/#?]+)/([^/#?]+)(?:/-/tags)?/?$")
        .expect("valid gitlab tags regex")
});

const API_ROOT: &str = "https://gitlab.com/api/v4";
const TAGS_PAGE_SIZE: usize = 100;
const MAX_TAG_PAGES: usize = 10;

#[derive(Deserialize)]
struct ApiOwner {
    username: String,
}

#[derive(Deserialize)]
struct ApiNamespace {
    name: String,
}

#[derive(Deserialize, Default)]
struct ApiLinks {
    #[serde(default)]
    issues: Option<String>,
}

#[derive(Deserialize)]
struct ApiProject {
    name: String,
    #[serde(default)]
    owner: Option<ApiOwner>,
    #[serde(default)]
    namespace: Option<ApiNamespace>,
    #[serde(default, deserialize_with = "empty_is_none")]
    description: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    web_url: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    readme_url: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default, rename = "_links")]
    links: Option<ApiLinks>,
}

#[derive(Deserialize)]
struct ApiCommit {
    committed_date: String,
}

#[derive(Deserialize)]
struct ApiRef {
    name: String,
    commit: ApiCommit,
}

#[derive(Deserialize)]
struct ApiId {
    id: u64,
}

/// Parses `https://gitlab.com/{user}[/{repo}[.git|/-/tree/{branch}]]`.
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

/// Whether a user lookup found a user or fell back to a group.
enum Owner {
    User(u64),
    Group(u64),
}

pub struct GitLabClient<'a> {
    ctx: &'a ProviderContext,
}

impl<'a> GitLabClient<'a> {
    pub fn new(ctx: &'a ProviderContext) -> Self {
        Self { ctx }
    }

    fn project_id(user: &str, repo: &str) -> String {
        format!(
            "{}%2F{}",
            utf8_percent_encode(user, NON_ALPHANUMERIC),
            utf8_percent_encode(repo, NON_ALPHANUMERIC)
        )
    }

    fn api_url(project_id: &str, suffix: &str) -> String {
        format!("{API_ROOT}/projects/{project_id}{suffix}")
    }

    fn extract_repo_info(branch: &str, project: ApiProject) -> RepoInfo {
        let author = match (project.owner, project.namespace) {
            (Some(owner), _) => owner.username,
            (None, Some(namespace)) => namespace.name,
            (None, None) => String::new(),
        };
        let user_repo = format!("{author}/{}", project.name);

        let readme = project.readme_url.as_deref().and_then(|url| {
            url.rsplit('/')
                .next()
                .filter(|file| !file.is_empty())
                .map(|file| format!("https://gitlab.com/{user_repo}/-/raw/{branch}/{file}"))
        });

        RepoInfo {
            name: project.name,
            description: description_or_default(project.description),
            homepage: project.web_url,
            author,
            readme,
            issues: project.links.and_then(|links| links.issues),
            donate: None,
            default_branch: branch.to_string(),
        }
    }

    fn make_download_info(user: &str, repo: &str, ref_name: &str, version: String, date: String) -> DownloadInfo {
        DownloadInfo {
            version,
            url: format!("https://gitlab.com/{user}/{repo}/-/archive/{ref_name}/{repo}-{ref_name}.zip"),
            date,
        }
    }

    /// Looks the name up as a user first, then as a group.
    fn find_owner(&self, name: &str) -> Result<Option<Owner>> {
        let name = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();

        let users = self.lookup_ids(&format!("{API_ROOT}/users?username={name}"))?;
        if let Some(user) = users.first() {
            return Ok(Some(Owner::User(user.id)));
        }

        let groups = self.lookup_ids(&format!("{API_ROOT}/groups?search={name}"))?;
        Ok(groups.first().map(|group| Owner::Group(group.id)))
    }

    /// A 404 on a lookup endpoint is an empty result.
    fn lookup_ids(&self, url: &str) -> Result<Vec<ApiId>> {
        match self.ctx.fetch_json::<Vec<ApiId>>(url) {
            Ok(ids) => Ok(ids),
            Err(ProviderError::Fetch(FetchError::NotFound { .. })) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

impl HostingClient for GitLabClient<'_> {
    fn name(&self) -> &'static str {
        "GitLabClient"
    }

    fn repo_url(&self, user: &str, repo: &str) -> String {
        format!(
            "https://gitlab.com/{}/{}",
            utf8_percent_encode(user, NON_ALPHANUMERIC),
            utf8_percent_encode(repo, NON_ALPHANUMERIC)
        )
    }

    fn repo_info(&self, url: &str) -> Result<Option<RepoInfo>> {
        let Some(RepoRef {
            user,
            repo: Some(repo),
            branch,
        }) = user_repo_branch(url)
        else {
            return Ok(None);
        };

        let project: ApiProject = self
            .ctx
            .fetch_json(&Self::api_url(&Self::project_id(&user, &repo), ""))?;
        let branch = branch
            .or_else(|| project.default_branch.clone())
            .unwrap_or_else(|| "master".to_string());

        Ok(Some(Self::extract_repo_info(&branch, project)))
    }

    fn user_info(&self, url: &str) -> Result<Option<Vec<RepoInfo>>> {
        let Some(caps) = USER_URL.captures(url) else {
            return Ok(None);
        };

        let api_url = match self.find_owner(&caps[1])? {
            Some(Owner::User(id)) => format!("{API_ROOT}/users/{id}/projects"),
            Some(Owner::Group(id)) => format!("{API_ROOT}/groups/{id}/projects"),
            None => return Ok(None),
        };

        let projects: Vec<ApiProject> = self.ctx.fetch_json(&api_url)?;
        Ok(Some(
            projects
                .into_iter()
                .map(|project| {
                    let branch = project
                        .default_branch
                        .clone()
                        .unwrap_or_else(|| "master".to_string());
                    Self::extract_repo_info(&branch, project)
                })
                .collect(),
        ))
    }

    fn download_info_from_branch(
        &self,
        url: &str,
        default_branch: Option<&str>,
    ) -> Result<Option<Vec<DownloadInfo>>> {
        let Some(RepoRef {
            user,
            repo: Some(repo),
            branch,
        }) = user_repo_branch(url)
        else {
            return Ok(None);
        };
        let project_id = Self::project_id(&user, &repo);

        let branch = match (branch, default_branch) {
            (Some(branch), _) => branch,
            (None, Some(branch)) => branch.to_string(),
            (None, None) => {
                let project: ApiProject = self.ctx.fetch_json(&Self::api_url(&project_id, ""))?;
                project
                    .default_branch
                    .unwrap_or_else(|| "master".to_string())
            }
        };

        let branch_url = Self::api_url(&project_id, &format!("/repository/branches/{branch}"));
        let info: ApiRef = self.ctx.fetch_json(&branch_url)?;
        let timestamp = commit_timestamp(&info.commit.committed_date);

        Ok(Some(vec![Self::make_download_info(
            &user,
            &repo,
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
        let (user, repo) = (caps[1].to_string(), caps[2].to_string());
        let project_id = Self::project_id(&user, &repo);

        let mut tags = Vec::new();
        for page in 1..=MAX_TAG_PAGES {
            let tags_url = Self::api_url(
                &project_id,
                &format!("/repository/tags?per_page={TAGS_PAGE_SIZE}&page={page}"),
            );
            let page_tags: Vec<ApiRef> = self.ctx.fetch_json(&tags_url)?;
            let count = page_tags.len();
            tags.extend(
                page_tags
                    .into_iter()
                    .map(|t| (t.name, commit_timestamp(&t.commit.committed_date))),
            );
            if count < TAGS_PAGE_SIZE {
                break;
            }
        }

        let mut limit = ReleaseLimit::new(self.ctx.max_releases);
        let mut output = Vec::new();
        for tag in newest_tags(tags, tag_prefix) {
            output.push(Self::make_download_info(
                &user, &repo, &tag.tag, tag.label, tag.data,
            ));
            if limit.record(&tag.version) {
                break;
            }
        }

        debug!("Found {} tag releases for {}/{}", output.len(), user, repo);
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::test_support::context;

    const PROJECT_JSON: &str = r#"{
        "name": "bar",
        "owner": {"username": "foo"},
        "description": "A package",
        "web_url": "https://gitlab.com/foo/bar",
        "readme_url": "https://gitlab.com/foo/bar/-/blob/main/README.md",
        "default_branch": "main",
        "_links": {"issues": "https://gitlab.com/api/v4/projects/1/issues"}
    }"#;

    #[test]
    fn test_user_repo_branch() {
        let r = user_repo_branch("https://gitlab.com/foo/bar/-/tree/release/2").unwrap();
        assert_eq!(r.repo.as_deref(), Some("bar"));
        assert_eq!(r.branch.as_deref(), Some("release/2"));
        assert!(is_repo_url("https://gitlab.com/foo/bar.git"));
        assert!(is_user_url("https://gitlab.com/foo"));
        assert!(!is_repo_url("https://github.com/foo/bar"));
    }

    #[test]
    fn test_repo_info() {
        let (transport, ctx) = context();
        transport.insert_json("https://gitlab.com/api/v4/projects/foo%2Fbar", PROJECT_JSON);

        let info = GitLabClient::new(&ctx)
            .repo_info("https://gitlab.com/foo/bar")
            .unwrap()
            .unwrap();
        assert_eq!(info.author, "foo");
        assert_eq!(info.description, "A package");
        assert_eq!(
            info.readme.as_deref(),
            Some("https://gitlab.com/foo/bar/-/raw/main/README.md")
        );
        assert_eq!(
            info.issues.as_deref(),
            Some("https://gitlab.com/api/v4/projects/1/issues")
        );
    }

    #[test]
    fn test_download_info_from_branch() {
        let (transport, ctx) = context();
        transport.insert_json("https://gitlab.com/api/v4/projects/foo%2Fbar", PROJECT_JSON);
        transport.insert_json(
            "https://gitlab.com/api/v4/projects/foo%2Fbar/repository/branches/main",
            r#"{"name": "main", "commit": {"committed_date": "2022-01-02T03:04:05.000+00:00"}}"#,
        );

        let downloads = GitLabClient::new(&ctx)
            .download_info_from_branch("https://gitlab.com/foo/bar", None)
            .unwrap()
            .unwrap();
        assert_eq!(downloads[0].version, "2022.01.02.03.04.05");
        assert_eq!(
            downloads[0].url,
            "https://gitlab.com/foo/bar/-/archive/main/bar-main.zip"
        );
    }

    #[test]
    fn test_download_info_from_tags_with_prefix() {
        let (transport, ctx) = context();
        transport.insert_json(
            "https://gitlab.com/api/v4/projects/foo%2Fbar/repository/tags?per_page=100&page=1",
            r#"[
                {"name": "st4-1.1.0", "commit": {"committed_date": "2022-02-01T00:00:00Z"}},
                {"name": "st4-1.0.0", "commit": {"committed_date": "2022-01-01T00:00:00Z"}},
                {"name": "2.0.0", "commit": {"committed_date": "2022-03-01T00:00:00Z"}}
            ]"#,
        );

        let downloads = GitLabClient::new(&ctx)
            .download_info_from_tags("https://gitlab.com/foo/bar/-/tags", Some("st4-"))
            .unwrap()
            .unwrap();
        let versions: Vec<_> = downloads.iter().map(|d| d.version.as_str()).collect();
        assert_eq!(versions, vec!["1.1.0", "1.0.0"]);
        assert_eq!(
            downloads[0].url,
            "https://gitlab.com/foo/bar/-/archive/st4-1.1.0/bar-st4-1.1.0.zip"
        );
    }

    #[test]
    fn test_user_info_falls_back_to_group() {
        let (transport, ctx) = context();
        transport.insert_json("https://gitlab.com/api/v4/users?username=acme", "[]");
        transport.insert_json("https://gitlab.com/api/v4/groups?search=acme", r#"[{"id": 42}]"#);
        transport.insert_json(
            "https://gitlab.com/api/v4/groups/42/projects",
            &format!("[{PROJECT_JSON}]"),
        );

        let repos = GitLabClient::new(&ctx)
            .user_info("https://gitlab.com/acme")
            .unwrap()
            .unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "bar");
    }

    #[test]
    fn test_user_info_unknown_owner() {
        let (_, ctx) = context();
        assert!(GitLabClient::new(&ctx)
            .user_info("https://gitlab.com/nobody")
            .unwrap()
            .is_none());
    }
}
