//! Clients for the code hosting APIs that back git repository sources.
//!
//! Each client understands the URL forms of one host and turns repository
//! metadata, branches and tags into [`RepoInfo`] and [`DownloadInfo`] values.
//! URL-shape mismatches return `Ok(None)`; only I/O and decode failures are
//! errors.

use serde::{Deserialize, Deserializer};

use crate::{error::Result, provider::ProviderContext};

pub mod bitbucket;
pub mod github;
pub mod gitlab;

pub use bitbucket::BitbucketClient;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Owner, repository and branch parsed out of a hosting URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoRef {
    pub user: String,
    pub repo: Option<String>,
    pub branch: Option<String>,
}

impl RepoRef {
    pub fn user_repo(&self) -> Option<String> {
        self.repo.as_ref().map(|repo| format!("{}/{}", self.user, repo))
    }
}

/// General information about one repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoInfo {
    pub name: String,
    pub description: String,
    pub homepage: Option<String>,
    pub author: String,
    pub readme: Option<String>,
    pub issues: Option<String>,
    pub donate: Option<String>,
    pub default_branch: String,
}

/// One downloadable archive of a repository ref.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadInfo {
    pub version: String,
    pub url: String,
    pub date: String,
}

pub trait HostingClient {
    /// Name used in error messages.
    fn name(&self) -> &'static str;

    /// Canonical web URL of a repository.
    fn repo_url(&self, user: &str, repo: &str) -> String;

    fn repo_info(&self, url: &str) -> Result<Option<RepoInfo>>;

    /// Repositories of a user or organization.
    fn user_info(&self, url: &str) -> Result<Option<Vec<RepoInfo>>>;

    /// One release built from the newest commit of a branch.
    ///
    /// The branch comes from the URL, then `default_branch`, then the API.
    fn download_info_from_branch(
        &self,
        url: &str,
        default_branch: Option<&str>,
    ) -> Result<Option<Vec<DownloadInfo>>>;

    /// Releases built from tags that parse as versions, newest first.
    fn download_info_from_tags(
        &self,
        url: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Option<Vec<DownloadInfo>>>;

    /// Branch releases for repository and branch URLs, otherwise tag releases.
    fn download_info(&self, url: &str, tag_prefix: Option<&str>) -> Result<Option<Vec<DownloadInfo>>> {
        match self.download_info_from_branch(url, None)? {
            Some(output) => Ok(Some(output)),
            None => self.download_info_from_tags(url, tag_prefix),
        }
    }
}

/// Picks the client for the host of `url`, if it is a supported host.
pub fn client_for<'a>(url: &str, ctx: &'a ProviderContext) -> Option<Box<dyn HostingClient + 'a>> {
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?
        .split(['/', '?', '#'])
        .next()?;

    match host {
        "github.com" => Some(Box::new(GitHubClient::new(ctx))),
        "gitlab.com" => Some(Box::new(GitLabClient::new(ctx))),
        "bitbucket.org" => Some(Box::new(BitbucketClient::new(ctx))),
        _ => None,
    }
}

/// Treats empty strings the same as a missing value.
pub(crate) fn empty_is_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.trim().is_empty()))
}

pub(crate) fn description_or_default(description: Option<String>) -> String {
    description.unwrap_or_else(|| "No description provided".to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_for() {
        let (_, ctx) = test_support::context();
        assert_eq!(
            client_for("https://github.com/foo/bar", &ctx).map(|c| c.name()),
            Some("GitHubClient")
        );
        assert_eq!(
            client_for("https://gitlab.com/foo/bar/-/tree/main", &ctx).map(|c| c.name()),
            Some("GitLabClient")
        );
        assert_eq!(
            client_for("https://bitbucket.org/foo/bar", &ctx).map(|c| c.name()),
            Some("BitbucketClient")
        );
        assert!(client_for("https://example.com/foo/bar", &ctx).is_none());
        assert!(client_for("/local/repo.json", &ctx).is_none());
    }
}
