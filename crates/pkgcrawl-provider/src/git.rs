//! Providers backed directly by a code hosting API.
//!
//! A repository source yields exactly one package named after the repository.
//! A user or organization source yields one package per repository, and a
//! failure on one repository never hides the others.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use crate::{
    error::{ProviderError, Result},
    hosting::{
        bitbucket, github, gitlab, BitbucketClient, DownloadInfo, GitHubClient, GitLabClient,
        HostingClient, RepoInfo,
    },
    normalize::normalize_record,
    provider::{OutcomeCache, Provider, ProviderContext},
    record::{CrawlOutcome, PackageRecord, ReleaseRecord},
};

/// Supported code hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitHost {
    GitHub,
    GitLab,
    Bitbucket,
}

impl GitHost {
    fn client<'a>(self, ctx: &'a ProviderContext) -> Box<dyn HostingClient + 'a> {
        match self {
            GitHost::GitHub => Box::new(GitHubClient::new(ctx)),
            GitHost::GitLab => Box::new(GitLabClient::new(ctx)),
            GitHost::Bitbucket => Box::new(BitbucketClient::new(ctx)),
        }
    }

    fn repository_provider_name(self) -> &'static str {
        match self {
            GitHost::GitHub => "GitHubRepositoryProvider",
            GitHost::GitLab => "GitLabRepositoryProvider",
            GitHost::Bitbucket => "BitbucketRepositoryProvider",
        }
    }

    fn user_provider_name(self) -> &'static str {
        match self {
            GitHost::GitHub => "GitHubUserProvider",
            GitHost::GitLab => "GitLabUserProvider",
            GitHost::Bitbucket => "BitbucketUserProvider",
        }
    }

    pub fn matches_repository(self, url: &str) -> bool {
        match self {
            GitHost::GitHub => github::is_repo_url(url),
            GitHost::GitLab => gitlab::is_repo_url(url),
            GitHost::Bitbucket => bitbucket::is_repo_url(url),
        }
    }

    /// Bitbucket has no user listing.
    pub fn matches_user(self, url: &str) -> bool {
        match self {
            GitHost::GitHub => github::is_user_url(url),
            GitHost::GitLab => gitlab::is_user_url(url),
            GitHost::Bitbucket => false,
        }
    }
}

/// Builds the package record for one repository from its branch releases.
fn build_record(info: RepoInfo, downloads: Vec<DownloadInfo>, source: &str) -> PackageRecord {
    let releases = downloads
        .into_iter()
        .map(|download| {
            ReleaseRecord {
                version: download.version,
                sublime_text: "*".into(),
                platforms: vec!["*".into()],
                url: download.url,
                date: download.date,
                ..Default::default()
            }
        })
        .collect();

    let mut record = PackageRecord {
        name: info.name,
        description: Some(info.description),
        authors: vec![info.author],
        homepage: info.homepage,
        readme: info.readme,
        issues: info.issues,
        donate: info.donate,
        buy: None,
        sources: vec![source.to_string()],
        releases,
        ..Default::default()
    };
    normalize_record(&mut record);
    record
}

/// One package per hosted repository.
pub struct GitRepositoryProvider {
    host: GitHost,
    source: String,
    ctx: Arc<ProviderContext>,
    packages: OutcomeCache,
}

impl GitRepositoryProvider {
    pub fn new(host: GitHost, source: &str, ctx: Arc<ProviderContext>) -> Self {
        let source = match host {
            GitHost::GitHub => source.strip_suffix(".git").unwrap_or(source),
            _ => source,
        };
        Self {
            host,
            source: source.to_string(),
            ctx,
            packages: OutcomeCache::default(),
        }
    }

    fn crawl(&self) -> Result<PackageRecord> {
        let client = self.host.client(&self.ctx);
        let provider = self.name();

        let info = client
            .repo_info(&self.source)?
            .ok_or_else(|| {
                ProviderError::RepoInfo {
                    provider,
                    url: self.source.clone(),
                }
            })?;

        let downloads = client
            .download_info_from_branch(&self.source, Some(&info.default_branch))?
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                ProviderError::DownloadInfo {
                    provider,
                    url: self.source.clone(),
                }
            })?;

        Ok(build_record(info, downloads, &self.source))
    }
}

impl Provider for GitRepositoryProvider {
    fn name(&self) -> &'static str {
        self.host.repository_provider_name()
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn list_packages(&self, invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome> {
        if invalid_sources.contains(&self.source) {
            return Vec::new();
        }

        self.packages.get_or_compute(|| {
            match self.crawl() {
                Ok(record) => {
                    debug!("{} found {} at {}", self.name(), record.name, self.source);
                    vec![CrawlOutcome::Found(record)]
                }
                Err(err) => {
                    warn!("{} failed for {}: {}", self.name(), self.source, err);
                    vec![CrawlOutcome::source_failed(&self.source, err)]
                }
            }
        })
    }
}

/// One package per repository of a user or organization.
pub struct GitUserProvider {
    host: GitHost,
    source: String,
    ctx: Arc<ProviderContext>,
    packages: OutcomeCache,
}

impl GitUserProvider {
    pub fn new(host: GitHost, source: &str, ctx: Arc<ProviderContext>) -> Self {
        Self {
            host,
            source: source.to_string(),
            ctx,
            packages: OutcomeCache::default(),
        }
    }

    fn crawl(&self, invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome> {
        let client = self.host.client(&self.ctx);
        let provider = self.name();

        let repos = match client.user_info(&self.source) {
            Ok(Some(repos)) if !repos.is_empty() => repos,
            Ok(_) => {
                return vec![CrawlOutcome::source_failed(
                    &self.source,
                    ProviderError::UserInfo {
                        provider,
                        url: self.source.clone(),
                    },
                )];
            }
            Err(err) => {
                warn!("{} failed for {}: {}", provider, self.source, err);
                return vec![CrawlOutcome::source_failed(&self.source, err)];
            }
        };

        let mut outcomes = Vec::with_capacity(repos.len());
        for info in repos {
            let repo_url = client.repo_url(&info.author, &info.name);
            if invalid_sources.contains(&repo_url) {
                continue;
            }

            let downloads = client
                .download_info_from_branch(&repo_url, Some(&info.default_branch))
                .and_then(|downloads| {
                    downloads.filter(|d| !d.is_empty()).ok_or_else(|| {
                        ProviderError::DownloadInfo {
                            provider,
                            url: self.source.clone(),
                        }
                    })
                });

            match downloads {
                Ok(downloads) => {
                    outcomes.push(CrawlOutcome::Found(build_record(
                        info,
                        downloads,
                        &self.source,
                    )));
                }
                Err(err) => {
                    warn!("{} failed for {}: {}", provider, repo_url, err);
                    outcomes.push(CrawlOutcome::source_failed(repo_url, err));
                }
            }
        }
        outcomes
    }
}

impl Provider for GitUserProvider {
    fn name(&self) -> &'static str {
        self.host.user_provider_name()
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn list_packages(&self, invalid_sources: &HashSet<String>) -> Vec<CrawlOutcome> {
        if invalid_sources.contains(&self.source) {
            return Vec::new();
        }
        self.packages.get_or_compute(|| self.crawl(invalid_sources))
    }
}
