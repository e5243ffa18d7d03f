//! Maps a source URL to the provider that understands it.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use tracing::trace;

use crate::{
    git::{GitHost, GitRepositoryProvider, GitUserProvider},
    provider::{Provider, ProviderContext},
    repository::JsonRepositoryProvider,
};

/// Provider types, in match order. The JSON repository accepts anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    BitbucketRepository,
    GitHubRepository,
    GitHubUser,
    GitLabRepository,
    GitLabUser,
    JsonRepository,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::BitbucketRepository,
        ProviderKind::GitHubRepository,
        ProviderKind::GitHubUser,
        ProviderKind::GitLabRepository,
        ProviderKind::GitLabUser,
        ProviderKind::JsonRepository,
    ];

    /// First kind whose pattern matches `source`.
    pub fn detect(source: &str) -> ProviderKind {
        Self::ALL
            .into_iter()
            .find(|kind| kind.matches(source))
            .unwrap_or(ProviderKind::JsonRepository)
    }

    pub fn matches(self, source: &str) -> bool {
        match self {
            ProviderKind::BitbucketRepository => GitHost::Bitbucket.matches_repository(source),
            ProviderKind::GitHubRepository => GitHost::GitHub.matches_repository(source),
            ProviderKind::GitHubUser => GitHost::GitHub.matches_user(source),
            ProviderKind::GitLabRepository => GitHost::GitLab.matches_repository(source),
            ProviderKind::GitLabUser => GitHost::GitLab.matches_user(source),
            ProviderKind::JsonRepository => true,
        }
    }

    pub fn build(self, source: &str, ctx: Arc<ProviderContext>) -> Arc<dyn Provider> {
        match self {
            ProviderKind::BitbucketRepository => {
                Arc::new(GitRepositoryProvider::new(GitHost::Bitbucket, source, ctx))
            }
            ProviderKind::GitHubRepository => {
                Arc::new(GitRepositoryProvider::new(GitHost::GitHub, source, ctx))
            }
            ProviderKind::GitHubUser => Arc::new(GitUserProvider::new(GitHost::GitHub, source, ctx)),
            ProviderKind::GitLabRepository => {
                Arc::new(GitRepositoryProvider::new(GitHost::GitLab, source, ctx))
            }
            ProviderKind::GitLabUser => Arc::new(GitUserProvider::new(GitHost::GitLab, source, ctx)),
            ProviderKind::JsonRepository => Arc::new(JsonRepositoryProvider::new(source, ctx)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::BitbucketRepository => "bitbucket-repository",
            ProviderKind::GitHubRepository => "github-repository",
            ProviderKind::GitHubUser => "github-user",
            ProviderKind::GitLabRepository => "gitlab-repository",
            ProviderKind::GitLabUser => "gitlab-user",
            ProviderKind::JsonRepository => "json-repository",
        };
        write!(f, "{name}")
    }
}

/// Hands out one provider per source for the lifetime of a run.
///
/// Providers memoize their results, so asking twice for the same source
/// never triggers a second crawl.
pub struct ProviderRegistry {
    ctx: Arc<ProviderContext>,
    resolved: Mutex<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new(ctx: Arc<ProviderContext>) -> Self {
        Self {
            ctx,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<ProviderContext> {
        &self.ctx
    }

    pub fn provider_for(&self, source: &str) -> Arc<dyn Provider> {
        let mut resolved = self
            .resolved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        resolved
            .entry(source.to_string())
            .or_insert_with(|| {
                let kind = ProviderKind::detect(source);
                trace!("Using {} provider for {}", kind, source);
                kind.build(source, self.ctx.clone())
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::test_support::context;

    #[test]
    fn test_detect_order() {
        let cases = [
            ("https://bitbucket.org/foo/bar", ProviderKind::BitbucketRepository),
            ("https://github.com/foo/bar", ProviderKind::GitHubRepository),
            ("https://github.com/foo/bar/tree/dev", ProviderKind::GitHubRepository),
            ("https://github.com/foo", ProviderKind::GitHubUser),
            ("https://gitlab.com/foo/bar", ProviderKind::GitLabRepository),
            ("https://gitlab.com/foo", ProviderKind::GitLabUser),
            ("https://example.com/repository.json", ProviderKind::JsonRepository),
            ("/srv/channel/repository.json", ProviderKind::JsonRepository),
        ];

        for (source, expected) in cases {
            assert_eq!(ProviderKind::detect(source), expected, "{source}");
        }
    }

    #[test]
    fn test_provider_is_reused() {
        let (_transport, ctx) = context();
        let registry = ProviderRegistry::new(Arc::new(ctx));

        let first = registry.provider_for("https://github.com/foo/bar");
        let second = registry.provider_for("https://github.com/foo/bar");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "GitHubRepositoryProvider");

        let other = registry.provider_for("https://example.com/repository.json");
        assert_eq!(other.name(), "JsonRepositoryProvider");
    }
}
