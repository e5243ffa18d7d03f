//! Package providers for pkgcrawl.
//!
//! A provider turns one source URL into normalized package and library
//! records. Sources are either code hosting URLs (GitHub, GitLab, Bitbucket
//! repositories or users) or JSON repository manifests, and a channel
//! manifest ties a list of sources together.
//!
//! # Example
//!
//! ```no_run
//! use std::{collections::HashSet, sync::Arc};
//!
//! use pkgcrawl_fetch::Fetcher;
//! use pkgcrawl_provider::{ChannelWalker, ProviderContext, ProviderRegistry};
//!
//! fn list(fetcher: Fetcher) -> pkgcrawl_provider::Result<()> {
//!     let ctx = Arc::new(ProviderContext::new(Arc::new(fetcher)));
//!     let registry = Arc::new(ProviderRegistry::new(ctx));
//!     let channel = ChannelWalker::new("https://example.com/channel.json", registry.clone());
//!
//!     for repository in channel.repositories()? {
//!         let provider = registry.provider_for(&repository);
//!         for outcome in provider.list_packages(&HashSet::new()) {
//!             if let Some(record) = outcome.found() {
//!                 println!("{} {}", record.name, record.releases.len());
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod git;
pub mod hosting;
pub mod loader;
pub mod normalize;
pub mod provider;
pub mod readme;
pub mod record;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod version;

pub use channel::ChannelWalker;
pub use error::{ProviderError, Result};
pub use git::{GitHost, GitRepositoryProvider, GitUserProvider};
pub use provider::{Provider, ProviderContext};
pub use readme::{ReadmeClient, ReadmeFormat, ReadmeInfo};
pub use record::{CrawlOutcome, PackageRecord, RecordKind, ReleaseRecord};
pub use registry::{ProviderKind, ProviderRegistry};
pub use repository::JsonRepositoryProvider;
pub use schema::SchemaVersion;
