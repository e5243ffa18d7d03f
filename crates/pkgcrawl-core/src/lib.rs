//! Catalog maintenance for pkgcrawl.
//!
//! [`RefreshOrchestrator`] crawls every repository of a channel and writes
//! the outcomes to a [`Catalog`]; [`RemovalDetector`] is a separate pass that
//! flags records whose sources have left the channel.

pub mod catalog;
pub mod error;
pub mod orchestrator;
pub mod readme;
pub mod removal;
pub mod scrub;
pub mod selection;
pub mod session;
pub mod store;

pub use catalog::{Catalog, CatalogEntry, CatalogStatus, MissingTarget, StoredReadme};
pub use error::{CoreError, Result};
pub use orchestrator::{RefreshOrchestrator, RefreshSummary};
pub use readme::{PlainRenderer, ReadmeRenderer};
pub use removal::{RemovalDetector, RemovalSummary};
pub use scrub::SecretScrubber;
pub use selection::{select, select_invalid_sources, InvalidSources, Selection};
pub use session::CrawlSession;
pub use store::JsonCatalog;
