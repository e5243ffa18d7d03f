/// Which catalog table an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Package,
    Library,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Package => "package",
            EntryKind::Library => "library",
        }
    }
}

/// All event types emitted during a crawl or removal pass.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// The channel was resolved and the run is about to dispatch repositories.
    RefreshStarted { repositories: usize },
    /// A worker picked up a repository source.
    RepositoryStarted { source: String, provider: &'static str },
    /// A repository source has been fully processed.
    RepositoryFinished {
        source: String,
        found: usize,
        failed: usize,
    },
    /// A record was stored and marked active.
    RecordStored { kind: EntryKind, name: String },
    /// A whole source could not be crawled.
    SourceFailed {
        kind: EntryKind,
        source: String,
        error: String,
        needs_review: bool,
    },
    /// A single record could not be built.
    RecordBroken {
        kind: EntryKind,
        name: String,
        error: String,
        needs_review: bool,
    },
    /// A source was throttled and left untouched.
    RateLimited { source: String, message: String },
    /// README stage for a stored record.
    Readme { name: String, stage: ReadmeStage },
    /// The removal detector flagged a record.
    RecordRemoved { kind: EntryKind, name: String },
    /// Run finished.
    RefreshComplete {
        packages: usize,
        libraries: usize,
        failed: usize,
    },
}

/// README handling stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadmeStage {
    /// README fetched, rendered and stored.
    Stored,
    /// Record has no README, or it could not be fetched; any stored copy was dropped.
    Deleted,
}
