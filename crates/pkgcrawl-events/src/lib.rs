mod event;
mod sink;

use std::sync::Arc;

pub use event::*;
pub use sink::*;

/// Shared handle to an event sink.
pub type EventSinkHandle = Arc<dyn EventSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink() {
        let sink = NullSink;
        sink.emit(CrawlEvent::RateLimited {
            source: "https://api.github.com/repos/foo/bar".to_string(),
            message: "limit of 60 reached".to_string(),
        });
    }

    #[test]
    fn test_channel_sink() {
        let (sink, rx) = ChannelSink::new();
        sink.emit(CrawlEvent::RepositoryStarted {
            source: "https://example.com/repository.json".to_string(),
            provider: "JsonRepositoryProvider",
        });
        sink.emit(CrawlEvent::RecordStored {
            kind: EntryKind::Package,
            name: "Foo".to_string(),
        });
        sink.emit(CrawlEvent::RepositoryFinished {
            source: "https://example.com/repository.json".to_string(),
            found: 1,
            failed: 0,
        });

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], CrawlEvent::RepositoryStarted { .. }));
        assert!(matches!(
            &events[1],
            CrawlEvent::RecordStored {
                kind: EntryKind::Package,
                ..
            }
        ));
        assert!(matches!(
            &events[2],
            CrawlEvent::RepositoryFinished {
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_channel_sink_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(CrawlEvent::RecordStored {
            kind: EntryKind::Library,
            name: "orphaned".to_string(),
        });
    }

    #[test]
    fn test_collector_sink() {
        let sink = CollectorSink::default();
        assert!(sink.is_empty());

        sink.emit(CrawlEvent::SourceFailed {
            kind: EntryKind::Library,
            source: "https://example.com/gone.json".to_string(),
            error: "HTTP error 404 downloading https://example.com/gone.json.".to_string(),
            needs_review: true,
        });
        sink.emit(CrawlEvent::Readme {
            name: "Foo".to_string(),
            stage: ReadmeStage::Deleted,
        });

        assert_eq!(sink.len(), 2);
        let events = sink.events();
        assert!(matches!(
            &events[0],
            CrawlEvent::SourceFailed {
                needs_review: true,
                ..
            }
        ));
        assert!(matches!(
            &events[1],
            CrawlEvent::Readme {
                stage: ReadmeStage::Deleted,
                ..
            }
        ));
    }

    #[test]
    fn test_event_sink_handle() {
        let sink: EventSinkHandle = Arc::new(NullSink);
        sink.emit(CrawlEvent::RefreshStarted {
            repositories: 10,
        });

        let collector = Arc::new(CollectorSink::default());
        let sink: EventSinkHandle = collector.clone();
        sink.emit(CrawlEvent::RecordRemoved {
            kind: EntryKind::Package,
            name: "Old".to_string(),
        });
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_event_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NullSink>();
        assert_send_sync::<ChannelSink>();
        assert_send_sync::<CollectorSink>();
    }

    #[test]
    fn test_entry_kind_str() {
        assert_eq!(EntryKind::Package.as_str(), "package");
        assert_eq!(EntryKind::Library.as_str(), "library");
    }
}
