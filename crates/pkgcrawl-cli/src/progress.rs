use std::{
    sync::{mpsc::Receiver, LazyLock},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::{Cyan, Red};
use pkgcrawl_events::{CrawlEvent, ReadmeStage};
use tracing::{debug, trace};

use crate::utils::{progress_enabled, Colored};

static MULTI: LazyLock<MultiProgress> = LazyLock::new(MultiProgress::new);

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

/// Owns the background thread draining crawl events.
///
/// Every sender of the channel must be dropped before [`finish`](Self::finish)
/// is called, otherwise the join never returns.
pub struct ProgressGuard {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ProgressGuard {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn repository_style() -> Option<ProgressStyle> {
    ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {prefix}{wide_msg}").ok()
}

fn repository_bar(total: usize) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new(total as u64))
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    if let Some(style) = repository_style() {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn show_failures(bar: Option<&ProgressBar>, failures: usize) {
    if let Some(pb) = bar {
        pb.set_prefix(format!("{} ", Colored(Red, format!("{failures} failed"))));
    }
}

/// Spawns the thread that turns crawl events into a progress bar and log lines.
pub fn spawn_event_handler(receiver: Receiver<CrawlEvent>) -> ProgressGuard {
    let handle = std::thread::spawn(move || {
        let mut bar: Option<ProgressBar> = None;
        let mut failures = 0usize;

        while let Ok(event) = receiver.recv() {
            match event {
                CrawlEvent::RefreshStarted {
                    repositories,
                } => {
                    if let Some(old) = bar.take() {
                        old.finish_and_clear();
                    }
                    failures = 0;
                    bar = Some(repository_bar(repositories));
                }
                CrawlEvent::RepositoryStarted {
                    source,
                    provider,
                } => {
                    if let Some(pb) = &bar {
                        pb.set_message(format!("{} {source}", Colored(Cyan, provider)));
                    }
                }
                CrawlEvent::RepositoryFinished {
                    source,
                    found,
                    failed,
                } => {
                    debug!(found, failed, "Finished {source}");
                    if let Some(pb) = &bar {
                        pb.inc(1);
                    }
                }
                CrawlEvent::RecordStored {
                    kind,
                    name,
                } => trace!("Stored {} {name}", kind.as_str()),
                CrawlEvent::SourceFailed {
                    kind,
                    source,
                    needs_review,
                    ..
                } => {
                    failures += 1;
                    debug!(needs_review, "Failed {} source {source}", kind.as_str());
                    show_failures(bar.as_ref(), failures);
                }
                CrawlEvent::RecordBroken {
                    kind,
                    name,
                    ..
                } => {
                    failures += 1;
                    debug!("Broken {} {name}", kind.as_str());
                    show_failures(bar.as_ref(), failures);
                }
                CrawlEvent::RateLimited {
                    source, ..
                } => debug!("Rate limited {source}"),
                CrawlEvent::Readme {
                    name,
                    stage,
                } => {
                    match stage {
                        ReadmeStage::Stored => trace!("Stored README for {name}"),
                        ReadmeStage::Deleted => trace!("No README for {name}"),
                    }
                }
                CrawlEvent::RecordRemoved {
                    kind,
                    name,
                } => debug!("Removed {} {name}", kind.as_str()),
                CrawlEvent::RefreshComplete {
                    packages,
                    libraries,
                    failed,
                } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                    debug!(packages, libraries, failed, "Refresh complete");
                }
            }
        }

        if let Some(pb) = bar.take() {
            pb.finish_and_clear();
        }
    });

    ProgressGuard {
        handle: Some(handle),
    }
}
