use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use cli::{Args, CacheAction, Commands, ConfigAction};
use logging::setup_logging;
use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use pkgcrawl_config::{
    config::{default_config_path, generate_default_config, Config},
    error::ConfigError,
};
use pkgcrawl_core::{select, CrawlSession, RefreshSummary, RemovalSummary, Result};
use pkgcrawl_events::{ChannelSink, EventSinkHandle, NullSink};
use pkgcrawl_fetch::{FetchError, ResponseCache};
use pkgcrawl_provider::RecordKind;
use pkgcrawl_utils::path::resolve_path;
use progress::{spawn_event_handler, ProgressGuard};
use tracing::{debug, info};
use utils::{count_of, progress_enabled, set_flag, Colored, COLOR, PROGRESS};

mod cli;
mod logging;
mod progress;
mod utils;

fn create_events() -> (EventSinkHandle, Option<ProgressGuard>) {
    if progress_enabled() {
        let (sink, receiver) = ChannelSink::new();
        let guard = spawn_event_handler(receiver);
        (Arc::new(sink), Some(guard))
    } else {
        (Arc::new(NullSink), None)
    }
}

fn config_path(args: &Args) -> Result<PathBuf> {
    match &args.config {
        Some(path) => Ok(resolve_path(path).map_err(ConfigError::from)?),
        None => Ok(default_config_path()),
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let path = config_path(args)?;
    debug!("Loading config from {}", path.display());
    let mut config = Config::load(Some(&path))?;

    if let Some(proxy) = &args.proxy {
        config.crawler.http_proxy = Some(proxy.clone());
        config.crawler.https_proxy = Some(proxy.clone());
    }
    if let Some(user_agent) = &args.user_agent {
        config.crawler.user_agent = Some(user_agent.clone());
    }

    Ok(config)
}

fn open_session(args: &Args) -> Result<CrawlSession> {
    let config = load_config(args)?;
    let secrets = config.load_secrets()?;
    debug!("Loaded {} secrets", secrets.len());
    CrawlSession::open(config, &secrets)
}

fn print_names(label: &str, color: nu_ansi_term::Color, names: &[String]) {
    for name in names {
        info!("  {} {name}", Colored(color, label));
    }
}

fn report_refresh(summary: &RefreshSummary, json: bool) {
    if json {
        let report = serde_json::json!({
            "packages": summary.packages,
            "libraries": summary.libraries,
            "missing": summary.missing,
            "broken": summary.broken,
            "rate_limited": summary.rate_limited,
        });
        println!("{report}");
        return;
    }

    for (kind, singular, plural) in [
        (RecordKind::Package, "package", "packages"),
        (RecordKind::Library, "library", "libraries"),
    ] {
        let names = summary.names(kind);
        info!("Refreshed {}", count_of(names.len(), singular, plural));
        print_names("+", Green, names);
    }
    if !summary.missing.is_empty() {
        info!("{}", Colored(Yellow, format!("{} missing", summary.missing.len())));
        print_names("?", Yellow, &summary.missing);
    }
    if !summary.broken.is_empty() {
        info!("{}", Colored(Red, format!("{} broken", summary.broken.len())));
        print_names("!", Red, &summary.broken);
    }
    if !summary.rate_limited.is_empty() {
        info!(
            "Skipped {} because of rate limits",
            count_of(summary.rate_limited.len(), "source", "sources")
        );
    }
}

fn report_removal(summary: &RemovalSummary, dry_run: bool, json: bool) {
    if json {
        let report = serde_json::json!({
            "dry_run": dry_run,
            "packages": summary.packages,
            "libraries": summary.libraries,
        });
        println!("{report}");
        return;
    }

    let verb = if dry_run { "Would remove" } else { "Removed" };
    for (kind, singular, plural) in [
        (RecordKind::Package, "package", "packages"),
        (RecordKind::Library, "library", "libraries"),
    ] {
        let names = summary.names(kind);
        info!("{verb} {}", count_of(names.len(), singular, plural));
        print_names("-", Red, names);
    }
}

fn crawl(args: &Args, package: Option<String>, all: bool) -> Result<()> {
    let session = open_session(args)?;
    let _lock = session.lock()?;

    let selection = session.selection(package, all);
    debug!("Crawl selection: {:?}", selection);
    let invalid = select(session.catalog().as_ref(), &selection)?;

    let (events, guard) = create_events();
    let orchestrator = session.orchestrator(events);
    let result = orchestrator.refresh(&invalid);

    drop(orchestrator);
    if let Some(guard) = guard {
        guard.finish();
    }
    progress::stop();

    report_refresh(&result?, args.json);
    Ok(())
}

fn removed(args: &Args, dry_run: bool) -> Result<()> {
    let session = open_session(args)?;
    let _lock = session.lock()?;

    let (events, guard) = create_events();
    let detector = session.removal_detector(events);
    let result = detector.detect(dry_run);

    drop(detector);
    if let Some(guard) = guard {
        guard.finish();
    }

    report_removal(&result?, dry_run, args.json);
    Ok(())
}

fn sources(args: &Args) -> Result<()> {
    let session = open_session(args)?;
    let mut sources: Vec<String> = session
        .walker()
        .active_sources(&session.config().channel)?
        .into_iter()
        .collect();
    sources.sort();

    if args.json {
        println!("{}", serde_json::json!(sources));
    } else {
        for source in &sources {
            info!("{source}");
        }
        debug!("{}", count_of(sources.len(), "active source", "active sources"));
    }
    Ok(())
}

fn sweep_cache(args: &Args, ttl: Option<std::time::Duration>) -> Result<()> {
    let config = load_config(args)?;
    let ttl = ttl.unwrap_or_else(|| config.crawler.cache_length());
    let cache = ResponseCache::new(config.crawler.get_cache_path()?).map_err(FetchError::from)?;

    let removed = cache.sweep(ttl).map_err(FetchError::from)?;
    info!(
        "Removed {} from {}",
        count_of(removed, "cached response", "cached responses"),
        Colored(Cyan, cache.base_path().display())
    );
    Ok(())
}

fn handle_cli() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color || args.json {
        set_flag(&COLOR, false);
    }
    if args.no_progress || args.json || args.quiet {
        set_flag(&PROGRESS, false);
    }

    match &args.command {
        Commands::Crawl {
            package,
            all,
        } => crawl(&args, package.clone(), *all)?,
        Commands::Removed {
            dry_run,
        } => removed(&args, *dry_run)?,
        Commands::Sources => sources(&args)?,
        Commands::Cache {
            action: CacheAction::Sweep {
                ttl,
            },
        } => sweep_cache(&args, *ttl)?,
        Commands::Config {
            action: ConfigAction::Init,
        } => generate_default_config(&config_path(&args)?)?,
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            let config = load_config(&args)?;
            info!("{}", config.to_annotated_document()?);
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
