use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use pkgcrawl_utils::time::parse_std_duration;

#[derive(Parser, Debug)]
#[command(
    name = "pkgcrawl",
    about = "Crawl package channels into a reviewed catalog",
    version,
    arg_required_else_help = true
)]
pub struct Args {
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs and results as JSON
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable the progress bar
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Use a config file other than the default
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Proxy for both http and https requests
    #[arg(short = 'P', long, global = true)]
    pub proxy: Option<String>,

    /// Override the user agent
    #[arg(short = 'A', long, global = true)]
    pub user_agent: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh catalog records from the channel
    #[clap(name = "crawl")]
    Crawl {
        /// Only refresh the sources of this package
        #[arg(short, long)]
        package: Option<String>,

        /// Refresh every source instead of the outdated batch
        #[arg(short, long, conflicts_with = "package")]
        all: bool,
    },

    /// Flag records whose sources left the channel
    #[clap(name = "removed")]
    Removed {
        /// Report candidates without marking them
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Print every source currently reachable from the channel
    #[clap(name = "sources")]
    Sources,

    /// Manage the HTTP response cache
    #[clap(name = "cache")]
    Cache {
        #[clap(subcommand)]
        action: CacheAction,
    },

    /// Create or print the configuration
    #[clap(name = "config")]
    Config {
        #[clap(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Delete cached responses older than the ttl
    Sweep {
        /// Maximum age to keep, e.g. 1h or 2d12h. Defaults to `cache_length`
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Duration>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an annotated default config file
    Init,
    /// Print the effective configuration
    Show,
}

fn parse_ttl(value: &str) -> Result<Duration, String> {
    parse_std_duration(value).ok_or_else(|| format!("invalid duration '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crawl_flags() {
        let args = Args::try_parse_from(["pkgcrawl", "-vv", "crawl", "--package", "Foo"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(
            args.command,
            Commands::Crawl { package: Some(ref name), all: false } if name == "Foo"
        ));
    }

    #[test]
    fn test_package_conflicts_with_all() {
        assert!(Args::try_parse_from(["pkgcrawl", "crawl", "--all", "--package", "Foo"]).is_err());
    }

    #[test]
    fn test_parse_sweep_ttl() {
        let args = Args::try_parse_from(["pkgcrawl", "cache", "sweep", "--ttl", "1h30m"]).unwrap();
        match args.command {
            Commands::Cache {
                action: CacheAction::Sweep { ttl },
            } => assert_eq!(ttl, Some(Duration::from_secs(5400))),
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from(["pkgcrawl", "cache", "sweep", "--ttl", "soon"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["pkgcrawl", "removed", "-n", "--json", "-P", "http://proxy:3128"])
                .unwrap();
        assert!(args.json);
        assert_eq!(args.proxy.as_deref(), Some("http://proxy:3128"));
        assert!(matches!(args.command, Commands::Removed { dry_run: true }));
    }
}
