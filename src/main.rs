#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use assemble::{Assembler, Tally, dedup, write_outputs};
use chrono::{Local, Utc};
use clap::Parser;
use fixtures::{
    BucketKey, BucketStrategy, DEFAULT_FIXTURES_URL, DEFAULT_SPORT, build_keywords, fetch_fixtures,
};
use matcher::{AliasMap, DEFAULT_ALIAS_MAP_PATH};
use playlist::{DEFAULT_SCHEMES, IdentityMode, ParseOptions};
use probe::{DEFAULT_PROBE_TIMEOUT, Prober, TrustPolicy, probe_all};
use source::{Source, load_sources};
use tokio_util::sync::CancellationToken;
use tracing::info;
use util::{init_http_client, spawn_ct_watcher, warn_ulimit};

pub mod assemble;
pub mod fixtures;
pub mod matcher;
pub mod playlist;
pub mod probe;
pub mod source;
pub mod util;

#[cfg(test)]
mod test_support;

/// Regroups IPTV playlists around today's and upcoming football fixtures
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Playlist sources: `http(s)` URLs or local file paths
    #[arg(env = "MATCHDAY_SOURCES", value_delimiter = ',')]
    sources: Vec<String>,

    /// JSON (with comments) file mapping keywords to broadcaster name fragments
    #[arg(long, env = "MATCHDAY_ALIAS_MAP", default_value = DEFAULT_ALIAS_MAP_PATH)]
    alias_map: PathBuf,

    /// Date-scoped fixtures endpoint, queried as `?d=YYYY-MM-DD&s=<sport>`
    #[arg(long, env = "MATCHDAY_FIXTURES_URL", default_value = DEFAULT_FIXTURES_URL)]
    fixtures_url: String,

    /// Sport filter sent to the fixtures endpoint
    #[arg(long, default_value = DEFAULT_SPORT)]
    sport: String,

    /// Number of days after today to fetch fixtures for
    #[arg(long, default_value_t = 2)]
    days_ahead: u32,

    /// How fixtures are grouped
    #[arg(long, value_enum, default_value_t = BucketStrategy::Horizon)]
    buckets: BucketStrategy,

    /// Accepted stream URL schemes
    #[arg(long = "scheme", value_delimiter = ',', default_values = DEFAULT_SCHEMES)]
    schemes: Vec<String>,

    /// Keep entries that share a stream URL instead of deduplicating them
    #[arg(long)]
    preserve_duplicates: bool,

    /// Treat every channel as online without probing
    #[arg(long)]
    skip_probe: bool,

    /// Treat channels from local sources as online without probing
    #[arg(long)]
    trust_local: bool,

    /// Treat channels from this source as online without probing
    #[arg(long = "trust-source")]
    trusted_sources: Vec<String>,

    /// Treat non-http(s) streams as online without probing
    #[arg(long)]
    trust_non_web: bool,

    /// The amount of parallel probes
    #[arg(short, long, default_value_t = 50)]
    parallelism: usize,

    /// Probe timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    probe_timeout: u64,

    /// Playlist and fixtures request timeout, in seconds
    #[arg(long, default_value_t = 15)]
    fetch_timeout: u64,

    /// Extra keyword matched against today's channels
    #[arg(long = "live-keyword")]
    live_keywords: Vec<String>,

    /// Prefix today's channel names with their match's kickoff time
    #[arg(long)]
    time_tags: bool,

    /// Playlist output path
    #[arg(short, long, default_value = "live-grouped.m3u")]
    output: PathBuf,

    /// Statistics output path
    #[arg(long, default_value = "live-stats.json")]
    stats: PathBuf,
}

impl Args {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            schemes: self.schemes.iter().map(|s| s.to_lowercase()).collect(),
            identity: if self.preserve_duplicates {
                IdentityMode::SourcePosition
            } else {
                IdentityMode::StreamUrl
            },
        }
    }

    fn trust_policy(&self, sources: &[Source]) -> TrustPolicy {
        let mut trusted_sources: HashSet<String> = self
            .trusted_sources
            .iter()
            .map(|s| Source::from_arg(s).tag())
            .collect();
        if self.trust_local {
            trusted_sources.extend(sources.iter().filter(|s| s.is_local()).map(Source::tag));
        }

        TrustPolicy {
            skip_probe: self.skip_probe,
            trusted_sources,
            trust_non_web: self.trust_non_web,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Starting {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    warn_ulimit(args.parallelism);

    let ct = CancellationToken::new();
    spawn_ct_watcher(ct.clone());

    let client = init_http_client(Duration::from_secs(args.fetch_timeout));
    let aliases = AliasMap::load(&args.alias_map).await;

    // Step 1: Gather every channel
    let sources: Vec<Source> = args.sources.iter().map(|s| Source::from_arg(s)).collect();
    let fetched = load_sources(&client, &sources, &args.parse_options()).await?;
    let fetched_total = fetched.len();
    let unique = dedup(fetched);
    info!(
        "Total channels fetched: {fetched_total}, unique: {}",
        unique.len()
    );
    let tally = Tally {
        fetched: fetched_total,
        unique: unique.len(),
    };

    // Step 2: Keep the ones that are online
    let prober = Arc::new(Prober::new(
        Duration::from_secs(args.probe_timeout),
        args.trust_policy(&sources),
    ));
    let online = probe_all(prober, unique, args.parallelism, ct).await;

    // Step 3: Fixtures
    let today = Local::now().date_naive();
    let events = fetch_fixtures(
        &client,
        &args.fixtures_url,
        &args.sport,
        today,
        args.days_ahead,
    )
    .await;
    let mut buckets = build_keywords(&events, args.buckets, today);
    if !args.live_keywords.is_empty() {
        let today_key = match args.buckets {
            BucketStrategy::Horizon => BucketKey::Live,
            BucketStrategy::Date => BucketKey::Day(today),
        };
        buckets
            .entry(today_key)
            .or_default()
            .extend_keywords(&args.live_keywords);
    }

    // Step 4: Regroup and write
    let assembler = Assembler {
        aliases: &aliases,
        time_tags: args.time_tags,
        generated_at: Utc::now(),
    };
    let (playlist, stats) = assembler.assemble(tally, &online, &buckets, today);
    write_outputs(&args.output, &args.stats, &playlist, &stats).await?;

    info!(
        "Summary: {} online channels, {} today, {} upcoming, {} in the catch-all group",
        stats.online_total, stats.today_count, stats.upcoming_count, stats.catch_all_count
    );
    info!("All done successfully!");

    Ok(())
}
