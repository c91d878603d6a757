use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use rlimit::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Some stream origins refuse anything that doesn't look like a desktop browser
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";
pub const BROWSER_REFERER: &str = "https://www.google.com";

/// Formats a date the way playlist headings show it, e.g. `19-10-2026`
#[must_use]
pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// Warns when the open file limit is too low for the requested probe fan-out
pub fn warn_ulimit(parallelism: usize) {
    let Ok((limit, _)) = rlimit::getrlimit(Resource::NOFILE) else {
        return;
    };
    if file_limit_too_low(limit, parallelism) {
        warn!(
            "Your file limit ({limit}) is low for {parallelism} parallel probes. Consider lowering --parallelism or raising your file limit via `ulimit -n 10240`"
        );
    }
}

fn file_limit_too_low(limit: u64, parallelism: usize) -> bool {
    limit <= 2048 && (parallelism as u64).saturating_mul(2) > limit
}

/// HTTP client used for playlist sources and the fixtures feed
///
/// # Panics
/// Will panic if the TLS backend cannot be initialized
#[must_use]
pub fn init_http_client(timeout: Duration) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!(
            "{}/{} (+{})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_REPOSITORY")
        ))
        .expect("Package metadata is a valid header value"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .expect("Unable to build HTTP client")
}

/// HTTP client that impersonates a browser, used for probing stream URLs
///
/// # Panics
/// Will panic if the TLS backend cannot be initialized
#[must_use]
pub fn init_browser_client(timeout: Duration) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(REFERER, HeaderValue::from_static(BROWSER_REFERER));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .expect("Unable to build HTTP client")
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Caught CTRL+C signal! Pending probes will be counted as offline");
        ct.cancel();
    });
}
