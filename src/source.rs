use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use reqwest::Url;
use tracing::{error, info, instrument, warn};

use crate::playlist::{ChannelEntry, ParseOptions, parse_with};

/// Where a playlist comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote(Url),
}

impl Source {
    /// Anything that parses as an `http(s)` URL is remote, everything else is a local path
    #[must_use]
    pub fn from_arg(arg: &str) -> Self {
        match Url::parse(arg) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            _ => Self::Local(PathBuf::from(arg)),
        }
    }

    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Tag attached to every entry parsed from this source
    #[must_use]
    pub fn tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Fetches a remote text document. Any failure is logged and turned into `None`.
#[instrument(skip(client))]
pub async fn fetch_text(client: &reqwest::Client, url: Url) -> Option<String> {
    let res = match client.get(url.clone()).send().await {
        Ok(res) => res,
        Err(e) => {
            warn!("Unable to fetch {url}: {e}");
            return None;
        }
    };

    if !res.status().is_success() {
        warn!("Fetching {url} returned status {}", res.status());
        return None;
    }

    match res.text().await {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("Unable to read body of {url}: {e}");
            None
        }
    }
}

async fn read_local(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Reading local playlist {}", path.display()))
}

/// Reads and parses every source, in order
///
/// # Errors
/// Errors when a local source can't be read and there is no remote source to fall back on
pub async fn load_sources(
    client: &reqwest::Client,
    sources: &[Source],
    options: &ParseOptions,
) -> Result<Vec<ChannelEntry>> {
    let has_remote = sources.iter().any(|s| !s.is_local());
    let mut channels = Vec::new();

    for (position, source) in sources.iter().enumerate() {
        let text = match source {
            Source::Local(path) => match read_local(path).await {
                Ok(text) => Some(text),
                Err(e) if has_remote => {
                    error!("{e:#}. Continuing with the remaining sources");
                    None
                }
                Err(e) => {
                    error!("FATAL: {e:#}");
                    return Err(e.context("No remote source to fall back on"));
                }
            },
            Source::Remote(url) => fetch_text(client, url.clone()).await,
        };

        let Some(text) = text else {
            continue;
        };
        let parsed = parse_with(&text, &source.tag(), position, options);
        info!("Parsed {} channels from {source}", parsed.len());
        channels.extend(parsed);
    }

    Ok(channels)
}
