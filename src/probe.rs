use std::{collections::HashSet, sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use tokio::{select, sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::{playlist::ChannelEntry, util::init_browser_client};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(7);

/// Which entries are considered online without being probed
#[derive(Debug, Clone, Default)]
pub struct TrustPolicy {
    /// Treat every entry as online
    pub skip_probe: bool,
    /// Source tags whose entries are always online
    pub trusted_sources: HashSet<String>,
    /// Treat non `http(s)` streams (rtmp, udp, ...) as online
    pub trust_non_web: bool,
}

impl TrustPolicy {
    #[must_use]
    pub fn bypasses(&self, channel: &ChannelEntry) -> bool {
        self.skip_probe
            || self.trusted_sources.contains(&channel.source_tag)
            || (self.trust_non_web && !channel.is_web())
    }
}

pub struct Prober {
    client: reqwest::Client,
    policy: TrustPolicy,
}

impl Prober {
    #[must_use]
    pub fn new(timeout: Duration, policy: TrustPolicy) -> Self {
        Self {
            client: init_browser_client(timeout),
            policy,
        }
    }

    /// Sends a `HEAD` request and reports whether it answered `200 OK`. Never fails.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(res) => {
                debug!("{url} answered {}", res.status());
                res.status() == StatusCode::OK
            }
            Err(e) => {
                debug!("{url} is unreachable: {e}");
                false
            }
        }
    }

    #[must_use]
    pub fn bypasses(&self, channel: &ChannelEntry) -> bool {
        self.policy.bypasses(channel)
    }
}

/// Probes every channel concurrently and returns the online ones, in input order
///
/// At most `parallelism` probes are in flight at once. Once `ct` is cancelled, probes that haven't
/// finished yet count as offline.
///
/// # Panics
/// Will panic if a probe task panics
pub async fn probe_all(
    prober: Arc<Prober>,
    channels: Vec<ChannelEntry>,
    parallelism: usize,
    ct: CancellationToken,
) -> Vec<ChannelEntry> {
    let permits = Arc::new(Semaphore::new(parallelism.max(1)));
    let pb = ProgressBar::new(channels.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} probed")
            .expect("Progress template is valid"),
    );

    let mut probe_tasks = JoinSet::new();
    for (index, channel) in channels.iter().enumerate() {
        let bypass = prober.bypasses(channel);
        let url = channel.stream_url.clone();
        let prober = prober.clone();
        let permits = permits.clone();
        let ct = ct.clone();
        let pb = pb.clone();

        probe_tasks.spawn(async move {
            let online = bypass
                || select! {
                    biased;
                    () = ct.cancelled() => false,
                    online = async {
                        let Ok(_permit) = permits.acquire().await else {
                            return false;
                        };
                        prober.probe(&url).await
                    } => online,
                };
            pb.inc(1);
            (index, online)
        });
    }

    let mut online = vec![false; channels.len()];
    for (index, ok) in probe_tasks.join_all().await {
        online[index] = ok;
    }
    pb.finish_and_clear();

    let online: Vec<ChannelEntry> = channels
        .into_iter()
        .zip(online)
        .filter_map(|(channel, ok)| ok.then_some(channel))
        .collect();
    info!("Total channels verified as online: {}", online.len());

    online
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{playlist::parse, test_support::spawn_stub};

    fn channel(url: &str, tag: &str) -> ChannelEntry {
        parse(&format!("#EXTINF:-1,Test\n{url}\n"), tag).remove(0)
    }

    async fn stub() -> String {
        spawn_stub(|request| {
            if request.contains(" /ok") {
                (200, String::new())
            } else if request.contains(" /created") {
                (201, String::new())
            } else {
                (404, String::new())
            }
        })
        .await
    }

    #[tokio::test]
    async fn only_200_is_online() {
        let base = stub().await;
        let prober = Prober::new(Duration::from_secs(5), TrustPolicy::default());

        assert!(prober.probe(&format!("{base}/ok")).await);
        assert!(!prober.probe(&format!("{base}/created")).await);
        assert!(!prober.probe(&format!("{base}/missing")).await);
    }

    #[tokio::test]
    async fn unreachable_and_invalid_urls_are_offline() {
        let prober = Prober::new(Duration::from_secs(2), TrustPolicy::default());

        // Nothing listens on port 9 (discard) locally
        assert!(!prober.probe("http://127.0.0.1:9/stream").await);
        assert!(!prober.probe("not a url").await);
        assert!(!prober.probe("udp://239.0.0.1:1234").await);
    }

    #[tokio::test]
    async fn slow_origin_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let prober = Prober::new(Duration::from_millis(300), TrustPolicy::default());
        assert!(!prober.probe(&format!("http://{addr}/slow")).await);
    }

    #[tokio::test]
    async fn sends_browser_headers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = {
            let seen = seen.clone();
            spawn_stub(move |head| {
                seen.lock().unwrap().push(head.to_lowercase());
                (200, String::new())
            })
            .await
        };
        let prober = Prober::new(Duration::from_secs(5), TrustPolicy::default());

        assert!(prober.probe(&format!("{base}/stream")).await);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("head /stream "));
        assert!(seen[0].contains("user-agent: mozilla/5.0 (windows nt 10.0; win64; x64)"));
        assert!(seen[0].contains("referer: https://www.google.com"));
    }

    #[test]
    fn trust_policy_bypasses() {
        let policy = TrustPolicy {
            trusted_sources: HashSet::from(["live.m3u".to_string()]),
            trust_non_web: true,
            ..TrustPolicy::default()
        };

        assert!(policy.bypasses(&channel("http://x.example/s", "live.m3u")));
        assert!(policy.bypasses(&channel("rtmp://x.example/s", "remote")));
        assert!(!policy.bypasses(&channel("https://x.example/s", "remote")));

        let skip = TrustPolicy {
            skip_probe: true,
            ..TrustPolicy::default()
        };
        assert!(skip.bypasses(&channel("https://x.example/s", "remote")));
    }

    #[tokio::test]
    async fn probe_all_keeps_online_channels_in_order() {
        let base = stub().await;
        let policy = TrustPolicy {
            trusted_sources: HashSet::from(["trusted".to_string()]),
            ..TrustPolicy::default()
        };
        let prober = Arc::new(Prober::new(Duration::from_secs(5), policy));

        let channels = vec![
            channel(&format!("{base}/ok?a"), "remote"),
            channel(&format!("{base}/missing"), "remote"),
            channel("http://127.0.0.1:9/never-probed", "trusted"),
            channel(&format!("{base}/ok?b"), "remote"),
        ];

        let online = probe_all(prober, channels, 2, CancellationToken::new()).await;
        let urls: Vec<String> = online.into_iter().map(|c| c.stream_url).collect();
        assert_eq!(
            urls,
            vec![
                format!("{base}/ok?a"),
                "http://127.0.0.1:9/never-probed".to_string(),
                format!("{base}/ok?b"),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_probes_are_offline() {
        let base = stub().await;
        let policy = TrustPolicy {
            trust_non_web: true,
            ..TrustPolicy::default()
        };
        let prober = Arc::new(Prober::new(Duration::from_secs(5), policy));
        let ct = CancellationToken::new();
        ct.cancel();

        let channels = vec![
            channel(&format!("{base}/ok"), "remote"),
            channel("udp://239.0.0.1:1234", "remote"),
        ];

        let online = probe_all(prober, channels, 4, ct).await;
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].stream_url, "udp://239.0.0.1:1234");
    }
}
