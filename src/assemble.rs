use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::{
    fixtures::{BucketKey, BucketMap, KeywordBucket},
    matcher::{AliasMap, matches},
    playlist::{ChannelEntry, Descriptor},
    util::format_display_date,
};

pub const LIVE_HEADING: &str = "⚽ LIVE EVENT";
pub const UPCOMING_HEADING: &str = "📅 UPCOMING EVENTS";
pub const CATCH_ALL_HEADING: &str = "⭐ SPORTS CHANNEL";

/// Upcoming buckets only list their first few events
pub const UPCOMING_DISPLAY_LIMIT: usize = 5;

/// Drops every entry whose identity was already seen. The first occurrence wins.
#[must_use]
pub fn dedup(channels: Vec<ChannelEntry>) -> Vec<ChannelEntry> {
    let mut seen = HashSet::new();
    channels
        .into_iter()
        .filter(|c| seen.insert(c.identity.clone()))
        .collect()
}

/// Entry counts from before the probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub fetched: usize,
    pub unique: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub fetched_total: usize,
    pub unique_total: usize,
    pub online_total: usize,
    pub unique_urls_online: usize,
    pub today_count: usize,
    pub upcoming_count: usize,
    pub catch_all_count: usize,
    pub generated_at: DateTime<Utc>,
}

struct Section<'a> {
    heading: &'static str,
    caption: String,
    info_tag: &'static str,
    info_lines: Vec<&'a str>,
    members: Vec<(&'a ChannelEntry, Option<String>)>,
}

impl Section<'_> {
    fn render(&self, out: &mut Vec<String>) {
        out.push(String::new());
        out.push(
            Descriptor::synthetic(self.caption.as_str())
                .with_attribute("group-title", self.heading)
                .to_string(),
        );
        for line in &self.info_lines {
            out.push(
                Descriptor::synthetic(*line)
                    .with_attribute("tvg-name", self.info_tag)
                    .with_attribute("group-title", self.heading)
                    .to_string(),
            );
        }
        for (channel, prefix) in &self.members {
            out.extend(channel.render(self.heading, prefix.as_deref()));
        }
    }
}

/// Regroups online channels around fixture buckets and renders the final playlist
pub struct Assembler<'a> {
    pub aliases: &'a AliasMap,
    /// Prefix today's channel labels with the local kickoff of their match
    pub time_tags: bool,
    pub generated_at: DateTime<Utc>,
}

impl Assembler<'_> {
    /// Assigns each online channel to exactly one group, checked in order: today, each upcoming
    /// bucket, then the catch-all. Returns the playlist text and the run statistics.
    #[must_use]
    pub fn assemble(
        &self,
        tally: Tally,
        online: &[ChannelEntry],
        buckets: &BucketMap,
        today: NaiveDate,
    ) -> (String, RunStatistics) {
        let today_key = if buckets.contains_key(&BucketKey::Live) {
            BucketKey::Live
        } else {
            BucketKey::Day(today)
        };
        let empty = KeywordBucket::default();
        let today_bucket = buckets.get(&today_key).unwrap_or(&empty);

        let mut assigned = vec![false; online.len()];

        let mut today_members = Vec::new();
        for (i, channel) in online.iter().enumerate() {
            if matches(&channel.name, &today_bucket.keywords, self.aliases) {
                assigned[i] = true;
                today_members.push((channel, self.time_tag(channel, today_bucket)));
            }
        }
        let today_label = if today_bucket.label.is_empty() {
            format_display_date(today)
        } else {
            today_bucket.label.clone()
        };
        let today_section = Section {
            heading: LIVE_HEADING,
            caption: format!(
                "Today {today_label} - {} channels, {} events",
                today_members.len(),
                today_bucket.events.len()
            ),
            info_tag: "LIVE INFO",
            info_lines: today_bucket.display_lines(),
            members: today_members,
        };

        let mut upcoming_sections = Vec::new();
        for (_, bucket) in buckets.iter().filter(|(k, _)| **k != today_key) {
            let mut members = Vec::new();
            for (i, channel) in online.iter().enumerate() {
                if !assigned[i] && matches(&channel.name, &bucket.keywords, self.aliases) {
                    assigned[i] = true;
                    members.push((channel, None));
                }
            }
            upcoming_sections.push(Self::upcoming_section(bucket, members));
        }
        if upcoming_sections.is_empty() {
            upcoming_sections.push(Self::upcoming_section(&empty, Vec::new()));
        }

        let catch_all_members: Vec<_> = online
            .iter()
            .zip(&assigned)
            .filter(|(_, assigned)| !**assigned)
            .map(|(channel, _)| (channel, None))
            .collect();
        let catch_all_section = Section {
            heading: CATCH_ALL_HEADING,
            caption: format!("{} other active channels", catch_all_members.len()),
            info_tag: "",
            info_lines: Vec::new(),
            members: catch_all_members,
        };

        let stats = RunStatistics {
            fetched_total: tally.fetched,
            unique_total: tally.unique,
            online_total: online.len(),
            unique_urls_online: online
                .iter()
                .map(|c| c.stream_url.as_str())
                .collect::<HashSet<_>>()
                .len(),
            today_count: today_section.members.len(),
            upcoming_count: upcoming_sections.iter().map(|s| s.members.len()).sum(),
            catch_all_count: catch_all_section.members.len(),
            generated_at: self.generated_at,
        };

        let mut lines = vec![format!(
            "#EXTM3U url-version=\"{}\"",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )];
        today_section.render(&mut lines);
        for section in &upcoming_sections {
            section.render(&mut lines);
        }
        catch_all_section.render(&mut lines);

        let mut playlist = lines.join("\n");
        playlist.push('\n');

        (playlist, stats)
    }

    fn upcoming_section<'b>(
        bucket: &'b KeywordBucket,
        members: Vec<(&'b ChannelEntry, Option<String>)>,
    ) -> Section<'b> {
        let label = if bucket.label.is_empty() {
            String::new()
        } else {
            format!(" {}", bucket.label)
        };
        Section {
            heading: UPCOMING_HEADING,
            caption: format!(
                "Upcoming{label} - {} channels, {} events",
                members.len(),
                bucket.events.len()
            ),
            info_tag: "UPCOMING INFO",
            info_lines: bucket
                .display_lines()
                .into_iter()
                .take(UPCOMING_DISPLAY_LIMIT)
                .collect(),
            members,
        }
    }

    /// `[HH:MM]` of the first event in the bucket whose own keywords match the channel
    fn time_tag(&self, channel: &ChannelEntry, bucket: &KeywordBucket) -> Option<String> {
        if !self.time_tags {
            return None;
        }
        bucket
            .events
            .iter()
            .find(|e| matches(&channel.name, &e.keywords, self.aliases))
            .and_then(|e| e.local_kickoff.as_ref())
            .map(|t| format!("[{t}]"))
    }
}

/// Writes the playlist and its statistics sidecar
///
/// # Errors
/// Errors when either file can't be written
pub async fn write_outputs(
    playlist_path: &Path,
    stats_path: &Path,
    playlist: &str,
    stats: &RunStatistics,
) -> Result<()> {
    tokio::fs::write(playlist_path, playlist)
        .await
        .with_context(|| format!("Writing playlist to {}", playlist_path.display()))?;
    info!("Generated {}", playlist_path.display());

    let json = serde_json::to_string_pretty(stats).context("Serializing run statistics")?;
    tokio::fs::write(stats_path, json)
        .await
        .with_context(|| format!("Writing statistics to {}", stats_path.display()))?;
    info!("Stats saved to {}", stats_path.display());

    Ok(())
}
