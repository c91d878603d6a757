use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::util::format_display_date;

pub const DEFAULT_FIXTURES_URL: &str = "https://www.thesportsdb.com/api/v1/json/3/eventsday.php";
pub const DEFAULT_SPORT: &str = "Soccer";

/// Kickoff times from the feed are UTC; listings are shown in WIB (UTC+7)
const LOCAL_OFFSET_HOURS: i64 = 7;
const LOCAL_ZONE_LABEL: &str = "WIB";

#[derive(Debug, Clone, Deserialize)]
struct EventsDayResponse {
    events: Option<Vec<FeedEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct FeedEvent {
    #[serde(rename = "strHomeTeam")]
    home_team: Option<String>,
    #[serde(rename = "strAwayTeam")]
    away_team: Option<String>,
    #[serde(rename = "strLeague")]
    league: Option<String>,
    #[serde(rename = "strEvent")]
    event: Option<String>,
    #[serde(rename = "strTime")]
    time: Option<String>,
}

/// One scheduled match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureEvent {
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    pub event_name: String,
    /// UTC kickoff
    pub kickoff: Option<NaiveTime>,
    /// The date the feed was queried for
    pub date: NaiveDate,
}

impl FixtureEvent {
    fn from_feed(event: FeedEvent, date: NaiveDate) -> Self {
        Self {
            home_team: event.home_team.unwrap_or_default(),
            away_team: event.away_team.unwrap_or_default(),
            league: event.league.unwrap_or_default(),
            event_name: event.event.unwrap_or_default(),
            kickoff: event.time.as_deref().and_then(parse_kickoff),
            date,
        }
    }

    /// Local kickoff as `HH:MM`
    #[must_use]
    pub fn local_kickoff(&self) -> Option<String> {
        self.kickoff.map(|t| {
            let (local, _) = t.overflowing_add_signed(TimeDelta::hours(LOCAL_OFFSET_HOURS));
            local.format("%H:%M").to_string()
        })
    }

    /// e.g. `Arsenal vs Chelsea (02:30 WIB) - 20-10-2026`
    #[must_use]
    pub fn display_line(&self) -> String {
        let time = self
            .local_kickoff()
            .map_or_else(|| "time TBA".to_string(), |t| format!("{t} {LOCAL_ZONE_LABEL}"));
        format!(
            "{} vs {} ({time}) - {}",
            self.home_team,
            self.away_team,
            format_display_date(self.date)
        )
    }

    /// Lowercased, non-blank team, league and event names
    #[must_use]
    pub fn keywords(&self) -> Vec<String> {
        [
            &self.home_team,
            &self.away_team,
            &self.league,
            &self.event_name,
        ]
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
    }
}

fn parse_kickoff(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Fetches fixtures for every date in `start..=start + days_ahead`, one request per date
///
/// A date whose request fails or whose body doesn't parse contributes no events.
pub async fn fetch_fixtures(
    client: &reqwest::Client,
    base_url: &str,
    sport: &str,
    start: NaiveDate,
    days_ahead: u32,
) -> Vec<FixtureEvent> {
    let mut events = Vec::new();
    for date in start.iter_days().take(days_ahead as usize + 1) {
        let day = fetch_day(client, base_url, sport, date).await;
        info!("Found {} {sport} events on {date}", day.len());
        events.extend(day);
    }
    events
}

#[instrument(skip(client, base_url))]
async fn fetch_day(
    client: &reqwest::Client,
    base_url: &str,
    sport: &str,
    date: NaiveDate,
) -> Vec<FixtureEvent> {
    let res = match client
        .get(base_url)
        .query(&[("d", date.format("%Y-%m-%d").to_string().as_str()), ("s", sport)])
        .send()
        .await
    {
        Ok(res) => res,
        Err(e) => {
            warn!("Unable to fetch fixtures for {date}: {e}");
            return Vec::new();
        }
    };

    if !res.status().is_success() {
        warn!("Fixtures request for {date} returned status {}", res.status());
        return Vec::new();
    }

    match res.json::<EventsDayResponse>().await {
        Ok(body) => body
            .events
            .unwrap_or_default()
            .into_iter()
            .map(|e| FixtureEvent::from_feed(e, date))
            .collect(),
        Err(e) => {
            warn!("Error parsing fixtures for {date}: {e}");
            Vec::new()
        }
    }
}

/// How fixtures are grouped into keyword buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BucketStrategy {
    /// Today is live, every later date is upcoming
    #[default]
    Horizon,
    /// One bucket per calendar date
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    Live,
    Upcoming,
    Day(NaiveDate),
}

/// An event as kept in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEvent {
    pub display: String,
    pub local_kickoff: Option<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordBucket {
    /// Date (or date range) shown in headings
    pub label: String,
    pub keywords: BTreeSet<String>,
    pub events: Vec<BucketEvent>,
}

impl KeywordBucket {
    fn push(&mut self, event: &FixtureEvent) {
        let keywords = event.keywords();
        self.keywords.extend(keywords.iter().cloned());
        self.events.push(BucketEvent {
            display: event.display_line(),
            local_kickoff: event.local_kickoff(),
            keywords,
        });
    }

    /// Adds keywords that aren't tied to any event
    pub fn extend_keywords<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.extend(
            keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
    }

    #[must_use]
    pub fn display_lines(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.display.as_str()).collect()
    }
}

pub type BucketMap = BTreeMap<BucketKey, KeywordBucket>;

/// Groups events into keyword buckets
///
/// The horizon strategy always yields both a `Live` and an `Upcoming` bucket, even when empty.
#[must_use]
pub fn build_keywords(
    events: &[FixtureEvent],
    strategy: BucketStrategy,
    today: NaiveDate,
) -> BucketMap {
    let mut buckets = BucketMap::new();

    match strategy {
        BucketStrategy::Horizon => {
            let mut live = KeywordBucket {
                label: format_display_date(today),
                ..KeywordBucket::default()
            };
            let mut upcoming = KeywordBucket::default();
            let mut upcoming_dates = BTreeSet::new();

            for event in events {
                if event.date == today {
                    live.push(event);
                } else {
                    upcoming.push(event);
                    upcoming_dates.insert(event.date);
                }
            }

            upcoming.label = match (upcoming_dates.first(), upcoming_dates.last()) {
                (Some(first), Some(last)) if first != last => format!(
                    "{} to {}",
                    format_display_date(*first),
                    format_display_date(*last)
                ),
                (Some(only), _) => format_display_date(*only),
                _ => String::new(),
            };

            buckets.insert(BucketKey::Live, live);
            buckets.insert(BucketKey::Upcoming, upcoming);
        }
        BucketStrategy::Date => {
            for event in events {
                buckets
                    .entry(BucketKey::Day(event.date))
                    .or_insert_with(|| KeywordBucket {
                        label: format_display_date(event.date),
                        ..KeywordBucket::default()
                    })
                    .push(event);
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{test_support::spawn_stub, util::init_http_client};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn event(home: &str, away: &str, league: &str, time: Option<&str>, d: u32) -> FixtureEvent {
        FixtureEvent {
            home_team: home.to_string(),
            away_team: away.to_string(),
            league: league.to_string(),
            event_name: format!("{home} vs {away}"),
            kickoff: time.and_then(parse_kickoff),
            date: date(d),
        }
    }

    #[test]
    fn kickoff_is_shifted_to_local_time() {
        let e = event("Arsenal", "Chelsea", "English Premier League", Some("19:30:00"), 20);
        assert_eq!(e.local_kickoff().as_deref(), Some("02:30"));
        // The request date is kept even when the local kickoff rolls past midnight
        assert_eq!(e.display_line(), "Arsenal vs Chelsea (02:30 WIB) - 20-10-2026");

        let short = event("A", "B", "L", Some("08:05"), 20);
        assert_eq!(short.local_kickoff().as_deref(), Some("15:05"));
    }

    #[test]
    fn missing_kickoff_is_shown_as_tba() {
        let e = event("A", "B", "L", None, 20);
        assert_eq!(e.display_line(), "A vs B (time TBA) - 20-10-2026");
        assert_eq!(event("A", "B", "L", Some("garbage"), 20).kickoff, None);
    }

    #[test]
    fn keywords_are_lowercase_and_skip_blanks() {
        let mut e = event("Team A", "", "Liga 1", None, 19);
        e.event_name = "  ".to_string();
        assert_eq!(e.keywords(), vec!["team a", "liga 1"]);
    }

    #[test]
    fn horizon_buckets_split_today_from_later_days() {
        let events = vec![
            event("Team A", "Team B", "Liga 1", Some("12:00"), 19),
            event("Team C", "Team D", "Serie A", Some("18:00"), 20),
            event("Team E", "Team F", "La Liga", Some("18:00"), 21),
        ];

        let buckets = build_keywords(&events, BucketStrategy::Horizon, date(19));
        assert_eq!(buckets.len(), 2);

        let live = &buckets[&BucketKey::Live];
        assert_eq!(live.label, "19-10-2026");
        assert!(live.keywords.contains("team a"));
        assert!(live.keywords.contains("liga 1"));
        assert!(live.keywords.contains("team a vs team b"));
        assert!(!live.keywords.contains("team c"));
        assert_eq!(live.display_lines(), vec!["Team A vs Team B (19:00 WIB) - 19-10-2026"]);

        let upcoming = &buckets[&BucketKey::Upcoming];
        assert_eq!(upcoming.label, "20-10-2026 to 21-10-2026");
        assert_eq!(upcoming.events.len(), 2);
    }

    #[test]
    fn horizon_buckets_exist_without_events() {
        let buckets = build_keywords(&[], BucketStrategy::Horizon, date(19));
        assert!(buckets[&BucketKey::Live].keywords.is_empty());
        assert!(buckets[&BucketKey::Upcoming].events.is_empty());
        assert_eq!(buckets[&BucketKey::Upcoming].label, "");
    }

    #[test]
    fn date_buckets_are_ordered_by_day() {
        let events = vec![
            event("Team E", "Team F", "La Liga", None, 21),
            event("Team A", "Team B", "Liga 1", None, 19),
            event("Team C", "Team D", "Liga 1", None, 21),
        ];

        let buckets = build_keywords(&events, BucketStrategy::Date, date(19));
        let keys: Vec<BucketKey> = buckets.keys().copied().collect();
        assert_eq!(keys, vec![BucketKey::Day(date(19)), BucketKey::Day(date(21))]);
        assert_eq!(buckets[&BucketKey::Day(date(21))].events.len(), 2);
        assert_eq!(buckets[&BucketKey::Day(date(21))].label, "21-10-2026");
    }

    #[tokio::test]
    async fn fetches_one_request_per_date_and_tolerates_failures() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        let base = spawn_stub(move |request| {
            let request_line = request.lines().next().unwrap_or_default().to_string();
            seen.lock().unwrap().push(request_line);
            if request.contains("d=2026-10-19") {
                (
                    200,
                    r#"{"events":[{"strHomeTeam":"Team A","strAwayTeam":"Team B","strLeague":"Liga 1","strEvent":"Team A vs Team B","strTime":"12:00:00","dateEvent":"2026-10-18"}]}"#
                        .to_string(),
                )
            } else if request.contains("d=2026-10-20") {
                (200, "this is not json".to_string())
            } else if request.contains("d=2026-10-21") {
                (200, r#"{"events":null}"#.to_string())
            } else {
                (503, String::new())
            }
        })
        .await;

        let client = init_http_client(std::time::Duration::from_secs(5));
        let events = fetch_fixtures(&client, &format!("{base}/eventsday.php"), "Soccer", date(19), 3).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].home_team, "Team A");
        // Bucketed by the requested date, not the payload's dateEvent
        assert_eq!(events[0].date, date(19));
        assert_eq!(events[0].kickoff, NaiveTime::from_hms_opt(12, 0, 0));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        for (request, day) in requests.iter().zip(19..) {
            assert!(request.starts_with("GET /eventsday.php?"));
            assert!(request.contains(&format!("d=2026-10-{day}")));
            assert!(request.contains("s=Soccer"));
        }
    }
}
