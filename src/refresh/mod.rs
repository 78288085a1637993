//! Cache refresh decisions: when to call the provider and how much to fetch.
//!
//! ```text
//!  Idle ─▶ CheckingCacheAge ─┬─ quota exhausted ─────────▶ Skipping
//!                            ├─ age <  TTL ──────────────▶ QuickStatusUpdate (live feed only)
//!                            └─ age >= TTL ──────────────▶ FullRefresh (live, today, ±1 day)
//! ```
//!
//! Every cycle ends back in `Idle`; the result is reported as a
//! [`RefreshOutcome`].

pub mod poller;

pub use poller::{start_poller, PollIntervals};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cache::{FixtureCache, QuotaTracker};
use crate::live_scores::models::{DateLabel, Match, MatchId, MatchStatus};
use crate::live_scores::{FetchError, ScoreProvider};

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Full refresh once the cache is at least this old
    pub cache_ttl: chrono::Duration,
    /// Pause between endpoint calls inside one full refresh
    pub request_delay: Duration,
    pub fetch_yesterday: bool,
    pub fetch_tomorrow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    QuotaExhausted,
    NotDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Skipped(SkipReason),
    /// Live feed checked; `finished` matches dropped out of it.
    QuickUpdate { live: usize, finished: usize },
    FullRefresh { matches: usize },
    /// Provider answered 429; quota pinned, cache untouched.
    RateLimited,
    /// No endpoint produced a response; cache untouched.
    Failed,
    /// Another refresh is already running.
    Busy,
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("'{0}' is not a valid match id")]
    InvalidId(String),

    #[error("daily API quota exhausted")]
    QuotaExhausted,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Live,
    Schedule(NaiveDate),
}

impl Endpoint {
    fn label(self, today: NaiveDate) -> DateLabel {
        match self {
            Endpoint::Live => DateLabel::Live,
            Endpoint::Schedule(day) => DateLabel::for_day(day, today),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Live => f.write_str("live feed"),
            Endpoint::Schedule(day) => write!(f, "schedule {}", day),
        }
    }
}

/// Longest id accepted on the stats pass-through
const MAX_MATCH_ID_LEN: usize = 64;

/// A match id goes into the provider URL verbatim, so only plain ids are
/// accepted: ASCII letters, digits, `-` and `_`.
fn is_plain_match_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_MATCH_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Label for a record that came off the live feed. Feeds without a real
/// live endpoint also return matches that are not in play.
fn live_feed_label(m: &Match, today: NaiveDate) -> DateLabel {
    match m.status {
        s if s.is_in_play() => DateLabel::Live,
        MatchStatus::Finished => DateLabel::Finished,
        _ => m
            .kickoff
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| DateLabel::for_day(dt.date_naive(), today))
            .unwrap_or(DateLabel::Today),
    }
}

/// Owns the refresh policy over a provider, the fixture cache and the quota.
pub struct RefreshEngine {
    provider: Arc<dyn ScoreProvider>,
    cache: FixtureCache,
    quota: QuotaTracker,
    settings: RefreshSettings,
    /// Serializes refresh cycles between the poller and `/scores`
    running: Mutex<()>,
}

impl RefreshEngine {
    pub fn new(
        provider: Arc<dyn ScoreProvider>,
        cache: FixtureCache,
        quota: QuotaTracker,
        settings: RefreshSettings,
    ) -> Self {
        RefreshEngine {
            provider,
            cache,
            quota,
            settings,
            running: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &FixtureCache {
        &self.cache
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    pub fn provider(&self) -> &dyn ScoreProvider {
        self.provider.as_ref()
    }

    /// One poller cycle at the current time.
    pub async fn run_once(&self) -> RefreshOutcome {
        self.refresh(Utc::now()).await
    }

    /// One cycle of the state machine. Waits for any refresh already running.
    pub async fn refresh(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let _running = self.running.lock().await;

        self.quota.reset_if_new_day(now);
        let due = self.cache.is_due(now, self.settings.cache_ttl).await;

        if !self.quota.try_reserve() {
            info!("Skipping refresh, quota protection active");
            return RefreshOutcome::Skipped(SkipReason::QuotaExhausted);
        }

        if due {
            self.full_refresh(now).await
        } else {
            self.quick_update(now).await
        }
    }

    /// Full refresh on behalf of an HTTP request: only when the cache is due
    /// and quota allows, and never waiting behind a running refresh.
    pub async fn refresh_if_due(&self, now: DateTime<Utc>) -> RefreshOutcome {
        self.quota.reset_if_new_day(now);
        if !self.cache.is_due(now, self.settings.cache_ttl).await {
            return RefreshOutcome::Skipped(SkipReason::NotDue);
        }
        if !self.quota.try_reserve() {
            return RefreshOutcome::Skipped(SkipReason::QuotaExhausted);
        }
        let Ok(_running) = self.running.try_lock() else {
            return RefreshOutcome::Busy;
        };
        // The poller may have refreshed between the check and the lock.
        if !self.cache.is_due(now, self.settings.cache_ttl).await {
            return RefreshOutcome::Skipped(SkipReason::NotDue);
        }
        self.full_refresh(now).await
    }

    /// Quota-guarded pass-through to the provider's statistics endpoint.
    pub async fn fetch_stats(
        &self,
        match_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Value, StatsError> {
        if !is_plain_match_id(match_id) {
            return Err(StatsError::InvalidId(match_id.to_string()));
        }
        self.quota.reset_if_new_day(now);
        if !self.quota.try_reserve() {
            return Err(StatsError::QuotaExhausted);
        }
        Ok(self.call(self.provider.fetch_stats(match_id)).await?)
    }

    /// Run one provider request and account for it. Every dispatched request
    /// counts against the quota whatever its outcome; a 429 pins the quota.
    async fn call<T, F>(&self, request: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        let result = request.await;
        match &result {
            Err(FetchError::Unsupported(_)) => {}
            Err(FetchError::RateLimited) => {
                self.quota.record_call();
                self.quota.exhaust();
            }
            _ => {
                self.quota.record_call();
            }
        }
        result
    }

    async fn fetch(&self, endpoint: Endpoint) -> Result<Vec<Value>, FetchError> {
        match endpoint {
            Endpoint::Live => self.call(self.provider.fetch_live()).await,
            Endpoint::Schedule(day) => self.call(self.provider.fetch_schedule(day)).await,
        }
    }

    /// Re-check only the live feed: update in-play matches and finish the
    /// ones that dropped out. Does not count as a full refresh.
    async fn quick_update(&self, now: DateTime<Utc>) -> RefreshOutcome {
        if let Some(at) = self.cache.last_fetched_at().await {
            let age = now - at;
            info!(
                "Using cached fixtures ({} min old, full refresh in {} min), checking live feed",
                age.num_minutes(),
                (self.settings.cache_ttl - age).num_minutes()
            );
        }

        let records = match self.fetch(Endpoint::Live).await {
            Ok(records) => records,
            Err(FetchError::RateLimited) => {
                error!("Rate limit hit on live feed, stopping all requests");
                return RefreshOutcome::RateLimited;
            }
            Err(e) => {
                warn!("Quick status update failed, keeping cache as-is: {}", e);
                return RefreshOutcome::Failed;
            }
        };

        let today = now.date_naive();
        let live: Vec<Match> = records
            .iter()
            .map(|raw| {
                let mut m = self.provider.normalize(raw, DateLabel::Live, now);
                m.date_label = live_feed_label(&m, today);
                m
            })
            .filter(|m| m.status.is_in_play())
            .collect();
        let live_ids: HashSet<MatchId> = live.iter().map(|m| m.id.clone()).collect();
        let live_count = live_ids.len();

        let update = self.cache.apply_live(live, &live_ids).await;
        info!(
            "Quick status update: {} live ({} updated, {} new), {} finished",
            live_count, update.updated, update.added, update.finished
        );

        RefreshOutcome::QuickUpdate {
            live: live_count,
            finished: update.finished,
        }
    }

    async fn full_refresh(&self, now: DateTime<Utc>) -> RefreshOutcome {
        info!("Refreshing fixture cache from {}", self.provider.name());

        let today = now.date_naive();
        let mut endpoints = vec![Endpoint::Live, Endpoint::Schedule(today)];
        if self.settings.fetch_yesterday {
            if let Some(day) = today.checked_sub_days(Days::new(1)) {
                endpoints.push(Endpoint::Schedule(day));
            }
        }
        if self.settings.fetch_tomorrow {
            if let Some(day) = today.checked_add_days(Days::new(1)) {
                endpoints.push(Endpoint::Schedule(day));
            }
        }

        let mut matches: Vec<Match> = Vec::new();
        let mut seen: HashSet<MatchId> = HashSet::new();
        let mut answered = 0;

        for (i, endpoint) in endpoints.into_iter().enumerate() {
            if i > 0 && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
            if !self.quota.try_reserve() {
                warn!(
                    "Quota exhausted mid-cycle, keeping the {} matches gathered so far",
                    matches.len()
                );
                break;
            }

            info!("Fetching {}...", endpoint);
            let records = match self.fetch(endpoint).await {
                Ok(records) => records,
                Err(FetchError::RateLimited) => {
                    error!("Rate limit hit on {}, aborting refresh cycle", endpoint);
                    return RefreshOutcome::RateLimited;
                }
                Err(FetchError::Unauthorized(status)) => {
                    error!("Invalid API key (HTTP {}) on {}", status, endpoint);
                    continue;
                }
                Err(e) => {
                    warn!("{} failed: {}", endpoint, e);
                    continue;
                }
            };
            answered += 1;

            let label = endpoint.label(today);
            let mut added = 0;
            for raw in &records {
                let mut m = self.provider.normalize(raw, label, now);
                if matches!(endpoint, Endpoint::Live) {
                    m.date_label = live_feed_label(&m, today);
                }
                // First occurrence wins: the live feed is fetched first.
                if seen.insert(m.id.clone()) {
                    matches.push(m);
                    added += 1;
                }
            }
            info!("   {} records from {}, {} new", records.len(), endpoint, added);
        }

        if answered == 0 {
            warn!("No endpoint answered, keeping previous cache");
            return RefreshOutcome::Failed;
        }

        let total = matches.len();
        self.cache.replace(matches, now).await;
        info!(
            "Cache refreshed: {} total matches, next full refresh in {} min",
            total,
            self.settings.cache_ttl.num_minutes()
        );
        RefreshOutcome::FullRefresh { matches: total }
    }
}
