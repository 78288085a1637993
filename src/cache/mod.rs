//! In-memory fixture cache shared between the poller and the HTTP handlers.
//!
//! The refresh engine is the only writer. Readers always get a full snapshot:
//! a full refresh swaps the whole match list under the write lock, so nobody
//! observes a half-built list. Network I/O never happens while the lock is held.

pub mod quota;

pub use quota::QuotaTracker;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::live_scores::models::{DateLabel, Match, MatchId, MatchStatus};

/// Thread-safe snapshot of the last normalized match set.
#[derive(Clone, Default)]
pub struct FixtureCache {
    inner: Arc<RwLock<CacheInner>>,
}

#[derive(Default)]
struct CacheInner {
    /// Provider response order
    matches: Vec<Match>,
    /// `None` until the first full refresh
    last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub matches: Vec<Match>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    /// Time since the last full refresh; `None` if there never was one.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_fetched_at.map(|at| now - at)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchCounts {
    pub live: usize,
    pub finished: usize,
    /// Scheduled and postponed
    pub upcoming: usize,
}

impl MatchCounts {
    pub fn of(matches: &[Match]) -> Self {
        matches.iter().fold(MatchCounts::default(), |mut c, m| {
            match m.status {
                MatchStatus::Live | MatchStatus::Halftime => c.live += 1,
                MatchStatus::Finished => c.finished += 1,
                MatchStatus::Scheduled | MatchStatus::Postponed => c.upcoming += 1,
            }
            c
        })
    }
}

/// Result of [`FixtureCache::apply_live`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveUpdate {
    pub updated: usize,
    pub added: usize,
    pub finished: usize,
}

impl CacheInner {
    /// Overwrite cached matches with fresher live records of the same id and
    /// append live matches the cache has not seen yet. Returns `(updated, added)`.
    fn merge_live(&mut self, live: Vec<Match>) -> (usize, usize) {
        let positions: HashMap<MatchId, usize> = self
            .matches
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();

        let (mut updated, mut added) = (0, 0);
        for m in live {
            match positions.get(&m.id) {
                Some(&i) => {
                    self.matches[i] = m;
                    updated += 1;
                }
                None => {
                    self.matches.push(m);
                    added += 1;
                }
            }
        }
        (updated, added)
    }

    /// Finish every in-play match that is no longer in the live feed.
    fn reconcile_live_ids(&mut self, current_live_ids: &HashSet<MatchId>) -> usize {
        let mut finished = 0;
        for m in self.matches.iter_mut() {
            if m.status.is_in_play() && !current_live_ids.contains(&m.id) {
                info!(
                    "Match {} ({} vs {}) left the live feed, marking finished",
                    m.id, m.home_team.name, m.away_team.name
                );
                m.status = MatchStatus::Finished;
                m.date_label = DateLabel::Finished;
                finished += 1;
            }
        }
        finished
    }
}

impl FixtureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> CacheSnapshot {
        let inner = self.inner.read().await;
        CacheSnapshot {
            matches: inner.matches.clone(),
            last_fetched_at: inner.last_fetched_at,
        }
    }

    /// Swap in a freshly fetched match set.
    pub async fn replace(&self, matches: Vec<Match>, fetched_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        inner.matches = matches;
        inner.last_fetched_at = Some(fetched_at);
        debug!("FixtureCache: {} matches at {}", inner.matches.len(), fetched_at);
    }

    /// Apply one live-feed check: merge the fresh in-play records, then
    /// finish every in-play match missing from `live_ids`. Both steps run
    /// under one write lock so readers never see a half-applied update.
    pub async fn apply_live(&self, live: Vec<Match>, live_ids: &HashSet<MatchId>) -> LiveUpdate {
        let mut inner = self.inner.write().await;
        let (updated, added) = inner.merge_live(live);
        let finished = inner.reconcile_live_ids(live_ids);
        LiveUpdate {
            updated,
            added,
            finished,
        }
    }

    pub async fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_fetched_at
    }

    /// A refresh is due when the cache was never filled or is at least `ttl` old.
    pub async fn is_due(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.last_fetched_at().await {
            Some(at) => now - at >= ttl,
            None => true,
        }
    }

    /// Number of cached matches currently live or at half-time.
    pub async fn live_count(&self) -> usize {
        self.inner
            .read()
            .await
            .matches
            .iter()
            .filter(|m| m.status.is_in_play())
            .count()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.matches.len()
    }
}
