use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Daily API budget. Counts calls made since the last rolling 24h reset.
///
/// Exhausting the budget is a throttling signal: callers skip the call.
#[derive(Clone)]
pub struct QuotaTracker {
    inner: Arc<Mutex<QuotaState>>,
}

struct QuotaState {
    calls_made_today: u32,
    daily_limit: u32,
    last_reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub calls_used: u32,
    pub calls_limit: u32,
    pub calls_remaining: u32,
    pub exhausted: bool,
    pub last_reset_at: DateTime<Utc>,
}

impl QuotaTracker {
    pub fn new(daily_limit: u32, now: DateTime<Utc>) -> Self {
        QuotaTracker {
            inner: Arc::new(Mutex::new(QuotaState {
                calls_made_today: 0,
                daily_limit,
                last_reset_at: now,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        // A poisoned lock still holds valid counters.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Zero the counter once 24h have passed since the last reset.
    pub fn reset_if_new_day(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        if now - state.last_reset_at >= Duration::hours(24) {
            info!(
                "Daily API counter reset ({} calls used since {})",
                state.calls_made_today, state.last_reset_at
            );
            state.calls_made_today = 0;
            state.last_reset_at = now;
            true
        } else {
            false
        }
    }

    /// Whether another call fits in today's budget. Does not consume a slot;
    /// call [`QuotaTracker::record_call`] once the request has resolved.
    pub fn try_reserve(&self) -> bool {
        let state = self.lock();
        if state.calls_made_today >= state.daily_limit {
            warn!(
                "Quota limit reached ({}/{}), skipping API call",
                state.calls_made_today, state.daily_limit
            );
            return false;
        }
        true
    }

    /// Count one resolved request. Never counts past the limit, even when
    /// concurrent callers both passed `try_reserve` on the last free slot.
    pub fn record_call(&self) -> u32 {
        let mut state = self.lock();
        state.calls_made_today = (state.calls_made_today + 1).min(state.daily_limit);
        info!("API calls: {}/{}", state.calls_made_today, state.daily_limit);
        state.calls_made_today
    }

    /// Block every further call until the next daily reset. Used when the
    /// provider answers 429.
    pub fn exhaust(&self) {
        let mut state = self.lock();
        state.calls_made_today = state.daily_limit;
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        let state = self.lock();
        QuotaSnapshot {
            calls_used: state.calls_made_today,
            calls_limit: state.daily_limit,
            calls_remaining: state.daily_limit.saturating_sub(state.calls_made_today),
            exhausted: state.calls_made_today >= state.daily_limit,
            last_reset_at: state.last_reset_at,
        }
    }
}
