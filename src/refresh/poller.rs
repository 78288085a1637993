use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::RefreshEngine;

/// Sleep between cycles, picked from whether anything is in play.
#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub live: Duration,
    pub idle: Duration,
}

impl PollIntervals {
    pub fn for_live_count(&self, live: usize) -> Duration {
        if live > 0 {
            self.live
        } else {
            self.idle
        }
    }
}

/// Spawns the background refresh loop. It runs one refresh cycle, then
/// sleeps for the live or idle interval, until `shutdown` flips to `true`
/// (or its sender is dropped). Await the returned handle to join it.
pub fn start_poller(
    engine: Arc<RefreshEngine>,
    intervals: PollIntervals,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Poller started ({}, live interval={:?}, idle interval={:?})",
            engine.provider().name(),
            intervals.live,
            intervals.idle
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = engine.run_once() => outcome,
                _ = shutdown.changed() => break,
            };

            let live = engine.cache().live_count().await;
            let quota = engine.quota().snapshot();
            let wait = intervals.for_live_count(live);
            info!(
                "Cycle done: {:?} | API calls {}/{} | live matches {} | next poll in {} min",
                outcome,
                quota.calls_used,
                quota.calls_limit,
                live,
                wait.as_secs() / 60
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Poller stopped");
    })
}
