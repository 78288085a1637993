//! Provider-independent match status classification.
//!
//! Every provider reads its own status vocabulary into a [`StatusSignals`]
//! value; [`classify`] turns those signals into a [`MatchStatus`]. Providers
//! that never push a live or finished transition fall back to the time elapsed
//! since kickoff, so the cache heals itself even without an explicit
//! "finished" event.

use chrono::{DateTime, Duration, Utc};

use super::models::MatchStatus;

/// Flags a provider raised for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSignals {
    pub finished: bool,
    pub live: bool,
    pub halftime: bool,
    /// Postponed, cancelled, abandoned or suspended
    pub postponed: bool,
    /// The provider reports live transitions itself. When false and no flag is
    /// raised, the status is derived from the kickoff time.
    pub realtime: bool,
}

/// Time window used when a provider has no live signal.
#[derive(Debug, Clone, Copy)]
pub struct StatusPolicy {
    pub pregame_buffer: Duration,
    /// Kickoff + this is treated as finished. Must cover stoppage and extra time.
    pub auto_finish_after: Duration,
}

impl StatusPolicy {
    pub fn from_minutes(pregame_buffer: i64, auto_finish_after: i64) -> Self {
        StatusPolicy {
            pregame_buffer: Duration::minutes(pregame_buffer),
            auto_finish_after: Duration::minutes(auto_finish_after),
        }
    }

    fn by_elapsed(&self, kickoff: DateTime<Utc>, now: DateTime<Utc>) -> MatchStatus {
        if now > kickoff + self.auto_finish_after {
            MatchStatus::Finished
        } else if now >= kickoff - self.pregame_buffer {
            MatchStatus::Live
        } else {
            MatchStatus::Scheduled
        }
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        StatusPolicy::from_minutes(0, 180)
    }
}

/// Map provider signals plus kickoff time to a normalized status.
///
/// Priority: finished, live, halftime, postponed, then the elapsed-time
/// fallback for providers without a real-time feed, then scheduled.
pub fn classify(
    signals: StatusSignals,
    kickoff: Option<i64>,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> MatchStatus {
    if signals.finished {
        return MatchStatus::Finished;
    }
    if signals.live {
        return MatchStatus::Live;
    }
    if signals.halftime {
        return MatchStatus::Halftime;
    }
    if signals.postponed {
        return MatchStatus::Postponed;
    }
    if !signals.realtime {
        if let Some(kickoff) = kickoff
            .filter(|ts| *ts > 0)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        {
            return policy.by_elapsed(kickoff, now);
        }
    }
    MatchStatus::Scheduled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 18, 15, 0, 0).unwrap()
    }

    fn kickoff_minutes_ago(mins: i64) -> Option<i64> {
        Some((now() - Duration::minutes(mins)).timestamp())
    }

    #[test]
    fn test_explicit_flags_follow_priority() {
        let policy = StatusPolicy::default();
        let all = StatusSignals {
            finished: true,
            live: true,
            halftime: true,
            postponed: true,
            realtime: true,
        };
        assert_eq!(classify(all, None, now(), &policy), MatchStatus::Finished);

        let live_ht = StatusSignals {
            live: true,
            halftime: true,
            realtime: true,
            ..Default::default()
        };
        assert_eq!(classify(live_ht, None, now(), &policy), MatchStatus::Live);

        let ht = StatusSignals {
            halftime: true,
            postponed: true,
            realtime: true,
            ..Default::default()
        };
        assert_eq!(classify(ht, None, now(), &policy), MatchStatus::Halftime);

        let pst = StatusSignals {
            postponed: true,
            ..Default::default()
        };
        assert_eq!(
            classify(pst, kickoff_minutes_ago(60), now(), &policy),
            MatchStatus::Postponed
        );
    }

    #[test]
    fn test_realtime_provider_without_flags_stays_scheduled() {
        let policy = StatusPolicy::default();
        let signals = StatusSignals {
            realtime: true,
            ..Default::default()
        };
        // Kicked off long ago but the feed never said so: trust the feed.
        assert_eq!(
            classify(signals, kickoff_minutes_ago(500), now(), &policy),
            MatchStatus::Scheduled
        );
    }

    #[test]
    fn test_time_fallback_window() {
        let policy = StatusPolicy::from_minutes(10, 130);
        let none = StatusSignals::default();

        assert_eq!(
            classify(none, kickoff_minutes_ago(-30), now(), &policy),
            MatchStatus::Scheduled
        );
        assert_eq!(
            classify(none, kickoff_minutes_ago(-5), now(), &policy),
            MatchStatus::Live
        );
        assert_eq!(
            classify(none, kickoff_minutes_ago(60), now(), &policy),
            MatchStatus::Live
        );
        assert_eq!(
            classify(none, kickoff_minutes_ago(130), now(), &policy),
            MatchStatus::Live
        );
        assert_eq!(
            classify(none, kickoff_minutes_ago(131), now(), &policy),
            MatchStatus::Finished
        );
    }

    #[test]
    fn test_missing_or_zero_kickoff_is_scheduled() {
        let policy = StatusPolicy::default();
        let none = StatusSignals::default();
        assert_eq!(classify(none, None, now(), &policy), MatchStatus::Scheduled);
        assert_eq!(classify(none, Some(0), now(), &policy), MatchStatus::Scheduled);
    }

    #[test]
    fn test_flag_combinations_respect_priority() {
        let policy = StatusPolicy::default();
        let kickoffs = [
            None,
            kickoff_minutes_ago(-60),
            kickoff_minutes_ago(45),
            kickoff_minutes_ago(400),
        ];
        for bits in 0u8..32 {
            let signals = StatusSignals {
                finished: bits & 1 != 0,
                live: bits & 2 != 0,
                halftime: bits & 4 != 0,
                postponed: bits & 8 != 0,
                realtime: bits & 16 != 0,
            };
            for kickoff in kickoffs {
                let status = classify(signals, kickoff, now(), &policy);
                let expected_explicit = if signals.finished {
                    Some(MatchStatus::Finished)
                } else if signals.live {
                    Some(MatchStatus::Live)
                } else if signals.halftime {
                    Some(MatchStatus::Halftime)
                } else if signals.postponed {
                    Some(MatchStatus::Postponed)
                } else {
                    None
                };
                match expected_explicit {
                    Some(expected) => assert_eq!(status, expected, "bits={bits:05b}"),
                    None => assert!(
                        matches!(
                            status,
                            MatchStatus::Scheduled | MatchStatus::Live | MatchStatus::Finished
                        ),
                        "bits={bits:05b} gave {status:?}"
                    ),
                }
            }
        }
    }
}
