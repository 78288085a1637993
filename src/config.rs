use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::live_scores::StatusPolicy;
use crate::refresh::{PollIntervals, RefreshSettings};

/// One week
const MAX_CACHE_TTL_MINUTES: u64 = 7 * 24 * 60;
/// One day
const MAX_POLL_INTERVAL_MINUTES: u64 = 24 * 60;
/// One day, for the kickoff-time window
const MAX_STATUS_WINDOW_MINUTES: u32 = 24 * 60;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// SportAPI7 on RapidAPI (SofaScore data)
    Sportapi7,
    /// API-Football v3 on RapidAPI
    ApiFootball,
    /// OpenLigaDB (no key, no live feed)
    Openligadb,
}

impl ProviderKind {
    pub fn needs_api_key(self) -> bool {
        !matches!(self, ProviderKind::Openligadb)
    }
}

/// Quota-protected live scores cache
#[derive(Parser, Debug, Clone)]
#[command(name = "livescores-api", version, about)]
pub struct Config {
    /// Upstream scores provider
    #[arg(long, env = "PROVIDER", value_enum, default_value = "sportapi7")]
    pub provider: ProviderKind,

    /// RapidAPI key (required for sportapi7 and api-football)
    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the provider base URL
    #[arg(long, env = "PROVIDER_BASE_URL")]
    pub provider_base_url: Option<String>,

    /// Listen host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Safety limit on provider calls per rolling 24h
    #[arg(long, env = "MAX_API_CALLS_PER_DAY", default_value = "450")]
    pub daily_call_limit: u32,

    /// Minimum age before the schedule is fetched again
    #[arg(long, env = "CACHE_TTL_MINUTES", default_value = "180")]
    pub cache_ttl_minutes: u64,

    /// Poll interval while matches are live
    #[arg(long, env = "POLL_INTERVAL_LIVE_MINUTES", default_value = "10")]
    pub poll_interval_live_minutes: u64,

    /// Poll interval while nothing is live
    #[arg(long, env = "POLL_INTERVAL_IDLE_MINUTES", default_value = "60")]
    pub poll_interval_idle_minutes: u64,

    /// Minutes after kickoff a match without a live signal counts as finished
    #[arg(long, env = "AUTO_FINISH_MINUTES", default_value = "180")]
    pub auto_finish_minutes: u32,

    /// Minutes before kickoff a match without a live signal counts as live
    #[arg(long, env = "PREGAME_BUFFER_MINUTES", default_value = "0")]
    pub pregame_buffer_minutes: u32,

    /// Per-request timeout for provider calls
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Pause between endpoint calls in one full refresh
    #[arg(long, env = "REQUEST_DELAY_SECS", default_value = "2")]
    pub request_delay_secs: u64,

    /// Also fetch yesterday's schedule on a full refresh
    #[arg(long, env = "FETCH_YESTERDAY", default_value = "false")]
    pub fetch_yesterday: bool,

    /// Also fetch tomorrow's schedule on a full refresh
    #[arg(long, env = "FETCH_TOMORROW", default_value = "false")]
    pub fetch_tomorrow: bool,

    /// SportAPI7 sport slug
    #[arg(long, env = "SPORT", default_value = "football")]
    pub sport: String,

    /// OpenLigaDB league shortcut
    #[arg(long, env = "LEAGUE", default_value = "bl1")]
    pub league: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.needs_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            anyhow::bail!(
                "RAPIDAPI_KEY environment variable not set (required for provider {:?})",
                self.provider
            );
        }
        if let Some(base) = &self.provider_base_url {
            url::Url::parse(base)
                .map_err(|e| anyhow::anyhow!("PROVIDER_BASE_URL '{}' is not a valid URL: {}", base, e))?;
        }
        if self.daily_call_limit == 0 {
            anyhow::bail!("daily_call_limit must be positive");
        }
        if !(1..=MAX_CACHE_TTL_MINUTES).contains(&self.cache_ttl_minutes) {
            anyhow::bail!(
                "cache_ttl_minutes must be between 1 and {} (got {})",
                MAX_CACHE_TTL_MINUTES,
                self.cache_ttl_minutes
            );
        }
        for (name, value) in [
            ("poll_interval_live_minutes", self.poll_interval_live_minutes),
            ("poll_interval_idle_minutes", self.poll_interval_idle_minutes),
        ] {
            if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&value) {
                anyhow::bail!(
                    "{} must be between 1 and {} (got {})",
                    name,
                    MAX_POLL_INTERVAL_MINUTES,
                    value
                );
            }
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        if !(1..=MAX_STATUS_WINDOW_MINUTES).contains(&self.auto_finish_minutes) {
            anyhow::bail!(
                "auto_finish_minutes must be between 1 and {} (got {})",
                MAX_STATUS_WINDOW_MINUTES,
                self.auto_finish_minutes
            );
        }
        if self.pregame_buffer_minutes > MAX_STATUS_WINDOW_MINUTES {
            anyhow::bail!(
                "pregame_buffer_minutes must be at most {} (got {})",
                MAX_STATUS_WINDOW_MINUTES,
                self.pregame_buffer_minutes
            );
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    // Derived settings clamp to the bounds enforced by `validate`.

    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy::from_minutes(
            i64::from(self.pregame_buffer_minutes.min(MAX_STATUS_WINDOW_MINUTES)),
            i64::from(self.auto_finish_minutes.min(MAX_STATUS_WINDOW_MINUTES)),
        )
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            cache_ttl: chrono::Duration::minutes(
                self.cache_ttl_minutes.min(MAX_CACHE_TTL_MINUTES) as i64,
            ),
            request_delay: Duration::from_secs(self.request_delay_secs),
            fetch_yesterday: self.fetch_yesterday,
            fetch_tomorrow: self.fetch_tomorrow,
        }
    }

    pub fn poll_intervals(&self) -> PollIntervals {
        PollIntervals {
            live: Duration::from_secs(self.poll_interval_live_minutes.min(MAX_POLL_INTERVAL_MINUTES) * 60),
            idle: Duration::from_secs(self.poll_interval_idle_minutes.min(MAX_POLL_INTERVAL_MINUTES) * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["livescores-api"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_missing_key_is_fatal_for_rapidapi_providers() {
        let config = parse(&["--provider", "sportapi7", "--api-key", ""]);
        assert!(config.validate().is_err());

        let config = parse(&["--provider", "api-football", "--api-key", "abc"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_openligadb_needs_no_key() {
        let config = parse(&["--provider", "openligadb", "--api-key", ""]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = parse(&["--api-key", "abc", "--daily-call-limit", "0"]);
        assert!(config.validate().is_err());

        let config = parse(&["--api-key", "abc", "--provider-base-url", "not a url"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = parse(&[
            "--api-key",
            "abc",
            "--cache-ttl-minutes",
            "90",
            "--poll-interval-live-minutes",
            "5",
            "--poll-interval-idle-minutes",
            "30",
            "--request-delay-secs",
            "1",
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_settings().cache_ttl, chrono::Duration::minutes(90));
        assert_eq!(config.refresh_settings().request_delay, Duration::from_secs(1));
        let intervals = config.poll_intervals();
        assert_eq!(intervals.live, Duration::from_secs(300));
        assert_eq!(intervals.idle, Duration::from_secs(1800));
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        let huge = u64::MAX.to_string();
        let huge = huge.as_str();
        for flag in [
            "--cache-ttl-minutes",
            "--poll-interval-live-minutes",
            "--poll-interval-idle-minutes",
        ] {
            let config = parse(&["--api-key", "abc", flag, huge]);
            assert!(config.validate().is_err(), "{flag} accepted u64::MAX");
        }

        let config = parse(&["--api-key", "abc", "--cache-ttl-minutes", "10081"]);
        assert!(config.validate().is_err());
        let config = parse(&["--api-key", "abc", "--cache-ttl-minutes", "10080"]);
        assert!(config.validate().is_ok());

        let config = parse(&["--api-key", "abc", "--poll-interval-idle-minutes", "1441"]);
        assert!(config.validate().is_err());
        let config = parse(&["--api-key", "abc", "--auto-finish-minutes", "1441"]);
        assert!(config.validate().is_err());
        let config = parse(&["--api-key", "abc", "--pregame-buffer-minutes", "1441"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings_never_overflow() {
        let huge = u64::MAX.to_string();
        let huge = huge.as_str();
        let config = parse(&[
            "--api-key",
            "abc",
            "--cache-ttl-minutes",
            huge,
            "--poll-interval-live-minutes",
            huge,
        ]);
        assert_eq!(
            config.refresh_settings().cache_ttl,
            chrono::Duration::minutes(MAX_CACHE_TTL_MINUTES as i64)
        );
        assert!(config.refresh_settings().cache_ttl > chrono::Duration::zero());
        assert_eq!(
            config.poll_intervals().live,
            Duration::from_secs(MAX_POLL_INTERVAL_MINUTES * 60)
        );
    }
}
