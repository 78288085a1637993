use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::models::{DateLabel, League, Match, Team, UNKNOWN};
use super::normalize::{check_record_shape, i64_at, id_at, match_id_or_warn, str_at, u32_at};
use super::provider::{build_http_client, get_json, records_at, FetchError, ScoreProvider};
use super::status::{classify, StatusPolicy, StatusSignals};

const NAME: &str = "SportAPI7";
const RAPIDAPI_HOST: &str = "sportapi7.p.rapidapi.com";
const DEFAULT_BASE_URL: &str = "https://sportapi7.p.rapidapi.com";
const IMAGE_BASE_URL: &str = "https://img.sofascore.com/api/v1";

/// Scores provider backed by SportAPI7 on RapidAPI (SofaScore data model).
pub struct SportApi7 {
    http: Client,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: String,
    sport: String,
    policy: StatusPolicy,
}

impl SportApi7 {
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        sport: &str,
        timeout: Duration,
        policy: StatusPolicy,
    ) -> Result<Self> {
        Ok(SportApi7 {
            http: build_http_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            sport: sport.to_string(),
            policy,
        })
    }

    async fn get(&self, endpoint: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        get_json(
            &self.http,
            &url,
            &[
                ("x-rapidapi-host", RAPIDAPI_HOST),
                ("x-rapidapi-key", self.api_key.as_str()),
            ],
        )
        .await
    }
}

#[async_trait]
impl ScoreProvider for SportApi7 {
    async fn fetch_live(&self) -> Result<Vec<Value>, FetchError> {
        let raw = self
            .get(&format!("/api/v1/sport/{}/events/live", self.sport))
            .await?;
        Ok(records_at(&raw, "events"))
    }

    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Value>, FetchError> {
        let raw = self
            .get(&format!(
                "/api/v1/sport/{}/scheduled-events/{}",
                self.sport,
                date.format("%Y-%m-%d")
            ))
            .await?;
        Ok(records_at(&raw, "events"))
    }

    async fn fetch_stats(&self, match_id: &str) -> Result<Value, FetchError> {
        self.get(&format!("/api/v1/event/{}/statistics", match_id))
            .await
    }

    fn normalize(&self, raw: &Value, label: DateLabel, now: DateTime<Utc>) -> Match {
        normalize_event(raw, label, now, &self.policy)
    }

    fn name(&self) -> &str {
        NAME
    }

    fn host(&self) -> &str {
        RAPIDAPI_HOST
    }
}

/// Read SofaScore `status.code` / `status.type` into classifier flags.
///
/// Codes: 6/7 halves, 31–34 breaks, 41/42 extra time, 50 penalties,
/// 60 postponed, 70 cancelled, 90 abandoned, 100/110/120 ended (FT/AET/AP).
pub fn status_signals(code: i64, kind: &str) -> StatusSignals {
    let halftime = matches!(code, 31..=34) || kind == "halftime";
    StatusSignals {
        finished: kind == "finished" || matches!(code, 100 | 110 | 120),
        live: !halftime && (kind == "inprogress" || matches!(code, 6 | 7 | 41 | 42 | 50)),
        halftime,
        postponed: matches!(kind, "postponed" | "canceled" | "cancelled")
            || matches!(code, 60 | 70 | 90),
        realtime: true,
    }
}

fn team(raw: &Value, side: &str) -> Team {
    let id = id_at(raw, &format!("/{side}/id"));
    Team {
        name: str_at(raw, &format!("/{side}/name")).unwrap_or_else(|| UNKNOWN.to_string()),
        logo: id.as_ref().map(|id| format!("{IMAGE_BASE_URL}/team/{id}/image")),
        id,
    }
}

fn league(raw: &Value) -> League {
    let logo_id = id_at(raw, "/tournament/uniqueTournament/id").or_else(|| id_at(raw, "/tournament/id"));
    League {
        name: str_at(raw, "/tournament/name").unwrap_or_else(|| UNKNOWN.to_string()),
        country: str_at(raw, "/tournament/category/name"),
        logo: logo_id.map(|id| format!("{IMAGE_BASE_URL}/unique-tournament/{id}/image")),
    }
}

pub fn normalize_event(
    raw: &Value,
    label: DateLabel,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> Match {
    check_record_shape(raw, NAME);

    let kickoff = i64_at(raw, "/startTimestamp").filter(|ts| *ts > 0);
    let signals = status_signals(
        i64_at(raw, "/status/code").unwrap_or(0),
        str_at(raw, "/status/type").as_deref().unwrap_or(""),
    );

    Match {
        id: match_id_or_warn(raw, "/id", NAME),
        home_team: team(raw, "homeTeam"),
        away_team: team(raw, "awayTeam"),
        home_score: u32_at(raw, "/homeScore/current").unwrap_or(0),
        away_score: u32_at(raw, "/awayScore/current").unwrap_or(0),
        home_score_ht: u32_at(raw, "/homeScore/period1").unwrap_or(0),
        away_score_ht: u32_at(raw, "/awayScore/period1").unwrap_or(0),
        league: league(raw),
        kickoff,
        status: classify(signals, kickoff, now, policy),
        display_clock: str_at(raw, "/status/description"),
        date_label: label,
    }
}
