use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::models::{DateLabel, Match};
use super::normalize::{
    check_record_shape, i64_at, league_at, match_id_or_warn, str_at, team_at, u32_at,
};
use super::provider::{build_http_client, get_json, records_at, FetchError, ScoreProvider};
use super::status::{classify, StatusPolicy, StatusSignals};

const NAME: &str = "API-Football";
const RAPIDAPI_HOST: &str = "api-football-v1.p.rapidapi.com";
const DEFAULT_BASE_URL: &str = "https://api-football-v1.p.rapidapi.com/v3";

/// Scores provider backed by API-Football v3 through RapidAPI.
/// Docs: <https://www.api-football.com/documentation-v3>
pub struct ApiFootball {
    http: Client,
    api_key: String,
    base_url: String,
    policy: StatusPolicy,
}

impl ApiFootball {
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        timeout: Duration,
        policy: StatusPolicy,
    ) -> Result<Self> {
        Ok(ApiFootball {
            http: build_http_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
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
impl ScoreProvider for ApiFootball {
    async fn fetch_live(&self) -> Result<Vec<Value>, FetchError> {
        let raw = self.get("/fixtures?live=all").await?;
        Ok(records_at(&raw, "response"))
    }

    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Value>, FetchError> {
        let raw = self
            .get(&format!("/fixtures?date={}", date.format("%Y-%m-%d")))
            .await?;
        Ok(records_at(&raw, "response"))
    }

    async fn fetch_stats(&self, match_id: &str) -> Result<Value, FetchError> {
        self.get(&format!("/fixtures/statistics?fixture={}", match_id))
            .await
    }

    fn normalize(&self, raw: &Value, label: DateLabel, now: DateTime<Utc>) -> Match {
        normalize_fixture(raw, label, now, &self.policy)
    }

    fn name(&self) -> &str {
        NAME
    }

    fn host(&self) -> &str {
        RAPIDAPI_HOST
    }
}

/// Read `fixture.status.short` into classifier flags.
pub fn status_signals(short: &str) -> StatusSignals {
    StatusSignals {
        finished: matches!(short, "FT" | "AET" | "PEN" | "AWD" | "WO"),
        live: matches!(short, "1H" | "2H" | "ET" | "BT" | "P" | "LIVE" | "INT"),
        halftime: short == "HT",
        postponed: matches!(short, "PST" | "CANC" | "ABD" | "SUSP"),
        realtime: true,
    }
}

pub fn normalize_fixture(
    raw: &Value,
    label: DateLabel,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> Match {
    check_record_shape(raw, NAME);

    let kickoff = i64_at(raw, "/fixture/timestamp").filter(|ts| *ts > 0);
    let short = str_at(raw, "/fixture/status/short").unwrap_or_default();
    let status = classify(status_signals(&short), kickoff, now, policy);
    let display_clock = match u32_at(raw, "/fixture/status/elapsed") {
        Some(minute) if status.is_in_play() => Some(format!("{}'", minute)),
        _ => str_at(raw, "/fixture/status/long"),
    };

    Match {
        id: match_id_or_warn(raw, "/fixture/id", NAME),
        home_team: team_at(raw, "/teams/home/name", "/teams/home/id", "/teams/home/logo"),
        away_team: team_at(raw, "/teams/away/name", "/teams/away/id", "/teams/away/logo"),
        home_score: u32_at(raw, "/goals/home").unwrap_or(0),
        away_score: u32_at(raw, "/goals/away").unwrap_or(0),
        home_score_ht: u32_at(raw, "/score/halftime/home").unwrap_or(0),
        away_score_ht: u32_at(raw, "/score/halftime/away").unwrap_or(0),
        league: league_at(raw, "/league/name", "/league/country", "/league/logo"),
        kickoff,
        status,
        display_clock,
        date_label: label,
    }
}
