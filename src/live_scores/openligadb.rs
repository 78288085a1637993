use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::models::{DateLabel, League, Match};
use super::normalize::{bool_at, check_record_shape, match_id_or_warn, str_at, team_at, u32_at};
use super::provider::{build_http_client, get_json, FetchError, ScoreProvider};
use super::status::{classify, StatusPolicy, StatusSignals};

const NAME: &str = "OpenLigaDB";
const HOST: &str = "api.openligadb.de";
const DEFAULT_BASE_URL: &str = "https://api.openligadb.de";

/// OpenLigaDB result type ids
const RESULT_HALFTIME: u64 = 1;
const RESULT_FINAL: u64 = 2;

/// Keyless provider for German leagues. It only flags finished matches, so
/// live status comes from the kickoff-time fallback.
pub struct OpenLigaDb {
    http: Client,
    base_url: String,
    /// League shortcut, e.g. "bl1"
    league: String,
    policy: StatusPolicy,
}

impl OpenLigaDb {
    pub fn new(
        league: &str,
        base_url: Option<&str>,
        timeout: Duration,
        policy: StatusPolicy,
    ) -> Result<Self> {
        Ok(OpenLigaDb {
            http: build_http_client(timeout)?,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            league: league.to_string(),
            policy,
        })
    }

    async fn get_matches(&self, endpoint: &str) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let raw = get_json(&self.http, &url, &[]).await?;
        match raw {
            Value::Array(items) => Ok(items),
            other => Err(FetchError::Decode(format!(
                "expected a match array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Seasons are named after the year they start in; they roll over in July.
fn season_for(date: NaiveDate) -> i32 {
    if date.month() >= 7 {
        date.year()
    } else {
        date.year() - 1
    }
}

fn kickoff_of(raw: &Value) -> Option<i64> {
    str_at(raw, "/matchDateTimeUTC")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.timestamp())
}

fn result_of(raw: &Value, result_type: u64) -> Option<(u32, u32)> {
    raw.get("matchResults")?
        .as_array()?
        .iter()
        .find(|r| r.get("resultTypeID").and_then(Value::as_u64) == Some(result_type))
        .map(|r| {
            (
                u32_at(r, "/pointsTeam1").unwrap_or(0),
                u32_at(r, "/pointsTeam2").unwrap_or(0),
            )
        })
}

/// Running score of a match in progress: the last goal carries the score.
fn score_from_goals(raw: &Value) -> Option<(u32, u32)> {
    let last = raw.get("goals")?.as_array()?.last()?;
    Some((
        u32_at(last, "/scoreTeam1").unwrap_or(0),
        u32_at(last, "/scoreTeam2").unwrap_or(0),
    ))
}

#[async_trait]
impl ScoreProvider for OpenLigaDb {
    /// No live feed exists; the current matchday stands in for it and the
    /// normalizer decides which of its matches are in play.
    async fn fetch_live(&self) -> Result<Vec<Value>, FetchError> {
        self.get_matches(&format!("/getmatchdata/{}", self.league))
            .await
    }

    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Value>, FetchError> {
        let season = self
            .get_matches(&format!("/getmatchdata/{}/{}", self.league, season_for(date)))
            .await?;
        Ok(season
            .into_iter()
            .filter(|raw| {
                kickoff_of(raw)
                    .and_then(|ts| DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.date_naive() == date)
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn fetch_stats(&self, _match_id: &str) -> Result<Value, FetchError> {
        Err(FetchError::Unsupported(NAME))
    }

    fn normalize(&self, raw: &Value, label: DateLabel, now: DateTime<Utc>) -> Match {
        normalize_match(raw, label, now, &self.policy)
    }

    fn name(&self) -> &str {
        NAME
    }

    fn host(&self) -> &str {
        HOST
    }
}

pub fn normalize_match(
    raw: &Value,
    label: DateLabel,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> Match {
    check_record_shape(raw, NAME);

    let kickoff = kickoff_of(raw);
    let signals = StatusSignals {
        finished: bool_at(raw, "/matchIsFinished").unwrap_or(false),
        ..Default::default()
    };
    let (home_score, away_score) = result_of(raw, RESULT_FINAL)
        .or_else(|| score_from_goals(raw))
        .unwrap_or((0, 0));
    let (home_score_ht, away_score_ht) = result_of(raw, RESULT_HALFTIME).unwrap_or((0, 0));

    Match {
        id: match_id_or_warn(raw, "/matchID", NAME),
        home_team: team_at(raw, "/team1/teamName", "/team1/teamId", "/team1/teamIconUrl"),
        away_team: team_at(raw, "/team2/teamName", "/team2/teamId", "/team2/teamIconUrl"),
        home_score,
        away_score,
        home_score_ht,
        away_score_ht,
        league: str_at(raw, "/leagueName")
            .map(|name| League {
                name,
                country: None,
                logo: None,
            })
            .unwrap_or_else(League::unknown),
        kickoff,
        status: classify(signals, kickoff, now, policy),
        display_clock: None,
        date_label: label,
    }
}
