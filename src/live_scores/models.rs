use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-scoped fixture identifier. SofaScore-style feeds use integers,
/// some feeds hand out strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchId {
    Int(i64),
    Str(String),
}

impl MatchId {
    /// Read an id from a JSON value holding either a number or a non-empty string.
    pub fn from_json(value: &serde_json::Value) -> Option<MatchId> {
        if let Some(n) = value.as_i64() {
            return Some(MatchId::Int(n));
        }
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Some(MatchId::Str(s.trim().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchId::Int(n) => write!(f, "{}", n),
            MatchId::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Halftime,
    Finished,
    Postponed,
}

impl MatchStatus {
    /// Live and half-time both count as "in play" for polling and reconciliation.
    pub fn is_in_play(self) -> bool {
        matches!(self, MatchStatus::Live | MatchStatus::Halftime)
    }
}

/// Frontend grouping bucket, assigned at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateLabel {
    Live,
    Today,
    Tomorrow,
    Yesterday,
    Finished,
}

impl DateLabel {
    /// Bucket for a calendar day relative to `today`. Anything further away
    /// than one day falls back to `Today`.
    pub fn for_day(day: NaiveDate, today: NaiveDate) -> DateLabel {
        match (day - today).num_days() {
            1 => DateLabel::Tomorrow,
            -1 => DateLabel::Yesterday,
            _ => DateLabel::Today,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MatchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl League {
    pub fn unknown() -> Self {
        League {
            name: UNKNOWN.to_string(),
            country: None,
            logo: None,
        }
    }
}

pub const UNKNOWN: &str = "Unknown";

/// One normalized fixture, as cached and served on `/scores`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub home_team: Team,
    pub away_team: Team,
    pub home_score: u32,
    pub away_score: u32,
    pub home_score_ht: u32,
    pub away_score_ht: u32,
    pub league: League,
    /// Kickoff as Unix seconds
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<i64>,
    pub status: MatchStatus,
    /// Live clock label such as "45'" or "2nd half"
    #[serde(rename = "time", skip_serializing_if = "Option::is_none")]
    pub display_clock: Option<String>,
    #[serde(rename = "date")]
    pub date_label: DateLabel,
}
