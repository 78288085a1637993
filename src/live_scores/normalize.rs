//! Lenient JSON accessors shared by the provider normalizers.
//!
//! Providers disagree on whether numbers arrive as numbers or strings and on
//! which fields are present at all; every accessor here returns `None`
//! instead of failing so a normalizer can fall back to a default per field.

use serde_json::Value;
use tracing::warn;

use super::models::{League, MatchId, Team, UNKNOWN};

/// Non-negative integer at a JSON pointer, accepting `3` or `"3"`.
pub fn u32_at(raw: &Value, pointer: &str) -> Option<u32> {
    let v = raw.pointer(pointer)?;
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .and_then(|n| u32::try_from(n).ok())
}

pub fn i64_at(raw: &Value, pointer: &str) -> Option<i64> {
    let v = raw.pointer(pointer)?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Non-empty, trimmed string at a JSON pointer.
pub fn str_at(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn bool_at(raw: &Value, pointer: &str) -> Option<bool> {
    raw.pointer(pointer).and_then(Value::as_bool)
}

pub fn id_at(raw: &Value, pointer: &str) -> Option<MatchId> {
    raw.pointer(pointer).and_then(MatchId::from_json)
}

/// Fixture id, or a zero id plus a warning when the record has none.
pub fn match_id_or_warn(raw: &Value, pointer: &str, provider: &str) -> MatchId {
    match id_at(raw, pointer) {
        Some(id) => id,
        None => {
            warn!("{}: record without an id, keeping it as id 0", provider);
            MatchId::Int(0)
        }
    }
}

/// Log records that are not JSON objects; the caller still emits a default
/// match for them.
pub fn check_record_shape(raw: &Value, provider: &str) -> bool {
    if raw.is_object() {
        true
    } else {
        warn!("{}: malformed record (expected object): {}", provider, raw);
        false
    }
}

/// Team from `name`, `id` and `logo` pointers under a common prefix.
pub fn team_at(raw: &Value, name: &str, id: &str, logo: &str) -> Team {
    Team {
        name: str_at(raw, name).unwrap_or_else(|| UNKNOWN.to_string()),
        id: id_at(raw, id),
        logo: str_at(raw, logo),
    }
}

pub fn league_at(raw: &Value, name: &str, country: &str, logo: &str) -> League {
    League {
        name: str_at(raw, name).unwrap_or_else(|| UNKNOWN.to_string()),
        country: str_at(raw, country),
        logo: str_at(raw, logo),
    }
}
