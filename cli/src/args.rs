//! Argument parsing helpers

use chrono::{DateTime, NaiveDateTime};

/// Parse an election time.
///
/// Accepts unix seconds, RFC 3339 (`2025-07-01T12:00:00Z`), a UTC
/// `YYYY-MM-DD HH:MM` stamp, or an offset from `now` such as `+90m`,
/// `+1h`, `+7d`.
pub fn parse_time(raw: &str, now: i64) -> Result<i64, String> {
    let raw = raw.trim();
    if let Some(offset) = raw.strip_prefix('+') {
        let secs = parse_offset(offset)?;
        return now
            .checked_add(secs)
            .ok_or_else(|| format!("offset {:?} is too large", offset));
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc().timestamp());
    }
    Err(format!(
        "invalid time {:?}: use unix seconds, RFC 3339, \"YYYY-MM-DD HH:MM\" or +N[s|m|h|d]",
        raw
    ))
}

fn parse_offset(offset: &str) -> Result<i64, String> {
    let split = offset.char_indices().last().map_or(0, |(i, _)| i);
    let (digits, unit) = offset.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("invalid offset {:?}", offset))?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return Err(format!("unknown unit in offset {:?}", offset)),
    };
    amount
        .checked_mul(scale)
        .ok_or_else(|| format!("offset {:?} is too large", offset))
}
