use std::time::Duration;

use calgate_contracts::Event;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const CONFIG_MAX_AGE: Duration = Duration::from_secs(10 * 60);
/// 1.1 hours. Longer than the refresh interval so a failing scheduler gets a
/// grace period before reads fetch synchronously.
pub const EVENTS_MAX_AGE: Duration = Duration::from_secs(66 * 60);
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const REFRESH_STARTUP_DELAY: Duration = Duration::from_secs(5);

pub const USER_SUPPRESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const ROOM_SUPPRESSION_TTL: Duration = Duration::from_secs(10 * 60);
pub const SILENCE_MARKER: &str = "-";

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

pub const PREF_CALENDAR_ID: &str = "calendar-id";
pub const PREF_AUTOREPLY: &str = "autoreply";
pub const PREF_ANNOUNCE_START: &str = "announce-start";
pub const PREF_ANNOUNCE_END: &str = "announce-end";
pub const PREF_TIMEZONE: &str = "timezone";
pub const PREF_KEYS: [&str; 5] = [
    PREF_CALENDAR_ID,
    PREF_AUTOREPLY,
    PREF_ANNOUNCE_START,
    PREF_ANNOUNCE_END,
    PREF_TIMEZONE,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("missing unit after {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    #[error("expected number before unit {0:?}")]
    MissingNumber(String),
    #[error("duration out of range")]
    OutOfRange,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid boolean {0:?}")]
pub struct BoolParseError(pub String);

/// An unfetched cache is always stale; otherwise stale once its age strictly
/// exceeds `max_age`.
pub fn is_stale(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match fetched_at {
        None => true,
        Some(ts) => (now - ts).num_milliseconds() > max_age.as_millis() as i64,
    }
}

/// `None` means never fetched.
pub fn age_minutes(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    fetched_at.map(|ts| (now - ts).num_milliseconds() as f64 / 60_000.0)
}

/// First event in stored order whose interior contains `now`.
pub fn find_active_event(events: &[Event], now: DateTime<Utc>) -> Option<&Event> {
    events.iter().find(|e| e.is_active_at(now))
}

pub fn notification_message(event: &Event) -> String {
    if event.description.is_empty() {
        format!("Calendar event: {:?}", event.name)
    } else {
        event.description.clone()
    }
}

pub fn user_suppression_key(user_id: &str, room_id: &str) -> String {
    format!("user:{user_id}:{room_id}")
}

pub fn room_suppression_key(room_id: &str) -> String {
    format!("room:{room_id}")
}

/// Accepts the same spellings as a typical `ParseBool`: 1/0, t/f, true/false
/// in lower, upper or title case.
pub fn parse_bool_pref(value: &str) -> Result<bool, BoolParseError> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(BoolParseError(other.to_string())),
    }
}

/// Parses `4h`, `30m`, `1h30m`, `90s`, `500ms`, `1.5h` and space separated
/// combinations such as `1h 30m`.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }
        if ch.is_whitespace() {
            continue;
        }

        let unit = if ch == 'm' && chars.peek() == Some(&'s') {
            chars.next();
            "ms".to_string()
        } else {
            ch.to_string()
        };
        if number.is_empty() {
            return Err(DurationParseError::MissingNumber(unit));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| DurationParseError::InvalidNumber(number.clone()))?;

        let seconds = match unit.as_str() {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            "d" => value * 86400.0,
            _ => return Err(DurationParseError::UnknownUnit(unit)),
        };
        let part =
            Duration::try_from_secs_f64(seconds).map_err(|_| DurationParseError::OutOfRange)?;
        total = total
            .checked_add(part)
            .ok_or(DurationParseError::OutOfRange)?;
        number.clear();
    }

    if !number.is_empty() {
        return Err(DurationParseError::MissingUnit(number));
    }
    Ok(total)
}

/// Compact rendering used in replies, e.g. `4h`, `1h30m`, `45s`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    if total_secs == 0 {
        return format!("{}ms", d.subsec_millis());
    }
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn event(name: &str, description: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            name: name.to_string(),
            description: description.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn never_fetched_is_stale() {
        assert!(is_stale(None, at(10, 0), CONFIG_MAX_AGE));
        assert!(is_stale(None, at(10, 0), EVENTS_MAX_AGE));
    }

    #[test]
    fn staleness_is_strictly_greater_than_threshold() {
        let fetched = Some(at(10, 0));
        assert!(!is_stale(fetched, at(10, 10), CONFIG_MAX_AGE));
        assert!(is_stale(fetched, at(10, 11), CONFIG_MAX_AGE));
        assert!(!is_stale(fetched, at(11, 6), EVENTS_MAX_AGE));
        assert!(is_stale(fetched, at(11, 7), EVENTS_MAX_AGE));
    }

    #[test]
    fn first_active_event_wins_when_overlapping() {
        let outer = event("outer", "", at(9, 0), at(12, 0));
        let inner = event("inner", "", at(10, 0), at(11, 0));
        let events = vec![outer.clone(), inner.clone()];
        assert_eq!(find_active_event(&events, at(10, 30)), Some(&outer));

        let events = vec![inner.clone(), outer];
        assert_eq!(find_active_event(&events, at(10, 30)), Some(&inner));
    }

    #[test]
    fn no_active_event_on_boundaries() {
        let events = vec![event("x", "", at(10, 0), at(11, 0))];
        assert!(find_active_event(&events, at(10, 0)).is_none());
        assert!(find_active_event(&events, at(11, 0)).is_none());
        assert!(find_active_event(&[], at(10, 30)).is_none());
    }

    #[test]
    fn message_prefers_description() {
        let e = event("Offsite", "Team is out today", at(10, 0), at(11, 0));
        assert_eq!(notification_message(&e), "Team is out today");
        let e = event("Offsite", "", at(10, 0), at(11, 0));
        assert_eq!(notification_message(&e), "Calendar event: \"Offsite\"");
    }

    #[test]
    fn suppression_keys() {
        assert_eq!(user_suppression_key("alice", "ops"), "user:alice:ops");
        assert_eq!(room_suppression_key("ops"), "room:ops");
    }

    #[test]
    fn bool_prefs() {
        assert_eq!(parse_bool_pref("true"), Ok(true));
        assert_eq!(parse_bool_pref("T"), Ok(true));
        assert_eq!(parse_bool_pref("0"), Ok(false));
        assert!(parse_bool_pref("yes").is_err());
        assert!(parse_bool_pref("").is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("4h"), Ok(Duration::from_secs(4 * 3600)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1h 30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert!(matches!(
            parse_duration("10"),
            Err(DurationParseError::MissingUnit(_))
        ));
        assert!(matches!(
            parse_duration("3y"),
            Err(DurationParseError::UnknownUnit(_))
        ));
        assert!(matches!(
            parse_duration("h"),
            Err(DurationParseError::MissingNumber(_))
        ));
        assert_eq!(
            parse_duration("99999999999999999999999d"),
            Err(DurationParseError::OutOfRange)
        );
    }

    #[test]
    fn duration_rendering() {
        assert_eq!(format_duration(Duration::from_secs(4 * 3600)), "4h");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn age_is_none_when_unfetched() {
        assert_eq!(age_minutes(None, at(10, 0)), None);
        assert_eq!(age_minutes(Some(at(10, 0)), at(10, 30)), Some(30.0));
    }
}
