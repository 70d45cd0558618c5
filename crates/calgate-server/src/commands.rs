use std::time::Duration;

use calgate_contracts::CacheStatus;
use calgate_kernel::{format_duration, parse_duration, DurationParseError};
use thiserror::Error;

pub const COMMAND_PREFIX: &str = "!gcal";

pub const USAGE: &str = "\
Usage:
!gcal help - show this message
!gcal status - report calendar and config cache ages
!gcal expire - mark both caches stale
!gcal reload - expire and refresh immediately
!gcal silence <duration> - silence notifications in this room, e.g. 4h or 1h30m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Expire,
    Reload,
    Silence(Duration),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("silence needs a duration, e.g. `!gcal silence 4h`")]
    MissingDuration,
    #[error("invalid duration {input:?}: {source}")]
    InvalidDuration {
        input: String,
        source: DurationParseError,
    },
    #[error("silence duration must be greater than zero")]
    ZeroDuration,
}

/// Parses a `!gcal` command. Returns `None` when the body is not addressed
/// to `!gcal` at all.
pub fn parse_command(body: &str) -> Option<Result<Command, CommandError>> {
    let mut words = body.split_whitespace();
    if words.next()? != COMMAND_PREFIX {
        return None;
    }

    let command = match words.next() {
        None | Some("help") => Ok(Command::Help),
        Some("status") => Ok(Command::Status),
        Some("expire") => Ok(Command::Expire),
        Some("reload") => Ok(Command::Reload),
        Some("silence") => parse_silence(&words.collect::<Vec<_>>().join(" ")),
        Some(_) => Ok(Command::Help),
    };
    Some(command)
}

fn parse_silence(arg: &str) -> Result<Command, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingDuration);
    }
    let duration = parse_duration(arg).map_err(|source| CommandError::InvalidDuration {
        input: arg.to_string(),
        source,
    })?;
    if duration.is_zero() {
        return Err(CommandError::ZeroDuration);
    }
    Ok(Command::Silence(duration))
}

pub fn status_reply(status: &CacheStatus) -> String {
    format!(
        "Calendar cache {}. Config cache {}.",
        describe_age(status.events_age_minutes),
        describe_age(status.config_age_minutes)
    )
}

fn describe_age(minutes: Option<f64>) -> String {
    match minutes {
        Some(m) => format!("is {m:.0} minutes old"),
        None => "has never been fetched".to_string(),
    }
}

pub fn silence_reply(duration: Duration) -> String {
    format!(
        "Calendar notifications silenced for {}.",
        format_duration(duration)
    )
}

pub fn unknown_room_reply(room_id: &str) -> String {
    format!("Room {room_id:?} is not registered for calendar notifications.")
}
