//! Classification of raw server log lines into typed events
//!
//! The Valheim dedicated server writes an append-only text log through
//! Unity's logger. Every line the monitor cares about starts with the same
//! literal prefix and a UTC wall-clock timestamp:
//!
//! ```text
//! [Info   : Unity Log] 03/14/2021 15:09:26: Got connection SteamID 76561198000000001
//! ```
//!
//! Classification is first-match-wins over a fixed set of grammars. The three
//! "player event" kinds (connection complete, respawn, death) share one line
//! template and are told apart by a decision table over two numeric fields —
//! that table lives in [`classify_player_event`] rather than being encoded
//! into regex alternation, so it stays readable and directly testable.
//!
//! Classification never fails: a line matching no grammar (or one whose
//! numeric fields don't parse) degrades to [`LogEventKind::Ignored`]. Server
//! logs are full of lines the monitor has no use for, and that is normal.

use crate::events::{LogEvent, LogEventKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Prefix every recognized line carries: literal Unity tag, then the
/// `MM/DD/YYYY HH:MM:SS` timestamp, then the message body.
static PREFIXED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[Info   : Unity Log\] (\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}): (.*)$")
        .expect("prefix pattern is valid")
});

static CONNECTION_STARTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Got connection SteamID (\d+)$").expect("pattern is valid"));

/// Shared template for connection-complete, respawn and death lines. The
/// character name can contain spaces; the two trailing numbers are signed.
static PLAYER_EVENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Got character ZDOID from (.+) : (-?\d+):(-?\d+)$").expect("pattern is valid")
});

static DISCONNECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Closing socket (\d+)$").expect("pattern is valid"));

static WORLD_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Get create world (.+)$").expect("pattern is valid"));

static RANDOM_EVENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Random event set:(\S+)$").expect("pattern is valid"));

static DAY_STARTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Time -?[\d.]+, day:(\d+)\s+nextm:-?[\d.]+\s+skipspeed:-?[\d.]+$")
        .expect("pattern is valid")
});

static LOCATION_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Found location of type (.+)$").expect("pattern is valid"));

static DUNGEON_LOADED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Dungeon loaded \d+$").expect("pattern is valid"));

/// `mine:` is the server's own build, `remote` the connecting client's.
/// Versions look like `0.147.3@0.9.7`; captured verbatim, never parsed.
static VERSION_MISMATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Peer (\d+) has incompatible version, mine:(\S+) remote (\S+)$")
        .expect("pattern is valid")
});

const SERVER_START: &str = "Game server connected";
const SERVER_STOP: &str = "Net scene destroyed";

/// Classifies one raw log line into a typed event
///
/// `reference` is the caller's clock, used as the event timestamp only when
/// the line's own timestamp field cannot be parsed; the embedded timestamp
/// wins whenever it is valid. Never fails — anything unrecognized comes back
/// as `Ignored` carrying the raw line.
pub fn classify(line: &str, reference: DateTime<Utc>) -> LogEvent {
    let Some(caps) = PREFIXED_LINE.captures(line) else {
        return ignored(line, reference);
    };

    let timestamp = parse_timestamp(&caps[1]).unwrap_or(reference);
    match classify_body(&caps[2]) {
        Some(kind) => LogEvent::new(timestamp, kind),
        None => ignored(line, timestamp),
    }
}

fn ignored(line: &str, timestamp: DateTime<Utc>) -> LogEvent {
    LogEvent::new(
        timestamp,
        LogEventKind::Ignored {
            raw: line.to_string(),
        },
    )
}

/// Parses the server's `MM/DD/YYYY HH:MM:SS` wall clock, which is UTC
fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(field, "%m/%d/%Y %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Matches the message body against each grammar, first-match-wins
///
/// Returns `None` when no grammar matches or a matched line carries numeric
/// fields that don't parse (the caller degrades both to `Ignored`).
fn classify_body(body: &str) -> Option<LogEventKind> {
    if let Some(caps) = CONNECTION_STARTED.captures(body) {
        let steam_id = caps[1].parse().ok()?;
        return Some(LogEventKind::ConnectionStarted { steam_id });
    }

    if let Some(caps) = PLAYER_EVENT.captures(body) {
        let character = caps[1].to_string();
        let session_id = caps[2].parse().ok()?;
        let identifier = caps[3].parse().ok()?;
        return classify_player_event(character, session_id, identifier);
    }

    if let Some(caps) = DISCONNECTION.captures(body) {
        let steam_id = caps[1].parse().ok()?;
        return Some(LogEventKind::Disconnection { steam_id });
    }

    if let Some(caps) = WORLD_INFO.captures(body) {
        return Some(LogEventKind::WorldInfo {
            world_name: caps[1].to_string(),
        });
    }

    if body == SERVER_START {
        return Some(LogEventKind::ServerStart);
    }

    if body == SERVER_STOP {
        return Some(LogEventKind::ServerStop);
    }

    if let Some(caps) = RANDOM_EVENT.captures(body) {
        return Some(LogEventKind::RandomEvent {
            event: caps[1].to_string(),
        });
    }

    if let Some(caps) = DAY_STARTED.captures(body) {
        let day = caps[1].parse().ok()?;
        return Some(LogEventKind::DayStarted { day });
    }

    if let Some(caps) = LOCATION_FOUND.captures(body) {
        return Some(LogEventKind::LocationFound {
            location: caps[1].to_string(),
        });
    }

    if DUNGEON_LOADED.is_match(body) {
        return Some(LogEventKind::DungeonLoaded);
    }

    if let Some(caps) = VERSION_MISMATCH.captures(body) {
        let steam_id = caps[1].parse().ok()?;
        return Some(LogEventKind::VersionMismatch {
            steam_id,
            server_version: caps[2].to_string(),
            client_version: caps[3].to_string(),
        });
    }

    None
}

/// Decision table for the overloaded ZDOID template
///
/// The server logs connection completions, deaths and respawns through one
/// line shape; only the `session:identifier` pair tells them apart. Rules in
/// priority order:
///
/// | identifier | session  | meaning             |
/// |------------|----------|---------------------|
/// | 1          | any      | connection complete |
/// | 0          | 0        | death               |
/// | >= 0       | non-zero | respawn (identifier counts revives) |
/// | otherwise  |          | unrecognized        |
fn classify_player_event(character: String, session_id: i64, identifier: i64) -> Option<LogEventKind> {
    if identifier == 1 {
        return Some(LogEventKind::ConnectionComplete {
            session_id,
            character,
        });
    }

    if identifier == 0 && session_id == 0 {
        return Some(LogEventKind::Death {
            session_id,
            character,
        });
    }

    if identifier >= 0 && session_id != 0 {
        return Some(LogEventKind::Respawn {
            session_id,
            character,
            respawn_count: identifier,
        });
    }

    None
}
