//! Typed events extracted from the server log
//!
//! Every recognized log line maps to exactly one [`LogEventKind`]. The kinds
//! mirror what the Valheim dedicated server actually writes; payload fields
//! carry only what downstream consumers need (the registry for lifecycle
//! kinds, presentation layers for the informational ones).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A classified log line: when it happened and what it means
///
/// The timestamp is taken from the line itself (the server logs UTC wall
/// clock); a reference clock is substituted only when the field is
/// unparseable, so event ordering always follows line order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: LogEventKind,
}

impl LogEvent {
    pub fn new(timestamp: DateTime<Utc>, kind: LogEventKind) -> Self {
        Self { timestamp, kind }
    }
}

/// What a single log line means to the monitor
///
/// Enumeration order matters: the classifier tries grammars first-match-wins
/// in this order, and the three player-event kinds (connect, respawn, death)
/// share one line template distinguished only by numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEventKind {
    /// A Steam identity began a connection handshake
    ConnectionStarted { steam_id: u64 },
    /// Handshake succeeded; the named character is now online
    ConnectionComplete { session_id: i64, character: String },
    /// Either an already-online character respawned, or a first connection
    /// whose completion was logged under this shape (see the monitor's
    /// reclassification rule)
    Respawn {
        session_id: i64,
        character: String,
        respawn_count: i64,
    },
    /// The character died (session id and identifier both zero in the log)
    Death { session_id: i64, character: String },
    /// A Steam identity's socket closed
    Disconnection { steam_id: u64 },
    /// The server announced which world it is hosting
    WorldInfo { world_name: String },
    /// Server process came up
    ServerStart,
    /// Server process is going down
    ServerStop,
    /// A world random event triggered (internal codename, e.g. "wolves")
    RandomEvent { event: String },
    /// The in-game day counter advanced
    DayStarted { day: u32 },
    /// A point of interest was generated/discovered
    LocationFound { location: String },
    /// Informational only; never mutates registry state
    DungeonLoaded,
    /// A connecting client runs a different build than the server. Both
    /// version strings are kept verbatim; nobody parses them.
    VersionMismatch {
        steam_id: u64,
        client_version: String,
        server_version: String,
    },
    /// Line matched no known grammar. Not an error; server logs are mostly
    /// noise from the monitor's point of view.
    Ignored { raw: String },
}

impl LogEventKind {
    /// True for kinds the monitor keeps in its event history
    ///
    /// `Ignored` lines are noise and `DungeonLoaded` carries no payload
    /// anyone has asked for; everything else is worth an audit trail entry.
    pub fn is_recordable(&self) -> bool {
        !matches!(self, LogEventKind::Ignored { .. } | LogEventKind::DungeonLoaded)
    }
}
