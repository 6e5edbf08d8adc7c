//! The polling reconciliation loop
//!
//! [`ServerMonitor`] ties the pieces together: each `poll()` fetches the full
//! log text from the injected [`LogSource`], classifies every line it has not
//! seen before, and applies the resulting events in log order to the
//! [`PlayerRegistry`]. A remembered line offset makes repeated polls over the
//! same (append-only) log idempotent.
//!
//! Nothing a poll encounters is allowed to escape it: fetch failures count as
//! "no new data this cycle" and are retried on the next tick, unparseable
//! lines were already degraded to `Ignored` by the classifier, and registry
//! edge cases (unmatched disconnects, completions with nothing pending) are
//! absorbed where they occur.

use crate::registry::PlayerRegistry;
use crate::sources::{IdentityResolver, LogSource};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use shared::classifier::classify;
use shared::events::{LogEvent, LogEventKind};

/// Drives log ingestion and owns everything derived from it
///
/// The caller is expected to invoke [`poll`](Self::poll) from a single
/// periodic task; `&mut self` enforces that no two polls overlap.
pub struct ServerMonitor {
    source: Box<dyn LogSource>,
    registry: PlayerRegistry,
    /// Number of log lines already processed. Monotonic: it only advances
    /// when a poll actually saw new lines, so a failed or empty fetch leaves
    /// the same lines to be picked up next cycle.
    lines_seen: usize,
    world_name: Option<String>,
    current_day: Option<u32>,
    history: Vec<LogEvent>,
}

impl ServerMonitor {
    pub fn new(source: Box<dyn LogSource>, resolver: Box<dyn IdentityResolver>) -> Self {
        Self {
            source,
            registry: PlayerRegistry::new(resolver),
            lines_seen: 0,
            world_name: None,
            current_day: None,
            history: Vec::new(),
        }
    }

    /// Runs one poll cycle; returns the number of events recorded
    ///
    /// Zero means nothing changed: the fetch failed, the log had no new
    /// lines, or every new line was noise.
    pub fn poll(&mut self) -> usize {
        let text = match self.source.fetch_full_text() {
            Ok(text) => text,
            Err(error) => {
                warn!("Log fetch failed, treating as no new data: {}", error);
                return 0;
            }
        };

        let lines: Vec<&str> = text.lines().collect();
        if lines.len() <= self.lines_seen {
            debug!("No new log lines ({} seen)", self.lines_seen);
            return 0;
        }

        let reference = Utc::now();
        let mut recorded = 0;
        for line in &lines[self.lines_seen..] {
            let event = classify(line, reference);
            if self.apply(event) {
                recorded += 1;
            }
        }

        info!(
            "Processed {} new log lines, {} events recorded",
            lines.len() - self.lines_seen,
            recorded
        );
        self.lines_seen = lines.len();
        recorded
    }

    /// Applies one event's side effects; true if it entered the history
    fn apply(&mut self, event: LogEvent) -> bool {
        let timestamp = event.timestamp;
        match &event.kind {
            LogEventKind::ConnectionStarted { steam_id } => {
                self.registry.connection_started(*steam_id, timestamp);
            }
            LogEventKind::ConnectionComplete { session_id, character } => {
                self.registry.player_connected(*session_id, character, timestamp);
            }
            LogEventKind::Respawn {
                session_id,
                character,
                ..
            } => {
                // Some log variants record a first connection as a respawn.
                // No online connection under this session means exactly that,
                // so the event is processed as a completion instead.
                if self.registry.connected_by_session(*session_id).is_none() {
                    info!(
                        "Respawn for unseen session {}; treating as connection of {}",
                        session_id, character
                    );
                    self.registry.player_connected(*session_id, character, timestamp);
                }
            }
            LogEventKind::Death { session_id, character } => {
                self.registry.record_death(*session_id, character);
            }
            LogEventKind::Disconnection { steam_id } => {
                self.registry.player_disconnected(*steam_id);
            }
            LogEventKind::WorldInfo { world_name } => {
                info!("Server world: {}", world_name);
                self.world_name = Some(world_name.clone());
            }
            LogEventKind::DayStarted { day } => {
                self.current_day = Some(*day);
            }
            // history-only kinds
            LogEventKind::ServerStart
            | LogEventKind::ServerStop
            | LogEventKind::RandomEvent { .. }
            | LogEventKind::LocationFound { .. }
            | LogEventKind::VersionMismatch { .. } => {}
            LogEventKind::DungeonLoaded | LogEventKind::Ignored { .. } => return false,
        }

        let recordable = event.kind.is_recordable();
        if recordable {
            self.history.push(event);
        }
        recordable
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn world_name(&self) -> Option<&str> {
        self.world_name.as_deref()
    }

    pub fn current_day(&self) -> Option<u32> {
        self.current_day
    }

    /// Every recorded event, in the order it was applied
    pub fn history(&self) -> &[LogEvent] {
        &self.history
    }

    /// Point-in-time view of the server, ready for presentation layers
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let online = self
            .registry
            .online_connections()
            .into_iter()
            .map(|connection| {
                let character = connection.character.clone().unwrap_or_default();
                let deaths = self
                    .registry
                    .character_by_name(&character)
                    .map(|c| c.deaths)
                    .unwrap_or(0);
                let player = self
                    .registry
                    .profile(connection.steam_id)
                    .map(|profile| profile.display_name.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                OnlinePlayer {
                    character,
                    player,
                    deaths,
                }
            })
            .collect();

        StatusSnapshot {
            world_name: self.world_name.clone(),
            current_day: self.current_day,
            online,
        }
    }
}

/// What the server looks like right now
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub world_name: Option<String>,
    pub current_day: Option<u32>,
    pub online: Vec<OnlinePlayer>,
}

/// One online character and the identity behind it
#[derive(Debug, Clone, Serialize)]
pub struct OnlinePlayer {
    pub character: String,
    pub player: String,
    pub deaths: u32,
}
