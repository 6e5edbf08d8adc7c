//! Authoritative in-memory model of who is on the server
//!
//! The registry owns every identity, character and connection the monitor
//! knows about and is the only place any of them is mutated. It is fed one
//! classified event at a time, in log order, by the monitor's poll loop:
//!
//! - identities ([`SteamProfile`]) are created on first reference and kept
//!   forever; display names come from the injected [`IdentityResolver`] and
//!   are cached, except that failed resolutions are retried on the next
//!   appearance of the same id
//! - characters ([`Character`]) are keyed case-insensitively by name and
//!   persist after disconnect (a character stays "known" with its death
//!   count for the life of the process)
//! - live connections are double-indexed: by session id (what death and
//!   respawn lines carry) and by Steam id (what disconnect lines carry)
//!
//! Start/complete matching is delegated to the FIFO
//! [`PendingConnectionTracker`](crate::pending::PendingConnectionTracker);
//! see that module for why order is the only available correlation key.

use crate::pending::{PendingConnectionTracker, PlayerConnection};
use crate::sources::IdentityResolver;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Steam id used for connections whose handshake predates monitoring
///
/// When a completion arrives with nothing pending, the registry synthesizes
/// a pending entry under this reserved id instead of dropping the event:
/// showing an online player with an unknown identity beats silently losing
/// them.
pub const UNKNOWN_STEAM_ID: u64 = 0;

const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

/// A player's public identity, as resolved once per Steam id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SteamProfile {
    pub steam_id: u64,
    pub display_name: String,
    pub profile_url: Option<String>,
    /// Every character name ever seen completing a connection under this
    /// identity, in first-observed order, no duplicates
    pub characters: Vec<String>,
}

impl SteamProfile {
    fn placeholder(steam_id: u64) -> Self {
        Self {
            steam_id,
            display_name: UNKNOWN_DISPLAY_NAME.to_string(),
            profile_url: None,
            characters: Vec::new(),
        }
    }

    /// Appends a character name if this profile has not seen it yet
    fn record_character(&mut self, name: &str) {
        let known = self
            .characters
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(name));
        if !known {
            self.characters.push(name.to_string());
        }
    }
}

/// A character as the world knows it
///
/// Identified by name (case-insensitive); the session id is only valid for
/// the current connection and changes on every reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Character {
    /// Name with the casing it was first observed under
    pub name: String,
    /// Session id from the most recent connection that bound this character
    pub session_id: i64,
    pub deaths: u32,
}

/// Single coherent container for all player state
pub struct PlayerRegistry {
    resolver: Box<dyn IdentityResolver>,
    profiles: HashMap<u64, SteamProfile>,
    /// Ids whose resolution succeeded; failures stay out so they retry
    resolved: HashSet<u64>,
    /// Keyed by lowercased name
    characters: HashMap<String, Character>,
    pending: PendingConnectionTracker,
    /// ONLINE connections by session id
    online: HashMap<i64, PlayerConnection>,
    /// Secondary index into `online`: Steam id -> session id
    session_by_steam: HashMap<u64, i64>,
}

impl PlayerRegistry {
    pub fn new(resolver: Box<dyn IdentityResolver>) -> Self {
        Self {
            resolver,
            profiles: HashMap::new(),
            resolved: HashSet::new(),
            characters: HashMap::new(),
            pending: PendingConnectionTracker::new(),
            online: HashMap::new(),
            session_by_steam: HashMap::new(),
        }
    }

    /// Handles a connection-started event: identity in, handshake pending
    pub fn connection_started(&mut self, steam_id: u64, timestamp: DateTime<Utc>) {
        self.ensure_profile(steam_id);
        self.pending.add_pending(steam_id, timestamp);
    }

    /// Handles a connection-complete event: binds a character to the
    /// earliest pending handshake
    ///
    /// Creates the character on first sight of the name. When nothing is
    /// pending (the handshake happened before monitoring began), a pending
    /// entry under [`UNKNOWN_STEAM_ID`] is synthesized first so the player
    /// still shows up online.
    pub fn player_connected(&mut self, session_id: i64, character_name: &str, timestamp: DateTime<Utc>) {
        let key = character_name.to_lowercase();
        self.characters
            .entry(key)
            .and_modify(|character| character.session_id = session_id)
            .or_insert_with(|| Character {
                name: character_name.to_string(),
                session_id,
                deaths: 0,
            });

        if self.pending.is_empty() {
            warn!(
                "Completion for {} with no pending handshake; assuming it predates monitoring",
                character_name
            );
            self.profiles
                .entry(UNKNOWN_STEAM_ID)
                .or_insert_with(|| SteamProfile::placeholder(UNKNOWN_STEAM_ID));
            self.pending.add_pending(UNKNOWN_STEAM_ID, timestamp);
        }

        let Ok(connection) = self.pending.complete_earliest(character_name, timestamp) else {
            // guarded above; nothing sensible left to do if it still fails
            return;
        };

        if let Some(profile) = self.profiles.get_mut(&connection.steam_id) {
            profile.record_character(character_name);
        }

        // An identity that completes again while still ONLINE reconnected
        // before its old socket close was logged; the old session is dead.
        // Evict it, or it would lose its Steam-id index here and stay ONLINE
        // forever. The reserved unknown id is exempt: several pre-monitoring
        // players can legitimately share it.
        if connection.steam_id != UNKNOWN_STEAM_ID {
            if let Some(stale_session) = self.session_by_steam.remove(&connection.steam_id) {
                if self.online.remove(&stale_session).is_some() {
                    info!(
                        "Evicted stale session {} for Steam id {} on reconnect",
                        stale_session, connection.steam_id
                    );
                }
            }
        }

        self.session_by_steam.insert(connection.steam_id, session_id);
        self.online.insert(session_id, connection);
    }

    /// Handles a disconnection event for the given Steam id
    ///
    /// Removes an ONLINE connection (both indices together) or, failing
    /// that, abandons a still-pending handshake. Returns the removed
    /// connection; `None` means the id was never observed connecting, which
    /// happens naturally when monitoring starts mid-session.
    pub fn player_disconnected(&mut self, steam_id: u64) -> Option<PlayerConnection> {
        if let Some(session_id) = self.session_by_steam.remove(&steam_id) {
            let connection = self.online.remove(&session_id);
            if let Some(ref connection) = connection {
                info!(
                    "{} went offline (Steam id {})",
                    connection.character.as_deref().unwrap_or(UNKNOWN_DISPLAY_NAME),
                    steam_id
                );
            }
            return connection;
        }

        if let Some(connection) = self.pending.fail_pending(steam_id) {
            return Some(connection);
        }

        debug!("Disconnect for Steam id {} with no tracked connection", steam_id);
        None
    }

    /// Records a death against whichever character the event identifies
    ///
    /// Prefers the character bound to the event's session; death lines carry
    /// session 0 though, so the usual path is the case-insensitive name
    /// lookup. A death naming an unknown character is dropped.
    pub fn record_death(&mut self, session_id: i64, character_name: &str) {
        let by_session = self
            .online
            .get(&session_id)
            .and_then(|connection| connection.character.clone());

        let key = match by_session {
            Some(name) => name.to_lowercase(),
            None => character_name.to_lowercase(),
        };

        match self.characters.get_mut(&key) {
            Some(character) => {
                character.deaths += 1;
                info!("{} died ({} deaths total)", character.name, character.deaths);
            }
            None => debug!("Death for unknown character {}; dropped", character_name),
        }
    }

    /// Resolves and caches the identity for a Steam id
    ///
    /// The resolver is consulted once per id; on failure the profile exists
    /// as an Unknown placeholder and the id stays unresolved so a later
    /// reference retries. The reserved unknown id is never resolved.
    fn ensure_profile(&mut self, steam_id: u64) {
        if steam_id == UNKNOWN_STEAM_ID || self.resolved.contains(&steam_id) {
            self.profiles
                .entry(steam_id)
                .or_insert_with(|| SteamProfile::placeholder(steam_id));
            return;
        }

        match self.resolver.resolve(steam_id) {
            Ok(identity) => {
                let profile = self
                    .profiles
                    .entry(steam_id)
                    .or_insert_with(|| SteamProfile::placeholder(steam_id));
                profile.display_name = identity.display_name;
                profile.profile_url = identity.profile_url;
                self.resolved.insert(steam_id);
            }
            Err(error) => {
                warn!("Identity resolution for {} failed: {}", steam_id, error);
                self.profiles
                    .entry(steam_id)
                    .or_insert_with(|| SteamProfile::placeholder(steam_id));
            }
        }
    }

    /// Looks up the ONLINE connection for a session id
    pub fn connected_by_session(&self, session_id: i64) -> Option<&PlayerConnection> {
        self.online.get(&session_id)
    }

    /// Looks up a character by name, case-insensitively
    pub fn character_by_name(&self, name: &str) -> Option<&Character> {
        self.characters.get(&name.to_lowercase())
    }

    pub fn profile(&self, steam_id: u64) -> Option<&SteamProfile> {
        self.profiles.get(&steam_id)
    }

    /// All ONLINE connections, ordered by when they came online
    pub fn online_connections(&self) -> Vec<&PlayerConnection> {
        let mut connections: Vec<&PlayerConnection> = self.online.values().collect();
        connections.sort_by_key(|connection| connection.since);
        connections
    }

    /// ONLINE connections followed by still-pending ones
    pub fn all_connections(&self) -> Vec<&PlayerConnection> {
        let mut connections = self.online_connections();
        connections.extend(self.pending.pending());
        connections
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}
