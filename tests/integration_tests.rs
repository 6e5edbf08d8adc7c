//! Integration tests for the server monitor
//!
//! These tests feed realistic Valheim log text through the full pipeline
//! (classifier -> monitor -> registry) and check the resulting player model.

use monitor::monitor::ServerMonitor;
use monitor::registry::UNKNOWN_STEAM_ID;
use monitor::sources::{IdentityResolver, LogSource, ResolvedIdentity};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

/// In-memory log source the tests append to between polls
#[derive(Clone)]
struct ScriptedLog {
    text: Arc<Mutex<String>>,
    failing: Arc<Mutex<bool>>,
}

impl ScriptedLog {
    fn new() -> Self {
        Self {
            text: Arc::new(Mutex::new(String::new())),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    /// Appends one line in the server's log format
    fn append(&self, body: &str) {
        let mut text = self.text.lock().unwrap();
        text.push_str("[Info   : Unity Log] 03/14/2021 15:09:26: ");
        text.push_str(body);
        text.push('\n');
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

impl LogSource for ScriptedLog {
    fn fetch_full_text(&mut self) -> Result<String, Box<dyn Error>> {
        if *self.failing.lock().unwrap() {
            return Err("log host unreachable".into());
        }
        Ok(self.text.lock().unwrap().clone())
    }
}

/// Resolver that derives names deterministically and never fails
struct TestResolver;

impl IdentityResolver for TestResolver {
    fn resolve(&mut self, steam_id: u64) -> Result<ResolvedIdentity, Box<dyn Error>> {
        Ok(ResolvedIdentity {
            display_name: format!("Viking{}", steam_id),
            profile_url: Some(format!("https://steamcommunity.com/profiles/{}", steam_id)),
        })
    }
}

fn monitor_over(log: &ScriptedLog) -> ServerMonitor {
    ServerMonitor::new(Box::new(log.clone()), Box::new(TestResolver))
}

/// END-TO-END SCENARIO TESTS
mod scenario_tests {
    use super::*;

    /// Tests the canonical connect/day/disconnect session in one poll
    #[test]
    fn full_session_lifecycle() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        log.append("Time 500.0, day:3    nextm:1.0  skipspeed:1.0");
        log.append("Closing socket 123");

        server_monitor.poll();

        assert_eq!(server_monitor.current_day(), Some(3));
        assert_eq!(server_monitor.registry().online_count(), 0);

        let character = server_monitor.registry().character_by_name("Bjorn").unwrap();
        assert_eq!(character.deaths, 0);

        let profile = server_monitor.registry().profile(123).unwrap();
        assert_eq!(profile.display_name, "Viking123");
        assert_eq!(profile.characters, vec!["Bjorn".to_string()]);
    }

    /// Tests that a session spread across several polls reconciles the same
    #[test]
    fn session_across_multiple_polls() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Get create world Midgard");
        log.append("Got connection SteamID 123");
        server_monitor.poll();
        assert_eq!(server_monitor.registry().online_count(), 0);
        assert_eq!(server_monitor.registry().all_connections().len(), 1);

        log.append("Got character ZDOID from Bjorn : 55:1");
        server_monitor.poll();
        assert_eq!(server_monitor.registry().online_count(), 1);
        assert_eq!(server_monitor.world_name(), Some("Midgard"));

        log.append("Closing socket 123");
        server_monitor.poll();
        assert_eq!(server_monitor.registry().online_count(), 0);
    }

    /// Tests a status snapshot serializes for downstream presentation
    #[test]
    fn snapshot_serializes_to_json() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Get create world Midgard");
        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        server_monitor.poll();

        let json = serde_json::to_string(&server_monitor.status_snapshot()).unwrap();
        assert!(json.contains("\"world_name\":\"Midgard\""));
        assert!(json.contains("\"character\":\"Bjorn\""));
        assert!(json.contains("\"player\":\"Viking123\""));
    }

    /// Tests polling from a periodic timer, the way the binary drives it
    #[tokio::test]
    async fn polling_from_a_timer() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");

        let mut applied = 0;
        for _ in 0..3 {
            applied += server_monitor.poll();
            sleep(Duration::from_millis(5)).await;
            log.append("Got character ZDOID from Bjorn : 55:1");
        }

        assert!(applied >= 2);
        assert_eq!(server_monitor.registry().online_count(), 1);
    }
}

/// RECONCILIATION PROPERTY TESTS
mod reconciliation_tests {
    use super::*;

    /// Tests FIFO binding: k-th start pairs with k-th completion
    #[test]
    fn fifo_binding_over_interleaved_connections() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 111");
        log.append("Got connection SteamID 222");
        log.append("Got connection SteamID 333");
        log.append("Got character ZDOID from Bjorn : 71:1");
        log.append("Got character ZDOID from Freya : 72:1");
        log.append("Got character ZDOID from Erik : 73:1");

        server_monitor.poll();

        let registry = server_monitor.registry();
        assert_eq!(registry.connected_by_session(71).unwrap().steam_id, 111);
        assert_eq!(registry.connected_by_session(72).unwrap().steam_id, 222);
        assert_eq!(registry.connected_by_session(73).unwrap().steam_id, 333);
    }

    /// Tests that re-polling unchanged text never duplicates state
    #[test]
    fn idempotent_replay() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        log.append("Got character ZDOID from Bjorn : 0:0");

        assert_eq!(server_monitor.poll(), 3);
        assert_eq!(server_monitor.poll(), 0);

        let registry = server_monitor.registry();
        assert_eq!(registry.online_count(), 1);
        assert_eq!(registry.character_by_name("Bjorn").unwrap().deaths, 1);
        assert_eq!(server_monitor.history().len(), 3);
    }

    /// Tests the respawn-as-first-connection reclassification
    #[test]
    fn respawn_reclassification_brings_character_online() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:4");

        server_monitor.poll();

        let connection = server_monitor.registry().connected_by_session(55).unwrap();
        assert!(connection.is_online());
        assert_eq!(connection.steam_id, 123);
        assert_eq!(connection.character.as_deref(), Some("Bjorn"));
    }

    /// Tests death counting across repeated deaths
    #[test]
    fn deaths_accumulate_per_character() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        for _ in 0..4 {
            log.append("Got character ZDOID from Bjorn : 0:0");
        }

        server_monitor.poll();

        let registry = server_monitor.registry();
        assert_eq!(registry.character_by_name("Bjorn").unwrap().deaths, 4);
        // session binding unaffected by dying
        assert_eq!(registry.connected_by_session(55).unwrap().steam_id, 123);
    }

    /// Tests case-insensitive character identity across log lines
    #[test]
    fn character_names_match_case_insensitively() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        log.append("Closing socket 123");
        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from bjorn : 56:1");

        server_monitor.poll();

        let registry = server_monitor.registry();
        let character = registry.character_by_name("BJORN").unwrap();
        assert_eq!(character.name, "Bjorn");
        assert_eq!(character.session_id, 56);
        // one known name on the profile, not two
        assert_eq!(registry.profile(123).unwrap().characters.len(), 1);
    }

    /// Tests a reconnect whose completion lands before the old socket close
    #[test]
    fn reconnect_before_close_replaces_old_session() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 56:1");
        // the close for the first socket arrives late
        log.append("Closing socket 123");
        server_monitor.poll();

        let registry = server_monitor.registry();
        assert!(registry.connected_by_session(55).is_none());
        assert_eq!(registry.online_count(), 0);
        assert!(registry.all_connections().is_empty());
        assert_eq!(server_monitor.status_snapshot().online.len(), 0);
    }

    /// Tests that disconnection clears both the session and steam id lookups
    #[test]
    fn disconnection_cleans_up_both_indices() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");
        server_monitor.poll();

        log.append("Closing socket 123");
        server_monitor.poll();

        assert!(server_monitor.registry().connected_by_session(55).is_none());
        assert!(server_monitor.registry().all_connections().is_empty());

        // a second disconnect for the same id is a harmless no-op
        log.append("Closing socket 123");
        server_monitor.poll();
        assert!(server_monitor.registry().character_by_name("Bjorn").is_some());
    }
}

/// DEGRADED-INPUT TESTS
mod degraded_input_tests {
    use super::*;

    /// Tests that a fetch failure retries the same lines next cycle
    #[test]
    fn fetch_failure_is_retried() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got connection SteamID 123");
        log.append("Got character ZDOID from Bjorn : 55:1");

        log.set_failing(true);
        assert_eq!(server_monitor.poll(), 0);
        assert_eq!(server_monitor.registry().online_count(), 0);

        log.set_failing(false);
        assert_eq!(server_monitor.poll(), 2);
        assert_eq!(server_monitor.registry().online_count(), 1);
    }

    /// Tests a completion observed with no start (monitor joined mid-session)
    #[test]
    fn completion_without_start_binds_unknown_identity() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Got character ZDOID from Bjorn : 55:1");
        server_monitor.poll();

        let registry = server_monitor.registry();
        let connection = registry.connected_by_session(55).unwrap();
        assert_eq!(connection.steam_id, UNKNOWN_STEAM_ID);
        assert_eq!(
            registry.profile(UNKNOWN_STEAM_ID).unwrap().characters,
            vec!["Bjorn".to_string()]
        );
    }

    /// Tests that noise lines around real events change nothing
    #[test]
    fn noise_is_ignored_but_consumed() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        log.append("Zonesystem Start 642");
        log.append("Got connection SteamID 123");
        log.append("DungeonDB Start 642");
        log.append("Got character ZDOID from Bjorn : 55:1");

        assert_eq!(server_monitor.poll(), 2);
        assert_eq!(server_monitor.registry().online_count(), 1);
        assert_eq!(server_monitor.poll(), 0);
    }
}

/// KNOWN LIMITATION: FIFO correlation under out-of-order handshakes
///
/// The log emits no shared key between a connection start (Steam id) and its
/// completion (session id + character), so arrival order is the only
/// correlation signal. When two clients complete out of start order, the
/// monitor binds identities to the wrong characters. This test pins the
/// current (wrong but deliberate) behavior so any future fix shows up as an
/// intentional test change.
mod fifo_limitation_tests {
    use super::*;

    #[test]
    fn out_of_order_completion_misbinds_identities() {
        let log = ScriptedLog::new();
        let mut server_monitor = monitor_over(&log);

        // 111 starts first but 222's character finishes loading first
        log.append("Got connection SteamID 111");
        log.append("Got connection SteamID 222");
        log.append("Got character ZDOID from Freya : 72:1"); // really 222's
        log.append("Got character ZDOID from Bjorn : 71:1"); // really 111's

        server_monitor.poll();

        let registry = server_monitor.registry();
        // FIFO hands Freya to 111 and Bjorn to 222 - the documented mis-bind
        assert_eq!(registry.connected_by_session(72).unwrap().steam_id, 111);
        assert_eq!(registry.connected_by_session(71).unwrap().steam_id, 222);
    }
}
