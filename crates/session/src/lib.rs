//! Hide-and-Seek Session Core
//!
//! The transport-free half of a peer-to-peer hide-and-seek session. It owns:
//! - The participant registry and its replicas
//! - The phase controller (`Waiting → Hiding → Seeking → Ended`) and its timers
//! - Host and client message dispatch
//! - The catch resolver
//! - Identity and session-code generation, input validation
//!
//! # Architecture
//!
//! One participant's process is the host and holds the canonical session;
//! every other process holds a replica that changes only through host
//! messages, except for its own avatar position.
//!
//! Dispatch is a pure function of `(state, input, now)` to outbound messages.
//! [`HostSession`] returns [`Outbound`] messages addressed by [`Recipient`];
//! [`ClientSession`] returns a [`Verdict`] and, when stepping, the position
//! update to report. Nothing here performs I/O or reads the clock; the driver
//! passes `now` in and delivers what comes out.
//!
//! Peer misbehaviour is never an error. Unknown kinds, host-only kinds from
//! clients and messages about unknown participants are dropped with a
//! [`Verdict`] describing why.

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod host;
pub mod ident;
pub mod phase;
pub mod protocol;
pub mod registry;
pub mod state;

use std::time::Duration;

use hideseek_sim::{CATCH_THRESHOLD, LayoutConfig, MovementConfig};

pub use client::ClientSession;
pub use error::SessionError;
pub use host::HostSession;
pub use ident::{ParticipantId, host_identity};
pub use phase::{Phase, TimerKind};
pub use protocol::{ConnId, DecodeError, Dispatch, Message, Outbound, Recipient, Verdict};
pub use registry::{Participant, Registry};
pub use state::{GameResult, Session, SessionView};

// ============================================================================
// Session Parameters
// ============================================================================

/// Length of the Hiding phase.
pub const HIDE_DURATION: Duration = Duration::from_secs(30);

/// Total game length, counted from the start of Hiding.
pub const GAME_DURATION: Duration = Duration::from_secs(180);

/// Pause between the last capture and the end of the game, so the final
/// `captured` message reaches everyone before `gameEnded`.
pub const END_GRACE_DELAY: Duration = Duration::from_secs(1);

/// Participants needed before the host may start.
pub const MIN_PARTICIPANTS: usize = 2;

/// Upper bound on any configured phase duration.
pub const MAX_PHASE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Session configuration. Every peer in a session must use the same values.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub movement: MovementConfig,
    pub layout: LayoutConfig,
    pub catch_threshold: f64,
    pub hide_duration: Duration,
    pub game_duration: Duration,
    pub end_grace_delay: Duration,
    pub min_participants: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            layout: LayoutConfig::default(),
            catch_threshold: CATCH_THRESHOLD,
            hide_duration: HIDE_DURATION,
            game_duration: GAME_DURATION,
            end_grace_delay: END_GRACE_DELAY,
            min_participants: MIN_PARTICIPANTS,
        }
    }
}

impl SessionConfig {
    /// Reject configurations whose timers could not run the game to its end.
    pub fn validate(&self) -> Result<(), SessionError> {
        if [self.hide_duration, self.game_duration, self.end_grace_delay]
            .iter()
            .any(|d| *d > MAX_PHASE_DURATION)
        {
            return Err(SessionError::InvalidConfig(
                "phase durations are limited to one day",
            ));
        }
        if self.game_duration < self.hide_duration {
            return Err(SessionError::InvalidConfig(
                "game duration is shorter than the hide duration",
            ));
        }
        if !self.catch_threshold.is_finite() || self.catch_threshold <= 0.0 {
            return Err(SessionError::InvalidConfig(
                "catch threshold must be a positive distance",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Instant;

    use hideseek_sim::{MoveIntent, Outcome, Role};
    use proptest::prelude::*;

    use super::*;

    /// Host plus clients wired together in memory. Every delivered message
    /// goes through the wire encoding.
    struct Harness {
        host: HostSession,
        clients: BTreeMap<ConnId, ClientSession>,
        next_conn: ConnId,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                host: HostSession::with_code("Hosty", "AB12", SessionConfig::default(), 1)
                    .unwrap(),
                clients: BTreeMap::new(),
                next_conn: 1,
                now: Instant::now(),
            }
        }

        fn deliver(&mut self, outbound: Vec<Outbound>) {
            for out in outbound {
                let bytes = out.message.encode_to_vec();
                for (conn, client) in self.clients.iter_mut() {
                    if out.to.includes(*conn) {
                        let message = Message::decode(&bytes).unwrap().unwrap();
                        client.on_message(message, self.now);
                    }
                }
            }
        }

        /// Open a channel; the client exists only if the host admits it.
        fn open(&mut self) -> Option<ConnId> {
            let conn = self.next_conn;
            self.next_conn += 1;
            let out = self.host.on_channel_open(conn, self.now)?;
            let client =
                ClientSession::new("Guest", "ab12", SessionConfig::default(), 1000 + conn)
                    .unwrap();
            self.clients.insert(conn, client);
            self.deliver(out);
            Some(conn)
        }

        fn join(&mut self, conn: ConnId) -> Verdict {
            let join = self.clients[&conn].join_request().unwrap();
            self.send(conn, join)
        }

        fn try_connect(&mut self) -> Option<ConnId> {
            let conn = self.open()?;
            self.join(conn).is_applied().then_some(conn)
        }

        fn connect(&mut self) -> ConnId {
            self.try_connect().expect("host refused the connection")
        }

        /// A refused connection is closed by the host; its client is gone.
        fn send(&mut self, conn: ConnId, message: Message) -> Verdict {
            let dispatch = self.host.on_message(conn, message, self.now);
            if dispatch.verdict == Verdict::RefusedAfterEnd {
                self.clients.remove(&conn);
            }
            self.deliver(dispatch.outbound);
            dispatch.verdict
        }

        fn disconnect(&mut self, conn: ConnId) {
            self.clients.remove(&conn);
            let out = self.host.on_channel_close(conn);
            self.deliver(out);
        }

        fn advance(&mut self, by: Duration) {
            self.now += by;
            let out = self.host.poll_timers(self.now);
            self.deliver(out);
        }

        fn assert_converged(&self) {
            let expected = self.host.session().digest();
            for (conn, client) in &self.clients {
                assert_eq!(
                    client.session().digest(),
                    expected,
                    "replica on connection {conn} diverged"
                );
            }
        }
    }

    #[test]
    fn test_join_scenario_snapshot_has_only_host() {
        let mut net = Harness::new();
        let conn = net.connect();
        let client = &net.clients[&conn];

        assert!(client.is_synced());
        assert_eq!(client.phase(), Phase::Waiting);
        let host_record = client
            .session()
            .registry()
            .get(net.host.local_id())
            .unwrap();
        assert_eq!(host_record.role, Role::Hider);
        assert_eq!(
            client.session().local().map(|p| p.role),
            Some(Role::Hunter)
        );
        net.assert_converged();
    }

    #[test]
    fn test_full_game_hunters_win() {
        let mut net = Harness::new();
        let hunter = net.connect();
        let watcher = net.connect();
        net.assert_converged();

        let out = net.host.start_game(net.now).unwrap();
        net.deliver(out);
        for client in net.clients.values() {
            assert_eq!(client.phase(), Phase::Hiding);
            assert!(!client.session().obstacles().is_empty());
        }
        net.assert_converged();

        net.advance(HIDE_DURATION);
        for client in net.clients.values() {
            assert_eq!(client.phase(), Phase::Seeking);
        }

        let hunter_id = net.clients[&hunter].local_id().to_string();
        let host_position = net.clients[&hunter]
            .session()
            .registry()
            .get(net.host.local_id())
            .unwrap()
            .position;
        let verdict = net.send(
            hunter,
            Message::PositionUpdate {
                participant_id: hunter_id.clone(),
                position: host_position,
            },
        );
        assert_eq!(verdict, Verdict::Applied);

        // The watcher sees the hunter move and the capture.
        let watcher_replica = net.clients[&watcher].session();
        assert_eq!(
            watcher_replica.registry().get(&hunter_id).map(|p| p.position),
            Some(host_position)
        );
        assert_eq!(watcher_replica.registry().uncaptured_hiders().count(), 0);
        assert_eq!(watcher_replica.phase(), Phase::Seeking);

        net.advance(END_GRACE_DELAY);
        for client in net.clients.values() {
            assert_eq!(client.phase(), Phase::Ended);
            let result = client.session().result().unwrap();
            assert_eq!(result.outcome, Outcome::HuntersWin);
            assert_eq!(result.message(), "Hunters win!");
            assert_eq!(result.winners.len(), 2);
        }
        net.assert_converged();
    }

    #[test]
    fn test_late_joiner_receives_running_game() {
        let mut net = Harness::new();
        net.connect();
        let out = net.host.start_game(net.now).unwrap();
        net.deliver(out);
        net.advance(Duration::from_secs(10));

        let late = net.connect();
        let client = &net.clients[&late];
        assert_eq!(client.phase(), Phase::Hiding);
        assert_eq!(
            client.view(net.now).countdown,
            Some(Duration::from_secs(20))
        );
        net.assert_converged();
    }

    #[test]
    fn test_host_reset_stops_stale_timers() {
        let mut net = Harness::new();
        net.connect();
        let out = net.host.start_game(net.now).unwrap();
        net.deliver(out);

        let dropped = net.host.reset();
        assert_eq!(dropped.len(), 1);
        net.advance(GAME_DURATION * 2);
        assert_eq!(net.host.phase(), Phase::Waiting);
    }

    #[test]
    fn test_join_after_end_is_refused() {
        let mut net = Harness::new();
        net.connect();
        let out = net.host.start_game(net.now).unwrap();
        net.deliver(out);
        net.advance(GAME_DURATION);
        assert_eq!(net.host.phase(), Phase::Ended);

        assert_eq!(net.open(), None);
        assert_eq!(net.clients.len(), 1);
        assert_eq!(net.host.connection_count(), 1);
        assert_eq!(net.host.session().registry().len(), 2);
        net.assert_converged();
    }

    #[test]
    fn test_join_racing_game_end_is_refused() {
        let mut net = Harness::new();
        net.connect();
        let out = net.host.start_game(net.now).unwrap();
        net.deliver(out);

        let late = net.open().unwrap();
        net.advance(GAME_DURATION);
        assert_eq!(net.clients[&late].phase(), Phase::Ended);

        assert_eq!(net.join(late), Verdict::RefusedAfterEnd);
        assert!(!net.clients.contains_key(&late));
        assert_eq!(net.host.bound_participant(late), None);
        assert_eq!(net.host.connection_count(), 1);
        net.assert_converged();
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));

        let short_game = SessionConfig {
            hide_duration: Duration::from_secs(60),
            game_duration: Duration::from_secs(30),
            ..SessionConfig::default()
        };
        assert!(matches!(
            HostSession::create("Ada", short_game.clone(), 1),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientSession::new("Ada", "AB12", short_game, 1),
            Err(SessionError::InvalidConfig(_))
        ));

        let endless = SessionConfig {
            hide_duration: Duration::from_secs(u64::MAX),
            game_duration: Duration::from_secs(u64::MAX),
            ..SessionConfig::default()
        };
        assert!(matches!(
            HostSession::create("Ada", endless, 1),
            Err(SessionError::InvalidConfig(_))
        ));

        let no_reach = SessionConfig {
            catch_threshold: f64::NAN,
            ..SessionConfig::default()
        };
        assert!(no_reach.validate().is_err());

        let equal = SessionConfig {
            hide_duration: Duration::from_secs(30),
            game_duration: Duration::from_secs(30),
            ..SessionConfig::default()
        };
        assert_eq!(equal.validate(), Ok(()));
    }

    #[derive(Debug, Clone)]
    enum Churn {
        Join,
        Leave(usize),
        Start,
        Wait,
    }

    fn churn() -> impl Strategy<Value = Churn> {
        prop_oneof![
            3 => Just(Churn::Join),
            2 => (0usize..8).prop_map(Churn::Leave),
            1 => Just(Churn::Start),
            1 => Just(Churn::Wait),
        ]
    }

    proptest! {
        /// Any sequence of joins, leaves, a start and waits through the
        /// end of the game leaves every replica with the host's
        /// `{id, role, captured, color}` set, phase and obstacles.
        #[test]
        fn prop_replicas_converge_under_churn(ops in prop::collection::vec(churn(), 1..24)) {
            let mut net = Harness::new();
            for op in ops {
                match op {
                    Churn::Join => {
                        net.try_connect();
                    }
                    Churn::Leave(index) => {
                        let conns: Vec<ConnId> = net.clients.keys().copied().collect();
                        if !conns.is_empty() {
                            net.disconnect(conns[index % conns.len()]);
                        }
                    }
                    Churn::Start => {
                        if let Ok(out) = net.host.start_game(net.now) {
                            net.deliver(out);
                        }
                    }
                    Churn::Wait => net.advance(Duration::from_secs(60)),
                }
                net.advance(Duration::from_secs(1));
                net.assert_converged();
            }
        }

        /// Once captured, the host's hider avatar never moves again.
        #[test]
        fn prop_captured_hider_never_moves(
            intents in prop::collection::vec((-1i8..=1, -1i8..=1), 1..40)
        ) {
            let mut net = Harness::new();
            let hunter = net.connect();
            let out = net.host.start_game(net.now).unwrap();
            net.deliver(out);
            net.advance(HIDE_DURATION);

            let host_position = net.host.session().local().unwrap().position;
            let hunter_id = net.clients[&hunter].local_id().to_string();
            net.send(hunter, Message::PositionUpdate {
                participant_id: hunter_id,
                position: host_position,
            });
            prop_assert!(net.host.session().local().unwrap().captured);

            for (dx, dy) in intents {
                let out = net.host.step_local(MoveIntent::new(dx, dy), net.now);
                prop_assert!(out.is_empty());
                prop_assert_eq!(net.host.session().local().unwrap().position, host_position);
            }
        }
    }
}
