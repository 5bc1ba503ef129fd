//! Host-side dispatch.
//!
//! The host owns the canonical [`Session`]. Every entry point is a plain
//! function of `(state, input, now)` returning the messages the driver must
//! deliver, so the whole protocol is testable without a network or a clock.
//!
//! Capture is decided here and nowhere else: proximity is evaluated once per
//! applied hunter position, whether the update came from a client or from the
//! host's own movement step.

use std::collections::HashMap;
use std::time::Instant;

use hideseek_sim::{
    MoveIntent, Role, Vec2, generate_obstacles, random_color, random_spawn, within_catch_range,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::SessionConfig;
use crate::error::SessionError;
use crate::ident::{
    ParticipantId, generate_participant_id, generate_session_code, normalize_session_code,
    validate_name,
};
use crate::phase::{Phase, PhaseTimers, TimerKind};
use crate::protocol::{ConnId, Dispatch, Message, Outbound, Recipient, Verdict};
use crate::registry::Participant;
use crate::state::{GameResult, Session, SessionView};

/// Authoritative session state plus the host-only bookkeeping around it.
#[derive(Debug)]
pub struct HostSession {
    config: SessionConfig,
    session: Session,
    /// Open connections and the participant each one joined as.
    connections: HashMap<ConnId, Option<ParticipantId>>,
    timers: PhaseTimers,
    rng: ChaCha8Rng,
}

impl HostSession {
    /// Create a session under a freshly generated code.
    pub fn create(name: &str, config: SessionConfig, seed: u64) -> Result<Self, SessionError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let code = generate_session_code(&mut rng);
        Self::build(name, code, config, rng)
    }

    /// Create a session under a caller-chosen code.
    pub fn with_code(
        name: &str,
        code: &str,
        config: SessionConfig,
        seed: u64,
    ) -> Result<Self, SessionError> {
        let code = normalize_session_code(code)?;
        Self::build(name, code, config, ChaCha8Rng::seed_from_u64(seed))
    }

    fn build(
        name: &str,
        code: String,
        config: SessionConfig,
        mut rng: ChaCha8Rng,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let name = validate_name(name)?;
        let id = generate_participant_id(&mut rng);
        let position = random_spawn(
            &mut rng,
            config.movement.world_width,
            config.movement.world_height,
        );
        let color = random_color(&mut rng);
        // The host is always the first participant and always a hider.
        let local = Participant::new(id, name, Role::Hider, position, color);

        info!(code = %code, host = %local.id, "session created");

        Ok(Self {
            config,
            session: Session::new(code, local),
            connections: HashMap::new(),
            timers: PhaseTimers::new(),
            rng,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn code(&self) -> &str {
        self.session.code()
    }

    pub fn local_id(&self) -> &str {
        self.session.local_id()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn timers(&self) -> &PhaseTimers {
        &self.timers
    }

    /// Earliest instant at which [`poll_timers`](Self::poll_timers) has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Participant a connection joined as, if it has joined.
    pub fn bound_participant(&self, conn: ConnId) -> Option<&str> {
        self.connections.get(&conn)?.as_deref()
    }

    pub fn view(&self, now: Instant) -> SessionView {
        self.session.view(now, &self.config, true)
    }

    pub fn snapshot(&self, now: Instant) -> Message {
        Message::Snapshot {
            phase: self.session.phase(),
            participants: self.session.registry().sorted().into_iter().cloned().collect(),
            obstacles: self.session.obstacles().to_vec(),
            elapsed_seconds: self.session.elapsed(now).as_secs_f64(),
        }
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// A peer opened a channel. It gets the current state before anything
    /// else; it becomes visible to others only once it joins.
    ///
    /// Returns `None` once the game has ended: the connection is not
    /// admitted and the driver must close it.
    pub fn on_channel_open(&mut self, conn: ConnId, now: Instant) -> Option<Vec<Outbound>> {
        if self.phase() == Phase::Ended {
            info!(conn, "channel refused, game has ended");
            return None;
        }
        self.connections.insert(conn, None);
        debug!(conn, phase = self.phase().as_str(), "channel opened");
        Some(vec![Outbound::new(
            Recipient::Connection(conn),
            self.snapshot(now),
        )])
    }

    /// A channel closed. Its participant leaves the registry and everyone
    /// else is told, except after the game has ended where the final
    /// standings stay as they are.
    pub fn on_channel_close(&mut self, conn: ConnId) -> Vec<Outbound> {
        let Some(bound) = self.connections.remove(&conn) else {
            return Vec::new();
        };
        let Some(participant_id) = bound else {
            debug!(conn, "channel closed before join");
            return Vec::new();
        };

        if self.phase() == Phase::Ended {
            debug!(conn, participant = %participant_id, "channel closed after game end");
            return Vec::new();
        }

        if self.session.registry.remove(&participant_id).is_none() {
            return Vec::new();
        }
        info!(conn, participant = %participant_id, "participant left");
        vec![Outbound::broadcast(Message::ParticipantLeft { participant_id })]
    }

    // ========================================================================
    // Message Dispatch
    // ========================================================================

    /// Apply one message received on `conn`.
    pub fn on_message(&mut self, conn: ConnId, message: Message, now: Instant) -> Dispatch {
        let Some(bound) = self.connections.get(&conn).cloned() else {
            warn!(conn, kind = message.kind(), "message on unknown connection");
            return Dispatch::ignored(Verdict::IgnoredUnboundConnection);
        };

        let dispatch = match message {
            Message::Join(participant) => self.handle_join(conn, bound, participant),
            Message::PositionUpdate {
                participant_id,
                position,
            } => match bound {
                None => Dispatch::ignored(Verdict::IgnoredUnboundConnection),
                Some(owner) if owner != participant_id => {
                    Dispatch::ignored(Verdict::IgnoredForeignParticipant)
                }
                Some(_) => self.handle_position(conn, participant_id, position, now),
            },
            other => {
                debug!(conn, kind = other.kind(), "host-only message from client");
                Dispatch::ignored(Verdict::IgnoredHostOnly)
            }
        };

        if !dispatch.verdict.is_applied() {
            debug!(conn, verdict = ?dispatch.verdict, "message ignored");
        }
        dispatch
    }

    fn handle_join(
        &mut self,
        conn: ConnId,
        bound: Option<ParticipantId>,
        requested: Participant,
    ) -> Dispatch {
        if bound.is_some() || self.session.registry.contains(&requested.id) {
            return Dispatch::ignored(Verdict::IgnoredDuplicateJoin);
        }
        // Opened before the end: its replica would hold a record the final
        // registry never will.
        if self.phase() == Phase::Ended {
            self.connections.remove(&conn);
            info!(conn, participant = %requested.id, "join refused, game has ended");
            return Dispatch::ignored(Verdict::RefusedAfterEnd);
        }

        // Every joiner is a hunter; the provisional role is never trusted.
        let participant = Participant {
            role: Role::Hunter,
            captured: false,
            ..requested
        };

        self.session.registry.insert(participant.clone());
        self.connections.insert(conn, Some(participant.id.clone()));
        info!(
            conn,
            participant = %participant.id,
            name = %participant.name,
            role = participant.role.as_str(),
            "participant joined"
        );

        Dispatch::applied(vec![
            Outbound::new(
                Recipient::Connection(conn),
                Message::JoinAccepted(participant.clone()),
            ),
            Outbound::new(
                Recipient::AllExcept(conn),
                Message::ParticipantJoined(participant),
            ),
        ])
    }

    fn handle_position(
        &mut self,
        conn: ConnId,
        participant_id: ParticipantId,
        position: Vec2,
        now: Instant,
    ) -> Dispatch {
        let phase = self.phase();
        if phase == Phase::Ended {
            return Dispatch::ignored(Verdict::IgnoredAfterEnd);
        }
        if !phase.is_running() {
            return Dispatch::ignored(Verdict::IgnoredWrongPhase);
        }

        let Some(participant) = self.session.registry.get_mut(&participant_id) else {
            return Dispatch::ignored(Verdict::IgnoredUnknownParticipant);
        };
        if participant.is_frozen() {
            return Dispatch::ignored(Verdict::IgnoredFrozen);
        }
        participant.position = position;
        let is_hunter = participant.role == Role::Hunter;

        let mut outbound = vec![Outbound::new(
            Recipient::AllExcept(conn),
            Message::PositionUpdate {
                participant_id: participant_id.clone(),
                position,
            },
        )];
        if is_hunter {
            outbound.extend(self.resolve_catches(&participant_id, now));
        }
        Dispatch::applied(outbound)
    }

    // ========================================================================
    // Host Actions
    // ========================================================================

    /// Start the game: `Waiting → Hiding`.
    ///
    /// Generates the obstacle layout, stamps the phase start and arms the
    /// hide and total-game timers.
    pub fn start_game(&mut self, now: Instant) -> Result<Vec<Outbound>, SessionError> {
        let phase = self.phase();
        if phase != Phase::Waiting {
            return Err(SessionError::WrongPhase {
                action: "start the game",
                actual: phase,
            });
        }
        let have = self.session.registry().len();
        let need = self.config.min_participants;
        if have < need {
            return Err(SessionError::NotEnoughParticipants { have, need });
        }

        self.timers.cancel_all();
        if !self
            .timers
            .arm_game(now, self.config.hide_duration, self.config.game_duration)
        {
            return Err(SessionError::InvalidConfig(
                "phase deadlines overflow the clock",
            ));
        }
        let obstacles = generate_obstacles(&mut self.rng, &self.config.layout);
        self.session.enter_hiding(now, obstacles.clone());

        info!(
            participants = have,
            obstacles = obstacles.len(),
            "game started"
        );
        Ok(vec![Outbound::broadcast(Message::PhaseChanged {
            phase: Phase::Hiding,
            obstacles,
        })])
    }

    /// Advance the host's own avatar one tick.
    pub fn step_local(&mut self, intent: MoveIntent, now: Instant) -> Vec<Outbound> {
        let Some(position) = self.session.step_local(intent, &self.config) else {
            return Vec::new();
        };
        let local_id = self.session.local_id().to_string();
        let is_hunter = self
            .session
            .local()
            .is_some_and(|p| p.role == Role::Hunter);

        let mut outbound = vec![Outbound::broadcast(Message::PositionUpdate {
            participant_id: local_id.clone(),
            position,
        })];
        if is_hunter {
            outbound.extend(self.resolve_catches(&local_id, now));
        }
        outbound
    }

    /// Fire every timer due at `now`.
    ///
    /// A timer whose guarded phase is no longer current does nothing.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        while let Some(kind) = self.timers.take_due(now) {
            let phase = self.phase();
            if phase != kind.guarded_phase() {
                debug!(timer = ?kind, phase = phase.as_str(), "stale timer skipped");
                continue;
            }
            match kind {
                TimerKind::HideElapsed => {
                    self.session.phase = Phase::Seeking;
                    info!("hiding over, seeking begins");
                    outbound.push(Outbound::broadcast(Message::PhaseChanged {
                        phase: Phase::Seeking,
                        obstacles: Vec::new(),
                    }));
                }
                TimerKind::GameElapsed | TimerKind::EndGrace => {
                    outbound.extend(self.end_game());
                }
            }
        }
        outbound
    }

    /// Catch test for one hunter against every uncaptured hider.
    ///
    /// All hiders in range are captured in this evaluation. Once none remain,
    /// the end-of-game grace timer is armed.
    fn resolve_catches(&mut self, hunter_id: &str, now: Instant) -> Vec<Outbound> {
        if self.phase() != Phase::Seeking {
            return Vec::new();
        }
        let Some(hunter) = self
            .session
            .registry
            .get(hunter_id)
            .filter(|p| p.role == Role::Hunter)
        else {
            return Vec::new();
        };
        let hunter_position = hunter.position;
        let threshold = self.config.catch_threshold;

        let mut caught: Vec<ParticipantId> = self
            .session
            .registry
            .uncaptured_hiders()
            .filter(|hider| within_catch_range(hunter_position, hider.position, threshold))
            .map(|hider| hider.id.clone())
            .collect();
        if caught.is_empty() {
            return Vec::new();
        }
        caught.sort();

        let mut outbound = Vec::with_capacity(caught.len());
        for participant_id in caught {
            if let Some(hider) = self.session.registry.get_mut(&participant_id) {
                hider.captured = true;
            }
            info!(hunter = %hunter_id, hider = %participant_id, "hider captured");
            outbound.push(Outbound::broadcast(Message::Captured { participant_id }));
        }

        if self.session.registry.uncaptured_hiders().next().is_none() {
            let at = now.checked_add(self.config.end_grace_delay).unwrap_or(now);
            self.timers.arm_end_grace(at);
            info!("all hiders captured, ending after grace delay");
        }
        outbound
    }

    /// `Seeking → Ended`. Decides winners and stops every timer.
    fn end_game(&mut self) -> Vec<Outbound> {
        self.timers.cancel_all();
        let result = GameResult::decide(self.session.registry());
        info!(
            outcome = result.message(),
            winners = result.winners.len(),
            "game ended"
        );
        self.session.end(result.clone());
        vec![Outbound::broadcast(Message::GameEnded(result))]
    }

    /// Drop back to Waiting with only the host itself.
    ///
    /// All connections are forgotten; returns them so the driver can close
    /// the channels.
    pub fn reset(&mut self) -> Vec<ConnId> {
        self.timers.cancel_all();
        self.session.reset(Role::Hider);
        let mut dropped: Vec<ConnId> = self.connections.drain().map(|(conn, _)| conn).collect();
        dropped.sort_unstable();
        info!(dropped = dropped.len(), "session reset");
        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hideseek_sim::Outcome;

    use super::*;

    fn host() -> HostSession {
        HostSession::with_code("Hosty", "ab12", SessionConfig::default(), 42).unwrap()
    }

    fn joiner(id: &str) -> Participant {
        Participant::new(id, id.to_lowercase(), Role::Hider, Vec2::new(50.0, 50.0), "#9b59b6")
    }

    fn join(host: &mut HostSession, conn: ConnId, id: &str, now: Instant) {
        host.on_channel_open(conn, now);
        let dispatch = host.on_message(conn, Message::Join(joiner(id)), now);
        assert_eq!(dispatch.verdict, Verdict::Applied);
    }

    fn place(host: &mut HostSession, id: &str, position: Vec2) {
        if let Some(p) = host.session.registry.get_mut(id) {
            p.position = position;
        }
    }

    fn move_to(id: &str, x: f64, y: f64) -> Message {
        Message::PositionUpdate {
            participant_id: id.to_string(),
            position: Vec2::new(x, y),
        }
    }

    /// Host plus one hunter, already in Seeking, host hider parked at (400, 250).
    fn seeking(now: Instant) -> (HostSession, String) {
        let mut host = host();
        join(&mut host, 1, "HUNTR1", now);
        host.start_game(now).unwrap();
        host.poll_timers(now + host.config.hide_duration);
        assert_eq!(host.phase(), Phase::Seeking);
        let host_id = host.local_id().to_string();
        place(&mut host, &host_id, Vec2::new(400.0, 250.0));
        (host, host_id)
    }

    // ========================================================================
    // Creation & Join
    // ========================================================================

    #[test]
    fn test_create_validates_input() {
        let config = SessionConfig::default();
        assert_eq!(
            HostSession::create("  ", config.clone(), 1).unwrap_err(),
            SessionError::EmptyName
        );
        assert!(matches!(
            HostSession::with_code("Ada", "AB", config.clone(), 1),
            Err(SessionError::InvalidSessionCode(_))
        ));
        let host = HostSession::create("Ada", config, 1).unwrap();
        assert_eq!(host.code().len(), 4);
        assert_eq!(host.phase(), Phase::Waiting);
    }

    #[test]
    fn test_snapshot_on_open_contains_only_host() {
        let now = Instant::now();
        let mut host = host();
        assert_eq!(host.code(), "AB12");

        let out = host.on_channel_open(7, now).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Recipient::Connection(7));
        let Message::Snapshot {
            phase,
            participants,
            obstacles,
            elapsed_seconds,
        } = &out[0].message
        else {
            panic!("expected snapshot, got {:?}", out[0].message);
        };
        assert_eq!(*phase, Phase::Waiting);
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].id, host.local_id());
        assert_eq!(participants[0].role, Role::Hider);
        assert!(obstacles.is_empty());
        assert_eq!(*elapsed_seconds, 0.0);
    }

    #[test]
    fn test_join_assigns_hunter_and_notifies_others() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);

        host.on_channel_open(2, now);
        let dispatch = host.on_message(2, Message::Join(joiner("SECND2")), now);
        assert_eq!(dispatch.verdict, Verdict::Applied);
        assert_eq!(dispatch.outbound.len(), 2);

        let Message::JoinAccepted(accepted) = &dispatch.outbound[0].message else {
            panic!("expected joinAccepted");
        };
        assert_eq!(dispatch.outbound[0].to, Recipient::Connection(2));
        assert_eq!(accepted.role, Role::Hunter);
        assert_eq!(accepted.color, "#9b59b6");

        assert_eq!(dispatch.outbound[1].to, Recipient::AllExcept(2));
        assert!(matches!(
            &dispatch.outbound[1].message,
            Message::ParticipantJoined(p) if p.id == "SECND2"
        ));
        assert_eq!(host.bound_participant(2), Some("SECND2"));
        assert_eq!(host.session().registry().len(), 3);
    }

    #[test]
    fn test_duplicate_joins_are_ignored() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);

        let again = host.on_message(1, Message::Join(joiner("OTHER1")), now);
        assert_eq!(again.verdict, Verdict::IgnoredDuplicateJoin);

        host.on_channel_open(2, now);
        let clash = host.on_message(2, Message::Join(joiner("FIRST1")), now);
        assert_eq!(clash.verdict, Verdict::IgnoredDuplicateJoin);
        assert!(clash.outbound.is_empty());
        assert_eq!(host.session().registry().len(), 2);
    }

    #[test]
    fn test_host_only_messages_are_ignored() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);
        let dispatch = host.on_message(
            1,
            Message::Captured {
                participant_id: host.local_id().to_string(),
            },
            now,
        );
        assert_eq!(dispatch.verdict, Verdict::IgnoredHostOnly);
        assert!(host.session().registry().uncaptured_hiders().count() == 1);
    }

    #[test]
    fn test_message_on_unknown_connection() {
        let now = Instant::now();
        let mut host = host();
        let dispatch = host.on_message(99, Message::Join(joiner("GHOST1")), now);
        assert_eq!(dispatch.verdict, Verdict::IgnoredUnboundConnection);
    }

    // ========================================================================
    // Start Game & Timers
    // ========================================================================

    #[test]
    fn test_start_requires_two_participants() {
        let now = Instant::now();
        let mut host = host();
        assert_eq!(
            host.start_game(now),
            Err(SessionError::NotEnoughParticipants { have: 1, need: 2 })
        );
        assert_eq!(host.phase(), Phase::Waiting);
        assert!(host.session().obstacles().is_empty());
        assert_eq!(host.next_deadline(), None);
    }

    #[test]
    fn test_start_broadcasts_hiding_with_obstacles() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);

        let out = host.start_game(now).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Recipient::All);
        let Message::PhaseChanged { phase, obstacles } = &out[0].message else {
            panic!("expected phaseChanged");
        };
        assert_eq!(*phase, Phase::Hiding);
        assert!(!obstacles.is_empty());
        assert_eq!(obstacles.as_slice(), host.session().obstacles());
        assert!(host.timers().is_armed(TimerKind::HideElapsed));
        assert!(host.timers().is_armed(TimerKind::GameElapsed));

        assert_eq!(
            host.start_game(now),
            Err(SessionError::WrongPhase {
                action: "start the game",
                actual: Phase::Hiding
            })
        );
    }

    #[test]
    fn test_timers_drive_hiding_to_seeking_to_ended() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);
        host.start_game(now).unwrap();

        assert!(host.poll_timers(now + Duration::from_secs(29)).is_empty());
        let out = host.poll_timers(now + Duration::from_secs(30));
        assert_eq!(
            out,
            vec![Outbound::broadcast(Message::PhaseChanged {
                phase: Phase::Seeking,
                obstacles: Vec::new(),
            })]
        );

        let out = host.poll_timers(now + Duration::from_secs(180));
        let [ended] = out.as_slice() else {
            panic!("expected one message, got {out:?}");
        };
        let Message::GameEnded(result) = &ended.message else {
            panic!("expected gameEnded");
        };
        assert_eq!(result.outcome, Outcome::HidersWin);
        assert_eq!(result.winners.len(), 1);
        assert_eq!(result.winners[0].id, host.local_id());
        assert_eq!(host.phase(), Phase::Ended);
        assert_eq!(host.next_deadline(), None);
    }

    #[test]
    fn test_late_poll_fires_both_transitions_in_order() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);
        host.start_game(now).unwrap();

        let out = host.poll_timers(now + Duration::from_secs(1000));
        let kinds: Vec<_> = out.iter().map(|o| o.message.kind()).collect();
        assert_eq!(kinds, vec!["phaseChanged", "gameEnded"]);
    }

    #[test]
    fn test_reset_cancels_timers_and_connections() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);
        host.on_channel_open(2, now);
        host.start_game(now).unwrap();

        assert_eq!(host.reset(), vec![1, 2]);
        assert_eq!(host.phase(), Phase::Waiting);
        assert_eq!(host.connection_count(), 0);
        assert_eq!(host.session().registry().len(), 1);
        assert!(host.session().obstacles().is_empty());
        assert!(host.poll_timers(now + Duration::from_secs(1000)).is_empty());
        assert_eq!(host.phase(), Phase::Waiting);
    }

    // ========================================================================
    // Movement & Catch Resolver
    // ========================================================================

    #[test]
    fn test_position_rules() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);
        host.on_channel_open(2, now);

        assert_eq!(
            host.on_message(1, move_to("FIRST1", 10.0, 10.0), now).verdict,
            Verdict::IgnoredWrongPhase
        );
        assert_eq!(
            host.on_message(2, move_to("FIRST1", 10.0, 10.0), now).verdict,
            Verdict::IgnoredUnboundConnection
        );

        host.start_game(now).unwrap();
        let host_id = host.local_id().to_string();
        assert_eq!(
            host.on_message(1, move_to(&host_id, 10.0, 10.0), now).verdict,
            Verdict::IgnoredForeignParticipant
        );

        let dispatch = host.on_message(1, move_to("FIRST1", 10.0, 10.0), now);
        assert_eq!(dispatch.verdict, Verdict::Applied);
        assert_eq!(
            dispatch.outbound,
            vec![Outbound::new(
                Recipient::AllExcept(1),
                move_to("FIRST1", 10.0, 10.0)
            )]
        );
    }

    #[test]
    fn test_no_capture_during_hiding() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "HUNTR1", now);
        host.start_game(now).unwrap();
        let host_id = host.local_id().to_string();
        place(&mut host, &host_id, Vec2::new(400.0, 250.0));

        let dispatch = host.on_message(1, move_to("HUNTR1", 400.0, 250.0), now);
        assert_eq!(dispatch.outbound.len(), 1);
        assert_eq!(host.session().registry().uncaptured_hiders().count(), 1);
    }

    #[test]
    fn test_catch_boundary_is_exclusive() {
        let now = Instant::now();
        let (mut host, _) = seeking(now);

        let dispatch = host.on_message(1, move_to("HUNTR1", 420.0, 250.0), now);
        assert_eq!(dispatch.outbound.len(), 1);
        assert_eq!(host.session().registry().uncaptured_hiders().count(), 1);
    }

    #[test]
    fn test_last_capture_ends_game_after_grace() {
        let now = Instant::now();
        let (mut host, host_id) = seeking(now);

        let dispatch = host.on_message(1, move_to("HUNTR1", 419.9, 250.0), now);
        assert_eq!(dispatch.verdict, Verdict::Applied);
        assert_eq!(
            dispatch.outbound[1],
            Outbound::broadcast(Message::Captured {
                participant_id: host_id.clone()
            })
        );
        assert_eq!(
            host.timers().deadline(TimerKind::EndGrace),
            Some(now + host.config().end_grace_delay)
        );

        assert!(host.poll_timers(now + Duration::from_millis(999)).is_empty());
        let out = host.poll_timers(now + Duration::from_secs(1));
        let [ended] = out.as_slice() else {
            panic!("expected gameEnded, got {out:?}");
        };
        let Message::GameEnded(result) = &ended.message else {
            panic!("expected gameEnded");
        };
        assert_eq!(result.outcome, Outcome::HuntersWin);
        assert_eq!(result.message(), "Hunters win!");
        assert_eq!(result.winners.len(), 1);
        assert_eq!(result.winners[0].id, "HUNTR1");
    }

    #[test]
    fn test_simultaneous_catches_all_apply() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "HUNTR1", now);
        join(&mut host, 2, "HIDER2", now);
        join(&mut host, 3, "HIDER3", now);
        for id in ["HIDER2", "HIDER3"] {
            if let Some(p) = host.session.registry.get_mut(id) {
                p.role = Role::Hider;
            }
        }
        host.start_game(now).unwrap();
        host.poll_timers(now + Duration::from_secs(30));

        let host_id = host.local_id().to_string();
        place(&mut host, &host_id, Vec2::new(700.0, 400.0));
        place(&mut host, "HIDER2", Vec2::new(300.0, 205.0));
        place(&mut host, "HIDER3", Vec2::new(300.0, 195.0));

        let dispatch = host.on_message(1, move_to("HUNTR1", 300.0, 200.0), now);
        let captured: Vec<_> = dispatch
            .outbound
            .iter()
            .filter_map(|o| match &o.message {
                Message::Captured { participant_id } => Some(participant_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(captured, vec!["HIDER2", "HIDER3"]);
        assert_eq!(host.session().registry().uncaptured_hiders().count(), 1);
        assert!(!host.timers().is_armed(TimerKind::EndGrace));
    }

    #[test]
    fn test_captured_hider_is_frozen() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "HUNTR1", now);
        join(&mut host, 2, "HIDER2", now);
        if let Some(p) = host.session.registry.get_mut("HIDER2") {
            p.role = Role::Hider;
        }
        host.start_game(now).unwrap();
        host.poll_timers(now + Duration::from_secs(30));
        place(&mut host, "HIDER2", Vec2::new(100.0, 100.0));
        host.on_message(1, move_to("HUNTR1", 105.0, 100.0), now);

        let dispatch = host.on_message(2, move_to("HIDER2", 600.0, 300.0), now);
        assert_eq!(dispatch.verdict, Verdict::IgnoredFrozen);
        assert_eq!(
            host.session().registry().get("HIDER2").map(|p| p.position),
            Some(Vec2::new(100.0, 100.0))
        );
    }

    #[test]
    fn test_host_step_broadcasts_position() {
        let now = Instant::now();
        let (mut host, host_id) = seeking(now);
        let out = host.step_local(MoveIntent::new(0, -1), now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Recipient::All);
        assert!(matches!(
            &out[0].message,
            Message::PositionUpdate { participant_id, .. } if *participant_id == host_id
        ));
        assert!(host.step_local(MoveIntent::IDLE, now).is_empty());
    }

    #[test]
    fn test_host_as_hunter_catches_on_own_step() {
        // Hosts are created as hiders; the registry is edited to exercise
        // the resolver from the host's own movement.
        let now = Instant::now();
        let (mut host, host_id) = seeking(now);
        if let Some(p) = host.session.registry.get_mut(&host_id) {
            p.role = Role::Hunter;
        }
        if let Some(p) = host.session.registry.get_mut("HUNTR1") {
            p.role = Role::Hider;
        }
        host.session.obstacles.clear();
        place(&mut host, "HUNTR1", Vec2::new(400.0, 235.0));

        let out = host.step_local(MoveIntent::new(0, -1), now);
        assert_eq!(
            host.session().local().map(|p| p.position),
            Some(Vec2::new(400.0, 247.0))
        );
        assert!(matches!(
            &out[0].message,
            Message::PositionUpdate { participant_id, .. } if *participant_id == host_id
        ));
        assert_eq!(
            out[1],
            Outbound::broadcast(Message::Captured {
                participant_id: "HUNTR1".to_string()
            })
        );
        assert!(host.timers().is_armed(TimerKind::EndGrace));
    }

    // ========================================================================
    // Disconnects
    // ========================================================================

    #[test]
    fn test_close_broadcasts_participant_left() {
        let now = Instant::now();
        let mut host = host();
        join(&mut host, 1, "FIRST1", now);
        host.on_channel_open(2, now);

        assert!(host.on_channel_close(2).is_empty());
        assert_eq!(
            host.on_channel_close(1),
            vec![Outbound::broadcast(Message::ParticipantLeft {
                participant_id: "FIRST1".to_string()
            })]
        );
        assert_eq!(host.session().registry().len(), 1);
        assert!(host.on_channel_close(1).is_empty());
    }

    #[test]
    fn test_after_end_registry_is_frozen() {
        let now = Instant::now();
        let (mut host, _) = seeking(now);
        host.poll_timers(now + Duration::from_secs(180));
        assert_eq!(host.phase(), Phase::Ended);

        assert!(host.on_channel_close(1).is_empty());
        assert!(host.session().registry().contains("HUNTR1"));

        assert_eq!(host.on_channel_open(5, now), None);
        assert_eq!(host.connection_count(), 0);
        let dispatch = host.on_message(5, Message::Join(joiner("LATE01")), now);
        assert_eq!(dispatch.verdict, Verdict::IgnoredUnboundConnection);
        assert!(!host.session().registry().contains("LATE01"));
    }

    #[test]
    fn test_join_after_end_on_open_channel_is_refused() {
        let now = Instant::now();
        let (mut host, _) = seeking(now);
        assert!(host.on_channel_open(2, now).is_some());
        host.poll_timers(now + Duration::from_secs(180));
        assert_eq!(host.phase(), Phase::Ended);

        let dispatch = host.on_message(2, Message::Join(joiner("LATE01")), now);
        assert_eq!(dispatch.verdict, Verdict::RefusedAfterEnd);
        assert!(dispatch.outbound.is_empty());
        assert_eq!(host.connection_count(), 1);
        assert!(!host.session().registry().contains("LATE01"));

        // The joined hunter's connection is unaffected.
        let again = host.on_message(1, Message::Join(joiner("HUNTR1")), now);
        assert_eq!(again.verdict, Verdict::IgnoredDuplicateJoin);
        assert_eq!(host.bound_participant(1), Some("HUNTR1"));
    }
}
