//! Session state shared by host and client: the replica itself, game results
//! and the read-only view handed to renderers.

use std::time::{Duration, Instant};

use hideseek_sim::{Fnv1a64, MoveIntent, Obstacle, Outcome, Role, Vec2, step_avatar};

use crate::SessionConfig;
use crate::ident::ParticipantId;
use crate::phase::Phase;
use crate::registry::{Participant, Registry};

// ============================================================================
// Game Result
// ============================================================================

/// Winners and outcome of a finished game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameResult {
    pub outcome: Outcome,
    /// Ordered by participant id.
    pub winners: Vec<Participant>,
}

impl GameResult {
    /// Decide the result from the registry at the triggering instant.
    ///
    /// Any uncaptured hider means the hiders win and the winners are the
    /// uncaptured hiders; otherwise every hunter wins.
    pub fn decide(registry: &Registry) -> Self {
        let survivors = registry.uncaptured_hiders().count();
        let outcome = Outcome::from_survivors(survivors);

        let mut winners: Vec<Participant> = match outcome {
            Outcome::HidersWin => registry.uncaptured_hiders().cloned().collect(),
            Outcome::HuntersWin => registry.with_role(Role::Hunter).cloned().collect(),
        };
        winners.sort_by(|a, b| a.id.cmp(&b.id));

        Self { outcome, winners }
    }

    pub fn message(&self) -> &'static str {
        self.outcome.message()
    }
}

// ============================================================================
// Session
// ============================================================================

/// One peer's copy of the session. Canonical on the host, a replica
/// everywhere else.
#[derive(Debug, Clone)]
pub struct Session {
    code: String,
    local_id: ParticipantId,
    pub(crate) phase: Phase,
    /// Monotonic instant the Hiding phase began. `None` while Waiting.
    pub(crate) phase_started_at: Option<Instant>,
    pub(crate) registry: Registry,
    /// Empty iff Waiting.
    pub(crate) obstacles: Vec<Obstacle>,
    pub(crate) result: Option<GameResult>,
}

impl Session {
    pub(crate) fn new(code: String, local: Participant) -> Self {
        let local_id = local.id.clone();
        let mut registry = Registry::new();
        registry.insert(local);
        Self {
            code,
            local_id,
            phase: Phase::Waiting,
            phase_started_at: None,
            registry,
            obstacles: Vec::new(),
            result: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn local(&self) -> Option<&Participant> {
        self.registry.get(&self.local_id)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_started_at(&self) -> Option<Instant> {
        self.phase_started_at
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Time since Hiding began, always measured against the phase-start
    /// stamp rather than accumulated per tick.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.phase_started_at
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    /// Time left on the countdown shown for the current phase.
    ///
    /// Hiding counts down the hide duration; Seeking counts down the rest of
    /// the total game duration. Other phases have no countdown.
    pub fn countdown(&self, now: Instant, config: &SessionConfig) -> Option<Duration> {
        let total = match self.phase {
            Phase::Hiding => config.hide_duration,
            Phase::Seeking => config.game_duration,
            Phase::Waiting | Phase::Ended => return None,
        };
        Some(total.saturating_sub(self.elapsed(now)))
    }

    /// Fingerprint of the replicated state that every peer must agree on.
    ///
    /// Covers phase, the `{id, role, captured, color}` set and obstacle
    /// geometry. Positions are excluded: they are best-effort and each client
    /// is authoritative for its own.
    pub fn digest(&self) -> u64 {
        let mut hasher = Fnv1a64::new();
        hasher.update(&[self.phase as u8]);

        let participants = self.registry.sorted();
        hasher.update(&(participants.len() as u64).to_le_bytes());
        for p in participants {
            hasher.update_str(&p.id);
            hasher.update_str(p.role.as_str());
            hasher.update(&[u8::from(p.captured)]);
            hasher.update_str(&p.color);
        }

        hasher.update(&(self.obstacles.len() as u64).to_le_bytes());
        for o in &self.obstacles {
            hasher.update_f64(o.x);
            hasher.update_f64(o.y);
            hasher.update_f64(o.width);
            hasher.update_f64(o.height);
        }

        hasher.finish()
    }

    /// Read-only view for the rendering collaborator.
    pub fn view(&self, now: Instant, config: &SessionConfig, is_host: bool) -> SessionView {
        SessionView {
            code: self.code.clone(),
            local_id: self.local_id.clone(),
            is_host,
            phase: self.phase,
            participants: self.registry.sorted().into_iter().cloned().collect(),
            obstacles: self.obstacles.clone(),
            countdown: self.countdown(now, config),
            result: self.result.clone(),
        }
    }

    /// Move the local avatar one tick.
    ///
    /// Returns the new position if the avatar moved. Nothing moves outside
    /// Hiding and Seeking, and a captured hider stays frozen.
    pub(crate) fn step_local(
        &mut self,
        intent: MoveIntent,
        config: &SessionConfig,
    ) -> Option<Vec2> {
        if !self.phase.is_running() {
            return None;
        }
        let local = self.registry.get_mut(&self.local_id)?;
        if local.is_frozen() {
            return None;
        }

        let next = step_avatar(
            local.position,
            local.role,
            intent,
            &self.obstacles,
            &config.movement,
        );
        if next == local.position {
            return None;
        }
        local.position = next;
        Some(next)
    }

    pub(crate) fn enter_hiding(&mut self, now: Instant, obstacles: Vec<Obstacle>) {
        self.phase = Phase::Hiding;
        self.phase_started_at = Some(now);
        self.obstacles = obstacles;
    }

    pub(crate) fn end(&mut self, result: GameResult) {
        self.phase = Phase::Ended;
        self.result = Some(result);
    }

    /// Back to Waiting with only the local participant, restored to `role`
    /// and uncaptured.
    pub(crate) fn reset(&mut self, role: Role) {
        self.phase = Phase::Waiting;
        self.phase_started_at = None;
        self.obstacles.clear();
        self.result = None;
        self.registry.retain_only(&self.local_id);
        if let Some(local) = self.registry.get_mut(&self.local_id) {
            local.role = role;
            local.captured = false;
        }
    }
}

// ============================================================================
// Session View
// ============================================================================

/// Snapshot of a session for display. Never fed back into the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub code: String,
    pub local_id: ParticipantId,
    pub is_host: bool,
    pub phase: Phase,
    /// Ordered by participant id.
    pub participants: Vec<Participant>,
    pub obstacles: Vec<Obstacle>,
    /// Time left on the current phase's countdown.
    pub countdown: Option<Duration>,
    pub result: Option<GameResult>,
}

impl SessionView {
    pub fn local(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == self.local_id)
    }

    pub fn uncaptured_hiders(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.is_uncaptured_hider())
            .count()
    }
}
