//! Client-side dispatch.
//!
//! A client holds a replica that changes only through host messages. The one
//! exception is its own position, which it steps locally and reports.

use std::time::{Duration, Instant};

use hideseek_sim::{MoveIntent, Role, random_color, random_spawn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::SessionConfig;
use crate::error::SessionError;
use crate::ident::{self, generate_participant_id, normalize_session_code, validate_name};
use crate::phase::Phase;
use crate::protocol::{Message, Verdict};
use crate::registry::Participant;
use crate::state::{Session, SessionView};

/// A joining peer's replica of the host's session.
#[derive(Debug)]
pub struct ClientSession {
    config: SessionConfig,
    session: Session,
    /// Set once the initial snapshot has been applied.
    synced: bool,
}

impl ClientSession {
    /// Prepare to join the session `code_input`.
    ///
    /// The local participant starts as a provisional hunter; the host's
    /// `joinAccepted` overwrites it.
    pub fn new(
        name: &str,
        code_input: &str,
        config: SessionConfig,
        seed: u64,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let name = validate_name(name)?;
        let code = normalize_session_code(code_input)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let id = generate_participant_id(&mut rng);
        let position = random_spawn(
            &mut rng,
            config.movement.world_width,
            config.movement.world_height,
        );
        let local = Participant::new(id, name, Role::Hunter, position, random_color(&mut rng));

        Ok(Self {
            config,
            session: Session::new(code, local),
            synced: false,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_id(&self) -> &str {
        self.session.local_id()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Rendezvous identity of the host to connect to.
    pub fn host_identity(&self) -> String {
        ident::host_identity(self.session.code())
    }

    /// The `join` request carrying the provisional local record.
    pub fn join_request(&self) -> Option<Message> {
        self.session.local().cloned().map(Message::Join)
    }

    pub fn view(&self, now: Instant) -> SessionView {
        self.session.view(now, &self.config, false)
    }

    /// Apply one message from the host.
    pub fn on_message(&mut self, message: Message, now: Instant) -> Verdict {
        let kind = message.kind();
        let verdict = self.apply(message, now);
        if verdict.is_applied() {
            debug!(kind, phase = self.phase().as_str(), "applied host message");
        } else {
            debug!(kind, ?verdict, "host message ignored");
        }
        verdict
    }

    fn apply(&mut self, message: Message, now: Instant) -> Verdict {
        if !self.synced && !matches!(message, Message::Snapshot { .. }) {
            return Verdict::IgnoredBeforeSnapshot;
        }
        if self.phase() == Phase::Ended
            && !matches!(message, Message::Join(_) | Message::Snapshot { .. })
        {
            return Verdict::IgnoredAfterEnd;
        }

        match message {
            Message::Join(_) => Verdict::IgnoredHostOnly,

            Message::Snapshot {
                phase,
                participants,
                obstacles,
                elapsed_seconds,
            } => {
                if self.synced {
                    return Verdict::IgnoredDuplicateSnapshot;
                }
                let local = self.session.local().cloned();
                self.session.registry.replace_all(participants);
                if let Some(local) = local {
                    if !self.session.registry.contains(&local.id) {
                        self.session.registry.insert(local);
                    }
                }
                self.session.phase = phase;
                self.session.obstacles = obstacles;
                self.session.phase_started_at = match phase {
                    Phase::Waiting => None,
                    _ => {
                        let elapsed = Duration::try_from_secs_f64(elapsed_seconds)
                            .unwrap_or_default();
                        Some(now.checked_sub(elapsed).unwrap_or(now))
                    }
                };
                self.synced = true;
                info!(
                    code = self.session.code(),
                    phase = phase.as_str(),
                    participants = self.session.registry().len(),
                    "joined session"
                );
                Verdict::Applied
            }

            Message::JoinAccepted(accepted) => {
                if accepted.id != self.session.local_id() {
                    return Verdict::IgnoredForeignParticipant;
                }
                let Some(local) = self.session.registry.get_mut(&accepted.id) else {
                    return Verdict::IgnoredUnknownParticipant;
                };
                // Host decides role and flags; the position stays ours.
                let position = local.position;
                *local = Participant {
                    position,
                    ..accepted
                };
                info!(role = local.role.as_str(), "join accepted");
                Verdict::Applied
            }

            Message::PositionUpdate {
                participant_id,
                position,
            } => {
                if participant_id == self.session.local_id() {
                    return Verdict::IgnoredOwnRecord;
                }
                let Some(participant) = self.session.registry.get_mut(&participant_id) else {
                    return Verdict::IgnoredUnknownParticipant;
                };
                if participant.is_frozen() {
                    return Verdict::IgnoredFrozen;
                }
                participant.position = position;
                Verdict::Applied
            }

            Message::PhaseChanged { phase, obstacles } => {
                if phase <= self.session.phase {
                    return Verdict::IgnoredStalePhase;
                }
                if phase == Phase::Hiding {
                    self.session.enter_hiding(now, obstacles);
                } else {
                    self.session.phase = phase;
                    if self.session.phase_started_at.is_none() {
                        self.session.phase_started_at = Some(now);
                    }
                    if self.session.obstacles.is_empty() {
                        self.session.obstacles = obstacles;
                    }
                }
                info!(phase = phase.as_str(), "phase changed");
                Verdict::Applied
            }

            Message::Captured { participant_id } => {
                let Some(participant) = self.session.registry.get_mut(&participant_id) else {
                    return Verdict::IgnoredUnknownParticipant;
                };
                participant.captured = true;
                info!(participant = %participant_id, "captured");
                Verdict::Applied
            }

            Message::GameEnded(result) => {
                info!(outcome = result.message(), "game ended");
                self.session.end(result);
                Verdict::Applied
            }

            Message::ParticipantJoined(participant) => {
                if participant.id == self.session.local_id() {
                    return Verdict::IgnoredOwnRecord;
                }
                self.session.registry.insert(participant);
                Verdict::Applied
            }

            Message::ParticipantLeft { participant_id } => {
                if participant_id == self.session.local_id() {
                    return Verdict::IgnoredOwnRecord;
                }
                match self.session.registry.remove(&participant_id) {
                    Some(_) => Verdict::Applied,
                    None => Verdict::IgnoredUnknownParticipant,
                }
            }
        }
    }

    /// Advance the local avatar one tick. Returns the update to send to the
    /// host if the avatar moved.
    pub fn step_local(&mut self, intent: MoveIntent) -> Option<Message> {
        let position = self.session.step_local(intent, &self.config)?;
        Some(Message::PositionUpdate {
            participant_id: self.session.local_id().to_string(),
            position,
        })
    }

    /// Drop back to the pre-session state: only the local participant, a
    /// provisional hunter again, awaiting a fresh snapshot.
    pub fn reset(&mut self) {
        self.session.reset(Role::Hunter);
        self.synced = false;
    }
}
