//! Replication protocol: domain messages, their wire encoding, addressing
//! and the verdicts returned by dispatch.
//!
//! Only the host authors `Snapshot`, `JoinAccepted`, `PhaseChanged`,
//! `Captured`, `GameEnded`, `ParticipantJoined` and `ParticipantLeft`, and
//! only the host accepts `Join`. `PositionUpdate` flows both ways.

use hideseek_sim::{Obstacle, Outcome, Role, Vec2};
use hideseek_wire::{
    self as wire, Envelope, ObstacleProto, OutcomeProto, ParticipantProto, PhaseProto, RoleProto,
    envelope::Body,
};
use prost::Message as ProstMessage;

use crate::ident::ParticipantId;
use crate::phase::Phase;
use crate::registry::Participant;
use crate::state::GameResult;

/// Host-local connection identifier.
pub type ConnId = u64;

// ============================================================================
// Messages
// ============================================================================

/// Every message kind exchanged between peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Client → host: request to join with a provisional record.
    Join(Participant),
    /// Host → joiner: authoritative record for the joiner.
    JoinAccepted(Participant),
    /// Host → new connection: full state, sent once on open.
    Snapshot {
        phase: Phase,
        participants: Vec<Participant>,
        obstacles: Vec<Obstacle>,
        elapsed_seconds: f64,
    },
    PositionUpdate {
        participant_id: ParticipantId,
        position: Vec2,
    },
    PhaseChanged {
        phase: Phase,
        obstacles: Vec<Obstacle>,
    },
    Captured {
        participant_id: ParticipantId,
    },
    GameEnded(GameResult),
    ParticipantJoined(Participant),
    ParticipantLeft {
        participant_id: ParticipantId,
    },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::JoinAccepted(_) => "joinAccepted",
            Self::Snapshot { .. } => "snapshot",
            Self::PositionUpdate { .. } => "positionUpdate",
            Self::PhaseChanged { .. } => "phaseChanged",
            Self::Captured { .. } => "captured",
            Self::GameEnded(_) => "gameEnded",
            Self::ParticipantJoined(_) => "participantJoined",
            Self::ParticipantLeft { .. } => "participantLeft",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let body = match self {
            Self::Join(p) => Body::Join(wire::Join {
                participant: Some(p.into()),
            }),
            Self::JoinAccepted(p) => Body::JoinAccepted(wire::JoinAccepted {
                participant: Some(p.into()),
            }),
            Self::Snapshot {
                phase,
                participants,
                obstacles,
                elapsed_seconds,
            } => Body::Snapshot(wire::Snapshot {
                phase: PhaseProto::from(*phase) as i32,
                participants: participants.iter().map(Into::into).collect(),
                obstacles: obstacles.iter().copied().map(Into::into).collect(),
                elapsed_seconds: *elapsed_seconds,
            }),
            Self::PositionUpdate {
                participant_id,
                position,
            } => Body::PositionUpdate(wire::PositionUpdate {
                participant_id: participant_id.clone(),
                x: position.x,
                y: position.y,
            }),
            Self::PhaseChanged { phase, obstacles } => Body::PhaseChanged(wire::PhaseChanged {
                phase: PhaseProto::from(*phase) as i32,
                obstacles: obstacles.iter().copied().map(Into::into).collect(),
            }),
            Self::Captured { participant_id } => Body::Captured(wire::Captured {
                participant_id: participant_id.clone(),
            }),
            Self::GameEnded(result) => Body::GameEnded(wire::GameEnded {
                winners: result.winners.iter().map(Into::into).collect(),
                outcome: OutcomeProto::from(result.outcome) as i32,
                message: result.message().to_string(),
            }),
            Self::ParticipantJoined(p) => Body::ParticipantJoined(wire::ParticipantJoined {
                participant: Some(p.into()),
            }),
            Self::ParticipantLeft { participant_id } => {
                Body::ParticipantLeft(wire::ParticipantLeft {
                    participant_id: participant_id.clone(),
                })
            }
        };
        Envelope { body: Some(body) }
    }

    /// Encode as one envelope frame.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.to_envelope().encode_to_vec()
    }

    /// Decode one envelope frame. `Ok(None)` means an unknown message kind.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, DecodeError> {
        Self::from_envelope(Envelope::decode(bytes)?)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>, DecodeError> {
        let Some(body) = envelope.body else {
            return Ok(None);
        };

        let message = match body {
            Body::Join(m) => Self::Join(required(m.participant, "participant")?.try_into()?),
            Body::JoinAccepted(m) => {
                Self::JoinAccepted(required(m.participant, "participant")?.try_into()?)
            }
            Body::Snapshot(m) => Self::Snapshot {
                phase: phase_from_wire(m.phase)?,
                participants: m
                    .participants
                    .into_iter()
                    .map(Participant::try_from)
                    .collect::<Result<_, _>>()?,
                obstacles: obstacles_from_wire(m.obstacles)?,
                elapsed_seconds: finite(m.elapsed_seconds, "elapsed_seconds")?.max(0.0),
            },
            Body::PositionUpdate(m) => Self::PositionUpdate {
                participant_id: non_empty_id(m.participant_id)?,
                position: Vec2::new(finite(m.x, "x")?, finite(m.y, "y")?),
            },
            Body::PhaseChanged(m) => Self::PhaseChanged {
                phase: phase_from_wire(m.phase)?,
                obstacles: obstacles_from_wire(m.obstacles)?,
            },
            Body::Captured(m) => Self::Captured {
                participant_id: non_empty_id(m.participant_id)?,
            },
            Body::GameEnded(m) => {
                let outcome = OutcomeProto::try_from(m.outcome).map_err(|_| {
                    DecodeError::InvalidEnum {
                        field: "outcome",
                        value: m.outcome,
                    }
                })?;
                Self::GameEnded(GameResult {
                    outcome: Outcome::from(outcome),
                    winners: m
                        .winners
                        .into_iter()
                        .map(Participant::try_from)
                        .collect::<Result<_, _>>()?,
                })
            }
            Body::ParticipantJoined(m) => {
                Self::ParticipantJoined(required(m.participant, "participant")?.try_into()?)
            }
            Body::ParticipantLeft(m) => Self::ParticipantLeft {
                participant_id: non_empty_id(m.participant_id)?,
            },
        };
        Ok(Some(message))
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// A frame that could not be turned into a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Frame(#[from] prost::DecodeError),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}` value {value}")]
    InvalidEnum { field: &'static str, value: i32 },

    #[error("invalid message: {0}")]
    Invalid(&'static str),
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField(field))
}

fn finite(value: f64, field: &'static str) -> Result<f64, DecodeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecodeError::Invalid(field))
    }
}

fn non_empty_id(id: String) -> Result<ParticipantId, DecodeError> {
    if id.is_empty() {
        return Err(DecodeError::MissingField("participant_id"));
    }
    Ok(id)
}

fn phase_from_wire(value: i32) -> Result<Phase, DecodeError> {
    PhaseProto::try_from(value)
        .map(Phase::from)
        .map_err(|_| DecodeError::InvalidEnum {
            field: "phase",
            value,
        })
}

fn obstacles_from_wire(obstacles: Vec<ObstacleProto>) -> Result<Vec<Obstacle>, DecodeError> {
    obstacles
        .into_iter()
        .map(|o| Obstacle::try_from(o).map_err(DecodeError::Invalid))
        .collect()
}

impl From<&Participant> for ParticipantProto {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            role: RoleProto::from(p.role) as i32,
            x: p.position.x,
            y: p.position.y,
            captured: p.captured,
            color: p.color.clone(),
        }
    }
}

impl TryFrom<ParticipantProto> for Participant {
    type Error = DecodeError;

    fn try_from(p: ParticipantProto) -> Result<Self, Self::Error> {
        let role = RoleProto::try_from(p.role).map_err(|_| DecodeError::InvalidEnum {
            field: "role",
            value: p.role,
        })?;
        Ok(Self {
            id: non_empty_id(p.id)?,
            name: p.name,
            role: Role::from(role),
            position: Vec2::new(finite(p.x, "x")?, finite(p.y, "y")?),
            captured: p.captured,
            color: p.color,
        })
    }
}

// ============================================================================
// Addressing
// ============================================================================

/// Which host connections an outbound message goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Connection(ConnId),
    All,
    AllExcept(ConnId),
}

impl Recipient {
    pub fn includes(self, conn: ConnId) -> bool {
        match self {
            Self::Connection(addressed) => conn == addressed,
            Self::All => true,
            Self::AllExcept(excluded) => conn != excluded,
        }
    }
}

/// A message the host must deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Recipient,
    pub message: Message,
}

impl Outbound {
    pub fn new(to: Recipient, message: Message) -> Self {
        Self { to, message }
    }

    pub fn broadcast(message: Message) -> Self {
        Self::new(Recipient::All, message)
    }
}

// ============================================================================
// Dispatch Results
// ============================================================================

/// What dispatch did with a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Applied to the local state.
    Applied,
    /// Only the host may author or accept this kind.
    IgnoredHostOnly,
    /// Sent on a connection that has not joined.
    IgnoredUnboundConnection,
    /// Second join on a connection, or an identity already registered.
    IgnoredDuplicateJoin,
    /// A second snapshot on the same session.
    IgnoredDuplicateSnapshot,
    /// Refers to a participant not in the registry.
    IgnoredUnknownParticipant,
    /// Position for an identity the sender does not own.
    IgnoredForeignParticipant,
    /// A client is authoritative for its own record until the host overrides it.
    IgnoredOwnRecord,
    /// Position of a captured hider.
    IgnoredFrozen,
    /// Not valid in the current phase.
    IgnoredWrongPhase,
    /// Phase change that does not move forward.
    IgnoredStalePhase,
    /// Received before the initial snapshot.
    IgnoredBeforeSnapshot,
    /// The game has ended; no further mutations apply.
    IgnoredAfterEnd,
    /// A join that arrived after the game ended. The connection has been
    /// forgotten and the driver must close it.
    RefusedAfterEnd,
}

impl Verdict {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Result of host dispatch: the verdict plus messages to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub verdict: Verdict,
    pub outbound: Vec<Outbound>,
}

impl Dispatch {
    pub fn applied(outbound: Vec<Outbound>) -> Self {
        Self {
            verdict: Verdict::Applied,
            outbound,
        }
    }

    pub fn ignored(verdict: Verdict) -> Self {
        Self {
            verdict,
            outbound: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
