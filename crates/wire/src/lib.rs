//! Hide-and-Seek Wire Protocol Types
//!
//! This crate defines the Protobuf messages exchanged between a session host
//! and its clients. Host and client binaries MUST both depend on this crate so
//! that every peer speaks the same schema.
//!
//! # Framing
//!
//! Every message travels as a single [`Envelope`] whose `body` is a `oneof`.
//! A peer running an older schema decodes an unknown body tag as
//! `body: None`; receivers treat that as an unknown message kind and drop it.
//!
//! # Message Directions
//!
//! - Client → host: `Join`, `PositionUpdate`
//! - Host → client: `Snapshot`, `JoinAccepted`, `PositionUpdate`,
//!   `PhaseChanged`, `Captured`, `GameEnded`, `ParticipantJoined`,
//!   `ParticipantLeft`

#![deny(unsafe_code)]

use prost::Message;

// ============================================================================
// Enumerations
// ============================================================================

/// Participant role on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RoleProto {
    Hider = 0,
    Hunter = 1,
}

/// Session phase on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PhaseProto {
    Waiting = 0,
    Hiding = 1,
    Seeking = 2,
    Ended = 3,
}

/// Game outcome on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum OutcomeProto {
    HidersWin = 0,
    HuntersWin = 1,
}

// ============================================================================
// Shared Records
// ============================================================================

/// Full participant record.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantProto {
    /// Stable 6-character identity.
    #[prost(string, tag = "1")]
    pub id: String,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(enumeration = "RoleProto", tag = "3")]
    pub role: i32,

    #[prost(double, tag = "4")]
    pub x: f64,

    #[prost(double, tag = "5")]
    pub y: f64,

    /// Only meaningful when role = Hider.
    #[prost(bool, tag = "6")]
    pub captured: bool,

    /// Display-only colour token.
    #[prost(string, tag = "7")]
    pub color: String,
}

/// Axis-aligned obstacle rectangle.
#[derive(Clone, PartialEq, Message)]
pub struct ObstacleProto {
    #[prost(double, tag = "1")]
    pub x: f64,

    #[prost(double, tag = "2")]
    pub y: f64,

    #[prost(double, tag = "3")]
    pub width: f64,

    #[prost(double, tag = "4")]
    pub height: f64,
}

// ============================================================================
// Messages
// ============================================================================

/// Client asks to join; carries the client's provisional record.
#[derive(Clone, PartialEq, Message)]
pub struct Join {
    #[prost(message, optional, tag = "1")]
    pub participant: Option<ParticipantProto>,
}

/// Host acknowledges a join with the authoritative record.
#[derive(Clone, PartialEq, Message)]
pub struct JoinAccepted {
    #[prost(message, optional, tag = "1")]
    pub participant: Option<ParticipantProto>,
}

/// Full state sent once to a newly opened connection.
#[derive(Clone, PartialEq, Message)]
pub struct Snapshot {
    #[prost(enumeration = "PhaseProto", tag = "1")]
    pub phase: i32,

    #[prost(message, repeated, tag = "2")]
    pub participants: Vec<ParticipantProto>,

    #[prost(message, repeated, tag = "3")]
    pub obstacles: Vec<ObstacleProto>,

    /// Seconds since the Hiding phase began; 0 while Waiting.
    #[prost(double, tag = "4")]
    pub elapsed_seconds: f64,
}

/// A participant moved.
#[derive(Clone, PartialEq, Message)]
pub struct PositionUpdate {
    #[prost(string, tag = "1")]
    pub participant_id: String,

    #[prost(double, tag = "2")]
    pub x: f64,

    #[prost(double, tag = "3")]
    pub y: f64,
}

/// Phase transition. Obstacles are attached only on entry to Hiding.
#[derive(Clone, PartialEq, Message)]
pub struct PhaseChanged {
    #[prost(enumeration = "PhaseProto", tag = "1")]
    pub phase: i32,

    #[prost(message, repeated, tag = "2")]
    pub obstacles: Vec<ObstacleProto>,
}

/// A hider was captured.
#[derive(Clone, PartialEq, Message)]
pub struct Captured {
    #[prost(string, tag = "1")]
    pub participant_id: String,
}

/// Terminal message for a session.
#[derive(Clone, PartialEq, Message)]
pub struct GameEnded {
    #[prost(message, repeated, tag = "1")]
    pub winners: Vec<ParticipantProto>,

    #[prost(enumeration = "OutcomeProto", tag = "2")]
    pub outcome: i32,

    /// Human-readable result line.
    #[prost(string, tag = "3")]
    pub message: String,
}

/// Registry delta: someone else joined.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantJoined {
    #[prost(message, optional, tag = "1")]
    pub participant: Option<ParticipantProto>,
}

/// Registry delta: someone left.
#[derive(Clone, PartialEq, Message)]
pub struct ParticipantLeft {
    #[prost(string, tag = "1")]
    pub participant_id: String,
}

/// Top-level frame for every message on a peer channel.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(oneof = "envelope::Body", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9")]
    pub body: Option<envelope::Body>,
}

pub mod envelope {
    /// Message kinds. New kinds MUST take new tags.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        Join(super::Join),
        #[prost(message, tag = "2")]
        JoinAccepted(super::JoinAccepted),
        #[prost(message, tag = "3")]
        Snapshot(super::Snapshot),
        #[prost(message, tag = "4")]
        PositionUpdate(super::PositionUpdate),
        #[prost(message, tag = "5")]
        PhaseChanged(super::PhaseChanged),
        #[prost(message, tag = "6")]
        Captured(super::Captured),
        #[prost(message, tag = "7")]
        GameEnded(super::GameEnded),
        #[prost(message, tag = "8")]
        ParticipantJoined(super::ParticipantJoined),
        #[prost(message, tag = "9")]
        ParticipantLeft(super::ParticipantLeft),
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

impl From<hideseek_sim::Role> for RoleProto {
    fn from(role: hideseek_sim::Role) -> Self {
        match role {
            hideseek_sim::Role::Hider => Self::Hider,
            hideseek_sim::Role::Hunter => Self::Hunter,
        }
    }
}

impl From<RoleProto> for hideseek_sim::Role {
    fn from(role: RoleProto) -> Self {
        match role {
            RoleProto::Hider => Self::Hider,
            RoleProto::Hunter => Self::Hunter,
        }
    }
}

impl From<hideseek_sim::Outcome> for OutcomeProto {
    fn from(outcome: hideseek_sim::Outcome) -> Self {
        match outcome {
            hideseek_sim::Outcome::HidersWin => Self::HidersWin,
            hideseek_sim::Outcome::HuntersWin => Self::HuntersWin,
        }
    }
}

impl From<OutcomeProto> for hideseek_sim::Outcome {
    fn from(outcome: OutcomeProto) -> Self {
        match outcome {
            OutcomeProto::HidersWin => Self::HidersWin,
            OutcomeProto::HuntersWin => Self::HuntersWin,
        }
    }
}

impl From<hideseek_sim::Obstacle> for ObstacleProto {
    fn from(o: hideseek_sim::Obstacle) -> Self {
        Self {
            x: o.x,
            y: o.y,
            width: o.width,
            height: o.height,
        }
    }
}

impl TryFrom<ObstacleProto> for hideseek_sim::Obstacle {
    type Error = &'static str;

    fn try_from(o: ObstacleProto) -> Result<Self, Self::Error> {
        let fields = [o.x, o.y, o.width, o.height];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err("obstacle fields must be finite");
        }
        if o.width < 0.0 || o.height < 0.0 {
            return Err("obstacle extent must be non-negative");
        }
        Ok(Self::new(o.x, o.y, o.width, o.height))
    }
}

// ============================================================================
// Tests
// ============================================================================
