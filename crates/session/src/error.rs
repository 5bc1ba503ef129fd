//! Errors reported synchronously to the user who initiated an action.
//!
//! Protocol violations from peers are not errors; they surface as a
//! [`Verdict`](crate::protocol::Verdict) and are dropped.

use crate::ident::SESSION_CODE_LEN;
use crate::phase::Phase;

/// Input validation failures. Session state is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("please enter your name")]
    EmptyName,

    #[error("session code must be {SESSION_CODE_LEN} alphanumeric characters, got {0:?}")]
    InvalidSessionCode(String),

    #[error("need at least {need} participants to start, have {have}")]
    NotEnoughParticipants { have: usize, need: usize },

    #[error("cannot {action} while the session is {actual:?}")]
    WrongPhase { action: &'static str, actual: Phase },

    #[error("invalid session configuration: {0}")]
    InvalidConfig(&'static str),
}
