//! Phase state machine and the host-local timers that drive it.
//!
//! Phases only move forward: `Waiting → Hiding → Seeking → Ended`. A reset
//! starts a fresh game in `Waiting`; it is not a back-transition of the
//! current one.
//!
//! Timers are plain deadlines polled by the driver. They are cancelled on
//! every phase change and on reset, and each firing still re-checks the phase
//! it guards before acting.

use std::time::{Duration, Instant};

use hideseek_wire::PhaseProto;

/// Game phase. Ordered so that `a < b` means `a` precedes `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Waiting,
    Hiding,
    Seeking,
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Hiding => "hiding",
            Self::Seeking => "seeking",
            Self::Ended => "ended",
        }
    }

    /// Avatars move only while the game is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Hiding | Self::Seeking)
    }
}

impl From<Phase> for PhaseProto {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Waiting => Self::Waiting,
            Phase::Hiding => Self::Hiding,
            Phase::Seeking => Self::Seeking,
            Phase::Ended => Self::Ended,
        }
    }
}

impl From<PhaseProto> for Phase {
    fn from(phase: PhaseProto) -> Self {
        match phase {
            PhaseProto::Waiting => Self::Waiting,
            PhaseProto::Hiding => Self::Hiding,
            PhaseProto::Seeking => Self::Seeking,
            PhaseProto::Ended => Self::Ended,
        }
    }
}

/// Host-local timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKind {
    /// Hide duration elapsed; guards `Hiding → Seeking`.
    HideElapsed,
    /// Total game duration elapsed; guards `Seeking → Ended`.
    GameElapsed,
    /// Grace delay after the last capture; guards `Seeking → Ended`.
    EndGrace,
}

impl TimerKind {
    /// Phase the timer is allowed to act in.
    pub fn guarded_phase(&self) -> Phase {
        match self {
            Self::HideElapsed => Phase::Hiding,
            Self::GameElapsed | Self::EndGrace => Phase::Seeking,
        }
    }
}

/// Armed deadlines, at most one per [`TimerKind`].
#[derive(Debug, Clone, Default)]
pub struct PhaseTimers {
    hide: Option<Instant>,
    game: Option<Instant>,
    end_grace: Option<Instant>,
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the hide and total-game timers from the Hiding start instant.
    ///
    /// Returns `false`, arming nothing, if either deadline is not
    /// representable.
    pub fn arm_game(&mut self, started_at: Instant, hide: Duration, game: Duration) -> bool {
        let (Some(hide), Some(game)) = (started_at.checked_add(hide), started_at.checked_add(game))
        else {
            return false;
        };
        self.hide = Some(hide);
        self.game = Some(game);
        true
    }

    /// Arm the end-of-game grace timer. An already armed grace timer keeps
    /// its earlier deadline.
    pub fn arm_end_grace(&mut self, at: Instant) {
        self.end_grace = Some(self.end_grace.map_or(at, |existing| existing.min(at)));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    pub fn cancel_all(&mut self) {
        *self = Self::default();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        match kind {
            TimerKind::HideElapsed => self.hide,
            TimerKind::GameElapsed => self.game,
            TimerKind::EndGrace => self.end_grace,
        }
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.hide, self.game, self.end_grace]
            .into_iter()
            .flatten()
            .min()
    }

    /// Disarm and return the earliest timer due at `now`. Ties resolve in
    /// [`TimerKind`] order.
    pub fn take_due(&mut self, now: Instant) -> Option<TimerKind> {
        let due = [
            TimerKind::HideElapsed,
            TimerKind::GameElapsed,
            TimerKind::EndGrace,
        ]
        .into_iter()
        .filter_map(|kind| {
            self.deadline(kind)
                .filter(|deadline| *deadline <= now)
                .map(|deadline| (deadline, kind))
        })
        .min()?;

        self.cancel(due.1);
        Some(due.1)
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<Instant> {
        match kind {
            TimerKind::HideElapsed => &mut self.hide,
            TimerKind::GameElapsed => &mut self.game,
            TimerKind::EndGrace => &mut self.end_grace,
        }
    }
}
