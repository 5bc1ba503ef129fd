//! Hide-and-Seek Simulation Core
//!
//! This crate contains the geometry and rules every peer runs locally:
//! avatar movement with obstacle collision, the catch proximity test,
//! game-outcome selection, obstacle layout generation and the replica digest.
//!
//! # Architecture Constraints
//!
//! The Simulation Core MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness (callers pass the RNG)
//!
//! Session state, timers and message handling live in `hideseek-session`.

#![deny(unsafe_code)]

pub mod layout;

pub use layout::{LayoutConfig, PALETTE, generate_obstacles, random_color, random_spawn};

// ============================================================================
// World Constants
// ============================================================================

/// World width in world units.
pub const WORLD_WIDTH: f64 = 800.0;

/// World height in world units.
pub const WORLD_HEIGHT: f64 = 500.0;

/// Avatar radius.
pub const AVATAR_RADIUS: f64 = 15.0;

/// Hunter displacement per tick per held axis.
pub const HUNTER_SPEED: f64 = 3.0;

/// Hider displacement per tick per held axis.
pub const HIDER_SPEED: f64 = 2.5;

/// Center-to-center distance below which a hunter captures a hider.
/// The boundary is exclusive: a distance equal to the threshold is not a catch.
pub const CATCH_THRESHOLD: f64 = 20.0;

// ============================================================================
// Core Types
// ============================================================================

/// 2D world coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Vec2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Participant role. Exactly one per participant; assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Hider,
    Hunter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hider => "hider",
            Self::Hunter => "hunter",
        }
    }
}

/// Axis-aligned static obstacle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Obstacle {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Closest point on (or in) the rectangle to `point`.
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x.clamp(self.x, self.x + self.width),
            point.y.clamp(self.y, self.y + self.height),
        )
    }
}

/// Per-tick movement intent read from held input.
///
/// Each axis is a unit direction in {-1, 0, 1}; axes are independent, so a
/// diagonal moves `speed` along both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveIntent {
    pub dx: i8,
    pub dy: i8,
}

impl MoveIntent {
    pub const IDLE: MoveIntent = MoveIntent { dx: 0, dy: 0 };

    /// Build an intent, normalizing each axis to its sign.
    pub fn new(dx: i8, dy: i8) -> Self {
        Self {
            dx: dx.signum(),
            dy: dy.signum(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    HidersWin,
    HuntersWin,
}

impl Outcome {
    /// Hiders win iff at least one hider is still uncaptured.
    pub fn from_survivors(uncaptured_hiders: usize) -> Self {
        if uncaptured_hiders > 0 {
            Self::HidersWin
        } else {
            Self::HuntersWin
        }
    }

    /// Winning role for this outcome.
    pub fn winning_role(&self) -> Role {
        match self {
            Self::HidersWin => Role::Hider,
            Self::HuntersWin => Role::Hunter,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::HidersWin => "Hiders win!",
            Self::HuntersWin => "Hunters win!",
        }
    }
}

// ============================================================================
// Movement & Collision
// ============================================================================

/// Movement tuning shared by every peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementConfig {
    pub world_width: f64,
    pub world_height: f64,
    pub avatar_radius: f64,
    pub hunter_speed: f64,
    pub hider_speed: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            avatar_radius: AVATAR_RADIUS,
            hunter_speed: HUNTER_SPEED,
            hider_speed: HIDER_SPEED,
        }
    }
}

impl MovementConfig {
    /// Per-tick speed for `role`. Hunters are faster.
    pub fn speed(&self, role: Role) -> f64 {
        match role {
            Role::Hunter => self.hunter_speed,
            Role::Hider => self.hider_speed,
        }
    }

    /// Clamp `position` into the world bounds shrunk by the avatar radius.
    pub fn clamp_to_world(&self, position: Vec2) -> Vec2 {
        let r = self.avatar_radius;
        Vec2::new(
            position.x.clamp(r, self.world_width - r),
            position.y.clamp(r, self.world_height - r),
        )
    }
}

/// Advance one avatar by one tick.
///
/// Applies the role speed to the intent, clamps to the world, then resolves
/// obstacles sequentially in list order. An idle intent leaves the avatar
/// where it is.
pub fn step_avatar(
    position: Vec2,
    role: Role,
    intent: MoveIntent,
    obstacles: &[Obstacle],
    config: &MovementConfig,
) -> Vec2 {
    if intent.is_idle() {
        return position;
    }

    let speed = config.speed(role);
    let moved = Vec2::new(
        position.x + f64::from(intent.dx) * speed,
        position.y + f64::from(intent.dy) * speed,
    );

    obstacles
        .iter()
        .fold(config.clamp_to_world(moved), |center, obstacle| {
            resolve_collision(center, obstacle, config.avatar_radius)
        })
}

/// Push an avatar out of `obstacle` so its center ends exactly `radius` away
/// from the obstacle's closest point.
///
/// If the center is inside the rectangle the push goes through the nearest
/// edge.
pub fn resolve_collision(center: Vec2, obstacle: &Obstacle, radius: f64) -> Vec2 {
    let closest = obstacle.closest_point(center);
    let dx = center.x - closest.x;
    let dy = center.y - closest.y;
    let distance = dx.hypot(dy);

    if distance >= radius {
        return center;
    }

    if distance > 0.0 {
        let scale = radius / distance;
        return Vec2::new(closest.x + dx * scale, closest.y + dy * scale);
    }

    let left = center.x - obstacle.x;
    let right = obstacle.x + obstacle.width - center.x;
    let top = center.y - obstacle.y;
    let bottom = obstacle.y + obstacle.height - center.y;
    let nearest = left.min(right).min(top).min(bottom);

    if nearest == left {
        Vec2::new(obstacle.x - radius, center.y)
    } else if nearest == right {
        Vec2::new(obstacle.x + obstacle.width + radius, center.y)
    } else if nearest == top {
        Vec2::new(center.x, obstacle.y - radius)
    } else {
        Vec2::new(center.x, obstacle.y + obstacle.height + radius)
    }
}

// ============================================================================
// Catch Test
// ============================================================================

/// True iff a hunter at `hunter` catches a hider at `hider`.
pub fn within_catch_range(hunter: Vec2, hider: Vec2, threshold: f64) -> bool {
    hunter.distance(hider) < threshold
}

// ============================================================================
// Replica Digest
// ============================================================================

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100000001b3;

/// FNV-1a 64-bit hasher used to fingerprint replicas.
///
/// Two peers holding the same replicated state produce the same digest as
/// long as callers feed fields in a canonical order.
#[derive(Debug, Clone)]
pub struct Fnv1a64 {
    state: u64,
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Fnv1a64 {
    pub fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    /// Hash a length-prefixed string so adjacent strings cannot alias.
    pub fn update_str(&mut self, value: &str) {
        self.update(&(value.len() as u64).to_le_bytes());
        self.update(value.as_bytes());
    }

    pub fn update_f64(&mut self, value: f64) {
        self.update(&canonicalize_f64(value).to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.state
    }
}

/// Canonicalize an f64 value for deterministic hashing.
///
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7ff8000000000000`
fn canonicalize_f64(value: f64) -> u64 {
    const QUIET_NAN_BITS: u64 = 0x7ff8000000000000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        0u64
    } else {
        value.to_bits()
    }
}

// ============================================================================
// Tests
// ============================================================================
