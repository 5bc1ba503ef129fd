//! Obstacle layout, spawn points and avatar colours.
//!
//! All generators take the RNG from the caller; the host seeds one per
//! session so a layout can be reproduced from its seed.

use rand::Rng;

use crate::{Obstacle, Vec2, WORLD_HEIGHT, WORLD_WIDTH};

/// Display colours handed out to participants.
pub const PALETTE: [&str; 10] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c", "#d35400", "#34495e",
    "#7f8c8d", "#27ae60",
];

/// Distance kept between a fresh spawn point and the world edge.
const SPAWN_MARGIN: f64 = 20.0;

/// Obstacle layout parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub world_width: f64,
    pub world_height: f64,
    /// Inclusive lower bound on the obstacle count. Must be at least 1.
    pub min_count: usize,
    /// Inclusive upper bound on the obstacle count.
    pub max_count: usize,
    /// Obstacle origins are kept this far from the world edges.
    pub margin: f64,
    pub min_side: f64,
    pub max_side: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            min_count: 10,
            max_count: 19,
            margin: 50.0,
            min_side: 20.0,
            max_side: 100.0,
        }
    }
}

/// Generate the static obstacle list for one game.
///
/// The result is never empty.
pub fn generate_obstacles<R: Rng + ?Sized>(rng: &mut R, config: &LayoutConfig) -> Vec<Obstacle> {
    assert!(config.min_count >= 1, "layout needs at least one obstacle");
    assert!(
        config.min_count <= config.max_count,
        "min_count must not exceed max_count"
    );

    let count = rng.gen_range(config.min_count..=config.max_count);
    (0..count)
        .map(|_| {
            Obstacle::new(
                rng.gen_range(config.margin..config.world_width - config.margin),
                rng.gen_range(config.margin..config.world_height - config.margin),
                rng.gen_range(config.min_side..config.max_side),
                rng.gen_range(config.min_side..config.max_side),
            )
        })
        .collect()
}

/// Random spawn point inside the world.
pub fn random_spawn<R: Rng + ?Sized>(rng: &mut R, world_width: f64, world_height: f64) -> Vec2 {
    Vec2::new(
        rng.gen_range(SPAWN_MARGIN..world_width - SPAWN_MARGIN),
        rng.gen_range(SPAWN_MARGIN..world_height - SPAWN_MARGIN),
    )
}

/// Random display colour from [`PALETTE`].
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    PALETTE[rng.gen_range(0..PALETTE.len())]
}
