//! Movement intent sources, read once per tick.

use hideseek_sim::MoveIntent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;

/// Produces the local avatar's movement intent for the current tick.
pub trait IntentSource: Send + 'static {
    fn intent(&mut self) -> MoveIntent;
}

impl<F> IntentSource for F
where
    F: FnMut() -> MoveIntent + Send + 'static,
{
    fn intent(&mut self) -> MoveIntent {
        self()
    }
}

/// Held input published by a UI thread through a `watch` channel.
#[derive(Debug, Clone)]
pub struct HeldInput(pub watch::Receiver<MoveIntent>);

impl IntentSource for HeldInput {
    fn intent(&mut self) -> MoveIntent {
        *self.0.borrow_and_update()
    }
}

/// Never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

impl IntentSource for Idle {
    fn intent(&mut self) -> MoveIntent {
        MoveIntent::IDLE
    }
}

/// Random walk: holds a random direction for a random number of ticks.
#[derive(Debug, Clone)]
pub struct Wander {
    rng: StdRng,
    current: MoveIntent,
    ticks_left: u32,
    max_hold_ticks: u32,
}

impl Wander {
    pub fn new(seed: u64, max_hold_ticks: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            current: MoveIntent::IDLE,
            ticks_left: 0,
            max_hold_ticks: max_hold_ticks.max(1),
        }
    }
}

impl IntentSource for Wander {
    fn intent(&mut self) -> MoveIntent {
        if self.ticks_left == 0 {
            self.current = MoveIntent::new(self.rng.gen_range(-1..=1), self.rng.gen_range(-1..=1));
            self.ticks_left = self.rng.gen_range(1..=self.max_hold_ticks);
        }
        self.ticks_left -= 1;
        self.current
    }
}
