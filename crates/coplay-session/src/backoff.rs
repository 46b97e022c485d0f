use std::time::Duration;

use rand::Rng;

/// Highest slot index a reconnect attempt can draw from.
pub const RECONNECT_MAX_SLOT_IDX: u32 = 10;
/// Unit delay multiplied by the drawn power-of-two slot.
pub const RECONNECT_SLOT_DELAY: Duration = Duration::from_millis(10);
/// Fixed delay added to every reconnect attempt.
pub const RECONNECT_DELAY_BASE: Duration = Duration::from_millis(200);

/// Randomized exponential backoff for reconnect attempts.
///
/// Attempt `k` draws `slot_idx` uniformly from `0..=min(k, max_slot_idx)` and
/// waits `slot_delay * 2^slot_idx + base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub slot_delay: Duration,
    pub base_delay: Duration,
    pub max_slot_idx: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            slot_delay: RECONNECT_SLOT_DELAY,
            base_delay: RECONNECT_DELAY_BASE,
            max_slot_idx: RECONNECT_MAX_SLOT_IDX,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for one specific slot index.
    pub fn delay_for_slot(&self, slot_idx: u32) -> Duration {
        let slot = 2_u32.saturating_pow(slot_idx);
        self.slot_delay
            .saturating_mul(slot)
            .saturating_add(self.base_delay)
    }

    /// Draws the delay for `attempt` (saturated at `max_slot_idx`).
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let k = attempt.min(self.max_slot_idx);
        let slot_idx = rng.gen_range(0..=k);
        self.delay_for_slot(slot_idx)
    }

    /// Smallest delay any attempt can produce.
    pub fn min_delay(&self) -> Duration {
        self.delay_for_slot(0)
    }

    /// Largest delay any attempt can produce.
    pub fn max_delay(&self) -> Duration {
        self.delay_for_slot(self.max_slot_idx)
    }
}

/// Attempt counter paired with a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Attempt index the next delay will be drawn for.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Draws a delay for the current attempt, then advances the counter
    /// (saturating at `max_slot_idx`).
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt, rng);
        self.attempt = self
            .attempt
            .saturating_add(1)
            .min(self.policy.max_slot_idx);
        delay
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
