use std::time::Duration;

use crate::protocol::{RECONNECT_BASE, RECONNECT_CAP};

/// Capped exponential delay for control-channel reconnects:
/// `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(RECONNECT_BASE, RECONNECT_CAP)
    }
}

impl ReconnectBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay for the current attempt; advances the counter.
    pub fn schedule_reconnect(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
