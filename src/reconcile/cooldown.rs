//! Per-key cooldown timers for pulse events

use crate::actuation::Key;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Timestamps before which new pulses for a key are suppressed
#[derive(Debug, Clone)]
pub struct Cooldowns {
    period: Duration,
    ready_at: HashMap<Key, Instant>,
}

impl Cooldowns {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ready_at: HashMap::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns true and restarts the timer if `key` may fire at `now`
    pub fn try_fire(&mut self, key: &Key, now: Instant) -> bool {
        if let Some(ready_at) = self.ready_at.get(key) {
            if now < *ready_at {
                return false;
            }
        }
        self.ready_at.insert(key.clone(), now + self.period);
        true
    }

    /// Time left until `key` may fire again
    pub fn remaining(&self, key: &Key, now: Instant) -> Duration {
        self.ready_at
            .get(key)
            .map(|ready_at| ready_at.saturating_duration_since(now))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_again_exactly_at_period_boundary() {
        let mut cooldowns = Cooldowns::new(Duration::from_millis(500));
        let key = Key::from("space");
        let t = Instant::now();

        assert!(cooldowns.try_fire(&key, t));
        assert!(!cooldowns.try_fire(&key, t + Duration::from_millis(499)));
        assert!(cooldowns.try_fire(&key, t + Duration::from_millis(500)));
    }

    #[test]
    fn suppressed_trigger_does_not_extend_cooldown() {
        let mut cooldowns = Cooldowns::new(Duration::from_millis(500));
        let key = Key::from("space");
        let t = Instant::now();

        cooldowns.try_fire(&key, t);
        cooldowns.try_fire(&key, t + Duration::from_millis(100));

        assert_eq!(
            cooldowns.remaining(&key, t + Duration::from_millis(100)),
            Duration::from_millis(400)
        );
    }

    #[test]
    fn unknown_key_has_no_remaining_time() {
        let cooldowns = Cooldowns::new(Duration::from_millis(500));
        assert_eq!(
            cooldowns.remaining(&Key::from("e"), Instant::now()),
            Duration::ZERO
        );
    }
}
