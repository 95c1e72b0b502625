//! Admission control: per-functionality consumption budgets over
//! consensus-second windows.
//!
//! Windows are keyed by the consensus timestamp, never a wall clock, so
//! every replica charges identical usage. Consumption happens only
//! through [`UtilizationManager::should_throttle_n_of_unscaled`];
//! capacity pre-flight checks peek without consuming.

use std::collections::BTreeMap;
use tessera_types::{ConsensusTime, Functionality};

pub struct UtilizationManager {
    /// Units admitted per functionality per consensus second. A
    /// functionality with no entry has no capacity at all.
    capacity: BTreeMap<Functionality, u32>,
    used: BTreeMap<Functionality, u32>,
    window: u64,
}

impl UtilizationManager {
    pub fn new(capacity: BTreeMap<Functionality, u32>) -> Self {
        Self {
            capacity,
            used: BTreeMap::new(),
            window: 0,
        }
    }

    /// A manager that admits everything.
    pub fn unthrottled() -> Self {
        Self::new(
            Functionality::ALL
                .into_iter()
                .map(|functionality| (functionality, u32::MAX))
                .collect(),
        )
    }

    fn roll(&mut self, now: ConsensusTime) {
        if now.seconds != self.window {
            self.window = now.seconds;
            self.used.clear();
        }
    }

    /// Whether budget for `n` unscaled units is exhausted in the window
    /// containing `now`. Consumes the units when they fit.
    pub fn should_throttle_n_of_unscaled(
        &mut self,
        n: u32,
        functionality: Functionality,
        now: ConsensusTime,
    ) -> bool {
        self.roll(now);
        let capacity = self.capacity.get(&functionality).copied().unwrap_or(0);
        let used = self.used.entry(functionality).or_insert(0);
        if used.saturating_add(n) > capacity {
            return true;
        }
        *used = used.saturating_add(n);
        false
    }

    /// Peek variant: reports whether `n` units would be throttled
    /// without consuming anything.
    pub fn would_throttle(&self, n: u32, functionality: Functionality, now: ConsensusTime) -> bool {
        let capacity = self.capacity.get(&functionality).copied().unwrap_or(0);
        let used = if now.seconds == self.window {
            self.used.get(&functionality).copied().unwrap_or(0)
        } else {
            0
        };
        used.saturating_add(n) > capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(n: u32) -> UtilizationManager {
        UtilizationManager::new(BTreeMap::from([(Functionality::CryptoTransfer, n)]))
    }

    #[test]
    fn test_consumes_until_capacity_exhausted() {
        let mut manager = capacity(2);
        let now = ConsensusTime::new(100, 0);
        assert!(!manager.should_throttle_n_of_unscaled(1, Functionality::CryptoTransfer, now));
        assert!(!manager.should_throttle_n_of_unscaled(1, Functionality::CryptoTransfer, now));
        assert!(manager.should_throttle_n_of_unscaled(1, Functionality::CryptoTransfer, now));
    }

    #[test]
    fn test_rejected_requests_consume_nothing() {
        let mut manager = capacity(2);
        let now = ConsensusTime::new(100, 0);
        assert!(manager.should_throttle_n_of_unscaled(3, Functionality::CryptoTransfer, now));
        assert!(!manager.should_throttle_n_of_unscaled(2, Functionality::CryptoTransfer, now));
    }

    #[test]
    fn test_window_resets_on_new_consensus_second() {
        let mut manager = capacity(1);
        assert!(!manager.should_throttle_n_of_unscaled(
            1,
            Functionality::CryptoTransfer,
            ConsensusTime::new(100, 0)
        ));
        assert!(manager.should_throttle_n_of_unscaled(
            1,
            Functionality::CryptoTransfer,
            ConsensusTime::new(100, 999)
        ));
        assert!(!manager.should_throttle_n_of_unscaled(
            1,
            Functionality::CryptoTransfer,
            ConsensusTime::new(101, 0)
        ));
    }

    #[test]
    fn test_would_throttle_peeks_without_consuming() {
        let mut manager = capacity(1);
        let now = ConsensusTime::new(100, 0);
        assert!(!manager.would_throttle(1, Functionality::CryptoTransfer, now));
        assert!(!manager.would_throttle(1, Functionality::CryptoTransfer, now));
        assert!(!manager.should_throttle_n_of_unscaled(1, Functionality::CryptoTransfer, now));
        assert!(manager.would_throttle(1, Functionality::CryptoTransfer, now));
    }

    #[test]
    fn test_unlisted_functionality_has_no_capacity() {
        let mut manager = capacity(10);
        let now = ConsensusTime::new(100, 0);
        assert!(manager.should_throttle_n_of_unscaled(1, Functionality::TokenMint, now));
    }

    #[test]
    fn test_unthrottled_admits_everything() {
        let mut manager = UtilizationManager::unthrottled();
        let now = ConsensusTime::new(100, 0);
        for _ in 0..1_000 {
            assert!(!manager.should_throttle_n_of_unscaled(
                u32::MAX,
                Functionality::AccountCreate,
                now
            ));
        }
    }
}
