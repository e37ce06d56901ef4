//! Prefetch accounting.
//!
//! A limiter tracks (count, size) usage against (prefetch_count,
//! prefetch_size). A zero limit means unlimited on that axis. Consumers
//! carry a list of limiters (channel scope plus connection scope or a
//! per-consumer snapshot, depending on the protocol dialect) and a delivery
//! is admitted only when every limiter admits it.

use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone, Copy)]
struct QosState {
    prefetch_count: u32,
    prefetch_size: u64,
    count: u32,
    size: u64,
}

impl QosState {
    fn admits(&self, count: u32, size: u64) -> bool {
        let count_ok = self.prefetch_count == 0 || self.count + count <= self.prefetch_count;
        let size_ok = self.prefetch_size == 0 || self.size + size <= self.prefetch_size;
        count_ok && size_ok
    }
}

#[derive(Debug, Default)]
pub struct QosLimiter {
    state: Mutex<QosState>,
}

impl QosLimiter {
    pub fn new(prefetch_count: u16, prefetch_size: u32) -> Self {
        Self {
            state: Mutex::new(QosState {
                prefetch_count: prefetch_count.into(),
                prefetch_size: prefetch_size.into(),
                count: 0,
                size: 0,
            }),
        }
    }

    /// Replace the limits. Usage is untouched; tightening below current
    /// usage claws nothing back, the budget simply stays exhausted until
    /// releases catch up.
    pub fn update(&self, prefetch_count: u16, prefetch_size: u32) {
        let mut state = self.state.lock().unwrap();
        state.prefetch_count = prefetch_count.into();
        state.prefetch_size = prefetch_size.into();
    }

    /// Try to account one delivery. Applies and returns `true` when within
    /// limits, otherwise leaves the usage untouched and returns `false`.
    pub fn inc(&self, count: u32, size: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.admits(count, size) {
            return false;
        }
        state.count += count;
        state.size += size;
        true
    }

    /// Release accounted usage.
    pub fn dec(&self, count: u32, size: u64) {
        let mut state = self.state.lock().unwrap();
        state.count = state.count.saturating_sub(count);
        state.size = state.size.saturating_sub(size);
    }

    pub fn usage(&self) -> (u32, u64) {
        let state = self.state.lock().unwrap();
        (state.count, state.size)
    }

    pub fn limits(&self) -> (u32, u64) {
        let state = self.state.lock().unwrap();
        (state.prefetch_count, state.prefetch_size)
    }

    /// Value copy, used to pin a consumer to the channel template at
    /// registration time.
    pub fn snapshot(&self) -> QosLimiter {
        let state = *self.state.lock().unwrap();
        QosLimiter {
            state: Mutex::new(state),
        }
    }
}

/// Admit one delivery against every limiter, or none of them.
pub fn inc_all(limiters: &[Arc<QosLimiter>], count: u32, size: u64) -> bool {
    for (index, limiter) in limiters.iter().enumerate() {
        if !limiter.inc(count, size) {
            for applied in &limiters[..index] {
                applied.dec(count, size);
            }
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limits_are_unlimited() {
        let qos = QosLimiter::new(0, 0);
        for _ in 0..1000 {
            assert!(qos.inc(1, 1 << 20));
        }
        assert_eq!(qos.usage().0, 1000);
    }

    #[test]
    fn count_limit_blocks_and_release_unblocks() {
        let qos = QosLimiter::new(2, 0);
        assert!(qos.inc(1, 10));
        assert!(qos.inc(1, 10));
        assert!(!qos.inc(1, 10));
        assert_eq!(qos.usage(), (2, 20));

        qos.dec(1, 10);
        assert!(qos.inc(1, 10));
    }

    #[test]
    fn size_limit_blocks_independently() {
        let qos = QosLimiter::new(0, 16);
        assert!(qos.inc(1, 12));
        assert!(!qos.inc(1, 8));
        assert!(qos.inc(1, 4));
    }

    #[test]
    fn refused_inc_leaves_usage_untouched() {
        let qos = QosLimiter::new(1, 0);
        assert!(qos.inc(1, 5));
        assert!(!qos.inc(1, 5));
        assert_eq!(qos.usage(), (1, 5));
    }

    #[test]
    fn dec_saturates_at_zero() {
        let qos = QosLimiter::new(0, 0);
        qos.dec(3, 100);
        assert_eq!(qos.usage(), (0, 0));
    }

    #[test]
    fn update_does_not_claw_back() {
        let qos = QosLimiter::new(0, 0);
        assert!(qos.inc(3, 30));
        qos.update(1, 0);
        assert_eq!(qos.usage(), (3, 30));
        assert!(!qos.inc(1, 1));
        qos.dec(3, 30);
        assert!(qos.inc(1, 1));
    }

    #[test]
    fn snapshot_is_independent_of_the_template() {
        let template = QosLimiter::new(5, 0);
        let snapshot = template.snapshot();
        template.update(1, 0);
        assert_eq!(snapshot.limits(), (5, 0));
        assert_eq!(template.limits(), (1, 0));
    }

    #[test]
    fn inc_all_rolls_back_partial_admits() {
        let wide = Arc::new(QosLimiter::new(10, 0));
        let narrow = Arc::new(QosLimiter::new(1, 0));
        let limiters = vec![Arc::clone(&wide), Arc::clone(&narrow)];

        assert!(inc_all(&limiters, 1, 8));
        assert!(!inc_all(&limiters, 1, 8));
        // the wide limiter must not leak the refused admit
        assert_eq!(wide.usage(), (1, 8));
        assert_eq!(narrow.usage(), (1, 8));
    }
}
