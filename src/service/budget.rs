//! Packet memory budget.
//!
//! Provides atomic budget tracking so buffered packets across all
//! connections of a service never exceed the configured ceiling.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic counter for tracking packet memory against a fixed ceiling.
///
/// `used_bytes` always stays within `0..=ceiling_bytes`. Reservations that
/// would cross the ceiling are rejected without touching the counter.
#[derive(Debug)]
pub struct MemoryBudget {
    ceiling: usize,
    used: AtomicUsize,
}

impl MemoryBudget {
    /// Create a new budget with the given ceiling in bytes.
    ///
    /// A ceiling of 0 is valid and only admits zero-byte reservations.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            used: AtomicUsize::new(0),
        }
    }

    /// Try to reserve `n` bytes. Returns `false` and leaves the budget
    /// unchanged if the reservation does not fit.
    pub fn try_reserve(&self, n: usize) -> bool {
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let new = match cur.checked_add(n) {
                Some(v) if v <= self.ceiling => v,
                _ => return false,
            };
            match self
                .used
                .compare_exchange_weak(cur, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Release `n` bytes back to the budget, clamping at zero.
    ///
    /// Returns the number of bytes actually released.
    pub fn release(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let prev = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(n))
            })
            .unwrap_or_else(|v| v);
        prev.min(n)
    }

    /// Snapshot of bytes currently reserved.
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Fixed ceiling set at construction.
    pub fn ceiling_bytes(&self) -> usize {
        self.ceiling
    }

    /// Snapshot of bytes still available.
    pub fn available_bytes(&self) -> usize {
        self.ceiling.saturating_sub(self.used_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reserve_reject_release_sequence() {
        let b = MemoryBudget::new(100);
        assert!(b.try_reserve(60));
        assert_eq!(b.used_bytes(), 60);

        assert!(!b.try_reserve(50));
        assert_eq!(b.used_bytes(), 60);

        assert_eq!(b.release(60), 60);
        assert_eq!(b.used_bytes(), 0);

        assert!(b.try_reserve(50));
        assert_eq!(b.used_bytes(), 50);
        assert_eq!(b.available_bytes(), 50);
    }

    #[test]
    fn zero_ceiling_admits_only_zero_bytes() {
        let b = MemoryBudget::new(0);
        assert!(!b.try_reserve(1));
        assert!(!b.try_reserve(usize::MAX));
        assert!(b.try_reserve(0));
        assert_eq!(b.used_bytes(), 0);
    }

    #[test]
    fn release_clamps_at_zero() {
        let b = MemoryBudget::new(10);
        assert!(b.try_reserve(4));
        assert_eq!(b.release(9), 4);
        assert_eq!(b.used_bytes(), 0);
        assert_eq!(b.release(1), 0);
        assert_eq!(b.used_bytes(), 0);
    }

    #[test]
    fn release_zero_is_noop() {
        let b = MemoryBudget::new(10);
        assert!(b.try_reserve(7));
        assert_eq!(b.release(0), 0);
        assert_eq!(b.used_bytes(), 7);
    }

    #[test]
    fn overflowing_reservation_is_rejected() {
        let b = MemoryBudget::new(usize::MAX);
        assert!(b.try_reserve(usize::MAX - 1));
        assert!(!b.try_reserve(2));
        assert_eq!(b.used_bytes(), usize::MAX - 1);
    }

    #[test]
    fn concurrent_reservations_never_exceed_ceiling() {
        const K: usize = 16;
        const B: usize = 64;
        let b = Arc::new(MemoryBudget::new(K * B));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let b = b.clone();
                std::thread::spawn(move || b.try_reserve(B))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, K);
        assert_eq!(b.used_bytes(), K * B);
    }
}
