//! Packed dual reference counts
//!
//! Layout of the single atomic word:
//!
//! ```text
//! bit 63      dead flag (terminal)
//! bit 62      touched: a claim was taken since the collector last cleared it
//! bits 32..61 internal count: edges, pins, pending autorelease claims
//! bits 0..31  external count: script-visible retains
//! ```
//!
//! Keeping both counts and the dead flag in one word makes "both counts hit
//! zero" and "the object is now dead" a single transition, so nothing can
//! retain an object in the window between the two.

use std::sync::atomic::{AtomicU64, Ordering};

const EXTERNAL_MASK: u64 = 0xFFFF_FFFF;
const INTERNAL_SHIFT: u32 = 32;
const INTERNAL_ONE: u64 = 1 << INTERNAL_SHIFT;
const INTERNAL_MAX: u64 = (1 << 30) - 1;
const TOUCHED: u64 = 1 << 62;
const DEAD: u64 = 1 << 63;
const FLAGS: u64 = DEAD | TOUCHED;

/// Result of a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// The object still has claims, or the decrement was a floored no-op
    Alive,
    /// This decrement removed the last claim; the caller must destroy it
    Unclaimed,
    /// The object was already dead
    Dead,
}

#[derive(Debug)]
pub(crate) struct RefCounts(AtomicU64);

impl RefCounts {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn internal_of(state: u64) -> u64 {
        (state & !FLAGS) >> INTERNAL_SHIFT
    }

    fn external_of(state: u64) -> u64 {
        state & EXTERNAL_MASK
    }

    fn bump(&self, step: u64, field: fn(u64) -> u64, limit: u64) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                if state & DEAD != 0 || field(state) >= limit {
                    None
                } else {
                    Some((state + step) | TOUCHED)
                }
            })
            .is_ok()
    }

    fn drop_one(&self, step: u64, field: fn(u64) -> u64) -> Release {
        let result = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                if state & DEAD != 0 || field(state) == 0 {
                    None
                } else if state & !FLAGS == step {
                    Some(DEAD)
                } else {
                    Some(state - step)
                }
            });
        match result {
            Ok(previous) if previous & !FLAGS == step => Release::Unclaimed,
            Ok(_) => Release::Alive,
            Err(state) if state & DEAD != 0 => Release::Dead,
            // Floored at zero
            Err(_) => Release::Alive,
        }
    }

    /// Add a script retain. Fails only on a dead object.
    pub(crate) fn retain_external(&self) -> bool {
        self.bump(1, Self::external_of, EXTERNAL_MASK)
    }

    /// Drop a script retain; extra releases are ignored.
    pub(crate) fn release_external(&self) -> Release {
        self.drop_one(1, Self::external_of)
    }

    pub(crate) fn retain_internal(&self) -> bool {
        self.bump(INTERNAL_ONE, Self::internal_of, INTERNAL_MAX)
    }

    pub(crate) fn release_internal(&self) -> Release {
        self.drop_one(INTERNAL_ONE, Self::internal_of)
    }

    /// Restore a saved external count on a fresh object in one step,
    /// saturating at the field's capacity.
    pub(crate) fn add_external(&self, amount: u32) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                if state & DEAD != 0 || amount == 0 {
                    return None;
                }
                let external = Self::external_of(state)
                    .saturating_add(u64::from(amount))
                    .min(EXTERNAL_MASK);
                Some((state & !EXTERNAL_MASK) | external | TOUCHED)
            });
    }

    /// Forget earlier claims so that [`RefCounts::is_touched`] reports only
    /// the ones taken from now on.
    pub(crate) fn clear_touched(&self) {
        self.0.fetch_and(!TOUCHED, Ordering::AcqRel);
    }

    pub(crate) fn is_touched(&self) -> bool {
        self.0.load(Ordering::Acquire) & TOUCHED != 0
    }

    /// Kill the object regardless of its counts. Returns `true` if this call
    /// did it, `false` if it was already dead.
    pub(crate) fn mark_dead(&self) -> bool {
        self.0.fetch_or(DEAD, Ordering::AcqRel) & DEAD == 0
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.0.load(Ordering::Acquire) & DEAD != 0
    }

    pub(crate) fn external(&self) -> u32 {
        Self::external_of(self.0.load(Ordering::Acquire)) as u32
    }

    pub(crate) fn internal(&self) -> u32 {
        Self::internal_of(self.0.load(Ordering::Acquire)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_floors_at_zero() {
        let counts = RefCounts::new();
        counts.retain_internal();
        assert!(counts.retain_external());

        assert_eq!(counts.release_external(), Release::Alive);
        for _ in 0..20 {
            assert_eq!(counts.release_external(), Release::Alive);
        }
        assert_eq!(counts.external(), 0);
        assert_eq!(counts.internal(), 1);
        assert!(!counts.is_dead());
    }

    #[test]
    fn test_last_claim_kills() {
        let counts = RefCounts::new();
        counts.retain_internal();
        counts.retain_external();

        assert_eq!(counts.release_internal(), Release::Alive);
        assert_eq!(counts.release_external(), Release::Unclaimed);
        assert!(counts.is_dead());

        // Nothing comes back from the dead
        assert!(!counts.retain_external());
        assert!(!counts.retain_internal());
        assert_eq!(counts.release_internal(), Release::Dead);
    }

    #[test]
    fn test_counts_are_independent() {
        let counts = RefCounts::new();
        counts.retain_internal();
        counts.retain_internal();
        counts.add_external(3);
        assert_eq!(counts.internal(), 2);
        assert_eq!(counts.external(), 3);
    }

    #[test]
    fn test_mark_dead_once() {
        let counts = RefCounts::new();
        counts.retain_external();
        assert!(counts.mark_dead());
        assert!(!counts.mark_dead());
        assert_eq!(counts.external(), 1);
    }

    #[test]
    fn test_restoring_a_huge_count_is_one_step() {
        let counts = RefCounts::new();
        counts.retain_internal();
        counts.add_external(u32::MAX);
        assert_eq!(counts.external(), u32::MAX);
        assert_eq!(counts.internal(), 1);

        counts.add_external(5);
        assert_eq!(counts.external(), u32::MAX);
        assert_eq!(counts.internal(), 1);
        assert!(!counts.retain_external());
    }

    #[test]
    fn test_claims_set_touched() {
        let counts = RefCounts::new();
        assert!(!counts.is_touched());
        counts.retain_internal();
        assert!(counts.is_touched());

        counts.clear_touched();
        assert!(!counts.is_touched());
        assert_eq!(counts.internal(), 1);
        counts.retain_external();
        assert!(counts.is_touched());

        // The flag does not count as a claim
        assert_eq!(counts.release_external(), Release::Alive);
        assert_eq!(counts.release_internal(), Release::Unclaimed);
        assert!(counts.is_dead());
    }
}
