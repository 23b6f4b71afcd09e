//! Ordered, merged set of half-open address intervals.
//!
//! Grounded on `groups.c`/`groups.h` from the original project: a sorted
//! list of `[start, end)` ranges where touching or overlapping intervals are
//! always merged, so the list stays at the minimum size covering the same
//! union of addresses.

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// A single half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: Address,
    pub end: Address,
}

/// A normalized set of non-touching, non-overlapping intervals, kept sorted
/// by `start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet {
            intervals: Vec::new(),
        }
    }

    /// Inserts `[start, end)`, merging with any interval it overlaps or
    /// touches. Panics on `start >= end` — the original treats this as a
    /// fatal invariant violation (a bug in the caller), not a recoverable
    /// error.
    pub fn add(&mut self, start: Address, end: Address) {
        assert!(
            start < end,
            "IntervalSet::add: invariant violation, start (0x{start:08x}) >= end (0x{end:08x})"
        );

        let mut merged_start = start;
        let mut merged_end = end;
        let mut first: Option<usize> = None;
        let mut last: Option<usize> = None;

        for (i, iv) in self.intervals.iter().enumerate() {
            // Overlaps or touches [start, end) when iv.start <= end && iv.end >= start.
            if iv.start <= end && iv.end >= start {
                if first.is_none() {
                    first = Some(i);
                }
                last = Some(i);
                merged_start = merged_start.min(iv.start);
                merged_end = merged_end.max(iv.end);
            }
        }

        match (first, last) {
            (Some(f), Some(l)) => {
                self.intervals.splice(
                    f..=l,
                    std::iter::once(Interval {
                        start: merged_start,
                        end: merged_end,
                    }),
                );
            }
            _ => {
                let pos = self.intervals.partition_point(|iv| iv.start < start);
                self.intervals.insert(pos, Interval { start, end });
            }
        }
    }

    /// True iff some interval contains `x`. Intervals are sorted and
    /// disjoint, so this runs in O(log n).
    pub fn contains(&self, x: Address) -> bool {
        self.intervals
            .binary_search_by(|iv| {
                if x < iv.start {
                    std::cmp::Ordering::Greater
                } else if x >= iv.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Checks the normalization invariant: sorted, non-empty, pairwise
    /// non-touching. Used by tests and as a debug assertion surface.
    pub fn is_normalized(&self) -> bool {
        self.intervals.iter().all(|iv| iv.start < iv.end)
            && self
                .intervals
                .windows(2)
                .all(|w| w[0].end < w[1].start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn add_rejects_empty_range() {
        let mut set = IntervalSet::new();
        set.add(10, 10);
    }

    #[test]
    fn add_merges_touching_intervals() {
        let mut a = IntervalSet::new();
        a.add(0, 10);
        a.add(10, 20);

        let mut b = IntervalSet::new();
        b.add(0, 20);

        assert_eq!(a.intervals(), b.intervals());
    }

    #[test]
    fn add_merges_overlapping_intervals() {
        let mut set = IntervalSet::new();
        set.add(0, 10);
        set.add(5, 15);
        assert_eq!(set.intervals(), &[Interval { start: 0, end: 15 }]);
    }

    #[test]
    fn add_keeps_disjoint_intervals_separate() {
        let mut set = IntervalSet::new();
        set.add(100, 200);
        set.add(0, 10);
        assert_eq!(
            set.intervals(),
            &[
                Interval { start: 0, end: 10 },
                Interval {
                    start: 100,
                    end: 200
                }
            ]
        );
    }

    #[test]
    fn add_bridges_a_gap_between_two_intervals() {
        let mut set = IntervalSet::new();
        set.add(0, 10);
        set.add(20, 30);
        set.add(10, 20);
        assert_eq!(set.intervals(), &[Interval { start: 0, end: 30 }]);
    }

    #[test]
    fn contains_is_idempotent_and_order_independent() {
        let mut set = IntervalSet::new();
        set.add(0x8000, 0x8010);
        set.add(0x9000, 0x9010);
        assert!(set.contains(0x8004));
        assert!(set.contains(0x8004));
        assert!(!set.contains(0x8010));
        assert!(!set.contains(0x7fff));
        assert!(set.contains(0x9000));
    }

    #[test]
    fn normalized_after_arbitrary_insertion_order() {
        let mut set = IntervalSet::new();
        for (s, e) in [(50, 60), (0, 10), (30, 40), (10, 20), (20, 30)] {
            set.add(s, e);
        }
        assert!(set.is_normalized());
        assert_eq!(
            set.intervals(),
            &[Interval { start: 0, end: 40 }, Interval { start: 50, end: 60 }]
        );
    }
}
