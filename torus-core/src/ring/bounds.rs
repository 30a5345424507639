//! The published `[start, end)` window of live frames.
//!
//! `BoundsTracker` is the single point of cross-thread communication between
//! the writer and the readers. Both endpoints are monotonically
//! non-decreasing, which is what lets a reader assemble a consistent pair
//! from two plain atomic loads instead of a lock or a retry loop:
//!
//! - The reader loads `end` *before* `start`. Because `start` only ever
//!   advances, the pair it ends up with is a subset of the window that was
//!   live at the moment of the second load — never a torn pair that claims
//!   evicted or unwritten frames.
//! - The writer stores with `Release` and the reader loads with `Acquire`,
//!   so the sample bytes copied before a publication are visible to any
//!   reader that observes it.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use super::FrameTime;

/// Half-open range `[start, end)` of absolute frame indices currently live.
///
/// Invariants: `start <= end` and `end - start <= capacity_frames`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBounds {
    /// Oldest retained frame index (inclusive).
    pub start: FrameTime,
    /// One past the newest written frame index (exclusive).
    pub end: FrameTime,
}

impl TimeBounds {
    pub const fn new(start: FrameTime, end: FrameTime) -> Self {
        Self { start, end }
    }

    /// The empty window at frame zero — the state before any store.
    pub const fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Number of live frames in the window.
    pub fn len(&self) -> u64 {
        (self.end - self.start).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, frame: FrameTime) -> bool {
        self.start <= frame && frame < self.end
    }

    /// Overlap with `other`, or `None` when the ranges are disjoint.
    pub fn intersect(&self, other: TimeBounds) -> Option<TimeBounds> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeBounds { start, end })
    }
}

impl fmt::Display for TimeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Single-writer / multi-reader publication of the bounds pair.
///
/// Orderings:
/// - `start`/`end` writer stores: `Release` — pairs with reader `Acquire`
///   loads so a publication carries the sample copies made before it.
/// - writer-side reads: `Relaxed` — the single writer reads back its own
///   stores.
/// - `revision`: bumped once per completed store; `0` means nothing has ever
///   been stored.
#[derive(Debug)]
pub(crate) struct BoundsTracker {
    start: AtomicI64,
    end: AtomicI64,
    revision: AtomicU64,
}

impl BoundsTracker {
    pub fn new() -> Self {
        Self {
            start: AtomicI64::new(0),
            end: AtomicI64::new(0),
            revision: AtomicU64::new(0),
        }
    }

    /// Writer-side view of the last written pair.
    pub fn current(&self) -> TimeBounds {
        TimeBounds {
            start: self.start.load(Ordering::Relaxed),
            end: self.end.load(Ordering::Relaxed),
        }
    }

    /// Reader-side snapshot. Returns `None` until the first completed store.
    ///
    /// Loads `end` before `start`; with both endpoints monotonic the result
    /// is a (possibly narrowed) subset of the live window, never a superset.
    pub fn load(&self) -> Option<TimeBounds> {
        if self.revision.load(Ordering::Acquire) == 0 {
            return None;
        }
        let end = self.end.load(Ordering::Acquire);
        let start = self.start.load(Ordering::Acquire);
        // The writer may have advanced start past the end we read (phase 1
        // of a store). Collapse to the empty window at the new start.
        Some(TimeBounds {
            start,
            end: end.max(start),
        })
    }

    /// Phase 1 of a store: retire evicted frames *before* their slots are
    /// overwritten. Must never move `start` backwards.
    pub fn advance_start(&self, start: FrameTime) {
        debug_assert!(start >= self.start.load(Ordering::Relaxed));
        self.start.store(start, Ordering::Release);
    }

    /// Phase 2 of a store: publish the new end *after* the sample copy.
    /// Must never move `end` backwards.
    pub fn publish_end(&self, end: FrameTime) {
        debug_assert!(end >= self.end.load(Ordering::Relaxed));
        self.end.store(end, Ordering::Release);
        self.revision.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_first_publish() {
        let tracker = BoundsTracker::new();
        assert_eq!(tracker.load(), None);
        assert_eq!(tracker.current(), TimeBounds::empty());
    }

    #[test]
    fn publish_then_load_round_trip() {
        let tracker = BoundsTracker::new();
        tracker.publish_end(50);
        assert_eq!(tracker.load(), Some(TimeBounds::new(0, 50)));

        tracker.advance_start(30);
        tracker.publish_end(130);
        assert_eq!(tracker.load(), Some(TimeBounds::new(30, 130)));
    }

    #[test]
    fn start_past_end_collapses_to_empty_window() {
        let tracker = BoundsTracker::new();
        tracker.publish_end(100);
        // Phase 1 of a store that jumps far ahead: start overtakes end.
        tracker.advance_start(500);
        let bounds = tracker.load().unwrap();
        assert_eq!(bounds, TimeBounds::new(500, 500));
        assert!(bounds.is_empty());
    }

    #[test]
    fn intersect_overlapping_and_disjoint() {
        let a = TimeBounds::new(10, 50);
        assert_eq!(
            a.intersect(TimeBounds::new(40, 80)),
            Some(TimeBounds::new(40, 50))
        );
        assert_eq!(a.intersect(TimeBounds::new(50, 80)), None);
        assert_eq!(a.intersect(TimeBounds::new(0, 10)), None);
    }

    #[test]
    fn contains_and_len() {
        let bounds = TimeBounds::new(30, 130);
        assert_eq!(bounds.len(), 100);
        assert!(bounds.contains(30));
        assert!(bounds.contains(129));
        assert!(!bounds.contains(130));
        assert!(!bounds.contains(29));
    }
}
