//! Time-indexed ring buffer over fixed circular storage.
//!
//! ## Design constraints
//!
//! `store` runs on a real-time audio thread and `fetch` commonly runs on
//! another. Neither may:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Panic or log
//!
//! All allocation happens in [`RingBuffer::allocate`]; the hot path touches
//! preallocated storage and two atomics only.
//!
//! ## Writer / reader split
//!
//! The owning [`RingBuffer`] value is the single writer: `store` takes
//! `&mut self`, so writer exclusivity is enforced by the borrow checker
//! rather than by documentation. Consumer threads hold cloneable
//! [`RingReader`] handles created with [`RingBuffer::reader`]. Lifecycle
//! calls (`allocate`/`deallocate`) are caller-serialized with respect to
//! in-flight fetches; a reader that races one observes `NotAllocated`
//! through a poison flag, never freed memory — storage is released when the
//! last handle drops.
//!
//! ## Overwrite and zero-fill policy
//!
//! The writer never waits for a slow reader: once the window exceeds
//! capacity, the oldest frames are evicted and their slots reused. A fetch
//! outside the published window zero-fills the missing frames and reports
//! [`Underrun`](crate::TorusError::Underrun) or
//! [`NotYetAvailable`](crate::TorusError::NotYetAvailable) as an advisory —
//! the caller's buffer is always fully populated.

pub mod block;
mod bounds;
mod storage;

pub use bounds::TimeBounds;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, TorusError};
use bounds::BoundsTracker;
use storage::SampleStore;

/// Absolute frame index. Ever-increasing for a well-behaved producer;
/// wraparound of the storage slots is internal and invisible to callers.
pub type FrameTime = i64;

/// State shared between the writer and all reader handles.
struct Shared {
    channel_count: u32,
    bytes_per_frame: u32,
    capacity_frames: u32,
    store: SampleStore,
    bounds: BoundsTracker,
    /// Set when the owner deallocates or re-allocates. Readers that observe
    /// it fail with `NotAllocated` instead of serving a dead window.
    retired: AtomicBool,
}

impl Shared {
    /// Common descriptor validation for store and fetch. Argument errors
    /// abort before any mutation.
    fn validate<I>(&self, lens: I, frame_count: u32) -> Result<()>
    where
        I: ExactSizeIterator<Item = usize>,
    {
        if lens.len() == 0 {
            return Err(TorusError::InvalidArgument("descriptor is empty"));
        }
        if lens.len() != self.channel_count as usize {
            return Err(TorusError::InvalidArgument(
                "descriptor channel count does not match the buffer",
            ));
        }
        if frame_count == 0 {
            return Err(TorusError::InvalidArgument("frame count must be positive"));
        }
        let expected = frame_count as usize * self.bytes_per_frame as usize;
        for len in lens {
            if len != expected {
                return Err(TorusError::InvalidArgument(
                    "descriptor channel byte length does not match frame count",
                ));
            }
        }
        Ok(())
    }

    fn store_frames(
        &self,
        channels: &[&[u8]],
        frame_count: u32,
        frame_number: FrameTime,
    ) -> Result<()> {
        self.validate(channels.iter().map(|c| c.len()), frame_count)?;
        if frame_count > self.capacity_frames {
            return Err(TorusError::TooMuch {
                frames: frame_count,
                capacity: self.capacity_frames,
            });
        }
        let write_end = frame_number
            .checked_add(frame_count as i64)
            .ok_or(TorusError::InvalidArgument("frame index overflow"))?;

        let cur = self.bounds.current();
        if write_end <= cur.start {
            return Err(TorusError::StaleStore {
                end: write_end,
                start: cur.start,
            });
        }

        let new_end = cur.end.max(write_end);
        let new_start = cur.start.max(new_end - self.capacity_frames as i64);

        // Phase 1: evicted frames leave the published window before their
        // slots are reused.
        if new_start > cur.start {
            self.bounds.advance_start(new_start);
        }

        // A write that jumps past the previous end leaves never-written
        // slots inside the new window; clear them so they read as silence.
        if frame_number > cur.end {
            let gap_start = cur.end.max(new_start);
            if frame_number > gap_start {
                self.store.zero_frames(TimeBounds::new(gap_start, frame_number));
            }
        }

        // Copy the portion that lands inside the new window. A store that
        // reaches back into the evicted region drops that prefix silently.
        let copy_start = frame_number.max(new_start);
        if copy_start < write_end {
            let skip = (copy_start - frame_number) as usize * self.bytes_per_frame as usize;
            for (channel, src) in channels.iter().enumerate() {
                self.store.write_channel(channel, copy_start, &src[skip..]);
            }
        }

        // Phase 2: publish after the copy so a reader that observes the new
        // end is guaranteed to see the sample data behind it.
        self.bounds.publish_end(new_end);
        Ok(())
    }

    fn fetch_frames(
        &self,
        channels: &mut [&mut [u8]],
        frame_count: u32,
        frame_number: FrameTime,
    ) -> Result<()> {
        self.validate(channels.iter().map(|c| c.len()), frame_count)?;
        let requested_end = frame_number
            .checked_add(frame_count as i64)
            .ok_or(TorusError::InvalidArgument("frame index overflow"))?;
        let requested = TimeBounds::new(frame_number, requested_end);

        if self.retired.load(Ordering::Acquire) {
            zero_all(channels);
            return Err(TorusError::NotAllocated);
        }

        let bounds = self.bounds.load().unwrap_or(TimeBounds::empty());
        let live = requested.intersect(bounds);
        let bytes_per_frame = self.bytes_per_frame as usize;

        match live {
            Some(live) => {
                let head = (live.start - frame_number) as usize * bytes_per_frame;
                let tail = (live.end - frame_number) as usize * bytes_per_frame;
                for (channel, dst) in channels.iter_mut().enumerate() {
                    dst[..head].fill(0);
                    self.store.read_channel(channel, live.start, &mut dst[head..tail]);
                    dst[tail..].fill(0);
                }
            }
            None => zero_all(channels),
        }

        // Revalidate: the writer may have evicted part of what was just
        // copied. Those frames raced the overwrite, so silence them.
        let fresh = self.bounds.load().unwrap_or(TimeBounds::empty());
        if let Some(live) = live {
            if fresh.start > live.start {
                let lost_end = fresh.start.min(live.end);
                let a = (live.start - frame_number) as usize * bytes_per_frame;
                let b = (lost_end - frame_number) as usize * bytes_per_frame;
                for dst in channels.iter_mut() {
                    dst[a..b].fill(0);
                }
            }
        }

        // The window actually served: the freshest start, the end the copy
        // ran against.
        let served = TimeBounds::new(fresh.start, bounds.end.max(fresh.start));
        if requested.start < served.start {
            return Err(TorusError::Underrun {
                requested,
                bounds: served,
            });
        }
        if requested.end > served.end {
            return Err(TorusError::NotYetAvailable {
                requested,
                bounds: served,
            });
        }
        Ok(())
    }

    fn time_bounds(&self) -> Result<TimeBounds> {
        if self.retired.load(Ordering::Acquire) {
            return Err(TorusError::NotAllocated);
        }
        self.bounds.load().ok_or(TorusError::Empty)
    }
}

fn zero_all(channels: &mut [&mut [u8]]) {
    for dst in channels.iter_mut() {
        dst.fill(0);
    }
}

/// The time-indexed ring buffer. Owner of the storage and the single legal
/// writer; see the module docs for the threading model.
pub struct RingBuffer {
    shared: Option<Arc<Shared>>,
}

impl RingBuffer {
    /// A new, unallocated buffer. Every operation except
    /// [`allocate`](Self::allocate) fails with `NotAllocated` until storage
    /// exists.
    pub fn new() -> Self {
        Self { shared: None }
    }

    /// Allocate zeroed storage for `channel_count` channels of
    /// `capacity_frames` frames at `bytes_per_frame` bytes each, and reset
    /// the time bounds to empty.
    ///
    /// Allocating over an already-allocated buffer releases the prior
    /// storage first; outstanding [`RingReader`] handles bound to it start
    /// failing with `NotAllocated`.
    ///
    /// # Errors
    /// `InvalidArgument` when any dimension is zero or the total size does
    /// not fit in memory.
    pub fn allocate(
        &mut self,
        channel_count: u32,
        bytes_per_frame: u32,
        capacity_frames: u32,
    ) -> Result<()> {
        if channel_count == 0 || bytes_per_frame == 0 || capacity_frames == 0 {
            return Err(TorusError::InvalidArgument(
                "channel count, bytes per frame and capacity must all be positive",
            ));
        }
        let total = (channel_count as u64)
            .checked_mul(bytes_per_frame as u64)
            .and_then(|b| b.checked_mul(capacity_frames as u64))
            .filter(|&b| usize::try_from(b).is_ok())
            .ok_or(TorusError::InvalidArgument(
                "requested storage size overflows addressable memory",
            ))?;

        if let Some(old) = self.shared.take() {
            old.retired.store(true, Ordering::Release);
            debug!("released previous sample store before re-allocation");
        }

        self.shared = Some(Arc::new(Shared {
            channel_count,
            bytes_per_frame,
            capacity_frames,
            store: SampleStore::new(channel_count, bytes_per_frame, capacity_frames),
            bounds: BoundsTracker::new(),
            retired: AtomicBool::new(false),
        }));
        debug!(
            channel_count,
            bytes_per_frame, capacity_frames, total_bytes = total, "sample store allocated"
        );
        Ok(())
    }

    /// Release storage and reset to the unallocated state. Idempotent —
    /// calling it twice is a no-op. Storage memory is freed once the last
    /// reader handle drops.
    pub fn deallocate(&mut self) {
        if let Some(old) = self.shared.take() {
            old.retired.store(true, Ordering::Release);
            debug!("sample store deallocated");
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.shared.is_some()
    }

    pub fn channel_count(&self) -> Option<u32> {
        self.shared.as_ref().map(|s| s.channel_count)
    }

    pub fn bytes_per_frame(&self) -> Option<u32> {
        self.shared.as_ref().map(|s| s.bytes_per_frame)
    }

    pub fn capacity_frames(&self) -> Option<u32> {
        self.shared.as_ref().map(|s| s.capacity_frames)
    }

    /// A cloneable fetch-only handle for consumer threads.
    pub fn reader(&self) -> Result<RingReader> {
        let shared = self.shared.as_ref().ok_or(TorusError::NotAllocated)?;
        Ok(RingReader {
            shared: Arc::clone(shared),
        })
    }

    /// Write `frame_count` frames at absolute `frame_number`.
    ///
    /// `channels` must hold exactly one slice per configured channel, each
    /// `frame_count * bytes_per_frame` bytes long; the memory is borrowed
    /// for this call only.
    ///
    /// Oldest frames are evicted silently when the window would exceed
    /// capacity — the writer never blocks on a slow reader. Writes are
    /// expected with non-decreasing `frame_number`; overlapping or
    /// out-of-order writes simply overwrite the corresponding slots.
    ///
    /// # Errors
    /// - `NotAllocated`, `InvalidArgument`, `TooMuch`: rejected without any
    ///   mutation.
    /// - `StaleStore`: the whole write lies before the retained window and
    ///   would be evicted immediately; rejected without mutation.
    pub fn store(
        &mut self,
        channels: &[&[u8]],
        frame_count: u32,
        frame_number: FrameTime,
    ) -> Result<()> {
        let shared = self.shared.as_ref().ok_or(TorusError::NotAllocated)?;
        shared.store_frames(channels, frame_count, frame_number)
    }

    /// Read `frame_count` frames at absolute `frame_number` into `channels`.
    ///
    /// Frames inside the published window come back as stored; frames
    /// outside it (already evicted, or not yet written) come back as zeros.
    /// The destination is fully populated regardless of the returned code —
    /// a caller that ignores errors plays silence, never garbage.
    ///
    /// # Errors
    /// - `Underrun`: part of the request lies before the window start.
    /// - `NotYetAvailable`: part of the request lies at or past the end.
    /// - `NotAllocated`, `InvalidArgument`: see [`store`](Self::store);
    ///   argument errors abort without touching the destination.
    pub fn fetch(
        &self,
        channels: &mut [&mut [u8]],
        frame_count: u32,
        frame_number: FrameTime,
    ) -> Result<()> {
        match &self.shared {
            Some(shared) => shared.fetch_frames(channels, frame_count, frame_number),
            None => {
                zero_all(channels);
                Err(TorusError::NotAllocated)
            }
        }
    }

    /// The currently published `[start, end)` window.
    ///
    /// # Errors
    /// `NotAllocated` before allocation, `Empty` before the first store.
    /// Intended for planning a satisfiable fetch range; the clamping inside
    /// [`fetch`](Self::fetch) remains authoritative.
    pub fn time_bounds(&self) -> Result<TimeBounds> {
        let shared = self.shared.as_ref().ok_or(TorusError::NotAllocated)?;
        shared.time_bounds()
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch-only handle held by consumer threads. Cheap to clone; multiple
/// concurrent fetches are safe with respect to each other.
#[derive(Clone)]
pub struct RingReader {
    shared: Arc<Shared>,
}

impl RingReader {
    /// See [`RingBuffer::fetch`].
    pub fn fetch(
        &self,
        channels: &mut [&mut [u8]],
        frame_count: u32,
        frame_number: FrameTime,
    ) -> Result<()> {
        self.shared.fetch_frames(channels, frame_count, frame_number)
    }

    /// See [`RingBuffer::time_bounds`].
    pub fn time_bounds(&self) -> Result<TimeBounds> {
        self.shared.time_bounds()
    }

    /// `false` once the owner deallocates or re-allocates the buffer this
    /// handle was created from.
    pub fn is_allocated(&self) -> bool {
        !self.shared.retired.load(Ordering::Acquire)
    }
}
