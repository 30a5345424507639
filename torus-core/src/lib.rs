//! # torus-core
//!
//! Time-indexed multi-channel audio ring buffer.
//!
//! ## Architecture
//!
//! ```text
//! Audio callback (single writer)          Render / analysis threads
//!        │                                          │
//!        │ store(channels, n, frame_number)         │ fetch(channels, n, frame_number)
//!        ▼                                          ▼
//!   RingBuffer ──reader()──▶ RingReader ──clone──▶ RingReader …
//!        │
//!        ├── SampleStore     (fixed circular arenas, one per channel)
//!        └── BoundsTracker   (atomically published [start, end) frame window)
//! ```
//!
//! Frames are addressed by an absolute, ever-increasing frame index; slot
//! `frame % capacity` is reused once the index laps the capacity. The writer
//! never blocks on a slow reader (oldest frames are silently evicted) and a
//! reader never blocks on the writer (missing frames come back as silence).
//!
//! The store/fetch hot path is wait-free: it takes no locks and performs no
//! heap allocation.

#![warn(clippy::all)]

pub mod error;
pub mod ring;

// Convenience re-exports for downstream crates
pub use error::{Result, TorusError};
pub use ring::block::FrameBlock;
pub use ring::{FrameTime, RingBuffer, RingReader, TimeBounds};
