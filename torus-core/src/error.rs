use thiserror::Error;

use crate::ring::{FrameTime, TimeBounds};

/// All errors produced by torus-core.
///
/// `Underrun` and `NotYetAvailable` are advisory: the fetch that reports them
/// has still fully populated the caller's buffers, with zeros substituted for
/// every frame outside the retained window. A caller that ignores them plays
/// silence, never garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TorusError {
    #[error("ring buffer is not allocated")]
    NotAllocated,

    #[error("ring buffer is empty — nothing has been stored yet")]
    Empty,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("store of {frames} frames exceeds the capacity of {capacity}")]
    TooMuch { frames: u32, capacity: u32 },

    #[error("store ending at frame {end} lies entirely before the retained window start {start}")]
    StaleStore { end: FrameTime, start: FrameTime },

    #[error("fetch of {requested} reaches before the retained window {bounds}")]
    Underrun {
        requested: TimeBounds,
        bounds: TimeBounds,
    },

    #[error("fetch of {requested} reaches past the written end of {bounds}")]
    NotYetAvailable {
        requested: TimeBounds,
        bounds: TimeBounds,
    },
}

pub type Result<T> = std::result::Result<T, TorusError>;
