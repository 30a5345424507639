//! Owned planar scratch buffers for one store or fetch call.

/// A block of per-channel sample bytes sized for a fixed number of frames.
///
/// The ring buffer itself borrows caller memory only for the duration of a
/// call; `FrameBlock` is the owned realization of that memory, allocated
/// once on the non-RT side and reused across calls.
#[derive(Debug, Clone)]
pub struct FrameBlock {
    channels: Vec<Vec<u8>>,
    bytes_per_frame: u32,
    frames: u32,
}

impl FrameBlock {
    /// Allocate a zero-filled block.
    pub fn zeroed(channel_count: u32, bytes_per_frame: u32, frames: u32) -> Self {
        let len = frames as usize * bytes_per_frame as usize;
        Self {
            channels: (0..channel_count).map(|_| vec![0u8; len]).collect(),
            bytes_per_frame,
            frames,
        }
    }

    pub fn channel_count(&self) -> u32 {
        self.channels.len() as u32
    }

    pub fn bytes_per_frame(&self) -> u32 {
        self.bytes_per_frame
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// One channel's bytes.
    pub fn channel(&self, channel: usize) -> &[u8] {
        &self.channels[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [u8] {
        &mut self.channels[channel]
    }

    /// Borrow all channels as a store descriptor.
    pub fn as_slices(&self) -> Vec<&[u8]> {
        self.channels.iter().map(|c| c.as_slice()).collect()
    }

    /// Borrow all channels as a fetch descriptor.
    pub fn as_mut_slices(&mut self) -> Vec<&mut [u8]> {
        self.channels.iter_mut().map(|c| c.as_mut_slice()).collect()
    }

    /// Overwrite every byte in every channel.
    pub fn fill(&mut self, byte: u8) {
        for channel in &mut self.channels {
            channel.fill(byte);
        }
    }
}
