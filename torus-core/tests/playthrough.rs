//! Threaded play-through tests.
//!
//! Topology mirrors the intended deployment: an input callback stores blocks
//! at an absolute frame index while an output callback fetches the same
//! index range behind a latency offset, on another thread. The property
//! under test is the hard one: whatever the interleaving, a fetch returns
//! either the bytes that were stored for a frame or silence — never
//! garbage, never a crash.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use torus_core::{FrameBlock, RingBuffer, TorusError};

const CHANNELS: u32 = 2;
const BYTES_PER_FRAME: u32 = 4; // one f32 sample per channel per frame
const CAPACITY: u32 = 4800; // 100 ms at 48 kHz
const BLOCK: u32 = 480; // 10 ms callback block

/// Deterministic nonzero sample for (channel, frame); zero is reserved to
/// mean "silence" in the assertions below.
fn sample(channel: usize, frame: i64) -> f32 {
    (frame % 100_000) as f32 + channel as f32 * 0.25 + 1.0
}

fn fill_block(block: &mut FrameBlock, start: i64) {
    for channel in 0..CHANNELS as usize {
        for i in 0..BLOCK as usize {
            let bytes = sample(channel, start + i as i64).to_le_bytes();
            block.channel_mut(channel)[i * 4..i * 4 + 4].copy_from_slice(&bytes);
        }
    }
}

/// Check every fetched frame: stored value or silence. Returns the number
/// of silent frames; panics on anything else.
fn verify_block(block: &FrameBlock, start: i64, frames: u32) -> u32 {
    let mut silent = 0;
    for i in 0..frames as usize {
        let frame = start + i as i64;
        let mut frame_is_silent = true;
        for channel in 0..CHANNELS as usize {
            let bytes: [u8; 4] = block.channel(channel)[i * 4..i * 4 + 4].try_into().unwrap();
            let value = f32::from_le_bytes(bytes);
            if value == 0.0 {
                continue;
            }
            frame_is_silent = false;
            assert_eq!(
                value,
                sample(channel, frame),
                "garbage at channel {channel} frame {frame}"
            );
        }
        if frame_is_silent {
            silent += 1;
        }
    }
    silent
}

fn spawn_writer(
    mut rb: RingBuffer,
    stop: Arc<AtomicBool>,
    pace: Duration,
) -> thread::JoinHandle<i64> {
    thread::spawn(move || {
        let mut block = FrameBlock::zeroed(CHANNELS, BYTES_PER_FRAME, BLOCK);
        let mut frame = 0i64;
        while !stop.load(Ordering::Relaxed) {
            fill_block(&mut block, frame);
            rb.store(&block.as_slices(), BLOCK, frame)
                .expect("store failed");
            frame += BLOCK as i64;
            if !pace.is_zero() {
                thread::sleep(pace);
            }
        }
        frame
    })
}

#[test]
fn reader_sees_only_stored_samples_or_silence() {
    let mut rb = RingBuffer::new();
    rb.allocate(CHANNELS, BYTES_PER_FRAME, CAPACITY).unwrap();
    let reader = rb.reader().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    // No pacing: the writer laps the reader constantly, maximising eviction
    // races against the fetches below.
    let writer = spawn_writer(rb, Arc::clone(&stop), Duration::ZERO);

    let mut block = FrameBlock::zeroed(CHANNELS, BYTES_PER_FRAME, BLOCK);
    let mut fetches = 0u32;
    let deadline = Instant::now() + Duration::from_millis(300);

    while Instant::now() < deadline {
        let bounds = match reader.time_bounds() {
            Ok(b) => b,
            Err(TorusError::Empty) => continue,
            Err(e) => panic!("unexpected time_bounds error: {e}"),
        };

        // Alternate between the calm end of the window and the contested
        // start, where eviction races the copy.
        let start = if fetches % 2 == 0 {
            (bounds.end - 2 * BLOCK as i64).max(bounds.start)
        } else {
            bounds.start
        };

        // Advisories are expected under this much contention; garbage is
        // caught inside verify_block.
        match reader.fetch(&mut block.as_mut_slices(), BLOCK, start) {
            Ok(())
            | Err(TorusError::Underrun { .. })
            | Err(TorusError::NotYetAvailable { .. }) => {}
            Err(e) => panic!("unexpected fetch error: {e}"),
        }
        verify_block(&block, start, BLOCK);
        fetches += 1;
    }

    stop.store(true, Ordering::Relaxed);
    let written = writer.join().expect("writer thread panicked");

    assert!(fetches > 0, "reader never ran");
    assert!(written > CAPACITY as i64, "writer never lapped the buffer");
}

#[test]
fn bounds_stay_consistent_under_concurrent_stores() {
    let mut rb = RingBuffer::new();
    rb.allocate(CHANNELS, BYTES_PER_FRAME, CAPACITY).unwrap();
    let reader = rb.reader().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writer = spawn_writer(rb, Arc::clone(&stop), Duration::ZERO);

    let mut last_end = 0i64;
    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        let bounds = match reader.time_bounds() {
            Ok(b) => b,
            Err(TorusError::Empty) => continue,
            Err(e) => panic!("unexpected time_bounds error: {e}"),
        };
        assert!(bounds.start <= bounds.end, "torn pair: {bounds}");
        assert!(
            bounds.len() <= CAPACITY as u64,
            "window exceeds capacity: {bounds}"
        );
        assert!(
            bounds.end >= last_end,
            "end went backwards: {} < {last_end}",
            bounds.end
        );
        last_end = bounds.end;
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().expect("writer thread panicked");
}

#[test]
fn deallocate_with_live_readers_degrades_to_not_allocated() {
    let mut rb = RingBuffer::new();
    rb.allocate(CHANNELS, BYTES_PER_FRAME, CAPACITY).unwrap();

    let block = FrameBlock::zeroed(CHANNELS, BYTES_PER_FRAME, BLOCK);
    rb.store(&block.as_slices(), BLOCK, 0).unwrap();

    let reader = rb.reader().unwrap();
    let fetcher = thread::spawn(move || {
        let mut block = FrameBlock::zeroed(CHANNELS, BYTES_PER_FRAME, BLOCK);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match reader.fetch(&mut block.as_mut_slices(), BLOCK, 0) {
                Err(TorusError::NotAllocated) => return true,
                Ok(()) | Err(TorusError::Underrun { .. })
                | Err(TorusError::NotYetAvailable { .. }) => {}
                Err(e) => panic!("unexpected fetch error: {e}"),
            }
            if Instant::now() > deadline {
                return false;
            }
            thread::yield_now();
        }
    });

    thread::sleep(Duration::from_millis(20));
    rb.deallocate();

    assert!(
        fetcher.join().expect("reader thread panicked"),
        "reader never observed deallocation"
    );
}
