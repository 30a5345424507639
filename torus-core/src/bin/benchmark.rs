//! Hot-path benchmark: a paced writer thread against a trailing reader.
//!
//! Simulates the deployment topology — an input callback storing fixed-size
//! blocks at a real-time cadence, an output-side reader fetching behind a
//! latency offset — and reports store/fetch rates, advisory counts and fetch
//! latency percentiles.

fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use crossbeam_channel::{select, tick, unbounded};
    use serde::Serialize;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use torus_core::{FrameBlock, RingBuffer, TimeBounds, TorusError};
    use tracing::info;

    #[derive(Debug)]
    struct Args {
        seconds: u64,
        channels: u32,
        bytes_per_frame: u32,
        capacity_frames: u32,
        block_frames: u32,
        sample_rate: u32,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        seconds: u64,
        channels: u32,
        bytes_per_frame: u32,
        capacity_frames: u32,
        block_frames: u32,
        sample_rate: u32,
        stores: u64,
        fetches: u64,
        underruns: u64,
        not_yet_available: u64,
        frames_written: i64,
        final_bounds: TimeBounds,
        p50_fetch_us: f64,
        p95_fetch_us: f64,
        max_fetch_us: f64,
    }

    fn parse_args() -> Result<Args, String> {
        let mut args = Args {
            seconds: 5,
            channels: 2,
            bytes_per_frame: 4,
            capacity_frames: 9600,
            block_frames: 480,
            sample_rate: 48_000,
            output: None,
        };

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            let mut value = |name: &str| {
                it.next().ok_or_else(|| format!("missing value for {name}"))
            };
            match arg.as_str() {
                "--seconds" => {
                    args.seconds = value("--seconds")?
                        .parse::<u64>()
                        .map_err(|_| "invalid value for --seconds".to_string())?
                        .clamp(1, 120);
                }
                "--channels" => {
                    args.channels = value("--channels")?
                        .parse()
                        .map_err(|_| "invalid value for --channels".to_string())?;
                }
                "--bytes-per-frame" => {
                    args.bytes_per_frame = value("--bytes-per-frame")?
                        .parse()
                        .map_err(|_| "invalid value for --bytes-per-frame".to_string())?;
                }
                "--capacity" => {
                    args.capacity_frames = value("--capacity")?
                        .parse()
                        .map_err(|_| "invalid value for --capacity".to_string())?;
                }
                "--block" => {
                    args.block_frames = value("--block")?
                        .parse()
                        .map_err(|_| "invalid value for --block".to_string())?;
                }
                "--rate" => {
                    args.sample_rate = value("--rate")?
                        .parse()
                        .map_err(|_| "invalid value for --rate".to_string())?;
                }
                "--output" => {
                    args.output = Some(PathBuf::from(value("--output")?));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p torus-core --bin benchmark -- \\
  [--seconds <n>] [--channels <n>] [--bytes-per-frame <n>] \\
  [--capacity <frames>] [--block <frames>] [--rate <hz>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(args)
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
        sorted[idx]
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let block_period = Duration::from_secs_f64(args.block_frames as f64 / args.sample_rate as f64);

    let mut rb = RingBuffer::new();
    rb.allocate(args.channels, args.bytes_per_frame, args.capacity_frames)
        .map_err(|e| e.to_string())?;
    let reader = rb.reader().map_err(|e| e.to_string())?;
    let bounds_probe = rb.reader().map_err(|e| e.to_string())?;

    let stop = Arc::new(AtomicBool::new(false));
    let (progress_tx, progress_rx) = unbounded::<(u64, u64)>();

    let writer = thread::spawn({
        let stop = Arc::clone(&stop);
        let channels = args.channels;
        let bytes_per_frame = args.bytes_per_frame;
        let block_frames = args.block_frames;
        move || {
            let mut block = FrameBlock::zeroed(channels, bytes_per_frame, block_frames);
            block.fill(0x5A);
            let mut frame = 0i64;
            let mut stores = 0u64;
            let mut next = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                rb.store(&block.as_slices(), block_frames, frame)
                    .expect("store failed");
                frame += block_frames as i64;
                stores += 1;
                next += block_period;
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
            (stores, frame)
        }
    });

    let fetcher = thread::spawn({
        let stop = Arc::clone(&stop);
        let tx = progress_tx;
        let channels = args.channels;
        let bytes_per_frame = args.bytes_per_frame;
        let block_frames = args.block_frames;
        move || {
            let mut block = FrameBlock::zeroed(channels, bytes_per_frame, block_frames);
            let mut fetches = 0u64;
            let mut underruns = 0u64;
            let mut not_yet = 0u64;
            let mut latencies_us: Vec<f64> = Vec::with_capacity(1 << 16);
            while !stop.load(Ordering::Relaxed) {
                let Ok(bounds) = reader.time_bounds() else {
                    thread::yield_now();
                    continue;
                };
                // Trail the writer by two blocks — the play-through offset.
                let start = (bounds.end - 2 * block_frames as i64).max(bounds.start);
                let begin = Instant::now();
                match reader.fetch(&mut block.as_mut_slices(), block_frames, start) {
                    Ok(()) => {}
                    Err(TorusError::Underrun { .. }) => underruns += 1,
                    Err(TorusError::NotYetAvailable { .. }) => not_yet += 1,
                    Err(e) => panic!("unexpected fetch error: {e}"),
                }
                latencies_us.push(begin.elapsed().as_secs_f64() * 1e6);
                fetches += 1;
                if fetches % 100 == 0 {
                    let _ = tx.try_send((fetches, underruns + not_yet));
                }
                thread::sleep(block_period);
            }
            (fetches, underruns, not_yet, latencies_us)
        }
    });

    let started = Instant::now();
    let deadline = crossbeam_channel::after(Duration::from_secs(args.seconds));
    let heartbeat = tick(Duration::from_secs(1));
    loop {
        select! {
            recv(progress_rx) -> msg => {
                if let Ok((fetches, advisories)) = msg {
                    info!(fetches, advisories, elapsed_s = started.elapsed().as_secs(), "progress");
                }
            }
            recv(heartbeat) -> _ => {
                if let Ok(bounds) = bounds_probe.time_bounds() {
                    info!(%bounds, "window");
                }
            }
            recv(deadline) -> _ => break,
        }
    }
    stop.store(true, Ordering::Relaxed);

    let (stores, frames_written) = writer.join().expect("writer thread panicked");
    let (fetches, underruns, not_yet_available, mut latencies_us) =
        fetcher.join().expect("fetcher thread panicked");
    latencies_us.sort_by(|a, b| a.total_cmp(b));

    let final_bounds = bounds_probe
        .time_bounds()
        .unwrap_or(TimeBounds::empty());

    let summary = Summary {
        seconds: args.seconds,
        channels: args.channels,
        bytes_per_frame: args.bytes_per_frame,
        capacity_frames: args.capacity_frames,
        block_frames: args.block_frames,
        sample_rate: args.sample_rate,
        stores,
        fetches,
        underruns,
        not_yet_available,
        frames_written,
        final_bounds,
        p50_fetch_us: percentile(&latencies_us, 0.50),
        p95_fetch_us: percentile(&latencies_us, 0.95),
        max_fetch_us: latencies_us.last().copied().unwrap_or(0.0),
    };

    println!(
        "stores: {} ({:.0}/s)  fetches: {} ({:.0}/s)",
        summary.stores,
        summary.stores as f64 / args.seconds as f64,
        summary.fetches,
        summary.fetches as f64 / args.seconds as f64,
    );
    println!(
        "advisories: {} underrun, {} not-yet-available",
        summary.underruns, summary.not_yet_available
    );
    println!(
        "fetch latency: p50 {:.1} µs, p95 {:.1} µs, max {:.1} µs",
        summary.p50_fetch_us, summary.p95_fetch_us, summary.max_fetch_us
    );
    println!("final window: {}", summary.final_bounds);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        std::fs::write(path, json).map_err(|e| e.to_string())?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}
