//! Fixed-interval game loop.
//!
//! Runs `update(dt)` at a fixed simulation interval regardless of how fast
//! the outer loop iterates, calling `draw` once per iteration and sleeping
//! toward the FPS limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_FPS_LIMIT: u32 = 60;
pub const DEFAULT_INTERVAL: f32 = 1.0 / 90.0;

/// Drives `update` at `interval` seconds per step until `run_flag` clears.
///
/// Elapsed wall time accumulates between iterations; each iteration runs as
/// many fixed-interval updates as the accumulator covers, so a slow frame is
/// caught up by a burst of updates rather than a longer dt.
pub fn run<U, D>(run_flag: &AtomicBool, mut update: U, mut draw: D, fps_limit: u32, interval: f32)
where
    U: FnMut(f32),
    D: FnMut(),
{
    let frame_budget = if fps_limit > 0 {
        Some(Duration::from_secs_f32(2.0 / fps_limit as f32))
    } else {
        None
    };

    let mut last = Instant::now();
    let mut accumulated = 0.0f32;

    while run_flag.load(Ordering::Relaxed) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(last);
        accumulated += elapsed.as_secs_f32();

        while accumulated >= interval {
            accumulated -= interval;
            update(interval);
        }

        draw();

        if let Some(budget) = frame_budget {
            if let Some(rest) = budget.checked_sub(elapsed) {
                thread::sleep(rest);
            }
        }
        last = now;
    }
}
