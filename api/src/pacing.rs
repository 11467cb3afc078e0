use std::time::Duration;

use rand::Rng;

/// Fixed spread around the caller-supplied base delay, in seconds.
pub const JITTER_SPREAD_SECS: f64 = 15.0;

/// Cursor over the ordered sender pool. It advances after every attempt,
/// success or failure, so the k-th recipient of a run always lands on
/// account `k % len`.
pub struct Rotation {
    cursor: usize,
    len: usize,
}

impl Rotation {
    /// Callers enforce a non-empty pool before the loop starts.
    pub fn new(len: usize) -> Self {
        debug_assert!(len > 0);
        Self { cursor: 0, len }
    }

    pub fn next(&mut self) -> usize {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.len;
        index
    }
}

/// Inter-send pause: the base delay jittered within the fixed spread,
/// clamped so a small base cannot produce a negative duration.
pub fn jittered_delay(base_seconds: u64, rng: &mut impl Rng) -> Duration {
    let jitter = rng.gen_range(-JITTER_SPREAD_SECS..=JITTER_SPREAD_SECS);
    Duration::from_secs_f64((base_seconds as f64 + jitter).max(0.0))
}
