//! High-resolution timer for frame timing and stats sampling.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Total elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Elapsed time in milliseconds since the timer was created.
    ///
    /// Stats counters report milliseconds, so this avoids scattering the
    /// conversion around call sites.
    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }

    /// Time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_monotonic() {
        let timer = Timer::new();
        let a = timer.elapsed();
        let b = timer.elapsed();
        assert!(b >= a);
    }

    #[test]
    fn test_tick_resets_delta_origin() {
        let mut timer = Timer::new();
        timer.tick();
        let delta = timer.tick();
        // A tick right after another tick measures a near-zero window,
        // never the full time since construction.
        assert!(delta <= timer.elapsed());
    }

    #[test]
    fn test_elapsed_ms_matches_secs() {
        let timer = Timer::new();
        let secs = timer.elapsed_secs();
        let ms = timer.elapsed_ms();
        assert!(ms >= secs * 1000.0 * 0.5);
    }
}
