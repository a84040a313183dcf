//! Accumulator for running a simulation at a fixed rate from a variable-rate loop.

use log::warn;

#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: f32,
    accumulator: f32,
    max_steps: u32,
    dropped_steps: u64,
}

impl FixedTimestep {
    /// `step` is the tick length in seconds; at most `max_steps` ticks are
    /// released per call to [`advance`](Self::advance).
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step,
            accumulator: 0.0,
            max_steps: max_steps.max(1),
            dropped_steps: 0,
        }
    }

    /// Step of `1 / ticks_per_second` seconds.
    pub fn from_rate(ticks_per_second: u32, max_steps: u32) -> Self {
        Self::new(1.0 / ticks_per_second.max(1) as f32, max_steps)
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Adds `elapsed` seconds and returns how many fixed steps are due. The
    /// remainder carries over; backlog beyond the cap is discarded.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.accumulator += elapsed;
        }

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }

        if self.accumulator >= self.step {
            let backlog = (self.accumulator / self.step) as u64;
            self.dropped_steps += backlog;
            warn!(
                "Simulation fell behind by {} ticks, dropping backlog",
                backlog
            );
            self.accumulator %= self.step;
        }

        steps
    }

    /// Fraction of a step currently accumulated, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.step
    }

    /// Steps discarded by the catch-up cap so far.
    pub fn dropped_steps(&self) -> u64 {
        self.dropped_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_carries_remainder() {
        let mut ts = FixedTimestep::new(0.1, 8);
        assert_eq!(ts.advance(0.05), 0);
        assert_eq!(ts.advance(0.06), 1);
        assert_approx_eq!(ts.alpha(), 0.1, 1e-3);
    }

    #[test]
    fn test_multiple_steps_per_call() {
        let mut ts = FixedTimestep::new(0.1, 8);
        assert_eq!(ts.advance(0.35), 3);
        assert_approx_eq!(ts.alpha(), 0.5, 1e-3);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut ts = FixedTimestep::from_rate(60, 4);
        assert_eq!(ts.advance(1.0), 4);
        assert!(ts.dropped_steps() > 0);
        assert!(ts.alpha() < 1.0);
        assert_eq!(ts.advance(0.0), 0);
    }

    #[test]
    fn test_ignores_bad_elapsed() {
        let mut ts = FixedTimestep::new(0.1, 8);
        assert_eq!(ts.advance(-1.0), 0);
        assert_eq!(ts.advance(f32::NAN), 0);
        assert_eq!(ts.alpha(), 0.0);
    }

    #[test]
    fn test_total_steps_match_elapsed_time() {
        let mut ts = FixedTimestep::from_rate(60, 8);
        let total: u32 = (0..600).map(|_| ts.advance(1.0 / 120.0)).sum();
        assert!((299..=300).contains(&total));
    }
}
