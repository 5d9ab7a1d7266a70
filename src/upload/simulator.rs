//! Degraded-mode progress for uploads whose real transfer failed
//!
//! The simulator only moves a progress bar; it never sends bytes. It is
//! invoked explicitly on the failure branch of an upload pipeline.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::UploadConfig;

const MAX_INCREMENT: f32 = 100.0;

/// Clamp to `[1, 100]`; NaN becomes `fallback`
fn clamp_increment(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(1.0, MAX_INCREMENT)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    tick: Duration,
    min_increment: f32,
    max_increment: f32,
}

impl ProgressSimulator {
    /// Increments are clamped to `[1, 100]` and the range is kept non-empty;
    /// non-finite values fall back to the nearest bound.
    pub fn new(tick: Duration, min_increment: f32, max_increment: f32) -> Self {
        let min_increment = clamp_increment(min_increment, 1.0).min(MAX_INCREMENT - 1.0);
        let max_increment = clamp_increment(max_increment, MAX_INCREMENT);
        let max_increment = if max_increment > min_increment {
            max_increment
        } else {
            min_increment + 1.0
        };
        Self {
            tick,
            min_increment,
            max_increment,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.tick(), config.min_increment, config.max_increment)
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Advance from `start` to 100, reporting each value.
    ///
    /// Stops early when `report` returns false. Returns whether 100 was reached.
    pub async fn run(&self, start: u8, mut report: impl FnMut(u8) -> bool + Send) -> bool {
        let mut rng = StdRng::from_entropy();
        let mut progress = f32::from(start.min(100));

        loop {
            tokio::time::sleep(self.tick).await;
            progress = (progress + rng.gen_range(self.min_increment..self.max_increment)).min(100.0);
            let value = progress as u8;
            if !report(value) {
                return false;
            }
            if value >= 100 {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reaches_100_monotonically() {
        let simulator = ProgressSimulator::new(Duration::from_millis(1), 10.0, 35.0);
        let mut seen = Vec::new();

        let finished = simulator
            .run(0, |p| {
                seen.push(p);
                true
            })
            .await;

        assert!(finished);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        // increments of at least 10 reach 100 within 10 ticks
        assert!(seen.len() <= 10);
        assert!(seen.iter().all(|p| *p >= 10));
    }

    #[tokio::test]
    async fn test_stops_when_report_refuses() {
        let simulator = ProgressSimulator::new(Duration::from_millis(1), 10.0, 35.0);
        let mut calls = 0;

        let finished = simulator
            .run(0, |_| {
                calls += 1;
                false
            })
            .await;

        assert!(!finished);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_resumes_from_start() {
        let simulator = ProgressSimulator::new(Duration::from_millis(1), 10.0, 35.0);
        let mut first = None;
        simulator
            .run(60, |p| {
                first.get_or_insert(p);
                true
            })
            .await;
        assert!(first.unwrap() >= 70);
    }

    #[test]
    fn test_sanitizes_bounds() {
        let simulator = ProgressSimulator::new(Duration::from_millis(200), 0.0, 0.0);
        assert!(simulator.min_increment >= 1.0);
        assert!(simulator.max_increment > simulator.min_increment);

        for (min, max) in [
            (10.0, f32::INFINITY),
            (f32::NAN, f32::NAN),
            (f32::NEG_INFINITY, 35.0),
            (f32::INFINITY, f32::INFINITY),
            (500.0, 20.0),
        ] {
            let simulator = ProgressSimulator::new(Duration::from_millis(1), min, max);
            assert!(simulator.min_increment.is_finite());
            assert!(simulator.max_increment.is_finite());
            assert!(simulator.min_increment >= 1.0);
            assert!(simulator.max_increment > simulator.min_increment);
            assert!(simulator.max_increment <= MAX_INCREMENT);
        }
    }

    #[tokio::test]
    async fn test_infinite_increment_still_completes() {
        let simulator = ProgressSimulator::new(Duration::from_millis(1), 10.0, f32::INFINITY);
        let mut last = 0;
        let finished = simulator
            .run(0, |p| {
                last = p;
                true
            })
            .await;

        assert!(finished);
        assert_eq!(last, 100);
    }
}
