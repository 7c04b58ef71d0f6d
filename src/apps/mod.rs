//! The example programs as library operations.
//!
//! Each app runs its kernel on a [`Context`](crate::context::Context),
//! computes the same result on the host, and compares the two.

pub mod blur;
pub mod histogram;
pub mod multi_queue;
pub mod rotate;
pub mod transpose;
pub mod vector_add;

use crate::context::Context;
use crate::telemetry::RunReport;
use crate::verify::Verification;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use std::fmt;
use std::time::{Duration, Instant};

/// Upper bound of generated input values.
pub const RANDOM_NUMBER_MAX: i32 = 1000;

/// A verified device result and how long each side took.
#[derive(Debug, Clone)]
pub struct Check<T> {
    pub label: String,
    pub verification: Verification<T>,
    pub host_time: Duration,
    pub device_time: Duration,
}

impl<T> Check<T> {
    pub fn passed(&self) -> bool {
        self.verification.is_match()
    }

    pub fn speedup(&self) -> Option<f64> {
        let device = self.device_time.as_secs_f64();
        (device > 0.0).then(|| self.host_time.as_secs_f64() / device)
    }
}

impl<T: fmt::Display> Check<T> {
    pub fn report(&self, program: &str, context: &Context, elements: usize) -> RunReport {
        RunReport {
            program: program.to_string(),
            platform: context.platform().name.clone(),
            device: context.device().name.clone(),
            elements,
            lanes: 1,
            host_time_ms: ms(self.host_time),
            device_time_ms: ms(self.device_time),
            passed: self.passed(),
            verification: self.verification.to_string(),
            metrics: context.metrics(),
            pool: Some(context.pool_stats()),
            ..RunReport::default()
        }
    }
}

impl<T: fmt::Display> fmt::Display for Check<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[INFO] {}", self.label)?;
        writeln!(f, "[INFO] Serial time:\t{:.6}ms", ms(self.host_time))?;
        writeln!(f, "[INFO] Device time:\t{:.6}ms", ms(self.device_time))?;
        write!(f, "{}", self.verification)?;
        if let (true, Some(s)) = (self.passed(), self.speedup()) {
            write!(f, "\n[INFO] Achieved speedup of {:.2}x", s)?;
        }
        Ok(())
    }
}

pub(crate) fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

pub(crate) fn timed<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let r = f();
    (r, start.elapsed())
}

fn rng(seed: Option<u64>) -> Pcg64 {
    match seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_entropy(),
    }
}

/// `len` integers drawn uniformly from `[0, RANDOM_NUMBER_MAX]`.
pub fn random_ints(len: usize, seed: Option<u64>) -> Vec<i32> {
    let dist = Uniform::new_inclusive(0, RANDOM_NUMBER_MAX);
    dist.sample_iter(rng(seed)).take(len).collect()
}

/// Whole-numbered floats in `[0, RANDOM_NUMBER_MAX)`.
pub fn random_floats(len: usize, seed: Option<u64>) -> Vec<f32> {
    let dist = Uniform::new(0, RANDOM_NUMBER_MAX);
    dist.sample_iter(rng(seed))
        .take(len)
        .map(|v| v as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_input_is_reproducible() {
        assert_eq!(random_ints(64, Some(7)), random_ints(64, Some(7)));
        assert_ne!(random_ints(64, Some(7)), random_ints(64, Some(8)));
        assert!(random_ints(1000, Some(1))
            .iter()
            .all(|v| (0..=RANDOM_NUMBER_MAX).contains(v)));
    }

    #[test]
    fn test_check_display() {
        let check = Check {
            label: "demo".to_string(),
            verification: Verification::<i32>::Match,
            host_time: Duration::from_millis(4),
            device_time: Duration::from_millis(2),
        };
        let text = check.to_string();
        assert!(text.contains("Test PASS"));
        assert!(text.contains("speedup of 2.00x"));
    }
}
