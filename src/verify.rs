//! Element-by-element comparison of a host reference against device output.

use serde::Serialize;
use std::fmt;

/// How close a device value must be to the host reference.
///
/// Device math built with relaxed floating point flags is not bit-exact
/// with the host, so float outputs should use one of the approximate modes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub enum Tolerance {
    #[default]
    Exact,
    Absolute(f64),
    /// Relative to the magnitude of the expected value.
    Relative(f64),
}

pub trait Approx: Copy + PartialEq + fmt::Debug {
    fn within(expected: Self, actual: Self, tolerance: Tolerance) -> bool;
}

macro_rules! impl_approx {
    ($($t:ty),*) => {
        $(
            impl Approx for $t {
                fn within(expected: Self, actual: Self, tolerance: Tolerance) -> bool {
                    if expected == actual {
                        return true;
                    }
                    let diff = (expected as f64 - actual as f64).abs();
                    match tolerance {
                        Tolerance::Exact => false,
                        Tolerance::Absolute(eps) => diff <= eps,
                        Tolerance::Relative(eps) => diff <= eps * (expected as f64).abs(),
                    }
                }
            }
        )*
    };
}

impl_approx!(i32, u32, i64, f32, f64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Verification<T> {
    Match,
    Mismatch { index: usize, expected: T, actual: T },
    LengthMismatch { expected: usize, actual: usize },
}

impl<T> Verification<T> {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match)
    }
}

impl<T: fmt::Display> fmt::Display for Verification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Match => write!(f, "[INFO] Test PASS! No mismatch found!"),
            Verification::Mismatch {
                index,
                expected,
                actual,
            } => write!(
                f,
                "[FAIL] There is a mismatch at location {}\n\twhere HOST contains {} and DEVICE contains {}",
                index, expected, actual
            ),
            Verification::LengthMismatch { expected, actual } => write!(
                f,
                "[FAIL] HOST produced {} elements but DEVICE produced {}",
                expected, actual
            ),
        }
    }
}

/// Linear scan in array order, reporting only the first mismatch.
pub fn verify<T: Approx>(reference: &[T], device: &[T], tolerance: Tolerance) -> Verification<T> {
    if reference.len() != device.len() {
        return Verification::LengthMismatch {
            expected: reference.len(),
            actual: device.len(),
        };
    }

    reference
        .iter()
        .zip(device)
        .position(|(&e, &a)| !T::within(e, a, tolerance))
        .map_or(Verification::Match, |index| Verification::Mismatch {
            index,
            expected: reference[index],
            actual: device[index],
        })
}
