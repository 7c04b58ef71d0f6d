//! Static partitioning of a workload into per-lane chunks.

use crate::error::{Error, Result};
use serde::Serialize;
use std::ops::Range;

/// What to do with the elements left over when the lane count does not
/// divide the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RemainderPolicy {
    /// The last lane takes the remainder.
    #[default]
    LastLane,
    /// A non-zero remainder is an error.
    Reject,
}

/// The contiguous sub-range of the workload assigned to one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub lane: usize,
    pub offset: usize,
    pub len: usize,
}

impl Chunk {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub total: usize,
    pub lanes: usize,
    pub chunk_size: usize,
    pub chunks: Vec<Chunk>,
}

impl Workload {
    /// Elements the plain `total / lanes` split would have left out.
    pub fn remainder(&self) -> usize {
        self.total - self.chunk_size * self.lanes
    }

    /// True when the chunks are disjoint, in order, and cover `[0, total)`.
    pub fn is_exact_cover(&self) -> bool {
        let mut next = 0;
        for chunk in &self.chunks {
            if chunk.offset != next {
                return false;
            }
            next += chunk.len;
        }
        next == self.total
    }
}

/// Split `total` elements into `lanes` contiguous chunks.
///
/// Chunk `i` starts at `i * (total / lanes)`. Leftover elements are handled
/// by `policy`; they are never silently dropped.
pub fn partition(total: usize, lanes: usize, policy: RemainderPolicy) -> Result<Workload> {
    if lanes == 0 {
        return Err(Error::config("lane count must be > 0"));
    }

    let chunk_size = total / lanes;
    let remainder = total - chunk_size * lanes;

    if remainder != 0 && policy == RemainderPolicy::Reject {
        return Err(Error::partition(format!(
            "{} elements do not divide evenly across {} lanes (remainder {})",
            total, lanes, remainder
        )));
    }

    let chunks = (0..lanes)
        .map(|lane| {
            let extra = if lane + 1 == lanes { remainder } else { 0 };
            Chunk {
                lane,
                offset: lane * chunk_size,
                len: chunk_size + extra,
            }
        })
        .collect();

    Ok(Workload {
        total,
        lanes,
        chunk_size,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let w = partition(16, 4, RemainderPolicy::Reject).unwrap();
        let offsets: Vec<usize> = w.chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12]);
        assert!(w.chunks.iter().all(|c| c.len == 4));
        assert!(w.is_exact_cover());
        assert_eq!(w.remainder(), 0);
    }

    #[test]
    fn test_remainder_goes_to_last_lane() {
        let w = partition(10_000, 3, RemainderPolicy::LastLane).unwrap();
        assert_eq!(w.chunk_size, 3333);
        assert_eq!(w.remainder(), 1);
        assert_eq!(w.chunks[2].len, 3334);
        assert_eq!(w.chunks[2].range().end, 10_000);
        assert!(w.is_exact_cover());
    }

    #[test]
    fn test_remainder_rejected() {
        let err = partition(10, 4, RemainderPolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::Partition(_)));
    }

    #[test]
    fn test_zero_total_gives_empty_lanes() {
        let w = partition(0, 4, RemainderPolicy::Reject).unwrap();
        assert_eq!(w.chunks.len(), 4);
        assert!(w.chunks.iter().all(Chunk::is_empty));
        assert!(w.is_exact_cover());
    }

    #[test]
    fn test_more_lanes_than_elements() {
        let w = partition(3, 5, RemainderPolicy::LastLane).unwrap();
        assert_eq!(w.chunk_size, 0);
        assert_eq!(w.chunks[4].len, 3);
        assert!(w.chunks[..4].iter().all(Chunk::is_empty));
        assert!(w.is_exact_cover());
    }

    #[test]
    fn test_zero_lanes_is_error() {
        assert!(partition(16, 0, RemainderPolicy::LastLane).is_err());
    }

    #[test]
    fn test_exact_cover_for_many_shapes() {
        for total in [0usize, 1, 7, 16, 100, 1023, 4096] {
            for lanes in 1..=9 {
                let w = partition(total, lanes, RemainderPolicy::LastLane).unwrap();
                assert!(w.is_exact_cover(), "total={} lanes={}", total, lanes);
                let sum: usize = w.chunks.iter().map(|c| c.len).sum();
                assert_eq!(sum, total);
            }
        }
    }
}
