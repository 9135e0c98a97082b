use std::ops::Range;

use crate::error::{format_error, invalid_config, Result};
use crate::format::{ContainerHeader, MAX_WORKERS};

/// How an input of a given length is cut into `worker_count` contiguous chunks.
///
/// Every chunk holds `nominal_chunk_size` bytes except the last, which also
/// absorbs the `remainder`. The plan always satisfies
/// `nominal_chunk_size * worker_count + remainder == total_len()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPlan {
    worker_count: usize,
    nominal_chunk_size: u64,
    remainder: usize,
}

/// Plan the chunks for `input_len` bytes across `worker_count` workers.
///
/// Fails with [`InvalidConfiguration`](crate::PlzoError::InvalidConfiguration)
/// when the worker count is zero, larger than the container can record, or
/// larger than the input (which would leave some chunk empty).
pub fn plan(input_len: u64, worker_count: usize) -> Result<ChunkPlan> {
    ChunkPlan::new(input_len, worker_count)
}

impl ChunkPlan {
    pub fn new(input_len: u64, worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(invalid_config("worker count must be at least 1"));
        }
        if worker_count > MAX_WORKERS {
            return Err(invalid_config(format!(
                "worker count {} exceeds the container limit of {}",
                worker_count, MAX_WORKERS
            )));
        }
        if input_len < worker_count as u64 {
            return Err(invalid_config(format!(
                "cannot split {} bytes into {} non-empty chunks",
                input_len, worker_count
            )));
        }
        let workers = worker_count as u64;
        let plan = Self {
            worker_count,
            nominal_chunk_size: input_len / workers,
            remainder: (input_len % workers) as usize,
        };
        tracing::debug!(
            input_len,
            worker_count,
            nominal_chunk_size = plan.nominal_chunk_size,
            remainder = plan.remainder,
            "planned chunks"
        );
        Ok(plan)
    }

    /// Rebuild the plan recorded in a container header.
    ///
    /// The nominal size and remainder are trusted verbatim: chunk boundaries
    /// on the decompress side are exactly the ones used at compression time.
    pub fn from_header(header: &ContainerHeader) -> Result<Self> {
        let worker_count = header.worker_count as usize;
        let remainder = header.remainder as usize;
        if worker_count == 0 {
            return Err(format_error("header declares zero workers"));
        }
        if remainder >= worker_count {
            return Err(format_error(format!(
                "remainder {} is not smaller than worker count {}",
                remainder, worker_count
            )));
        }
        if header.nominal_chunk_size == 0 {
            return Err(format_error("header declares an empty nominal chunk size"));
        }
        header
            .nominal_chunk_size
            .checked_mul(worker_count as u64)
            .and_then(|n| n.checked_add(remainder as u64))
            .ok_or_else(|| format_error("declared chunk sizes overflow a 64-bit length"))?;
        Ok(Self {
            worker_count,
            nominal_chunk_size: header.nominal_chunk_size,
            remainder,
        })
    }

    /// The header fields that record this plan in a container.
    pub fn header(&self) -> ContainerHeader {
        ContainerHeader {
            worker_count: self.worker_count as u8,
            nominal_chunk_size: self.nominal_chunk_size,
            remainder: self.remainder as u8,
        }
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[inline]
    pub fn nominal_chunk_size(&self) -> u64 {
        self.nominal_chunk_size
    }

    #[inline]
    pub fn remainder(&self) -> usize {
        self.remainder
    }

    /// Total raw length covered by the plan.
    pub fn total_len(&self) -> u64 {
        self.nominal_chunk_size * self.worker_count as u64 + self.remainder as u64
    }

    /// Raw length of chunk `index`; only the last chunk differs from nominal.
    pub fn chunk_len(&self, index: usize) -> u64 {
        debug_assert!(index < self.worker_count);
        if index + 1 == self.worker_count {
            self.nominal_chunk_size + self.remainder as u64
        } else {
            self.nominal_chunk_size
        }
    }

    /// Raw byte range of chunk `index` within the whole input.
    pub fn chunk_range(&self, index: usize) -> Range<u64> {
        let start = self.nominal_chunk_size * index as u64;
        start..start + self.chunk_len(index)
    }

    /// Byte ranges of every chunk, in index order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        (0..self.worker_count).map(move |i| self.chunk_range(i))
    }

    /// Slice `input` into one borrowed chunk per worker.
    ///
    /// `input` must be exactly [`total_len`](Self::total_len) bytes long.
    pub fn split<'a>(&self, input: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        if input.len() as u64 != self.total_len() {
            return Err(invalid_config(format!(
                "plan covers {} bytes but input has {}",
                self.total_len(),
                input.len()
            )));
        }
        Ok(self
            .ranges()
            .map(|r| &input[r.start as usize..r.end as usize])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlzoError;

    #[test]
    fn test_even_split() {
        let p = plan(1000, 8).unwrap();
        assert_eq!(p.nominal_chunk_size(), 125);
        assert_eq!(p.remainder(), 0);
        assert!((0..8).all(|i| p.chunk_len(i) == 125));
    }

    #[test]
    fn test_remainder_goes_to_last_chunk() {
        let p = plan(1003, 8).unwrap();
        assert_eq!(p.nominal_chunk_size(), 125);
        assert_eq!(p.remainder(), 3);
        for i in 0..7 {
            assert_eq!(p.chunk_len(i), 125);
        }
        assert_eq!(p.chunk_len(7), 128);
        assert_eq!(p.chunk_range(7), 875..1003);
    }

    #[test]
    fn test_plan_identity_holds() {
        for len in 1..300u64 {
            for workers in 1..=len.min(40) as usize {
                let p = plan(len, workers).unwrap();
                assert_eq!(
                    p.nominal_chunk_size() * workers as u64 + p.remainder() as u64,
                    len
                );
                assert!(p.remainder() < workers);
                assert_eq!(p.ranges().map(|r| r.end - r.start).sum::<u64>(), len);
                assert_eq!(p, plan(len, workers).unwrap());
            }
        }
    }

    #[test]
    fn test_one_byte_chunks_when_workers_equal_length() {
        let p = plan(16, 16).unwrap();
        assert_eq!(p.nominal_chunk_size(), 1);
        assert_eq!(p.remainder(), 0);
        assert!(p.ranges().all(|r| r.end - r.start == 1));
    }

    #[test]
    fn test_single_worker_takes_everything() {
        let p = plan(12345, 1).unwrap();
        assert_eq!(p.chunk_range(0), 0..12345);
        assert_eq!(p.remainder(), 0);
    }

    #[test]
    fn test_rejects_bad_worker_counts() {
        assert!(matches!(plan(100, 0), Err(PlzoError::InvalidConfiguration(_))));
        assert!(matches!(plan(7, 8), Err(PlzoError::InvalidConfiguration(_))));
        assert!(matches!(plan(0, 1), Err(PlzoError::InvalidConfiguration(_))));
        assert!(matches!(
            plan(10_000, MAX_WORKERS + 1),
            Err(PlzoError::InvalidConfiguration(_))
        ));
        assert!(plan(10_000, MAX_WORKERS).is_ok());
    }

    #[test]
    fn test_header_round_trip_and_validation() {
        let p = plan(1003, 8).unwrap();
        assert_eq!(ChunkPlan::from_header(&p.header()).unwrap(), p);

        let bad = ContainerHeader {
            worker_count: 4,
            nominal_chunk_size: 10,
            remainder: 4,
        };
        assert!(matches!(
            ChunkPlan::from_header(&bad),
            Err(PlzoError::ContainerFormat(_))
        ));
        let zero = ContainerHeader {
            worker_count: 0,
            nominal_chunk_size: 10,
            remainder: 0,
        };
        assert!(ChunkPlan::from_header(&zero).is_err());
    }

    #[test]
    fn test_split_borrows_contiguous_chunks() {
        let data: Vec<u8> = (0..=254).collect();
        let p = plan(data.len() as u64, 4).unwrap();
        let chunks = p.split(&data).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].len(), 63 + 3);
        assert_eq!(chunks.concat(), data);
        assert!(p.split(&data[1..]).is_err());
    }
}
