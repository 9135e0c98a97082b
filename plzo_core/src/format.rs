use crate::error::{format_error, Result};

/// Size of the fixed container header in bytes.
///   worker_count:u8 + nominal_chunk_size:u64 + remainder:u8
///   = 1 + 8 + 1 = 10
pub const HEADER_SIZE: usize = 10;

/// Size of each entry in the compressed chunk size table, in bytes.
pub const SIZE_ENTRY_SIZE: usize = 4;

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 8;

/// Largest worker count the 1-byte header field can carry.
pub const MAX_WORKERS: usize = u8::MAX as usize;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 10-byte container header.
///
/// All multi-byte fields are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub worker_count: u8,
    /// Raw bytes in every chunk except the last.
    pub nominal_chunk_size: u64,
    /// Extra raw bytes carried by the last chunk.
    pub remainder: u8,
}

impl ContainerHeader {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.worker_count;
        buf[1..9].copy_from_slice(&self.nominal_chunk_size.to_le_bytes());
        buf[9] = self.remainder;
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes.
    ///
    /// Only the layout is checked here; whether the values describe a valid
    /// chunk plan is decided by [`ChunkPlan::from_header`](crate::ChunkPlan::from_header).
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut nominal = [0u8; 8];
        nominal.copy_from_slice(&buf[1..9]);
        Self {
            worker_count: buf[0],
            nominal_chunk_size: u64::from_le_bytes(nominal),
            remainder: buf[9],
        }
    }

    /// Bytes occupied by the size table that follows this header.
    #[inline]
    pub fn size_table_len(&self) -> usize {
        self.worker_count as usize * SIZE_ENTRY_SIZE
    }

    /// Header plus size table.
    #[inline]
    pub fn prefix_len(&self) -> usize {
        HEADER_SIZE + self.size_table_len()
    }
}

// ── Size table ─────────────────────────────────────────────────────────────

pub fn encode_size_table(sizes: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(sizes.len() * SIZE_ENTRY_SIZE);
    for size in sizes {
        buf.extend_from_slice(&size.to_le_bytes());
    }
    buf
}

/// Parse `count` size entries from the start of `buf`.
pub fn decode_size_table(buf: &[u8], count: usize) -> Result<Vec<u32>> {
    let needed = count * SIZE_ENTRY_SIZE;
    if buf.len() < needed {
        return Err(format_error(format!(
            "size table truncated: need {} bytes for {} chunks, have {}",
            needed,
            count,
            buf.len()
        )));
    }
    Ok(buf[..needed]
        .chunks_exact(SIZE_ENTRY_SIZE)
        .map(|entry| u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]))
        .collect())
}
