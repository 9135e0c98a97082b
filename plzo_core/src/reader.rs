use std::io::Read;

use crate::error::{format_error, Result};
use crate::format::{decode_size_table, ContainerHeader, HEADER_SIZE, SIZE_ENTRY_SIZE};
use crate::plan::ChunkPlan;

/// A parsed container borrowing its payload bytes from the input buffer.
///
/// # Decode sequence
/// 1. Read the 10-byte header and rebuild the [`ChunkPlan`] it records.
/// 2. Read `worker_count` little-endian `u32` compressed sizes.
/// 3. Slice the remaining bytes into one payload per chunk, in table order.
///
/// Every length is checked against the buffer before it is sliced: a table
/// that declares more payload bytes than follow fails with
/// [`ContainerFormat`](crate::PlzoError::ContainerFormat), as do leftover
/// bytes after the last payload.
#[derive(Debug, Clone)]
pub struct ContainerView<'a> {
    pub header: ContainerHeader,
    plan: ChunkPlan,
    compressed_sizes: Vec<u32>,
    payloads: Vec<&'a [u8]>,
    container_len: u64,
}

/// Parse a whole container held in memory.
pub fn decode(bytes: &[u8]) -> Result<ContainerView<'_>> {
    let header = parse_header(bytes)?;
    let plan = ChunkPlan::from_header(&header)?;
    let compressed_sizes = decode_size_table(&bytes[HEADER_SIZE..], plan.worker_count())?;

    let mut rest = &bytes[header.prefix_len()..];
    let declared: u64 = compressed_sizes.iter().map(|&s| s as u64).sum();
    if declared > rest.len() as u64 {
        return Err(format_error(format!(
            "size table declares {} payload bytes but only {} follow",
            declared,
            rest.len()
        )));
    }

    let mut payloads = Vec::with_capacity(compressed_sizes.len());
    for &size in &compressed_sizes {
        let (payload, tail) = rest.split_at(size as usize);
        payloads.push(payload);
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(format_error(format!(
            "{} trailing bytes after the last chunk payload",
            rest.len()
        )));
    }

    tracing::debug!(
        worker_count = plan.worker_count(),
        nominal_chunk_size = plan.nominal_chunk_size(),
        remainder = plan.remainder(),
        payload_bytes = declared,
        "container decoded"
    );

    Ok(ContainerView {
        header,
        plan,
        compressed_sizes,
        payloads,
        container_len: bytes.len() as u64,
    })
}

/// Read only the header and size table from a stream, leaving payloads unread.
pub fn read_header<R: Read>(src: &mut R) -> Result<(ContainerHeader, Vec<u32>)> {
    let mut header_buf = [0u8; HEADER_SIZE];
    src.read_exact(&mut header_buf)
        .map_err(|e| truncated_or_io(e, "container header"))?;
    let header = ContainerHeader::from_bytes(&header_buf);
    ChunkPlan::from_header(&header)?;

    let mut table = vec![0u8; header.worker_count as usize * SIZE_ENTRY_SIZE];
    src.read_exact(&mut table)
        .map_err(|e| truncated_or_io(e, "size table"))?;
    let sizes = decode_size_table(&table, header.worker_count as usize)?;
    Ok((header, sizes))
}

fn parse_header(bytes: &[u8]) -> Result<ContainerHeader> {
    let buf: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            format_error(format!(
                "container is {} bytes, shorter than the {}-byte header",
                bytes.len(),
                HEADER_SIZE
            ))
        })?;
    Ok(ContainerHeader::from_bytes(buf))
}

fn truncated_or_io(err: std::io::Error, what: &str) -> crate::PlzoError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        format_error(format!("{} truncated", what))
    } else {
        err.into()
    }
}

impl<'a> ContainerView<'a> {
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.plan.worker_count()
    }

    pub fn compressed_sizes(&self) -> &[u32] {
        &self.compressed_sizes
    }

    pub fn payload(&self, index: usize) -> Option<&'a [u8]> {
        self.payloads.get(index).copied()
    }

    pub fn payloads(&self) -> &[&'a [u8]] {
        &self.payloads
    }

    /// Total uncompressed size of all chunks in bytes.
    pub fn raw_size(&self) -> u64 {
        self.plan.total_len()
    }

    /// Total payload bytes (excluding header and size table).
    pub fn compressed_size(&self) -> u64 {
        self.compressed_sizes.iter().map(|&s| s as u64).sum()
    }

    /// Length of the whole container, header and size table included.
    pub fn container_len(&self) -> u64 {
        self.container_len
    }

    /// Container length over raw length; below 1.0 means the data shrank.
    pub fn ratio(&self) -> f64 {
        let raw = self.raw_size();
        if raw == 0 {
            return 1.0;
        }
        self.container_len as f64 / raw as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_size_table;
    use crate::plan;
    use crate::writer::write_container;
    use crate::PlzoError;

    fn container(payloads: &[&[u8]], input_len: u64) -> Vec<u8> {
        let p = plan(input_len, payloads.len()).unwrap();
        let mut buf = Vec::new();
        write_container(&mut buf, &p, payloads).unwrap();
        buf
    }

    #[test]
    fn test_decode_inverts_write() {
        let bytes = container(&[b"one", b"", b"three"], 31);
        let view = decode(&bytes).unwrap();
        assert_eq!(view.worker_count(), 3);
        assert_eq!(view.plan().nominal_chunk_size(), 10);
        assert_eq!(view.plan().remainder(), 1);
        assert_eq!(view.compressed_sizes(), &[3, 0, 5]);
        assert_eq!(view.payloads(), &[&b"one"[..], b"", b"three"]);
        assert_eq!(view.container_len(), bytes.len() as u64);
        assert_eq!(view.raw_size(), 31);
        assert_eq!(view.compressed_size(), 8);
        assert_eq!(view.ratio(), bytes.len() as f64 / 31.0);
    }

    #[test]
    fn test_declared_sizes_past_end_fail_closed() {
        let mut bytes = plan(20, 2).unwrap().header().to_bytes().to_vec();
        bytes.extend(encode_size_table(&[4, 100]));
        bytes.extend_from_slice(b"abcdefgh");
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, PlzoError::ContainerFormat(_)), "{err}");
    }

    #[test]
    fn test_truncations_are_format_errors() {
        let bytes = container(&[b"aa", b"bb"], 4);
        for cut in 0..bytes.len() {
            let err = decode(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, PlzoError::ContainerFormat(_)), "cut {cut}: {err}");
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = container(&[b"aa", b"bb"], 4);
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(PlzoError::ContainerFormat(_))));
    }

    #[test]
    fn test_read_header_from_stream() {
        let bytes = container(&[b"xyz", b"q"], 9);
        let (header, sizes) = read_header(&mut &bytes[..]).unwrap();
        assert_eq!(header.worker_count, 2);
        assert_eq!(header.nominal_chunk_size, 4);
        assert_eq!(header.remainder, 1);
        assert_eq!(sizes, vec![3, 1]);

        let err = read_header(&mut &bytes[..12]).unwrap_err();
        assert!(matches!(err, PlzoError::ContainerFormat(_)));
    }
}
