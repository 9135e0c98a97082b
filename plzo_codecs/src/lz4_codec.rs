use lz4_flex::block::{compress, decompress_into, DecompressError};
use plzo_core::{Codec, CodecError, CodecStatus};

use crate::output_buffer;

// A match length grows by at most 255 per encoded byte.
const MAX_EXPANSION: usize = 255;
const EXPANSION_SLACK: usize = 16;

fn max_decompressed_len(compressed_len: usize) -> usize {
    compressed_len
        .saturating_mul(MAX_EXPANSION)
        .saturating_add(EXPANSION_SLACK)
}

/// LZ4 block codec.
///
/// Raw LZ4 blocks with no size prefix: the container already records each
/// chunk's compressed length, and decompression is told the exact raw length
/// through its capacity. Fast on both sides, which suits one-shot parallel
/// runs where each worker handles one large chunk.
///
/// Best for: general data when speed matters more than size.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8], _capacity: usize) -> Result<Vec<u8>, CodecError> {
        // The capacity check happens in the pool; LZ4's worst case stays well
        // under it.
        Ok(compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        // The output buffer is zero-filled up front, so a declared length the
        // payload cannot reach is refused before any memory is touched.
        let reachable = max_decompressed_len(compressed.len());
        if capacity > reachable {
            return Err(CodecError::new(
                CodecStatus::LengthMismatch,
                format!(
                    "{} compressed bytes cannot expand to {} (at most {})",
                    compressed.len(),
                    capacity,
                    reachable
                ),
            ));
        }
        let mut out = output_buffer(capacity)?;
        out.resize(capacity, 0);
        let n = decompress_into(compressed, &mut out).map_err(|e| {
            let status = match e {
                DecompressError::OutputTooSmall { .. } => CodecStatus::OutputOverrun,
                DecompressError::ExpectedAnotherByte => CodecStatus::InputOverrun,
                _ => CodecStatus::Error,
            };
            CodecError::new(status, format!("lz4 decompress error: {}", e))
        })?;
        out.truncate(n);
        Ok(out)
    }
}
