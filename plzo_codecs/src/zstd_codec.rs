use plzo_core::{Codec, CodecError, CodecStatus};
use zstd::bulk::{Compressor, Decompressor};
use zstd::zstd_safe::get_frame_content_size;

use crate::output_buffer;

/// Zstandard block codec.
///
/// Each chunk is compressed independently at the configured level (default:
/// 3) into a buffer of exactly the capacity the pool grants, so a chunk can
/// never grow past the container's worst-case bound.
///
/// Best for: text, logs, and structured data where ratio matters.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_block(&self, raw: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = output_buffer(capacity)?;
        Compressor::new(self.level)
            .and_then(|mut c| c.compress_to_buffer(raw, &mut out))
            .map_err(|e| {
                CodecError::new(CodecStatus::Error, format!("zstd compress error: {}", e))
            })?;
        Ok(out)
    }

    fn decompress_block(&self, compressed: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        // Frames written by compress_block carry their content size; check it
        // against the declared chunk before reserving anything.
        match get_frame_content_size(compressed) {
            Ok(Some(size)) if size != capacity as u64 => {
                return Err(CodecError::new(
                    CodecStatus::LengthMismatch,
                    format!("zstd frame holds {} bytes, chunk declares {}", size, capacity),
                ));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(CodecError::new(
                    CodecStatus::Error,
                    format!("zstd frame header: {}", e),
                ));
            }
        }
        // Writes into the spare capacity only, so a frame larger than the
        // declared chunk fails instead of growing the buffer.
        let mut out = output_buffer(capacity)?;
        Decompressor::new()
            .and_then(|mut d| d.decompress_to_buffer(compressed, &mut out))
            .map_err(|e| {
                CodecError::new(CodecStatus::Error, format!("zstd decompress error: {}", e))
            })?;
        Ok(out)
    }
}
