use plzo_core::{Codec, CodecError, CodecStatus};

use crate::output_buffer;

/// No-op codec: stores chunks verbatim, with no compression.
///
/// Useful for:
/// - Verifying the container round-trip independently of any codec.
/// - Data that is already compressed, where further compression would only
///   grow the archive.
pub struct PassThroughCodec;

impl PassThroughCodec {
    fn copy(&self, input: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        if input.len() > capacity {
            return Err(CodecError::new(
                CodecStatus::OutputOverrun,
                format!("{} bytes do not fit capacity {}", input.len(), capacity),
            ));
        }
        let mut out = output_buffer(input.len())?;
        out.extend_from_slice(input);
        Ok(out)
    }
}

impl Codec for PassThroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress_block(&self, raw: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        self.copy(raw, capacity)
    }

    fn decompress_block(&self, compressed: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError> {
        self.copy(compressed, capacity)
    }
}
