mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use plzo_core::{Codec, CodecError, CodecStatus};
use std::sync::Arc;

/// Names accepted by [`codec_by_name`].
pub const CODEC_NAMES: &[&str] = &["passthrough", "lz4", "zstd"];

/// Resolve a codec from its CLI name.
///
/// The container does not record which codec produced it, so the same name
/// must be supplied when compressing and when decompressing.
pub fn codec_by_name(name: &str, zstd_level: i32) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        "zstd" | "z" => Ok(Arc::new(ZstdCodec::new(zstd_level))),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            other,
            CODEC_NAMES.join(", ")
        ),
    }
}

/// Reserve exactly `capacity` bytes for a codec's output buffer.
///
/// Decompression capacities come from the container header, so a corrupt or
/// hostile header must turn into a chunk failure rather than an abort.
pub(crate) fn output_buffer(capacity: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    out.try_reserve_exact(capacity).map_err(|e| {
        CodecError::new(
            CodecStatus::OutputOverrun,
            format!("cannot allocate {} bytes of output: {}", capacity, e),
        )
    })?;
    Ok(out)
}
