use std::fmt;

use thiserror::Error;

/// Worst-case compressed size for a block of `raw_len` bytes.
///
/// Every compress job is handed exactly this much output capacity. A codec
/// plugged into the pool must never need more than `n + n/16 + 64 + 3` bytes
/// for `n` bytes of input; a job whose output exceeds it is reported as
/// [`CodecStatus::OutputOverrun`].
pub const fn worst_case_compressed_len(raw_len: usize) -> usize {
    raw_len + raw_len / 16 + 64 + 3
}

/// Status code of a single block codec invocation.
///
/// Numeric codes follow the LZO convention (`0` is success, negative values
/// are failures) so reports line up with what block codecs traditionally
/// return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecStatus {
    Ok,
    /// Generic codec failure (corrupt input, internal error, panic).
    Error,
    /// The codec ran out of input before finishing a block.
    InputOverrun,
    /// The output did not fit the capacity granted to the job.
    OutputOverrun,
    /// Decompressed length differs from the length the container declared.
    LengthMismatch,
    /// The job was never started because the run was cancelled.
    Cancelled,
}

impl CodecStatus {
    pub fn code(self) -> i32 {
        match self {
            CodecStatus::Ok => 0,
            CodecStatus::Error => -1,
            CodecStatus::InputOverrun => -4,
            CodecStatus::OutputOverrun => -5,
            CodecStatus::LengthMismatch => -8,
            CodecStatus::Cancelled => -100,
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == CodecStatus::Ok
    }
}

impl fmt::Display for CodecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecStatus::Ok => "ok",
            CodecStatus::Error => "error",
            CodecStatus::InputOverrun => "input overrun",
            CodecStatus::OutputOverrun => "output overrun",
            CodecStatus::LengthMismatch => "length mismatch",
            CodecStatus::Cancelled => "cancelled",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// A failed block codec call: a non-OK status plus a readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {detail}")]
pub struct CodecError {
    pub status: CodecStatus,
    pub detail: String,
}

impl CodecError {
    pub fn new(status: CodecStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

/// Single-block compression capability used by the worker pool.
///
/// Each `Codec` implementation:
/// - Compresses and decompresses one block at a time with no state carried
///   between blocks. Chunks are dispatched to different workers concurrently,
///   so a call may only touch its own input and the buffer it returns.
/// - Receives the output capacity granted to the job. For compression that is
///   [`worst_case_compressed_len`] of the input; for decompression it is the
///   uncompressed chunk length declared by the container.
/// - Holds only read-only configuration. The same instance is shared by every
///   worker for the duration of a run.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Compress a single independent block into at most `capacity` bytes.
    fn compress_block(&self, raw: &[u8], capacity: usize) -> Result<Vec<u8>, CodecError>;

    /// Decompress a single independent block of at most `capacity` raw bytes.
    fn decompress_block(&self, compressed: &[u8], capacity: usize)
        -> Result<Vec<u8>, CodecError>;
}

/// Which direction a batch of chunk jobs runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOp {
    Compress,
    Decompress,
}

impl CodecOp {
    /// Run `codec` on one chunk and enforce the capacity contract.
    ///
    /// Compression may produce anything up to `capacity` bytes; decompression
    /// must produce exactly `capacity` bytes, the chunk length the container
    /// declared for it.
    pub fn apply(
        self,
        codec: &dyn Codec,
        input: &[u8],
        capacity: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let out = match self {
            CodecOp::Compress => codec.compress_block(input, capacity)?,
            CodecOp::Decompress => codec.decompress_block(input, capacity)?,
        };
        match self {
            CodecOp::Compress if out.len() > capacity => Err(CodecError::new(
                CodecStatus::OutputOverrun,
                format!(
                    "{} produced {} bytes, capacity is {}",
                    codec.name(),
                    out.len(),
                    capacity
                ),
            )),
            CodecOp::Decompress if out.len() != capacity => Err(CodecError::new(
                CodecStatus::LengthMismatch,
                format!("decompressed {} bytes, container declares {}", out.len(), capacity),
            )),
            _ => Ok(out),
        }
    }
}

impl fmt::Display for CodecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecOp::Compress => f.write_str("compress"),
            CodecOp::Decompress => f.write_str("decompress"),
        }
    }
}
