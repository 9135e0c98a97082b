pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod plan;
pub mod pool;
pub mod reader;
pub mod writer;

pub use codec::{worst_case_compressed_len, Codec, CodecError, CodecOp, CodecStatus};
pub use config::EngineConfig;
pub use engine::{ArchiveEngine, CompressedArchive, DecompressedOutput, EngineState, RunStats};
pub use error::{PlzoError, Result};
pub use format::{ContainerHeader, DEFAULT_WORKERS, HEADER_SIZE, MAX_WORKERS};
pub use plan::{plan, ChunkPlan};
pub use pool::{
    Backend, CancelToken, ChunkBatch, ChunkFailure, ChunkFailureReport, ChunkJob, ChunkResult,
    WorkerPool,
};
pub use reader::{decode, read_header, ContainerView};
pub use writer::{encode, encoded_len, write_container};
