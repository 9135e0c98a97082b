use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::{worst_case_compressed_len, Codec, CodecOp};
use crate::config::EngineConfig;
use crate::error::{format_error, PlzoError, Result};
use crate::plan::{plan, ChunkPlan};
use crate::pool::{CancelToken, ChunkBatch, ChunkJob, ChunkResult, WorkerPool};
use crate::reader;
use crate::writer::{encoded_len, write_container};

/// Where an [`ArchiveEngine`] run currently stands.
///
/// A run walks `Idle -> Planning -> ChunkingInput -> Dispatching ->
/// Collecting -> Serializing -> Done`. Any error after leaving `Idle` ends the
/// run in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Planning,
    ChunkingInput,
    Dispatching,
    Collecting,
    Serializing,
    Done,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sizes and timing of one finished run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub input_len: u64,
    /// For compression this is the whole container: header, size table and
    /// payloads.
    pub output_len: u64,
    pub worker_count: usize,
    pub elapsed: Duration,
}

impl RunStats {
    /// Output length over input length.
    pub fn ratio(&self) -> f64 {
        if self.input_len == 0 {
            return 1.0;
        }
        self.output_len as f64 / self.input_len as f64
    }
}

/// An in-memory container produced by [`ArchiveEngine::compress`].
#[derive(Debug, Clone)]
pub struct CompressedArchive {
    pub bytes: Vec<u8>,
    pub plan: ChunkPlan,
    pub stats: RunStats,
}

/// Raw bytes recovered by [`ArchiveEngine::decompress`].
#[derive(Debug, Clone)]
pub struct DecompressedOutput {
    pub bytes: Vec<u8>,
    pub plan: ChunkPlan,
    pub stats: RunStats,
}

/// Orchestrates planning, parallel chunk coding, and container (de)serialization.
///
/// Compression cuts the input into `config.workers` chunks, codes them all at
/// once on a [`WorkerPool`], and writes the container. Decompression reads the
/// worker count, nominal chunk size, and remainder back from the container and
/// reverses the process; the configured worker count plays no part there.
///
/// The engine is reusable. Every call starts a fresh run from `Idle`.
pub struct ArchiveEngine {
    config: EngineConfig,
    codec: Arc<dyn Codec>,
    state: EngineState,
    transitions: Vec<EngineState>,
    cancel: CancelToken,
}

impl ArchiveEngine {
    pub fn new(config: EngineConfig, codec: Arc<dyn Codec>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            codec,
            state: EngineState::Idle,
            transitions: vec![EngineState::Idle],
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// States visited by the most recent run, starting with `Idle`.
    pub fn transitions(&self) -> &[EngineState] {
        &self.transitions
    }

    /// Token that abandons chunk jobs which have not started yet.
    ///
    /// A cancelled run ends in `Failed` with [`PlzoError::Cancelled`]. The
    /// token is cleared whenever a run ends, so a cancel that lands after the
    /// last check of a successful run does not leak into the next one.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ── Compress path ──────────────────────────────────────────────────────

    /// Compress `input` into an in-memory container.
    pub fn compress(&mut self, input: &[u8]) -> Result<CompressedArchive> {
        self.run(|engine| {
            let t0 = Instant::now();
            let plan = engine.plan_chunks(input.len() as u64)?;
            let results = engine.compress_chunks(&plan, input)?;

            engine.transition(EngineState::Serializing);
            let bytes = crate::writer::encode(&plan, &results)?;

            let stats = RunStats {
                input_len: input.len() as u64,
                output_len: bytes.len() as u64,
                worker_count: plan.worker_count(),
                elapsed: t0.elapsed(),
            };
            Ok(CompressedArchive { bytes, plan, stats })
        })
    }

    /// Compress the file at `input` into a container file at `output`.
    pub fn compress_file(&mut self, input: &Path, output: &Path) -> Result<RunStats> {
        self.run(|engine| {
            let t0 = Instant::now();
            let reading = || format!("reading {}", input.display());
            engine.transition(EngineState::Planning);
            let input_len = fs::metadata(input)
                .map_err(|e| PlzoError::from(e).with_context(reading()))?
                .len();
            let plan = engine.plan_chunks(input_len)?;

            engine.transition(EngineState::ChunkingInput);
            let data = fs::read(input).map_err(|e| PlzoError::from(e).with_context(reading()))?;
            if data.len() as u64 != input_len {
                let changed = std::io::Error::other(format!(
                    "file changed size while reading: planned {} bytes, read {}",
                    input_len,
                    data.len()
                ));
                return Err(PlzoError::from(changed).with_context(reading()));
            }
            let results = engine.compress_chunks(&plan, &data)?;

            engine.transition(EngineState::Serializing);
            let payloads: Vec<&[u8]> = results.iter().map(|r| r.output.as_slice()).collect();
            let written = write_file(output, |dst| write_container(dst, &plan, &payloads))?;
            debug_assert_eq!(
                written,
                encoded_len(&plan, payloads.iter().map(|p| p.len() as u64))
            );

            Ok(RunStats {
                input_len: data.len() as u64,
                output_len: written,
                worker_count: plan.worker_count(),
                elapsed: t0.elapsed(),
            })
        })
    }

    fn plan_chunks(&mut self, input_len: u64) -> Result<ChunkPlan> {
        self.transition(EngineState::Planning);
        plan(input_len, self.config.workers)
    }

    /// ChunkingInput through Collecting for the compress direction.
    fn compress_chunks(&mut self, plan: &ChunkPlan, input: &[u8]) -> Result<Vec<ChunkResult>> {
        self.transition(EngineState::ChunkingInput);
        let jobs: Vec<ChunkJob<'_>> = plan
            .split(input)?
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| ChunkJob {
                index,
                input: chunk,
                capacity: worst_case_compressed_len(chunk.len()),
            })
            .collect();

        let batch = self.dispatch(&jobs, CodecOp::Compress)?;
        self.collect(batch)
    }

    // ── Decompress path ────────────────────────────────────────────────────

    /// Decompress an in-memory container back into the original bytes.
    pub fn decompress(&mut self, container: &[u8]) -> Result<DecompressedOutput> {
        self.run(|engine| {
            let t0 = Instant::now();
            let (plan, bytes) = engine.decompress_chunks(container)?;
            let stats = RunStats {
                input_len: container.len() as u64,
                output_len: bytes.len() as u64,
                worker_count: plan.worker_count(),
                elapsed: t0.elapsed(),
            };
            Ok(DecompressedOutput { bytes, plan, stats })
        })
    }

    /// Decompress the container file at `input` into `output`.
    pub fn decompress_file(&mut self, input: &Path, output: &Path) -> Result<RunStats> {
        self.run(|engine| {
            let t0 = Instant::now();
            engine.transition(EngineState::Planning);
            let container = fs::read(input).map_err(|e| {
                PlzoError::from(e).with_context(format!("reading {}", input.display()))
            })?;
            let (plan, bytes) = engine.decompress_chunks(&container)?;
            write_file(output, |dst| {
                dst.write_all(&bytes)?;
                Ok(bytes.len() as u64)
            })?;
            Ok(RunStats {
                input_len: container.len() as u64,
                output_len: bytes.len() as u64,
                worker_count: plan.worker_count(),
                elapsed: t0.elapsed(),
            })
        })
    }

    /// Planning through Serializing for the decompress direction. Returns the
    /// plan recorded in the container and the reassembled raw bytes.
    fn decompress_chunks(&mut self, container: &[u8]) -> Result<(ChunkPlan, Vec<u8>)> {
        self.transition(EngineState::Planning);
        let view = reader::decode(container)?;
        let plan = *view.plan();
        tracing::debug!(
            raw_bytes = view.raw_size(),
            payload_bytes = view.compressed_size(),
            ratio = view.ratio(),
            "decompressing container"
        );

        self.transition(EngineState::ChunkingInput);
        let jobs = view
            .payloads()
            .iter()
            .copied()
            .enumerate()
            .map(|(index, payload)| {
                let capacity = usize::try_from(plan.chunk_len(index)).map_err(|_| {
                    format_error(format!(
                        "chunk {} declares {} raw bytes, too large for this platform",
                        index,
                        plan.chunk_len(index)
                    ))
                })?;
                Ok(ChunkJob {
                    index,
                    input: payload,
                    capacity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let batch = self.dispatch(&jobs, CodecOp::Decompress)?;
        let results = self.collect(batch)?;

        self.transition(EngineState::Serializing);
        let total: usize = results.iter().map(ChunkResult::output_len).sum();
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(total).map_err(|e| {
            PlzoError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                format!("cannot allocate {} bytes of output: {}", total, e),
            ))
        })?;
        for result in results {
            bytes.extend_from_slice(&result.output);
        }
        Ok((plan, bytes))
    }

    // ── Shared steps ───────────────────────────────────────────────────────

    fn dispatch(&mut self, jobs: &[ChunkJob<'_>], op: CodecOp) -> Result<ChunkBatch> {
        self.transition(EngineState::Dispatching);
        if self.cancel.is_cancelled() {
            return Err(PlzoError::Cancelled);
        }
        let pool =
            WorkerPool::new(jobs.len(), self.config.backend)?.with_cancel(self.cancel.clone());
        pool.run(jobs, op, self.codec.as_ref())
    }

    /// Past the barrier: surface cancellation and aggregated chunk failures.
    fn collect(&mut self, batch: ChunkBatch) -> Result<Vec<ChunkResult>> {
        self.transition(EngineState::Collecting);
        if self.cancel.is_cancelled() || batch.was_cancelled() {
            return Err(PlzoError::Cancelled);
        }
        batch.into_results().map_err(PlzoError::ChunkCodec)
    }

    fn run<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.state = EngineState::Idle;
        self.transitions.clear();
        self.transitions.push(EngineState::Idle);

        let result = body(self);
        match &result {
            Ok(_) => {
                self.transition(EngineState::Done);
                tracing::info!(codec = self.codec.name(), "run finished");
            }
            Err(err) => {
                self.transition(EngineState::Failed);
                let failed_in = self.transitions.iter().rev().nth(1);
                tracing::warn!(state = ?failed_in, error = %err, "run failed");
            }
        }
        if self.cancel.is_cancelled() {
            tracing::debug!(state = %self.state, "clearing cancel token after run");
            self.cancel.reset();
        }
        result
    }

    fn transition(&mut self, next: EngineState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "engine state");
        self.state = next;
        self.transitions.push(next);
    }
}

/// Create `path`, hand a buffered writer to `body`, and flush it.
fn write_file(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> Result<u64>,
) -> Result<u64> {
    let wrap =
        |e: std::io::Error| PlzoError::from(e).with_context(format!("writing {}", path.display()));
    let file = File::create(path).map_err(wrap)?;
    let mut dst = BufWriter::new(file);
    let written = body(&mut dst).map_err(|e| match e {
        PlzoError::Io(io) => wrap(io),
        other => other,
    })?;
    dst.flush().map_err(wrap)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, CodecStatus};
    use crate::pool::Backend;

    struct CopyCodec;

    impl Codec for CopyCodec {
        fn name(&self) -> &'static str {
            "copy"
        }

        fn compress_block(
            &self,
            raw: &[u8],
            _capacity: usize,
        ) -> std::result::Result<Vec<u8>, CodecError> {
            Ok(raw.to_vec())
        }

        fn decompress_block(
            &self,
            compressed: &[u8],
            capacity: usize,
        ) -> std::result::Result<Vec<u8>, CodecError> {
            if compressed.len() != capacity {
                return Err(CodecError::new(CodecStatus::LengthMismatch, "copy"));
            }
            Ok(compressed.to_vec())
        }
    }

    fn engine(workers: usize) -> ArchiveEngine {
        ArchiveEngine::new(EngineConfig::new(workers, Backend::Threads), Arc::new(CopyCodec))
            .unwrap()
    }

    #[test]
    fn test_cancel_after_collecting_does_not_leak_into_next_run() {
        let mut e = engine(4);
        let token = e.cancel_token();
        // Cancel arrives while the run is past its last cancellation check.
        let out = e
            .run(|engine| {
                engine.transition(EngineState::Serializing);
                token.cancel();
                Ok(())
            })
            .map(|_| e.state());
        assert_eq!(out.unwrap(), EngineState::Done);
        assert!(!token.is_cancelled());

        let archive = e.compress(b"0123456789abcdef").unwrap();
        assert_eq!(e.decompress(&archive.bytes).unwrap().bytes, b"0123456789abcdef");
    }

    #[test]
    fn test_file_run_reads_input_while_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("geo");
        let output = dir.path().join("geo.plzo");
        std::fs::write(&input, vec![42u8; 1000]).unwrap();

        let mut e = engine(8);
        let stats = e.compress_file(&input, &output).unwrap();
        assert_eq!(stats.input_len, 1000);
        assert_eq!(
            e.transitions(),
            &[
                EngineState::Idle,
                EngineState::Planning,
                EngineState::ChunkingInput,
                EngineState::Dispatching,
                EngineState::Collecting,
                EngineState::Serializing,
                EngineState::Done,
            ]
        );
    }

    #[test]
    fn test_file_too_small_for_workers_fails_in_planning() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tiny");
        std::fs::write(&input, b"abc").unwrap();

        let mut e = engine(8);
        let err = e.compress_file(&input, &dir.path().join("tiny.plzo")).unwrap_err();
        assert!(matches!(err, PlzoError::InvalidConfiguration(_)), "{err}");
        assert_eq!(
            e.transitions(),
            &[EngineState::Idle, EngineState::Planning, EngineState::Failed]
        );
    }
}
