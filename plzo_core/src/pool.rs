use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use rayon::prelude::*;

use crate::codec::{Codec, CodecError, CodecOp, CodecStatus};
use crate::error::{invalid_config, PlzoError, Result};
use crate::format::MAX_WORKERS;

// ── Scheduling backend ─────────────────────────────────────────────────────

/// Concurrency backend behind [`WorkerPool`]. Both run one job per worker and
/// return identical results; only the threading machinery differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// One scoped OS thread per chunk.
    #[default]
    Threads,
    /// A dedicated rayon pool sized to the chunk count.
    Rayon,
}

impl FromStr for Backend {
    type Err = PlzoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "threads" | "thread" => Ok(Backend::Threads),
            "rayon" => Ok(Backend::Rayon),
            other => Err(invalid_config(format!(
                "unknown backend '{}'. Valid options: threads, rayon",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Threads => f.write_str("threads"),
            Backend::Rayon => f.write_str("rayon"),
        }
    }
}

// ── Cancellation ───────────────────────────────────────────────────────────

/// Shared flag that stops chunk jobs which have not started yet.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag so the owner can start a fresh run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Jobs and results ───────────────────────────────────────────────────────

/// One unit of work: a chunk's input and the output capacity granted to it.
#[derive(Debug, Clone, Copy)]
pub struct ChunkJob<'a> {
    pub index: usize,
    pub input: &'a [u8],
    pub capacity: usize,
}

/// Outcome of one chunk job, tagged with the index of the chunk it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub index: usize,
    /// Codec output; empty when the job failed.
    pub output: Vec<u8>,
    pub status: CodecStatus,
    pub detail: Option<String>,
}

impl ChunkResult {
    fn from_outcome(index: usize, outcome: std::result::Result<Vec<u8>, CodecError>) -> Self {
        match outcome {
            Ok(output) => Self {
                index,
                output,
                status: CodecStatus::Ok,
                detail: None,
            },
            Err(err) => Self {
                index,
                output: Vec::new(),
                status: err.status,
                detail: Some(err.detail),
            },
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Actual number of bytes the codec produced.
    #[inline]
    pub fn output_len(&self) -> usize {
        self.output.len()
    }
}

/// A chunk that reported a non-OK status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub index: usize,
    pub status: CodecStatus,
    pub detail: String,
}

/// Every failed chunk of a batch, plus the complete result set so the
/// outputs of the chunks that did succeed stay available to the caller.
#[derive(Debug, Clone)]
pub struct ChunkFailureReport {
    pub op: CodecOp,
    pub failures: Vec<ChunkFailure>,
    pub results: Vec<ChunkResult>,
}

impl ChunkFailureReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Output of chunk `index` if it succeeded.
    pub fn output(&self, index: usize) -> Option<&[u8]> {
        self.results
            .get(index)
            .filter(|r| r.is_ok())
            .map(|r| r.output.as_slice())
    }
}

impl fmt::Display for ChunkFailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} chunks failed to {}",
            self.failure_count(),
            self.total(),
            self.op
        )?;
        for failure in &self.failures {
            write!(
                f,
                "; chunk {}: {} {}",
                failure.index, failure.status, failure.detail
            )?;
        }
        Ok(())
    }
}

/// Results of one dispatched batch, ordered by chunk index.
#[derive(Debug, Clone)]
pub struct ChunkBatch {
    op: CodecOp,
    results: Vec<ChunkResult>,
}

impl ChunkBatch {
    pub fn results(&self) -> &[ChunkResult] {
        &self.results
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChunkResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(ChunkResult::is_ok)
    }

    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == CodecStatus::Cancelled)
    }

    /// Every result in index order, or the aggregated failure report.
    pub fn into_results(self) -> std::result::Result<Vec<ChunkResult>, ChunkFailureReport> {
        if self.is_success() {
            return Ok(self.results);
        }
        Err(self.into_report())
    }

    pub fn into_report(self) -> ChunkFailureReport {
        let failures = self
            .failures()
            .map(|r| ChunkFailure {
                index: r.index,
                status: r.status,
                detail: r.detail.clone().unwrap_or_default(),
            })
            .collect();
        ChunkFailureReport {
            op: self.op,
            failures,
            results: self.results,
        }
    }
}

// ── Pool ───────────────────────────────────────────────────────────────────

/// Runs one codec invocation per chunk, all chunks concurrently.
///
/// Parallelism is fixed to the chunk count: a pool built for `n` workers
/// accepts exactly `n` jobs per batch and runs each on its own worker. Every
/// job is submitted before any result is awaited, and the only wait is the
/// join on the whole batch. A failing chunk never stops its siblings; its
/// status is recorded on its [`ChunkResult`] and the batch carries on.
pub struct WorkerPool {
    workers: usize,
    backend: Backend,
    cancel: CancelToken,
}

impl WorkerPool {
    pub fn new(workers: usize, backend: Backend) -> Result<Self> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(invalid_config(format!(
                "worker pool needs 1..={} workers, got {}",
                MAX_WORKERS, workers
            )));
        }
        Ok(Self {
            workers,
            backend,
            cancel: CancelToken::new(),
        })
    }

    /// Share an externally owned cancellation token with this pool.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Dispatch every job, wait for all of them, and return results by index.
    ///
    /// `jobs[i].index` must equal `i`.
    pub fn run(&self, jobs: &[ChunkJob<'_>], op: CodecOp, codec: &dyn Codec) -> Result<ChunkBatch> {
        if jobs.len() != self.workers {
            return Err(invalid_config(format!(
                "pool has {} workers but was given {} chunk jobs",
                self.workers,
                jobs.len()
            )));
        }
        if let Some((pos, job)) = jobs.iter().enumerate().find(|(i, j)| j.index != *i) {
            return Err(invalid_config(format!(
                "chunk job at position {} carries index {}",
                pos, job.index
            )));
        }

        tracing::debug!(
            workers = self.workers,
            backend = %self.backend,
            %op,
            codec = codec.name(),
            "dispatching chunk jobs"
        );

        let results = match self.backend {
            Backend::Threads => self.run_threads(jobs, op, codec)?,
            Backend::Rayon => self.run_rayon(jobs, op, codec)?,
        };

        let batch = ChunkBatch { op, results };
        for failed in batch.failures() {
            tracing::warn!(
                chunk = failed.index,
                status = %failed.status,
                detail = failed.detail.as_deref().unwrap_or(""),
                "chunk {} failed",
                op
            );
        }
        Ok(batch)
    }

    fn run_threads(
        &self,
        jobs: &[ChunkJob<'_>],
        op: CodecOp,
        codec: &dyn Codec,
    ) -> Result<Vec<ChunkResult>> {
        let (tx, rx) = bounded::<ChunkResult>(jobs.len());

        thread::scope(|s| -> Result<()> {
            for job in jobs {
                let tx = tx.clone();
                let cancel = &self.cancel;
                thread::Builder::new()
                    .name(format!("plzo-{}-{}", op, job.index))
                    .spawn_scoped(s, move || {
                        // The receiver outlives the scope, so send cannot fail.
                        let _ = tx.send(run_job(job, op, codec, cancel));
                    })?;
            }
            Ok(())
        })?;
        drop(tx);

        let mut slots: Vec<Option<ChunkResult>> = vec![None; jobs.len()];
        for result in rx.iter() {
            let index = result.index;
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    PlzoError::Io(std::io::Error::other(format!(
                        "worker for chunk {} exited without a result",
                        index
                    )))
                })
            })
            .collect()
    }

    fn run_rayon(
        &self,
        jobs: &[ChunkJob<'_>],
        op: CodecOp,
        codec: &dyn Codec,
    ) -> Result<Vec<ChunkResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(move |index| format!("plzo-{}-{}", op, index))
            .build()
            .map_err(|err| {
                PlzoError::Io(std::io::Error::other(format!(
                    "failed to build worker pool: {err}"
                )))
            })?;
        let cancel = &self.cancel;
        Ok(pool.install(|| {
            jobs.par_iter()
                .with_max_len(1)
                .map(|job| run_job(job, op, codec, cancel))
                .collect()
        }))
    }
}

/// Run one chunk job, converting codec errors and panics into a status.
fn run_job(
    job: &ChunkJob<'_>,
    op: CodecOp,
    codec: &dyn Codec,
    cancel: &CancelToken,
) -> ChunkResult {
    if cancel.is_cancelled() {
        return ChunkResult::from_outcome(
            job.index,
            Err(CodecError::new(CodecStatus::Cancelled, "run cancelled before chunk started")),
        );
    }
    let outcome = catch_unwind(AssertUnwindSafe(|| op.apply(codec, job.input, job.capacity)))
        .unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CodecError::new(
                CodecStatus::Error,
                format!("{} panicked: {}", codec.name(), msg),
            ))
        });
    let result = ChunkResult::from_outcome(job.index, outcome);
    tracing::debug!(
        chunk = job.index,
        input_len = job.input.len(),
        output_len = result.output_len(),
        status = %result.status,
        "chunk {} finished",
        op
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reverses bytes; refuses any block starting with 0xFF.
    struct ReverseCodec;

    impl Codec for ReverseCodec {
        fn name(&self) -> &'static str {
            "reverse"
        }

        fn compress_block(
            &self,
            raw: &[u8],
            _capacity: usize,
        ) -> std::result::Result<Vec<u8>, CodecError> {
            if raw.first() == Some(&0xFF) {
                return Err(CodecError::new(CodecStatus::Error, "poisoned block"));
            }
            Ok(raw.iter().rev().copied().collect())
        }

        fn decompress_block(
            &self,
            compressed: &[u8],
            _capacity: usize,
        ) -> std::result::Result<Vec<u8>, CodecError> {
            Ok(compressed.iter().rev().copied().collect())
        }
    }

    fn jobs_for(chunks: &[Vec<u8>]) -> Vec<ChunkJob<'_>> {
        chunks
            .iter()
            .enumerate()
            .map(|(index, c)| ChunkJob {
                index,
                input: c,
                capacity: crate::worst_case_compressed_len(c.len()),
            })
            .collect()
    }

    #[test]
    fn test_backends_agree() {
        let chunks: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 10 + i as usize]).collect();
        let jobs = jobs_for(&chunks);
        let a = WorkerPool::new(6, Backend::Threads)
            .unwrap()
            .run(&jobs, CodecOp::Compress, &ReverseCodec)
            .unwrap();
        let b = WorkerPool::new(6, Backend::Rayon)
            .unwrap()
            .run(&jobs, CodecOp::Compress, &ReverseCodec)
            .unwrap();
        assert_eq!(a.results(), b.results());
        assert!(a.results().iter().enumerate().all(|(i, r)| r.index == i));
    }

    #[test]
    fn test_one_failure_does_not_stop_siblings() {
        let mut chunks: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 8]).collect();
        chunks[2][0] = 0xFF;
        let jobs = jobs_for(&chunks);
        let batch = WorkerPool::new(4, Backend::Threads)
            .unwrap()
            .run(&jobs, CodecOp::Compress, &ReverseCodec)
            .unwrap();
        assert_eq!(batch.failure_count(), 1);
        let report = batch.into_report();
        assert_eq!(report.failed_indices(), vec![2]);
        assert!(report.output(0).is_some());
        assert!(report.output(2).is_none());
        assert!(report.to_string().starts_with("1 of 4 chunks failed"));
    }

    #[test]
    fn test_job_count_must_match_workers() {
        let chunks = vec![vec![1u8; 4]; 3];
        let jobs = jobs_for(&chunks);
        let err = WorkerPool::new(4, Backend::Threads)
            .unwrap()
            .run(&jobs, CodecOp::Compress, &ReverseCodec)
            .unwrap_err();
        assert!(matches!(err, PlzoError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_cancelled_jobs_never_start() {
        let chunks = vec![vec![1u8; 4]; 3];
        let jobs = jobs_for(&chunks);
        let token = CancelToken::new();
        token.cancel();
        let batch = WorkerPool::new(3, Backend::Rayon)
            .unwrap()
            .with_cancel(token)
            .run(&jobs, CodecOp::Compress, &ReverseCodec)
            .unwrap();
        assert!(batch.was_cancelled());
        assert_eq!(batch.failure_count(), 3);
    }

    #[test]
    fn test_decompress_length_must_match_declared() {
        let chunks = vec![vec![7u8; 5], vec![8u8; 5]];
        let jobs: Vec<ChunkJob<'_>> = chunks
            .iter()
            .enumerate()
            .map(|(index, c)| ChunkJob {
                index,
                input: c,
                capacity: if index == 0 { 5 } else { 6 },
            })
            .collect();
        let batch = WorkerPool::new(2, Backend::Threads)
            .unwrap()
            .run(&jobs, CodecOp::Decompress, &ReverseCodec)
            .unwrap();
        assert!(batch.results()[0].is_ok());
        assert_eq!(batch.results()[1].status, CodecStatus::LengthMismatch);
    }
}
