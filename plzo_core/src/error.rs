use thiserror::Error;

use crate::pool::ChunkFailureReport;

/// Errors produced by planning, dispatching, and (de)serializing a PLZO run.
///
/// Configuration and format errors are fatal and returned as soon as they are
/// detected. Chunk codec failures are only reported once every dispatched
/// chunk has finished, bundled into a single [`ChunkFailureReport`].
#[derive(Debug, Error)]
pub enum PlzoError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{0}")]
    ChunkCodec(ChunkFailureReport),
    #[error("container format error: {0}")]
    ContainerFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("run cancelled before every chunk was processed")]
    Cancelled,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PlzoError>,
    },
}

impl PlzoError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any [`PlzoError::Context`] layers.
    pub fn root(&self) -> &PlzoError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// The aggregated chunk failures, if this run failed at the chunk level.
    pub fn chunk_failures(&self) -> Option<&ChunkFailureReport> {
        match self.root() {
            Self::ChunkCodec(report) => Some(report),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlzoError>;

pub(crate) fn invalid_config(msg: impl Into<String>) -> PlzoError {
    PlzoError::InvalidConfiguration(msg.into())
}

pub(crate) fn format_error(msg: impl Into<String>) -> PlzoError {
    PlzoError::ContainerFormat(msg.into())
}
