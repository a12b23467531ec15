use crate::types::{DataType, Offset, Rank};
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SharedFpError>;

#[derive(Debug, thiserror::Error)]
pub enum SharedFpError {
    #[error("failed to open shared file pointer for {}: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },

    #[error("out of resources on rank {rank}: {reason}")]
    OutOfResources { rank: Rank, reason: String },

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("write of {bytes} bytes at offset {offset} failed: {reason}")]
    WriteFailed {
        offset: Offset,
        bytes: usize,
        reason: String,
    },

    #[error("split collective protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("shared file pointer is open but its offset tracker is missing")]
    MissingState,

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("byte count overflow: {count} elements of {dtype}")]
    ByteCountOverflow { count: usize, dtype: DataType },

    #[error("offset overflow: rank {rank} cannot advance offset {base} by {requested} bytes")]
    OffsetOverflow {
        rank: Rank,
        base: Offset,
        requested: Offset,
    },

    #[error("invalid byte request {requested} from rank {rank}")]
    InvalidRequest { rank: Rank, requested: Offset },

    #[error("offset allocation aborted by rank {root}: {reason}")]
    AllocationAborted { root: Rank, reason: String },

    #[error("rank {rank} not found in communicator")]
    UnknownPeer { rank: Rank },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("message decode failed: {0}")]
    DecodeFailed(String),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O engine for {} is shut down", path.display())]
    EngineClosed { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharedFpError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap any error raised while posting or completing a write.
    pub fn write_failed(offset: Offset, bytes: usize, reason: impl ToString) -> Self {
        Self::WriteFailed {
            offset,
            bytes,
            reason: reason.to_string(),
        }
    }

    /// True for errors that leave the communicator out of lockstep.
    ///
    /// After such an error the ranks may disagree on how many collective
    /// calls were issued, so the group should not be reused.
    pub fn is_collective(&self) -> bool {
        matches!(
            self,
            Self::CollectiveFailed { .. } | Self::PeerDisconnected { .. }
        )
    }
}
