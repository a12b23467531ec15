use crate::comm::Communicator;
use crate::config::SharedFpConfig;
use crate::error::{Result, SharedFpError};
use crate::io::{IoRequest, IoStatus};
use crate::sharedfp::allocation::{GlobalOffset, negotiate};
use crate::sharedfp::metadata::{Collaborator, MergeCollaborator};
use crate::sharedfp::split::SplitCollective;
use crate::sharedfp::state::SharedFileState;
use crate::types::{AccessMode, DataType, Info, Offset, OperationKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file handle with an individual shared file pointer.
///
/// Shared state is opened on the first write. Ordered writes and
/// [`close`](Self::close) are collective over the handle's communicator.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> sharedfp::Result<()> {
/// use sharedfp::{AccessMode, Communicator, DataType, Info, SharedFile, SharedFpConfig};
/// use std::sync::Arc;
///
/// let config = SharedFpConfig::from_env();
/// let comm = Communicator::bootstrap_local(1, &config)?.remove(0);
/// let mut file = SharedFile::new(
///     Arc::new(comm),
///     "/tmp/out.log",
///     AccessMode::WRONLY | AccessMode::CREATE,
///     Info::new(),
///     config,
/// );
/// file.write_ordered_begin(b"hello", 5, DataType::Byte).await?;
/// let status = file.write_ordered_end().await?;
/// assert_eq!(status.bytes, 5);
/// file.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SharedFile {
    comm: Arc<Communicator>,
    path: PathBuf,
    mode: AccessMode,
    info: Info,
    config: SharedFpConfig,
    collaborator: Box<dyn Collaborator>,
    state: Option<SharedFileState>,
    split: SplitCollective,
}

impl std::fmt::Debug for SharedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFile")
            .field("rank", &self.comm.rank())
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("split", &self.split)
            .finish_non_exhaustive()
    }
}

impl SharedFile {
    pub fn new(
        comm: Arc<Communicator>,
        path: impl Into<PathBuf>,
        mode: AccessMode,
        info: Info,
        config: SharedFpConfig,
    ) -> Self {
        Self {
            comm,
            path: path.into(),
            mode,
            info,
            config,
            collaborator: Box::new(MergeCollaborator),
            state: None,
            split: SplitCollective::new(),
        }
    }

    /// Replace the default [`MergeCollaborator`].
    pub fn with_collaborator(mut self, collaborator: impl Collaborator + 'static) -> Self {
        self.collaborator = Box::new(collaborator);
        self
    }

    pub fn comm(&self) -> &Communicator {
        &self.comm
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// This rank's replica of the global offset, once open.
    pub fn global_offset(&self) -> Option<Offset> {
        self.state.as_ref().map(SharedFileState::global_offset)
    }

    /// Append cursor of this rank's private data file, once open.
    pub fn data_file_offset(&self) -> Option<Offset> {
        let tracker = self.state.as_ref()?.tracker().ok()?;
        Some(tracker.data_file_offset())
    }

    /// Records waiting for the next merge.
    pub fn pending_records(&self) -> usize {
        self.state
            .as_ref()
            .and_then(|s| s.tracker().ok())
            .map_or(0, |t| t.queue().len())
    }

    pub fn split_in_use(&self) -> bool {
        self.split.in_use()
    }

    /// Post a write of `count` elements at this rank's private append
    /// cursor and advance the cursor right away.
    ///
    /// The offset is local to this rank; nothing is coordinated with the
    /// other ranks until the next merge.
    pub async fn iwrite_shared(
        &mut self,
        buf: &[u8],
        count: usize,
        dtype: DataType,
    ) -> Result<IoRequest> {
        self.ensure_open().await?;
        let bytes = request_bytes(buf, count, dtype)?;
        let len = bytes as Offset;

        let rank = self.comm.rank();
        let Self {
            state,
            collaborator,
            ..
        } = self;
        let state = opened(state)?;
        // Nothing is queued for a write that cannot be posted.
        state.tracker()?.room_for(len)?;

        if let Err(e) = collaborator.enqueue(OperationKind::Write, len, state) {
            tracing::warn!(rank, bytes, error = %e, "failed to queue write metadata");
        }

        let tracker = state.tracker_mut()?;
        let offset = tracker.advance(len)?;
        let request = tracker
            .data_file()
            .write_at_nb(offset, buf[..bytes].to_vec())
            .await?;
        tracing::trace!(rank, offset, bytes, "individual write posted");
        Ok(request)
    }

    /// [`iwrite_shared`](Self::iwrite_shared) and wait for it.
    pub async fn write_shared(
        &mut self,
        buf: &[u8],
        count: usize,
        dtype: DataType,
    ) -> Result<IoStatus> {
        self.iwrite_shared(buf, count, dtype).await?.wait().await
    }

    /// Start an ordered write. Collective.
    ///
    /// Merges queued metadata, allocates this rank's range behind every
    /// lower rank's, and posts the write into the shared file. Returns
    /// once the write is posted; [`write_ordered_end`](Self::write_ordered_end)
    /// waits for it.
    pub async fn write_ordered_begin(
        &mut self,
        buf: &[u8],
        count: usize,
        dtype: DataType,
    ) -> Result<()> {
        self.split.check_idle()?;
        if let Err(e) = self.ensure_open().await {
            self.abstain().await;
            let _ = negotiate(
                &self.comm,
                &mut GlobalOffset::default(),
                Err(SharedFpError::MissingState),
            )
            .await;
            return Err(e);
        }
        let bytes = request_bytes(buf, count, dtype);

        let Self {
            state,
            collaborator,
            split,
            ..
        } = self;
        let state = opened(state)?;

        // Blocking phase: both exchanges run on every rank, and a rank whose
        // request is unusable reports that through them.
        let local = match collaborator.collaborate(state).await {
            Ok(()) => bytes.map(|b| b as Offset),
            Err(e) => Err(e),
        };
        let alloc = state.allocate(local).await?;

        let data = buf[..alloc.len as usize].to_vec();
        let request = state
            .shared_file()
            .write_at_all_nb(state.comm(), alloc.offset, data)
            .await?;
        split.begin(request)?;
        tracing::debug!(
            rank = state.comm().rank(),
            offset = alloc.offset,
            bytes = alloc.len,
            "ordered write posted"
        );
        Ok(())
    }

    /// Wait for the write posted by the matching begin.
    ///
    /// The handle is free for a new split operation afterwards, even when
    /// the write failed.
    pub async fn write_ordered_end(&mut self) -> Result<IoStatus> {
        let outcome = self.split.end().await;
        if let Err(e) = &outcome
            && !matches!(e, SharedFpError::ProtocolViolation(_))
        {
            tracing::error!(rank = self.comm.rank(), error = %e, "ordered write failed");
        }
        outcome
    }

    /// Begin and end an ordered write. Collective.
    pub async fn write_ordered(
        &mut self,
        buf: &[u8],
        count: usize,
        dtype: DataType,
    ) -> Result<IoStatus> {
        self.write_ordered_begin(buf, count, dtype).await?;
        self.write_ordered_end().await
    }

    /// Finish the handle. Collective.
    ///
    /// Waits for an outstanding split operation, merges the remaining
    /// metadata into the shared file and removes this rank's data file
    /// unless the config keeps it. Ranks that never wrote open their state
    /// here so that every rank joins the merge.
    pub async fn close(mut self) -> Result<()> {
        let rank = self.comm.rank();
        let mut outcome = Ok(());
        if self.split.in_use() {
            tracing::warn!(rank, "closing with a split collective write outstanding");
            if let Err(e) = self.split.end().await {
                outcome = Err(e);
            }
        }

        if let Err(e) = self.ensure_open().await {
            self.abstain().await;
            return Err(e);
        }
        let Self {
            state,
            collaborator,
            config,
            ..
        } = self;
        let mut state = state.ok_or(SharedFpError::MissingState)?;
        let merged = collaborator.collaborate(&mut state).await;
        let closed = state.close(config.keep_datafiles).await;
        tracing::debug!(rank, "shared file pointer closed");
        outcome.and(merged).and(closed)
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if self.state.is_none() {
            let state = SharedFileState::open(
                Arc::clone(&self.comm),
                &self.path,
                self.mode,
                &self.info,
                &self.config,
            )
            .await
            .inspect_err(|e| {
                tracing::error!(rank = self.comm.rank(), error = %e, "lazy open failed");
            })?;
            self.state = Some(state);
        }
        Ok(())
    }

    /// Join the merge round of a collective call this rank cannot serve.
    async fn abstain(&self) {
        if let Err(e) = self.collaborator.abstain(&self.comm).await {
            tracing::debug!(rank = self.comm.rank(), error = %e, "left merge round");
        }
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> Option<&mut SharedFileState> {
        self.state.as_mut()
    }
}

fn opened(state: &mut Option<SharedFileState>) -> Result<&mut SharedFileState> {
    state.as_mut().ok_or(SharedFpError::MissingState)
}

/// Bytes covered by `count` elements of `dtype`, checked against `buf`.
fn request_bytes(buf: &[u8], count: usize, dtype: DataType) -> Result<usize> {
    let bytes = count
        .checked_mul(dtype.size_in_bytes())
        .filter(|&b| Offset::try_from(b).is_ok())
        .ok_or(SharedFpError::ByteCountOverflow { count, dtype })?;
    if buf.len() < bytes {
        return Err(SharedFpError::BufferSizeMismatch {
            expected: bytes,
            actual: buf.len(),
        });
    }
    Ok(bytes)
}
