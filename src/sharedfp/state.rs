use crate::comm::Communicator;
use crate::config::SharedFpConfig;
use crate::error::{Result, SharedFpError};
use crate::io::IoFile;
use crate::sharedfp::allocation::{Allocation, GlobalOffset, negotiate};
use crate::sharedfp::metadata::MetadataQueue;
use crate::types::{AccessMode, Info, Offset, Rank};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-rank bookkeeping: the private data file and its append cursor.
#[derive(Debug)]
pub struct OffsetTracker {
    rank: Rank,
    data_file: IoFile,
    data_file_path: PathBuf,
    data_file_offset: Offset,
    pub(crate) queue: MetadataQueue,
}

impl OffsetTracker {
    pub fn data_file(&self) -> &IoFile {
        &self.data_file
    }

    pub fn data_file_path(&self) -> &Path {
        &self.data_file_path
    }

    /// Next free position in the private data file.
    pub fn data_file_offset(&self) -> Offset {
        self.data_file_offset
    }

    pub fn queue(&self) -> &MetadataQueue {
        &self.queue
    }

    /// Bytes queued for the next merge.
    pub fn pending_write_bytes(&self) -> Result<Offset> {
        self.queue
            .pending_write_bytes()
            .ok_or(SharedFpError::OffsetOverflow {
                rank: self.rank,
                base: 0,
                requested: Offset::MAX,
            })
    }

    /// Cursor position after `bytes` more, without moving the cursor.
    pub fn room_for(&self, bytes: Offset) -> Result<Offset> {
        self.data_file_offset
            .checked_add(bytes)
            .ok_or(SharedFpError::OffsetOverflow {
                rank: self.rank,
                base: self.data_file_offset,
                requested: bytes,
            })
    }

    /// Move the append cursor past `bytes` and return where it was.
    ///
    /// Called when a write is posted, not when it completes. The data
    /// file's worker applies writes in submission order, so later posts
    /// never land before earlier ones.
    pub(crate) fn advance(&mut self, bytes: Offset) -> Result<Offset> {
        let at = self.data_file_offset;
        self.data_file_offset = self.room_for(bytes)?;
        Ok(at)
    }

    #[cfg(test)]
    pub(crate) fn set_data_file_offset(&mut self, at: Offset) {
        self.data_file_offset = at;
    }
}

/// State behind one open shared file pointer on this rank.
#[derive(Debug)]
pub struct SharedFileState {
    comm: Arc<Communicator>,
    global_offset: GlobalOffset,
    shared_file: IoFile,
    tracker: Option<OffsetTracker>,
}

impl SharedFileState {
    /// Open the shared file and this rank's private data file.
    ///
    /// The data file is `<name><suffix>.<rank>` next to the shared file, or
    /// inside the directory named by the `sharedfp_datafile_dir` hint.
    pub async fn open(
        comm: Arc<Communicator>,
        path: &Path,
        mode: AccessMode,
        info: &Info,
        config: &SharedFpConfig,
    ) -> Result<Self> {
        let open_failed = |reason: String| SharedFpError::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };
        if !mode.is_writable() {
            return Err(open_failed("shared file pointer needs write access".into()));
        }

        let rank = comm.rank();
        let data_file_path = datafile_path(path, rank, info, config)
            .ok_or_else(|| open_failed("path has no file name".into()))?;

        // Every rank opens the same shared file, so exclusive creation
        // would fail everywhere but the first.
        let shared_file = IoFile::open(path, mode.without(AccessMode::EXCL), config.queue_depth)
            .await
            .map_err(|e| open_failed(e.to_string()))?;
        let data_file = match IoFile::open(
            &data_file_path,
            AccessMode::RDWR | AccessMode::CREATE,
            config.queue_depth,
        )
        .await
        {
            Ok(f) => f,
            Err(e) => {
                let _ = shared_file.close().await;
                return Err(open_failed(format!(
                    "data file {}: {e}",
                    data_file_path.display()
                )));
            }
        };

        tracing::debug!(
            rank,
            path = %path.display(),
            data_file = %data_file_path.display(),
            "shared file pointer opened"
        );

        Ok(Self {
            comm,
            global_offset: GlobalOffset::default(),
            shared_file,
            tracker: Some(OffsetTracker {
                rank,
                data_file,
                data_file_path,
                data_file_offset: 0,
                queue: MetadataQueue::new(),
            }),
        })
    }

    pub fn comm(&self) -> &Communicator {
        &self.comm
    }

    /// This rank's replica of the global offset.
    pub fn global_offset(&self) -> Offset {
        self.global_offset.get()
    }

    pub fn shared_file(&self) -> &IoFile {
        &self.shared_file
    }

    pub fn tracker(&self) -> Result<&OffsetTracker> {
        self.tracker.as_ref().ok_or(SharedFpError::MissingState)
    }

    pub fn tracker_mut(&mut self) -> Result<&mut OffsetTracker> {
        self.tracker.as_mut().ok_or(SharedFpError::MissingState)
    }

    /// Allocate a range of the shared file for `local` bytes. Collective.
    pub async fn allocate(&mut self, local: Result<Offset>) -> Result<Allocation> {
        negotiate(&self.comm, &mut self.global_offset, local).await
    }

    #[cfg(test)]
    pub(crate) fn detach_tracker(&mut self) -> Option<OffsetTracker> {
        self.tracker.take()
    }

    /// Drain both files. The data file is removed unless `keep_datafile`.
    pub async fn close(self, keep_datafile: bool) -> Result<()> {
        let shared = self.shared_file.close().await;
        if let Some(tracker) = self.tracker {
            tracker.data_file.close().await?;
            if !keep_datafile {
                tokio::fs::remove_file(&tracker.data_file_path).await?;
            }
        }
        shared
    }
}

fn datafile_path(path: &Path, rank: Rank, info: &Info, config: &SharedFpConfig) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    let file_name = format!("{name}{}.{rank}", config.datafile_suffix);
    let dir = match info.get(Info::DATAFILE_DIR) {
        Some(dir) => PathBuf::from(dir),
        None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Some(dir.join(file_name))
}
