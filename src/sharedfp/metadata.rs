//! Pending-operation metadata and the collaborator that folds it into the
//! shared file.

use crate::comm::Communicator;
use crate::error::{Result, SharedFpError};
use crate::io::RequestGroup;
use crate::sharedfp::allocation::{GlobalOffset, negotiate};
use crate::sharedfp::state::SharedFileState;
use crate::types::{Offset, OperationKind};
use futures::future::BoxFuture;
use std::collections::VecDeque;

/// One operation recorded by the individual write/read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataRecord {
    pub kind: OperationKind,
    pub byte_length: Offset,
    /// Position of the bytes in this rank's private data file.
    pub local_offset: Offset,
}

/// FIFO of records awaiting a merge.
#[derive(Debug, Default)]
pub struct MetadataQueue {
    records: VecDeque<MetadataRecord>,
}

impl MetadataQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MetadataRecord) {
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Total bytes of the queued writes, `None` past `i64::MAX`.
    pub fn pending_write_bytes(&self) -> Option<Offset> {
        self.records
            .iter()
            .filter(|r| r.kind == OperationKind::Write)
            .try_fold(0 as Offset, |acc, r| acc.checked_add(r.byte_length))
    }
}

/// Records pending operations and merges them into the shared file.
///
/// `collaborate` is collective: every rank of the state's communicator
/// calls it at the same point in its call sequence.
pub trait Collaborator: Send + Sync {
    /// Queue a record for an operation about to be posted at the tracker's
    /// current data file offset.
    fn enqueue(
        &self,
        kind: OperationKind,
        byte_length: Offset,
        state: &mut SharedFileState,
    ) -> Result<()>;

    /// Fold every queued record into the shared file.
    fn collaborate<'a>(&'a self, state: &'a mut SharedFileState) -> BoxFuture<'a, Result<()>>;

    /// Take part in a `collaborate` round on a rank that has no state.
    ///
    /// The rank's peers see the round abort. Implementations that run
    /// other collectives in `collaborate` must mirror them here.
    fn abstain<'a>(&'a self, comm: &'a Communicator) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            negotiate(comm, &mut GlobalOffset::default(), Err(SharedFpError::MissingState))
                .await
                .map(drop)
        })
    }
}

/// Copies queued writes from the private data file into the shared file.
///
/// Each merge takes one rank-ordered range of the shared file for all of
/// this rank's queued bytes, then appends the records into it in the order
/// they were queued.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeCollaborator;

impl Collaborator for MergeCollaborator {
    fn enqueue(
        &self,
        kind: OperationKind,
        byte_length: Offset,
        state: &mut SharedFileState,
    ) -> Result<()> {
        let tracker = state.tracker_mut()?;
        let local_offset = tracker.data_file_offset();
        tracker.queue.push(MetadataRecord {
            kind,
            byte_length,
            local_offset,
        });
        Ok(())
    }

    fn collaborate<'a>(&'a self, state: &'a mut SharedFileState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // A rank that cannot size its backlog still joins the round.
            let local = state.tracker().and_then(|t| t.pending_write_bytes());
            let alloc = state.allocate(local).await?;

            // The range is committed on every rank from here on. Records
            // that fail to copy leave it unwritten and are not retried.
            let copied = copy_records(state, alloc.offset).await;
            let rank = state.comm().rank();
            let tracker = state.tracker_mut()?;
            let records = tracker.queue.len();
            tracker.queue.clear();

            if let Err(e) = copied {
                tracing::error!(
                    rank,
                    records,
                    offset = alloc.offset,
                    bytes = alloc.len,
                    error = %e,
                    "merge failed, queued records dropped"
                );
                return Err(e);
            }
            if records > 0 {
                tracing::debug!(
                    rank,
                    records,
                    offset = alloc.offset,
                    bytes = alloc.len,
                    "merged queued metadata into shared file"
                );
            }
            Ok(())
        })
    }
}

/// Copy queued writes from the data file to consecutive positions from `at`.
async fn copy_records(state: &SharedFileState, at: Offset) -> Result<()> {
    let rank = state.comm().rank();
    let tracker = state.tracker()?;
    let mut cursor = at;
    let mut group = RequestGroup::new();
    for record in tracker
        .queue
        .iter()
        .filter(|r| r.kind == OperationKind::Write && r.byte_length > 0)
    {
        let len = usize::try_from(record.byte_length).map_err(|_| {
            SharedFpError::InvalidRequest {
                rank,
                requested: record.byte_length,
            }
        })?;
        let data = tracker.data_file().read_at(record.local_offset, len).await?;
        group.push(state.shared_file().write_at_nb(cursor, data).await?);
        cursor += record.byte_length;
    }
    group.wait_all().await.map(drop)
}
