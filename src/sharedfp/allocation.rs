//! Offset allocation: turns per-rank byte requests into disjoint,
//! rank-ordered ranges of the shared file and advances the global offset.
//!
//! One round is four collectives, issued by every rank whatever its local
//! outcome:
//!
//! 1. broadcast of root's readiness verdict (scratch reservation),
//! 2. gather of one tagged request per rank,
//! 3. scatter of one tagged reply per rank,
//! 4. broadcast of the new global offset, only when every reply was an
//!    assignment.
//!
//! A failure on any rank is therefore seen by all ranks, and no rank is
//! left waiting inside a collective its peers skipped.

use crate::comm::Communicator;
use crate::error::{Result, SharedFpError};
use crate::types::{Offset, Rank};
use std::collections::TryReserveError;
use std::ops::Range;

/// Rank that gathers requests, plans the round and distributes the result.
pub const ALLOCATION_ROOT: Rank = 0;

/// `[tag u8][value i64 LE]`
const WIRE_LEN: usize = 9;

const READY: u8 = 0;
const NOT_READY: u8 = 1;

const TAG_OK: u8 = 0;
const TAG_REJECTED: u8 = 1;
const TAG_OVERFLOW: u8 = 2;

/// This rank's replica of the next unallocated shared-file position.
///
/// Only [`negotiate`] moves it, and only forward. After every successful
/// round all ranks of the communicator hold the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalOffset(Offset);

impl GlobalOffset {
    pub const fn starting_at(offset: Offset) -> Self {
        Self(offset)
    }

    pub const fn get(self) -> Offset {
        self.0
    }

    fn advance_to(&mut self, next: Offset) -> Result<()> {
        if next < self.0 {
            return Err(SharedFpError::DecodeFailed(format!(
                "global offset would move back from {} to {next}",
                self.0
            )));
        }
        self.0 = next;
        Ok(())
    }
}

/// Result of the rank-0 prefix sum for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Start offset per rank, indexed by rank.
    pub assigned: Vec<Offset>,
    /// Global offset after the round.
    pub next_global_offset: Offset,
}

/// Exclusive prefix sum of `requested` seeded by `global_offset`.
///
/// `assigned[i] = global_offset + sum(requested[..i])` and
/// `next_global_offset = global_offset + sum(requested)`. Negative requests
/// and sums past `i64::MAX` are rejected with the offending rank.
pub fn plan_allocation(global_offset: Offset, requested: &[Offset]) -> Result<AllocationPlan> {
    let mut assigned = Vec::with_capacity(requested.len());
    let mut cursor = global_offset;
    for (rank, &bytes) in requested.iter().enumerate() {
        let rank = rank as Rank;
        if bytes < 0 {
            return Err(SharedFpError::InvalidRequest {
                rank,
                requested: bytes,
            });
        }
        assigned.push(cursor);
        cursor = cursor
            .checked_add(bytes)
            .ok_or(SharedFpError::OffsetOverflow {
                rank,
                base: cursor,
                requested: bytes,
            })?;
    }
    Ok(AllocationPlan {
        assigned,
        next_global_offset: cursor,
    })
}

/// This rank's share of one allocation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// First byte of the range assigned to this rank.
    pub offset: Offset,
    /// Bytes this rank requested.
    pub len: Offset,
    /// Global offset after the round, identical on every rank.
    pub next_global_offset: Offset,
}

impl Allocation {
    pub fn end(&self) -> Offset {
        self.offset + self.len
    }

    pub fn range(&self) -> Range<Offset> {
        self.offset..self.end()
    }
}

/// Run one allocation round. Collective over `comm`.
///
/// `local` is this rank's byte request, or the error that kept it from
/// forming one. A failed rank still takes part so its peers are released:
/// it gets its own error back, and every other rank gets
/// `AllocationAborted`. `global` is only advanced when the whole round
/// succeeds.
pub async fn negotiate(
    comm: &Communicator,
    global: &mut GlobalOffset,
    local: Result<Offset>,
) -> Result<Allocation> {
    negotiate_with(comm, global, local, Scratch::reserve).await
}

async fn negotiate_with<F>(
    comm: &Communicator,
    global: &mut GlobalOffset,
    local: Result<Offset>,
    reserve: F,
) -> Result<Allocation>
where
    F: FnOnce(usize) -> std::result::Result<Scratch, TryReserveError>,
{
    let rank = comm.rank();

    let mut scratch = None;
    let mut verdict = [READY];
    if rank == ALLOCATION_ROOT {
        match reserve(comm.world_size() as usize) {
            Ok(s) => scratch = Some(s),
            Err(e) => {
                tracing::error!(rank, error = %e, "cannot reserve offset allocation scratch");
                verdict = [NOT_READY];
            }
        }
    }
    comm.broadcast(&mut verdict, ALLOCATION_ROOT).await?;
    if verdict[0] != READY {
        return Err(SharedFpError::OutOfResources {
            rank: ALLOCATION_ROOT,
            reason: "offset allocation scratch".into(),
        });
    }

    let request = match &local {
        Ok(bytes) => encode(TAG_OK, *bytes),
        Err(_) => encode(TAG_REJECTED, 0),
    };
    comm.gather(
        &request,
        scratch.as_mut().map(|s| s.wire.as_mut_slice()),
        ALLOCATION_ROOT,
    )
    .await?;

    let next = scratch
        .as_mut()
        .and_then(|s| plan_round(global.get(), s));

    let mut reply = [0u8; WIRE_LEN];
    comm.scatter(
        scratch.as_ref().map(|s| s.wire.as_slice()),
        &mut reply,
        ALLOCATION_ROOT,
    )
    .await?;
    drop(scratch);

    match Reply::decode(&reply)? {
        Reply::Assigned(offset) => {
            let next = comm
                .broadcast_i64(next.unwrap_or_default(), ALLOCATION_ROOT)
                .await?;
            global.advance_to(next)?;
            let len = local?;
            tracing::debug!(
                rank,
                offset,
                bytes = len,
                global_offset = next,
                "offset range allocated"
            );
            Ok(Allocation {
                offset,
                len,
                next_global_offset: next,
            })
        }
        Reply::Rejected { culprit } => {
            let requested = local?;
            if culprit == rank {
                return Err(SharedFpError::InvalidRequest { rank, requested });
            }
            Err(aborted(culprit, "request rejected"))
        }
        Reply::Overflow { culprit } => {
            let requested = local?;
            if culprit == rank {
                return Err(SharedFpError::OffsetOverflow {
                    rank,
                    base: global.get(),
                    requested,
                });
            }
            Err(aborted(culprit, "offset overflow"))
        }
    }
}

fn aborted(culprit: Rank, what: &str) -> SharedFpError {
    SharedFpError::AllocationAborted {
        root: ALLOCATION_ROOT,
        reason: format!("{what} from rank {culprit}"),
    }
}

/// Root-only buffers for one round, reserved fallibly up front.
struct Scratch {
    /// Gathered requests, overwritten in place with the replies.
    wire: Vec<u8>,
    requested: Vec<Offset>,
}

impl Scratch {
    fn reserve(world: usize) -> std::result::Result<Self, TryReserveError> {
        let wire_len = world.saturating_mul(WIRE_LEN);
        let mut wire = Vec::new();
        wire.try_reserve_exact(wire_len)?;
        wire.resize(wire_len, 0);
        let mut requested = Vec::new();
        requested.try_reserve_exact(world)?;
        Ok(Self { wire, requested })
    }
}

/// Decide every rank's reply and write it over that rank's request.
/// Returns the next global offset when the round succeeds.
fn plan_round(global_offset: Offset, scratch: &mut Scratch) -> Option<Offset> {
    let Scratch { wire, requested } = scratch;
    let mut rejected = None;
    for (rank, chunk) in wire.chunks_exact(WIRE_LEN).enumerate() {
        match decode(chunk) {
            Ok((TAG_OK, bytes)) => requested.push(bytes),
            _ => {
                rejected.get_or_insert(rank as Rank);
                requested.push(0);
            }
        }
    }

    let outcome = match rejected {
        Some(culprit) => Err(Reply::Rejected { culprit }),
        None => plan_allocation(global_offset, requested).map_err(|e| match e {
            SharedFpError::OffsetOverflow { rank, .. } => Reply::Overflow { culprit: rank },
            SharedFpError::InvalidRequest { rank, .. } => Reply::Rejected { culprit: rank },
            _ => Reply::Rejected {
                culprit: ALLOCATION_ROOT,
            },
        }),
    };

    match outcome {
        Ok(plan) => {
            for (chunk, &offset) in wire.chunks_exact_mut(WIRE_LEN).zip(&plan.assigned) {
                chunk.copy_from_slice(&Reply::Assigned(offset).encode());
            }
            Some(plan.next_global_offset)
        }
        Err(reply) => {
            tracing::warn!(?reply, "offset allocation round aborted");
            let encoded = reply.encode();
            for chunk in wire.chunks_exact_mut(WIRE_LEN) {
                chunk.copy_from_slice(&encoded);
            }
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Assigned(Offset),
    Rejected { culprit: Rank },
    Overflow { culprit: Rank },
}

impl Reply {
    fn encode(self) -> [u8; WIRE_LEN] {
        match self {
            Reply::Assigned(offset) => encode(TAG_OK, offset),
            Reply::Rejected { culprit } => encode(TAG_REJECTED, culprit as i64),
            Reply::Overflow { culprit } => encode(TAG_OVERFLOW, culprit as i64),
        }
    }

    fn decode(chunk: &[u8]) -> Result<Self> {
        let (tag, value) = decode(chunk)?;
        let culprit = || {
            Rank::try_from(value).map_err(|_| {
                SharedFpError::DecodeFailed(format!("invalid culprit rank {value}"))
            })
        };
        match tag {
            TAG_OK => Ok(Reply::Assigned(value)),
            TAG_REJECTED => Ok(Reply::Rejected {
                culprit: culprit()?,
            }),
            TAG_OVERFLOW => Ok(Reply::Overflow {
                culprit: culprit()?,
            }),
            other => Err(SharedFpError::DecodeFailed(format!(
                "unknown allocation reply tag {other}"
            ))),
        }
    }
}

fn encode(tag: u8, value: i64) -> [u8; WIRE_LEN] {
    let mut buf = [0u8; WIRE_LEN];
    buf[0] = tag;
    buf[1..].copy_from_slice(&value.to_le_bytes());
    buf
}

fn decode(chunk: &[u8]) -> Result<(u8, i64)> {
    let [tag, value @ ..] = chunk else {
        return Err(SharedFpError::DecodeFailed(
            "empty allocation message".into(),
        ));
    };
    let value: [u8; 8] = value.try_into().map_err(|_| {
        SharedFpError::DecodeFailed(format!("allocation message of {} bytes", chunk.len()))
    })?;
    Ok((*tag, i64::from_le_bytes(value)))
}
