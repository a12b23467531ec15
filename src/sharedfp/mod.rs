//! Individual shared file pointers.
//!
//! Each rank appends to a private data file and records what it wrote.
//! Ordered writes and merges place bytes in the shared file at ranges
//! handed out by the offset allocation protocol, so ranks never overlap
//! and lower ranks always come first within a round.

pub mod allocation;
mod file;
pub mod metadata;
mod split;
mod state;

pub use allocation::{
    ALLOCATION_ROOT, Allocation, AllocationPlan, GlobalOffset, negotiate, plan_allocation,
};
pub use file::SharedFile;
pub use metadata::{Collaborator, MergeCollaborator, MetadataQueue, MetadataRecord};
pub use split::SplitCollective;
pub use state::{OffsetTracker, SharedFileState};
