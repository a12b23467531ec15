pub mod collective;
pub mod comm;
pub mod config;
pub mod error;
pub mod io;
pub mod sharedfp;
pub mod types;

pub use comm::{Communicator, LocalTransport, TcpTransport, Transport};
pub use config::SharedFpConfig;
pub use error::{Result, SharedFpError};
pub use io::{IoFile, IoRequest, IoStatus, RequestGroup};
pub use sharedfp::{
    Allocation, Collaborator, GlobalOffset, MergeCollaborator, MetadataQueue, MetadataRecord,
    OffsetTracker, SharedFile, SharedFileState, SplitCollective, negotiate, plan_allocation,
};
pub use types::{AccessMode, DataType, Info, Offset, OperationKind, Rank};
