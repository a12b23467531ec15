//! Byte-level collectives over a [`Communicator`](crate::comm::Communicator).
//!
//! Every rank of the group must call the same collectives in the same
//! order. Each send/recv step is bounded by the communicator's
//! collective timeout and surfaces as `CollectiveFailed`.

mod broadcast;
mod gather;
mod helpers;
mod scatter;

pub use broadcast::broadcast;
pub use gather::gather;
pub use scatter::scatter;
