//! Rank groups and the byte transports they run on.
//!
//! A [`Communicator`] is the rank group every collective call is bound to.
//! It only needs point-to-point byte delivery with FIFO order per ordered
//! pair of ranks; anything satisfying [`Transport`] works.

mod collectives;
mod local;
mod tcp;

pub use local::LocalTransport;
pub use tcp::TcpTransport;

use crate::config::SharedFpConfig;
use crate::error::{Result, SharedFpError};
use crate::types::Rank;
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Point-to-point byte delivery between the ranks of one group.
///
/// Messages sent from `a` to `b` must be received by `b` in send order.
pub trait Transport: Send + Sync {
    /// Deliver `data` to `dest`.
    fn send<'a>(&'a self, dest: Rank, data: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Receive the next message sent by `src`.
    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// A fixed-size group of ranks that take part in collective exchanges.
///
/// Every rank must issue the same collective calls in the same order;
/// the group has no other mutual exclusion.
pub struct Communicator {
    rank: Rank,
    world_size: u32,
    transport: Arc<dyn Transport>,
    collective_timeout: Duration,
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size)
            .field("collective_timeout", &self.collective_timeout)
            .finish_non_exhaustive()
    }
}

impl Communicator {
    /// Bind a transport to a rank within a group of `world_size`.
    pub fn new(
        rank: Rank,
        world_size: u32,
        transport: Arc<dyn Transport>,
        config: &SharedFpConfig,
    ) -> Result<Self> {
        if rank >= world_size {
            return Err(SharedFpError::InvalidRank { rank, world_size });
        }
        Ok(Self {
            rank,
            world_size,
            transport,
            collective_timeout: config.collective_timeout,
        })
    }

    /// Build an in-process group: one communicator per rank, connected by
    /// bounded channels.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sharedfp::{Communicator, SharedFpConfig};
    ///
    /// let comms = Communicator::bootstrap_local(4, &SharedFpConfig::default()).unwrap();
    /// assert_eq!(comms[2].rank(), 2);
    /// assert_eq!(comms[2].world_size(), 4);
    /// ```
    pub fn bootstrap_local(world_size: u32, config: &SharedFpConfig) -> Result<Vec<Communicator>> {
        if world_size == 0 {
            return Err(SharedFpError::InvalidRank {
                rank: 0,
                world_size,
            });
        }
        LocalTransport::mesh(world_size, config.queue_depth)
            .into_iter()
            .enumerate()
            .map(|(rank, transport)| {
                Communicator::new(rank as Rank, world_size, Arc::new(transport), config)
            })
            .collect()
    }

    /// Join a TCP mesh as `rank`, one process per rank.
    ///
    /// `listener` must already be bound to `addrs[rank]`; `addrs` lists
    /// every rank's listening address in rank order.
    pub async fn connect_tcp(
        rank: Rank,
        listener: TcpListener,
        addrs: &[SocketAddr],
        config: &SharedFpConfig,
    ) -> Result<Communicator> {
        let world_size = addrs.len() as u32;
        if rank >= world_size {
            return Err(SharedFpError::InvalidRank { rank, world_size });
        }
        let transport = TcpTransport::establish(rank, listener, addrs, config).await?;
        Communicator::new(rank, world_size, Arc::new(transport), config)
    }

    /// This rank within the group (0-indexed).
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of ranks in the group.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Bound on each send/recv step inside a collective.
    pub fn collective_timeout(&self) -> Duration {
        self.collective_timeout
    }

    /// Send raw bytes to a peer.
    pub async fn send_bytes(&self, dest: Rank, data: &[u8]) -> Result<()> {
        self.check_peer(dest)?;
        self.transport.send(dest, data).await
    }

    /// Receive raw bytes from a peer.
    pub async fn recv_bytes(&self, src: Rank) -> Result<Vec<u8>> {
        self.check_peer(src)?;
        self.transport.recv(src).await
    }

    fn check_peer(&self, peer: Rank) -> Result<()> {
        if peer >= self.world_size {
            return Err(SharedFpError::InvalidRank {
                rank: peer,
                world_size: self.world_size,
            });
        }
        if peer == self.rank {
            return Err(SharedFpError::UnknownPeer { rank: peer });
        }
        Ok(())
    }
}
