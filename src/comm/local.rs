use super::Transport;
use crate::error::{Result, SharedFpError};
use crate::types::Rank;
use futures::future::BoxFuture;
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

/// In-process transport: one bounded channel per ordered pair of ranks.
///
/// Dropping a rank's transport closes its outgoing channels, so peers
/// blocked on it see `PeerDisconnected` instead of hanging.
pub struct LocalTransport {
    rank: Rank,
    senders: HashMap<Rank, mpsc::Sender<Vec<u8>>>,
    receivers: HashMap<Rank, Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl LocalTransport {
    /// Build a fully connected mesh of `world_size` transports, indexed by rank.
    pub fn mesh(world_size: u32, capacity: usize) -> Vec<LocalTransport> {
        let mut transports: Vec<LocalTransport> = (0..world_size)
            .map(|rank| LocalTransport {
                rank,
                senders: HashMap::new(),
                receivers: HashMap::new(),
            })
            .collect();

        for src in 0..world_size {
            for dst in 0..world_size {
                if src == dst {
                    continue;
                }
                let (tx, rx) = mpsc::channel(capacity.max(1));
                transports[src as usize].senders.insert(dst, tx);
                transports[dst as usize].receivers.insert(src, Mutex::new(rx));
            }
        }

        transports
    }

    /// Rank this transport belongs to.
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl Transport for LocalTransport {
    fn send<'a>(&'a self, dest: Rank, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let tx = self
                .senders
                .get(&dest)
                .ok_or(SharedFpError::UnknownPeer { rank: dest })?;
            tx.send(data.to_vec())
                .await
                .map_err(|_| SharedFpError::PeerDisconnected { rank: dest })
        })
    }

    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let rx = self
                .receivers
                .get(&src)
                .ok_or(SharedFpError::UnknownPeer { rank: src })?;
            rx.lock()
                .await
                .recv()
                .await
                .ok_or(SharedFpError::PeerDisconnected { rank: src })
        })
    }
}
