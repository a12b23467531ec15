use crate::error::Result;
use crate::types::Rank;

use super::Communicator;

impl Communicator {
    /// Gather one equally sized chunk per rank to `root`, ordered by rank.
    ///
    /// `recv` must hold `send.len() * world_size` bytes on root.
    pub async fn gather(&self, send: &[u8], recv: Option<&mut [u8]>, root: Rank) -> Result<()> {
        crate::collective::gather(self, send, recv, root).await
    }

    /// Scatter one equally sized chunk from `root` to each rank.
    ///
    /// `send` must hold `recv.len() * world_size` bytes on root.
    pub async fn scatter(&self, send: Option<&[u8]>, recv: &mut [u8], root: Rank) -> Result<()> {
        crate::collective::scatter(self, send, recv, root).await
    }

    /// Broadcast `buf` from `root` to all ranks.
    pub async fn broadcast(&self, buf: &mut [u8], root: Rank) -> Result<()> {
        crate::collective::broadcast(self, buf, root).await
    }

    /// Broadcast a single `i64` from `root`; every rank returns root's value.
    pub async fn broadcast_i64(&self, value: i64, root: Rank) -> Result<i64> {
        let mut buf = value.to_le_bytes();
        self.broadcast(&mut buf, root).await?;
        Ok(i64::from_le_bytes(buf))
    }
}
