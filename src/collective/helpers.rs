use crate::comm::Communicator;
use crate::error::{Result, SharedFpError};
use crate::types::Rank;

/// Send bytes to a peer with timeout, wrapping errors as `CollectiveFailed`.
pub(crate) async fn collective_send(
    comm: &Communicator,
    dest: Rank,
    data: &[u8],
    operation: &'static str,
) -> Result<()> {
    let timeout = comm.collective_timeout();
    match tokio::time::timeout(timeout, comm.send_bytes(dest, data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SharedFpError::CollectiveFailed {
            operation,
            rank: dest,
            reason: e.to_string(),
        }),
        Err(_) => Err(SharedFpError::CollectiveFailed {
            operation,
            rank: dest,
            reason: format!("send timed out after {}ms", timeout.as_millis()),
        }),
    }
}

/// Receive bytes from a peer with timeout, wrapping errors as `CollectiveFailed`.
pub(crate) async fn collective_recv(
    comm: &Communicator,
    src: Rank,
    operation: &'static str,
) -> Result<Vec<u8>> {
    let timeout = comm.collective_timeout();
    match tokio::time::timeout(timeout, comm.recv_bytes(src)).await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(SharedFpError::CollectiveFailed {
            operation,
            rank: src,
            reason: e.to_string(),
        }),
        Err(_) => Err(SharedFpError::CollectiveFailed {
            operation,
            rank: src,
            reason: format!("recv timed out after {}ms", timeout.as_millis()),
        }),
    }
}

/// Reject a root outside the group before any message moves.
pub(crate) fn check_root(comm: &Communicator, root: Rank) -> Result<()> {
    if root >= comm.world_size() {
        return Err(SharedFpError::InvalidRank {
            rank: root,
            world_size: comm.world_size(),
        });
    }
    Ok(())
}

/// Check a received chunk against the size every rank agreed on.
pub(crate) fn expect_len(received: &[u8], expected: usize) -> Result<()> {
    if received.len() != expected {
        return Err(SharedFpError::BufferSizeMismatch {
            expected,
            actual: received.len(),
        });
    }
    Ok(())
}
