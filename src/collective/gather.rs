use crate::collective::helpers::{check_root, collective_recv, collective_send, expect_len};
use crate::comm::Communicator;
use crate::error::{Result, SharedFpError};
use crate::types::Rank;
use futures::future::try_join_all;

/// Gather: root collects one equally sized chunk from each rank into a
/// contiguous buffer ordered by rank.
///
/// Uses flat gather: root posts N-1 concurrent recvs, non-root ranks send
/// their chunk to root.
///
/// `recv` must be `Some` on root with exactly `send.len() * world_size`
/// bytes; it is ignored on other ranks.
pub async fn gather(
    comm: &Communicator,
    send: &[u8],
    recv: Option<&mut [u8]>,
    root: Rank,
) -> Result<()> {
    check_root(comm, root)?;
    let world = comm.world_size();
    let rank = comm.rank();
    let chunk_bytes = send.len();

    if rank != root {
        return collective_send(comm, root, send, "gather").await;
    }

    let total = chunk_bytes * world as usize;
    let recv = recv.ok_or(SharedFpError::BufferSizeMismatch {
        expected: total,
        actual: 0,
    })?;
    expect_len(recv, total)?;

    // Stage own chunk at root's slot.
    let own_start = root as usize * chunk_bytes;
    recv[own_start..own_start + chunk_bytes].copy_from_slice(send);

    if world <= 1 {
        return Ok(());
    }

    // Concurrently receive from all other ranks.
    let futs: Vec<_> = (0..world)
        .filter(|&r| r != root)
        .map(|r| async move {
            let received = collective_recv(comm, r, "gather").await?;
            expect_len(&received, chunk_bytes)?;
            Ok::<_, SharedFpError>((r, received))
        })
        .collect();

    for (r, data) in try_join_all(futs).await? {
        let start = r as usize * chunk_bytes;
        recv[start..start + chunk_bytes].copy_from_slice(&data);
    }

    Ok(())
}
