use crate::collective::helpers::{check_root, collective_recv, collective_send, expect_len};
use crate::comm::Communicator;
use crate::error::{Result, SharedFpError};
use crate::types::Rank;
use futures::future::try_join_all;

/// Scatter: root distributes one chunk to each rank.
///
/// Root sends the `i`-th chunk of `send` to rank `i`; non-root ranks receive
/// their chunk from root. Every rank ends holding its chunk in `recv`.
///
/// `send` must be `Some` on root with exactly `recv.len() * world_size`
/// bytes; it is ignored on other ranks.
pub async fn scatter(
    comm: &Communicator,
    send: Option<&[u8]>,
    recv: &mut [u8],
    root: Rank,
) -> Result<()> {
    check_root(comm, root)?;
    let world = comm.world_size();
    let rank = comm.rank();
    let chunk_bytes = recv.len();

    if rank == root {
        let total = chunk_bytes * world as usize;
        let all_data = send.ok_or(SharedFpError::BufferSizeMismatch {
            expected: total,
            actual: 0,
        })?;
        expect_len(all_data, total)?;

        let own_start = root as usize * chunk_bytes;
        recv.copy_from_slice(&all_data[own_start..own_start + chunk_bytes]);

        let futs: Vec<_> = (0..world)
            .filter(|&r| r != root)
            .map(|r| {
                let start = r as usize * chunk_bytes;
                let chunk = &all_data[start..start + chunk_bytes];
                collective_send(comm, r, chunk, "scatter")
            })
            .collect();

        try_join_all(futs).await?;
    } else {
        let received = collective_recv(comm, root, "scatter").await?;
        expect_len(&received, chunk_bytes)?;
        recv.copy_from_slice(&received);
    }

    Ok(())
}
