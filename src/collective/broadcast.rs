use crate::collective::helpers::{check_root, collective_recv, collective_send, expect_len};
use crate::comm::Communicator;
use crate::error::Result;
use crate::types::Rank;
use futures::future::try_join_all;

/// Threshold: use flat broadcast for small worlds, tree broadcast for larger.
const TREE_BROADCAST_THRESHOLD: u32 = 4;

/// Broadcast `buf` from `root` to every rank.
///
/// Falls back to flat broadcast (root sends to all directly) for world
/// sizes below `TREE_BROADCAST_THRESHOLD`, otherwise fans out over a binary
/// tree rooted at `root`.
pub async fn broadcast(comm: &Communicator, buf: &mut [u8], root: Rank) -> Result<()> {
    check_root(comm, root)?;
    let world = comm.world_size();

    if world <= 1 {
        return Ok(());
    }
    if world < TREE_BROADCAST_THRESHOLD {
        return flat_broadcast(comm, buf, root).await;
    }

    let rank = comm.rank();

    // Remap ranks so root becomes logical rank 0.
    let logical = |r: Rank| -> Rank { (r + world - root) % world };
    let physical = |l: Rank| -> Rank { (l + root) % world };
    let my_logical = logical(rank);

    if my_logical != 0 {
        let parent = physical((my_logical - 1) / 2);
        let received = collective_recv(comm, parent, "broadcast").await?;
        expect_len(&received, buf.len())?;
        buf.copy_from_slice(&received);
    }

    // Send to children concurrently.
    let data: &[u8] = buf;
    let futs: Vec<_> = [2 * my_logical + 1, 2 * my_logical + 2]
        .into_iter()
        .filter(|&child| child < world)
        .map(|child| collective_send(comm, physical(child), data, "broadcast"))
        .collect();

    if !futs.is_empty() {
        try_join_all(futs).await?;
    }

    Ok(())
}

/// Flat broadcast: root sends to all other ranks concurrently.
async fn flat_broadcast(comm: &Communicator, buf: &mut [u8], root: Rank) -> Result<()> {
    let world = comm.world_size();

    if comm.rank() == root {
        let data: &[u8] = buf;
        let futs: Vec<_> = (0..world)
            .filter(|&r| r != root)
            .map(|r| collective_send(comm, r, data, "broadcast"))
            .collect();
        try_join_all(futs).await?;
    } else {
        let received = collective_recv(comm, root, "broadcast").await?;
        expect_len(&received, buf.len())?;
        buf.copy_from_slice(&received);
    }

    Ok(())
}
