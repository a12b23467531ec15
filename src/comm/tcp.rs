use super::Transport;
use crate::config::SharedFpConfig;
use crate::error::{Result, SharedFpError};
use crate::types::Rank;
use futures::future::{BoxFuture, try_join_all};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Maximum frame size accepted from a peer (4 GiB).
const MAX_FRAME_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Delay between connection attempts while a lower rank is still binding.
const DIAL_RETRY: Duration = Duration::from_millis(50);

struct TcpPeer {
    writer: Mutex<OwnedWriteHalf>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    reader_task: JoinHandle<()>,
}

/// Full-mesh TCP transport, one connection per pair of ranks.
///
/// Frames are `[len: u64 LE][payload]`. Each connection has a background
/// reader that feeds a bounded channel, so FIFO order per peer is the
/// stream order.
pub struct TcpTransport {
    rank: Rank,
    peers: HashMap<Rank, TcpPeer>,
}

impl TcpTransport {
    /// Build the mesh: dial every lower rank, accept every higher rank.
    ///
    /// The dialing side announces its rank as a `u32 LE` handshake.
    pub async fn establish(
        rank: Rank,
        listener: TcpListener,
        addrs: &[SocketAddr],
        config: &SharedFpConfig,
    ) -> Result<Self> {
        let world = addrs.len() as u32;
        let deadline = tokio::time::Instant::now() + config.collective_timeout;

        let dials = try_join_all((0..rank).map(|peer| async move {
            let stream = dial(addrs[peer as usize], rank, deadline).await?;
            Ok::<_, SharedFpError>((peer, stream))
        }));
        let accepts = accept_higher(&listener, rank, world, deadline);
        let (dialed, accepted) = tokio::try_join!(dials, accepts)?;

        let mut peers = HashMap::new();
        for (peer, stream) in dialed.into_iter().chain(accepted) {
            stream
                .set_nodelay(true)
                .map_err(|e| SharedFpError::transport_with_source("tcp set_nodelay", e))?;
            let (reader, writer) = stream.into_split();
            let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
            let handle = tokio::spawn(recv_loop(peer, reader, tx));
            peers.insert(
                peer,
                TcpPeer {
                    writer: Mutex::new(writer),
                    rx: Mutex::new(rx),
                    reader_task: handle,
                },
            );
        }

        tracing::debug!(rank, world, "tcp mesh established");
        Ok(Self { rank, peers })
    }

    /// Rank this transport belongs to.
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for peer in self.peers.values() {
            peer.reader_task.abort();
        }
    }
}

impl Transport for TcpTransport {
    fn send<'a>(&'a self, dest: Rank, data: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let peer = self
                .peers
                .get(&dest)
                .ok_or(SharedFpError::UnknownPeer { rank: dest })?;
            let mut writer = peer.writer.lock().await;
            write_frame(&mut writer, data).await.map_err(|e| {
                SharedFpError::transport_with_source(format!("tcp send to rank {dest}"), e)
            })
        })
    }

    fn recv<'a>(&'a self, src: Rank) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let peer = self
                .peers
                .get(&src)
                .ok_or(SharedFpError::UnknownPeer { rank: src })?;
            peer.rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(SharedFpError::PeerDisconnected { rank: src })
        })
    }
}

async fn dial(
    addr: SocketAddr,
    own_rank: Rank,
    deadline: tokio::time::Instant,
) -> Result<TcpStream> {
    loop {
        match TcpStream::connect(addr).await {
            Ok(mut stream) => {
                stream
                    .write_all(&own_rank.to_le_bytes())
                    .await
                    .map_err(|e| SharedFpError::transport_with_source("tcp handshake write", e))?;
                return Ok(stream);
            }
            Err(e) if tokio::time::Instant::now() + DIAL_RETRY < deadline => {
                tracing::debug!(%addr, error = %e, "peer not reachable yet, retrying");
                tokio::time::sleep(DIAL_RETRY).await;
            }
            Err(e) => {
                return Err(SharedFpError::transport_with_source(
                    format!("tcp connect to {addr}"),
                    e,
                ));
            }
        }
    }
}

async fn accept_higher(
    listener: &TcpListener,
    rank: Rank,
    world: u32,
    deadline: tokio::time::Instant,
) -> Result<Vec<(Rank, TcpStream)>> {
    let expected = world - rank - 1;
    let mut accepted: Vec<(Rank, TcpStream)> = Vec::with_capacity(expected as usize);

    while (accepted.len() as u32) < expected {
        let (mut stream, from) = tokio::time::timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| {
                SharedFpError::transport(format!(
                    "tcp mesh: only {}/{expected} higher ranks connected",
                    accepted.len()
                ))
            })?
            .map_err(|e| SharedFpError::transport_with_source("tcp accept", e))?;

        let mut hello = [0u8; 4];
        stream
            .read_exact(&mut hello)
            .await
            .map_err(|e| SharedFpError::transport_with_source("tcp handshake read", e))?;
        let peer = Rank::from_le_bytes(hello);

        if peer <= rank || peer >= world {
            return Err(SharedFpError::InvalidRank {
                rank: peer,
                world_size: world,
            });
        }
        if accepted.iter().any(|(r, _)| *r == peer) {
            return Err(SharedFpError::DecodeFailed(format!(
                "duplicate handshake from rank {peer} ({from})"
            )));
        }
        accepted.push((peer, stream));
    }

    Ok(accepted)
}

async fn write_frame(writer: &mut OwnedWriteHalf, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(data.len() as u64).to_le_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await
}

/// Background loop: read frames from one peer into its channel.
async fn recv_loop(peer: Rank, mut reader: OwnedReadHalf, tx: mpsc::Sender<Vec<u8>>) {
    let mut len_buf = [0u8; 8];
    loop {
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            tracing::debug!(peer, "tcp recv loop ended: {e}");
            return;
        }
        let len = u64::from_le_bytes(len_buf);
        if len > MAX_FRAME_SIZE {
            tracing::warn!(peer, len, "tcp frame too large, closing connection");
            return;
        }

        let mut payload = vec![0u8; len as usize];
        if let Err(e) = reader.read_exact(&mut payload).await {
            tracing::debug!(peer, "tcp recv loop ended reading payload: {e}");
            return;
        }
        if tx.send(payload).await.is_err() {
            return;
        }
    }
}
