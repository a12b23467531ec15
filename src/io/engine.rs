use crate::comm::Communicator;
use crate::error::{Result, SharedFpError};
use crate::io::request::{IoRequest, IoStatus};
use crate::types::{AccessMode, Offset};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum IoOp {
    Write {
        offset: Offset,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<IoStatus>>,
    },
    Read {
        offset: Offset,
        len: usize,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    Sync {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// A file driven by a single background worker.
///
/// Operations execute strictly in submission order, one at a time. A write
/// posted after another on the same handle therefore never lands before it,
/// and a read observes every write submitted ahead of it.
///
/// Dropping the handle lets the worker drain what was already submitted.
pub struct IoFile {
    path: PathBuf,
    tx: mpsc::Sender<IoOp>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for IoFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoFile").field("path", &self.path).finish()
    }
}

impl IoFile {
    /// Open `path` with `mode` and start its worker.
    pub async fn open(
        path: impl AsRef<Path>,
        mode: AccessMode,
        queue_depth: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut opts = tokio::fs::OpenOptions::new();
        opts.read(mode.is_readable()).write(mode.is_writable());
        if mode.contains(AccessMode::CREATE) {
            if mode.contains(AccessMode::EXCL) {
                opts.create_new(true);
            } else {
                opts.create(true);
            }
        }
        let file = opts.open(&path).await?.into_std().await;

        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let worker = tokio::spawn(run_worker(path.clone(), Arc::new(file), rx));
        Ok(Self { path, tx, worker })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Post a positional write. Returns once the write is queued.
    pub async fn write_at_nb(&self, offset: Offset, data: Vec<u8>) -> Result<IoRequest> {
        let bytes = data.len();
        if offset < 0 {
            return Err(SharedFpError::write_failed(offset, bytes, "negative offset"));
        }
        if bytes == 0 {
            return Ok(IoRequest::ready(offset, 0, Ok(IoStatus { offset, bytes: 0 })));
        }
        let (reply, rx) = oneshot::channel();
        self.submit(IoOp::Write {
            offset,
            data,
            reply,
        })
        .await?;
        Ok(IoRequest::new(offset, bytes, rx))
    }

    /// Post this rank's part of a collective write.
    ///
    /// Every rank of `comm` posts its own range in the same protocol round.
    /// The ranges are disjoint by construction, so each part completes
    /// independently; the request covers only the local part.
    pub async fn write_at_all_nb(
        &self,
        comm: &Communicator,
        offset: Offset,
        data: Vec<u8>,
    ) -> Result<IoRequest> {
        tracing::trace!(
            rank = comm.rank(),
            world = comm.world_size(),
            offset,
            bytes = data.len(),
            "posting collective write part"
        );
        self.write_at_nb(offset, data).await
    }

    /// Read exactly `len` bytes at `offset`, after every earlier submission.
    pub async fn read_at(&self, offset: Offset, len: usize) -> Result<Vec<u8>> {
        let (reply, rx) = oneshot::channel();
        self.submit(IoOp::Read { offset, len, reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Flush file data to stable storage, after every earlier submission.
    pub async fn sync(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.submit(IoOp::Sync { reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Stop accepting work and wait until everything submitted has run.
    pub async fn close(self) -> Result<()> {
        let Self { path, tx, worker } = self;
        drop(tx);
        worker.await.map_err(|e| {
            SharedFpError::transport_with_source(format!("I/O worker for {}", path.display()), e)
        })
    }

    async fn submit(&self, op: IoOp) -> Result<()> {
        self.tx.send(op).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> SharedFpError {
        SharedFpError::EngineClosed {
            path: self.path.clone(),
        }
    }
}

async fn run_worker(path: PathBuf, file: Arc<std::fs::File>, mut rx: mpsc::Receiver<IoOp>) {
    while let Some(op) = rx.recv().await {
        let file = Arc::clone(&file);
        match op {
            IoOp::Write {
                offset,
                data,
                reply,
            } => {
                let bytes = data.len();
                let outcome = blocking(move || write_all_at(&file, &data, offset))
                    .await
                    .map(|()| IoStatus { offset, bytes })
                    .map_err(|e| SharedFpError::write_failed(offset, bytes, e));
                if let Err(e) = &outcome {
                    tracing::error!(
                        path = %path.display(),
                        offset,
                        bytes,
                        error = %e,
                        "positional write failed"
                    );
                }
                let _ = reply.send(outcome);
            }
            IoOp::Read { offset, len, reply } => {
                let outcome = blocking(move || read_exact_at(&file, offset, len))
                    .await
                    .map_err(SharedFpError::from);
                let _ = reply.send(outcome);
            }
            IoOp::Sync { reply } => {
                let outcome = blocking(move || file.sync_data())
                    .await
                    .map_err(SharedFpError::from);
                let _ = reply.send(outcome);
            }
        }
    }
    tracing::trace!(path = %path.display(), "I/O worker drained");
}

async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(std::io::Error::other)?
}

fn position(offset: Offset) -> std::io::Result<u64> {
    u64::try_from(offset).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("negative file offset {offset}"),
        )
    })
}

#[cfg(unix)]
fn write_all_at(file: &std::fs::File, data: &[u8], offset: Offset) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, position(offset)?)
}

#[cfg(unix)]
fn read_exact_at(file: &std::fs::File, offset: Offset, len: usize) -> std::io::Result<Vec<u8>> {
    use std::os::unix::fs::FileExt;
    let mut buf = vec![0u8; len];
    file.read_exact_at(&mut buf, position(offset)?)?;
    Ok(buf)
}

#[cfg(windows)]
fn write_all_at(file: &std::fs::File, mut data: &[u8], offset: Offset) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut pos = position(offset)?;
    while !data.is_empty() {
        let n = file.seek_write(data, pos)?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        data = &data[n..];
        pos += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &std::fs::File, offset: Offset, len: usize) -> std::io::Result<Vec<u8>> {
    use std::os::windows::fs::FileExt;
    let mut buf = vec![0u8; len];
    let mut pos = position(offset)?;
    let mut filled = 0;
    while filled < len {
        let n = file.seek_read(&mut buf[filled..], pos)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
        pos += n as u64;
    }
    Ok(buf)
}
