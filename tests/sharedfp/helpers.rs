use sharedfp::{AccessMode, Communicator, Info, SharedFile, SharedFpConfig};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Helper: run the same body on every rank of an in-process group.
/// Returns each rank's output, indexed by rank.
pub async fn run_collective<T, F, Fut>(world_size: u32, f: F) -> Vec<T>
where
    F: Fn(Arc<Communicator>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let comms = Communicator::bootstrap_local(world_size, &SharedFpConfig::default()).unwrap();
    run_on(comms, f).await
}

/// Like [`run_collective`] over communicators built elsewhere.
pub async fn run_on<T, F, Fut>(comms: Vec<Communicator>, f: F) -> Vec<T>
where
    F: Fn(Arc<Communicator>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let comms: Vec<Arc<Communicator>> = comms.into_iter().map(Arc::new).collect();
    let f = Arc::new(f);
    let mut handles = Vec::new();
    for c in &comms {
        let c = Arc::clone(c);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(c).await }));
    }
    let mut results = Vec::with_capacity(handles.len());
    for h in handles {
        results.push(h.await.unwrap());
    }
    results
}

/// A write-only shared file handle at `path`.
pub fn open_shared(comm: Arc<Communicator>, path: &Path, config: SharedFpConfig) -> SharedFile {
    SharedFile::new(
        comm,
        path,
        AccessMode::WRONLY | AccessMode::CREATE,
        Info::new(),
        config,
    )
}

/// `len` copies of a byte identifying `rank`.
pub fn rank_bytes(rank: u32, len: usize) -> Vec<u8> {
    vec![b'a' + rank as u8; len]
}
