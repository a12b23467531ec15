use crate::error::{Result, SharedFpError};
use crate::types::Offset;
use tokio::sync::oneshot;

/// Outcome of a completed I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoStatus {
    /// File offset the request was posted at.
    pub offset: Offset,
    /// Bytes transferred.
    pub bytes: usize,
}

/// Handle to an in-flight positional I/O request.
///
/// Dropping the handle does not cancel the operation; the engine still
/// performs it in submission order.
#[derive(Debug)]
pub struct IoRequest {
    offset: Offset,
    bytes: usize,
    rx: oneshot::Receiver<Result<IoStatus>>,
}

impl IoRequest {
    pub(crate) fn new(
        offset: Offset,
        bytes: usize,
        rx: oneshot::Receiver<Result<IoStatus>>,
    ) -> Self {
        Self { offset, bytes, rx }
    }

    /// A request that is already complete.
    pub(crate) fn ready(offset: Offset, bytes: usize, outcome: Result<IoStatus>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self::new(offset, bytes, rx)
    }

    /// Offset the request was posted at.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Bytes the request covers.
    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Wait for the request to complete and propagate any error.
    pub async fn wait(self) -> Result<IoStatus> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SharedFpError::write_failed(
                self.offset,
                self.bytes,
                "I/O worker dropped the request",
            )),
        }
    }
}

/// A set of requests that can be waited on together.
#[derive(Debug, Default)]
pub struct RequestGroup {
    requests: Vec<IoRequest>,
}

impl RequestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: IoRequest) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Wait for every request in the group.
    ///
    /// Returns the first error encountered, if any. All requests are awaited
    /// regardless of errors.
    pub async fn wait_all(self) -> Result<Vec<IoStatus>> {
        let mut first_err = None;
        let mut statuses = Vec::with_capacity(self.requests.len());
        for request in self.requests {
            match request.wait().await {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(statuses),
        }
    }
}
