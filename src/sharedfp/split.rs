use crate::error::{Result, SharedFpError};
use crate::io::{IoRequest, IoStatus};

/// Single-flight state of a split collective operation on one handle.
///
/// Between a successful [`begin`](Self::begin) and the matching
/// [`end`](Self::end) the handle owns exactly one pending request.
#[derive(Debug, Default)]
pub struct SplitCollective {
    pending: Option<IoRequest>,
}

impl SplitCollective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_use(&self) -> bool {
        self.pending.is_some()
    }

    /// Fail unless the handle is free for a new operation.
    pub fn check_idle(&self) -> Result<()> {
        if self.in_use() {
            return Err(SharedFpError::ProtocolViolation(
                "a split collective operation is already outstanding on this handle",
            ));
        }
        Ok(())
    }

    /// Take ownership of a posted request.
    pub fn begin(&mut self, request: IoRequest) -> Result<()> {
        self.check_idle()?;
        self.pending = Some(request);
        Ok(())
    }

    /// Wait for the outstanding request. The handle is free again
    /// afterwards, whatever the outcome.
    pub async fn end(&mut self) -> Result<IoStatus> {
        let request = self.pending.take().ok_or(SharedFpError::ProtocolViolation(
            "no split collective operation is outstanding on this handle",
        ))?;
        request.wait().await
    }
}
