//! Byte-level positional file I/O with nonblocking requests.

mod engine;
mod request;

pub use engine::IoFile;
pub use request::{IoRequest, IoStatus, RequestGroup};
