//! Runtime-configurable tuning parameters for sharedfp.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `SHAREDFP_`) or by constructing a custom `SharedFpConfig`.

use std::time::Duration;

/// Tuning parameters for the communicator, the I/O engine and the
/// per-rank data files.
#[derive(Debug, Clone)]
pub struct SharedFpConfig {
    /// Timeout for individual send/recv operations within collectives.
    pub collective_timeout: Duration,

    /// Capacity of per-peer message lanes and of each file's submission queue.
    pub queue_depth: usize,

    /// Suffix inserted between the shared file name and the rank when
    /// naming a rank's private data file.
    pub datafile_suffix: String,

    /// Keep the private data files on close instead of removing them.
    pub keep_datafiles: bool,
}

impl Default for SharedFpConfig {
    fn default() -> Self {
        Self {
            collective_timeout: Duration::from_secs(30),
            queue_depth: 256,
            datafile_suffix: ".data".to_string(),
            keep_datafiles: false,
        }
    }
}

impl SharedFpConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `SHAREDFP_COLLECTIVE_TIMEOUT_SECS`
    /// - `SHAREDFP_QUEUE_DEPTH`
    /// - `SHAREDFP_DATAFILE_SUFFIX`
    /// - `SHAREDFP_KEEP_DATAFILES` (`1`/`true`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparseable values are
    /// ignored and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("SHAREDFP_COLLECTIVE_TIMEOUT_SECS")
            && let Ok(s) = v.parse::<u64>()
        {
            cfg.collective_timeout = Duration::from_secs(s);
        }
        if let Some(v) = lookup("SHAREDFP_QUEUE_DEPTH")
            && let Ok(n) = v.parse::<usize>()
            && n > 0
        {
            cfg.queue_depth = n;
        }
        if let Some(v) = lookup("SHAREDFP_DATAFILE_SUFFIX")
            && !v.is_empty()
        {
            cfg.datafile_suffix = v;
        }
        if let Some(v) = lookup("SHAREDFP_KEEP_DATAFILES") {
            cfg.keep_datafiles = matches!(v.as_str(), "1" | "true" | "yes");
        }

        cfg
    }
}
