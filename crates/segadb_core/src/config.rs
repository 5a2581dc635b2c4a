//! Database configuration.

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether mutating operations emit `tracing` events.
    ///
    /// Operation logging is an explicit dependency, not ambient: nothing is
    /// emitted unless this flag is set.
    pub log_operations: bool,

    /// Worker-pool ceiling for parallel load and CSV ingestion.
    /// `0` means "number of available CPU cores".
    pub worker_threads: usize,

    /// Default maximum CSV chunk size in bytes for parallel ingestion.
    /// `None` uses the ingest default of 4 MiB.
    pub max_chunk_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_operations: false,
            worker_threads: 0,
            max_chunk_size: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether mutating operations are logged.
    #[must_use]
    pub const fn log_operations(mut self, value: bool) -> Self {
        self.log_operations = value;
        self
    }

    /// Sets the worker-pool ceiling (`0` = available cores).
    #[must_use]
    pub const fn worker_threads(mut self, value: usize) -> Self {
        self.worker_threads = value;
        self
    }

    /// Sets the default maximum CSV chunk size in bytes.
    #[must_use]
    pub const fn max_chunk_size(mut self, value: Option<usize>) -> Self {
        self.max_chunk_size = value;
        self
    }
}
