/// Bytes requested per read when streaming line-oriented entries
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Buffer size for CSV writers used by the exporter
pub const WRITER_BUFFER_SIZE: usize = 128 * 1024;

/// Request timeout for dataset downloads, in seconds
pub const HTTP_TIMEOUT_SECS: u64 = 600;

/// User agent sent with dataset downloads
pub const USER_AGENT: &str = concat!("polyload/", env!("CARGO_PKG_VERSION"));

/// Minimum change in download fraction before a new progress message is emitted
pub const PROGRESS_STEP: f64 = 0.01;
