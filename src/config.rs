use std::time::Duration;

use clap::Args;

/// Upper bound on simultaneous probes regardless of what the caller asks for.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Tunables for one scan. Read-only for the scan's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Max probes holding an admission slot at once.
    pub concurrency: usize,
    /// Bound on each TCP connect, name resolution included.
    pub connect_timeout: Duration,
    /// Bound on the single banner read after a successful connect.
    pub read_timeout: Duration,
    /// Wall-clock bound on the whole scan.
    pub deadline: Duration,
    /// Size of the banner read buffer in bytes.
    pub banner_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: 100,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            deadline: Duration::from_secs(30),
            banner_size: 256,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn banner_size(mut self, size: usize) -> Self {
        self.banner_size = size;
        self
    }

    /// Semaphore size actually used: at least one slot, at most [`MAX_CONCURRENCY`].
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn effective_banner_size(&self) -> usize {
        self.banner_size.max(1)
    }
}

/// Command-line/env overrides for [`ScanOptions`], shared by the `scan` and `serve` commands.
#[derive(Debug, Clone, Args)]
pub struct ScanOptionsArgs {
    /// Max concurrent TCP connect attempts.
    #[arg(long, env = "PORTSCOPE_CONCURRENCY", default_value_t = 100)]
    pub concurrency: usize,

    /// Per-port connect timeout in milliseconds.
    #[arg(long = "connect-timeout-ms", env = "PORTSCOPE_CONNECT_TIMEOUT_MS", default_value_t = 1000)]
    pub connect_timeout_ms: u64,

    /// Banner read timeout in milliseconds.
    #[arg(long = "read-timeout-ms", env = "PORTSCOPE_READ_TIMEOUT_MS", default_value_t = 500)]
    pub read_timeout_ms: u64,

    /// Overall scan deadline in milliseconds; results gathered so far are returned when it fires.
    #[arg(long = "deadline-ms", env = "PORTSCOPE_DEADLINE_MS", default_value_t = 30_000)]
    pub deadline_ms: u64,

    /// Banner read buffer size in bytes.
    #[arg(long = "banner-bytes", env = "PORTSCOPE_BANNER_BYTES", default_value_t = 256)]
    pub banner_bytes: usize,
}

impl From<&ScanOptionsArgs> for ScanOptions {
    fn from(args: &ScanOptionsArgs) -> Self {
        ScanOptions::new()
            .concurrency(args.concurrency)
            .connect_timeout(Duration::from_millis(args.connect_timeout_ms))
            .read_timeout(Duration::from_millis(args.read_timeout_ms))
            .deadline(Duration::from_millis(args.deadline_ms))
            .banner_size(args.banner_bytes)
    }
}
