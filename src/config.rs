use std::time::Duration;

/// The default maximum time a single socket operation may stay pending.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// The default amount of bytes requested for each read, before the protocol gets a chance to
/// override it.
pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

/// Settings shared by both sockets of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelConfig {
    /// How long a connect, resolution, read or write may stay pending before the tunnel is torn
    /// down.
    pub idle_timeout: Duration,

    /// The buffer size requested before each read.
    pub read_size: usize,
}

impl TunnelConfig {
    pub const fn new() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_size: DEFAULT_READ_SIZE,
        }
    }

    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub const fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size;
        self
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self::new()
    }
}
