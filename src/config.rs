//! Construction-time configuration. No process-wide state: a `Config` is
//! built once and handed to `Context::new`.

use crate::buffer::DEFAULT_BUFFER_CAPACITY;

#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    /// Capacity of the payload and answer `ByteBuffer`s.
    pub buffer_size: usize,
    /// Initial `retries_left` for outgoing frames.
    pub retry_count: u8,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            buffer_size: DEFAULT_BUFFER_CAPACITY,
            retry_count: 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InterfaceConfig {
    /// Send-queue capacity.
    pub max_queued_frames: usize,
    /// Minimum interval, in milliseconds, between retry attempts.
    pub resend_min_time_ms: u64,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        InterfaceConfig {
            max_queued_frames: 16,
            resend_min_time_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub use_logging: bool,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub frame: FrameConfig,
    pub interface: InterfaceConfig,
    pub logging: LoggingConfig,
}
