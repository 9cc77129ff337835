//! Caller-facing errors. Frame-level/transient errors never escape
//! `Context::poll`; they are logged and collapsed into an IDLE reset instead.

/// Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The send queue already holds `interface.max_queued_frames` frames.
    QueueFull,
    /// The stuffed payload does not fit in `frame.buffer_size`.
    PayloadTooLarge,
}
