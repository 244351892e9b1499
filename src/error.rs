use crate::protocol::{CommandType, HandshakeResult};
use crate::types::FeedIdentity;
use std::fmt;

/// Errors produced while constructing or driving a gaze feed.
#[derive(Debug, thiserror::Error)]
pub enum GazeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{feed} feed unavailable: {reason}")]
    FeedUnavailable {
        feed: FeedIdentity,
        reason: String,
    },

    #[error("Handshake rejected by device server: {0:?}")]
    Handshake(HandshakeResult),

    #[error("Unexpected message: expected {expected:?}, got tag {got}")]
    UnexpectedMessage { expected: CommandType, got: u16 },

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Tracker already started")]
    AlreadyStarted,

    #[error("Tracker stopped")]
    Stopped,

    #[error("Failed to spawn feed thread: {0}")]
    ThreadSpawn(String),

    #[error("Unknown feed id {0}")]
    UnknownFeed(i32),

    #[error("No eye tracking feed enabled")]
    NoFeedEnabled,
}

impl GazeError {
    pub(crate) fn unavailable(feed: FeedIdentity, reason: impl fmt::Display) -> Self {
        GazeError::FeedUnavailable {
            feed,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        GazeError::MalformedMessage(reason.into())
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &GazeError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
