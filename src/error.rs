//! Error taxonomy for the bridge.

use thiserror::Error;

/// Errors raised by holders, handlers and the messenger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("invalid foreign handle (0 is the released sentinel)")]
    InvalidHandle,

    #[error("foreign handle {handle:#x} was already released")]
    DoubleRelease { handle: i64 },

    #[error("foreign object used after close")]
    UseAfterClose,

    #[error("no message handler registered on channel '{channel}'")]
    UnknownChannel { channel: String },

    #[error("no pending reply with id {id}")]
    UnknownReply { id: u64 },

    #[error("payload marked present but data pointer is null")]
    NullPayload,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
