//! Outbound calls into the runtime that owns the foreign objects.

use crate::handle::ForeignHandle;
use crate::reply::BinaryReply;

/// Native side of the bridge.
///
/// Implementations must be thread-safe: `release` may be called from the
/// cleaner thread while `dispatch_message` runs on the dispatcher thread.
/// None of the calls may panic for a live handle.
pub trait NativeRuntime: Send + Sync {
    /// Adds one reference to the object named by `handle`.
    fn retain(&self, handle: ForeignHandle);

    /// Drops one reference previously added by `retain`.
    fn release(&self, handle: ForeignHandle);

    /// Delivers a binary message to the object named by `handle`.
    ///
    /// The native side owns `reply` and answers it exactly once, now or later.
    fn dispatch_message(&self, handle: ForeignHandle, payload: Option<&[u8]>, reply: BinaryReply);
}
