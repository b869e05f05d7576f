//! Single-use reply capability handed to message handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{BridgeError, BridgeResult};

type ReplyFn = Box<dyn FnOnce(Option<Vec<u8>>) + Send>;

/// Answers one binary message. Consumed by [`BinaryReply::reply`].
///
/// A reply that is dropped unanswered responds with `None`, so the sender is
/// never left waiting.
pub struct BinaryReply {
    callback: Option<ReplyFn>,
}

impl BinaryReply {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A reply that discards the response.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn reply(mut self, data: Option<Vec<u8>>) {
        if let Some(callback) = self.callback.take() {
            callback(data);
        }
    }
}

impl Drop for BinaryReply {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!("[Reply] Reply dropped without an answer; responding with no data");
            callback(None);
        }
    }
}

impl fmt::Debug for BinaryReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryReply")
            .field("answered", &self.callback.is_none())
            .finish()
    }
}

/// Opaque id naming a parked [`BinaryReply`] on the native side.
pub type ReplyId = u64;

/// Replies waiting for the native side to answer them by id.
pub struct PendingReplies {
    next_id: AtomicU64,
    replies: Mutex<HashMap<ReplyId, BinaryReply>>,
}

impl Default for PendingReplies {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingReplies {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            replies: Mutex::new(HashMap::new()),
        }
    }

    /// Parks `reply` and returns the id to hand across the boundary.
    pub fn insert(&self, reply: BinaryReply) -> ReplyId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.replies.lock().insert(id, reply);
        debug!("[Reply] Parked reply {}", id);
        id
    }

    /// Answers and forgets the reply with `id`.
    pub fn complete(&self, id: ReplyId, data: Option<Vec<u8>>) -> BridgeResult<()> {
        // invoke outside the lock, the callback may park another reply
        let reply = self
            .replies
            .lock()
            .remove(&id)
            .ok_or(BridgeError::UnknownReply { id })?;
        reply.reply(data);
        Ok(())
    }

    /// Removes a parked reply without answering it explicitly.
    pub fn take(&self, id: ReplyId) -> Option<BinaryReply> {
        self.replies.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static PENDING_REPLIES: Lazy<PendingReplies> = Lazy::new(PendingReplies::new);

/// Process-wide table used by [`crate::NativeLibrary`] and the C exports.
pub fn pending_replies() -> &'static PendingReplies {
    &PENDING_REPLIES
}
