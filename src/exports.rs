//! Functions exported for the native side to call.
//!
//! None of these unwind into the caller: panics are caught and reported as
//! a failed call.

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::error;

use crate::payload::RawPayload;
use crate::reply::{ReplyId, pending_replies};

/// Answers the reply parked under `reply_id` by `dispatch_message`.
///
/// Returns `false` if the id is unknown (already answered) or the payload is
/// malformed; in the latter case the reply is answered with no data.
///
/// # Safety
///
/// When `payload.present` and `payload.len > 0`, `payload.data` must point to
/// `payload.len` readable bytes for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn flutter_bridge_reply(reply_id: ReplyId, payload: RawPayload) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let data = match unsafe { payload.to_vec() } {
            Ok(data) => data,
            Err(e) => {
                error!("[Exports] Reply {}: {}", reply_id, e);
                if let Some(reply) = pending_replies().take(reply_id) {
                    reply.reply(None);
                }
                return false;
            }
        };
        match pending_replies().complete(reply_id, data) {
            Ok(()) => true,
            Err(e) => {
                error!("[Exports] {}", e);
                false
            }
        }
    }));

    result.unwrap_or_else(|_| {
        error!("[Exports] Reply {} panicked", reply_id);
        false
    })
}

/// Number of replies the native side still owes.
#[unsafe(no_mangle)]
pub extern "C" fn flutter_bridge_pending_replies() -> usize {
    catch_unwind(|| pending_replies().len()).unwrap_or_else(|_| {
        error!("[Exports] Counting pending replies panicked");
        0
    })
}
