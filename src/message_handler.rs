//! Binary message handler backed by a native object.

use std::fmt;
use std::sync::Arc;

use log::{trace, warn};

use crate::error::BridgeResult;
use crate::handle::ForeignHandle;
use crate::holder::{DropPolicy, ForeignObjectHolder};
use crate::native::NativeRuntime;
use crate::reply::BinaryReply;

/// Forwards incoming binary messages to the native object it holds.
///
/// Lifetime follows [`ForeignObjectHolder`]: one retain on creation, one
/// release on close or drop.
pub struct BinaryMessageHandler {
    holder: ForeignObjectHolder,
    runtime: Arc<dyn NativeRuntime>,
}

impl BinaryMessageHandler {
    pub fn new(raw: i64, runtime: Arc<dyn NativeRuntime>) -> BridgeResult<Self> {
        Self::with_policy(raw, runtime, DropPolicy::default())
    }

    pub fn with_policy(
        raw: i64,
        runtime: Arc<dyn NativeRuntime>,
        policy: DropPolicy,
    ) -> BridgeResult<Self> {
        let holder = ForeignObjectHolder::create_with_policy(raw, runtime.clone(), policy)?;
        Ok(Self { holder, runtime })
    }

    /// Hands `payload` and `reply` to native code. `None` means the message
    /// has no body, which is not the same as an empty body.
    ///
    /// After close the reply is answered with `None` and `UseAfterClose` is
    /// returned; the sentinel handle never reaches native code.
    ///
    /// # Concurrency
    ///
    /// The native object stays retained until `dispatch_message` returns.
    /// A [`close`](Self::close) from another thread, or from native code
    /// inside the dispatch, refuses later messages right away and releases
    /// once the dispatch is done.
    pub fn on_message(&self, payload: Option<&[u8]>, reply: BinaryReply) -> BridgeResult<()> {
        let in_use = match self.holder.in_use() {
            Ok(in_use) => in_use,
            Err(e) => {
                warn!("[Message Handler] Message received after close, dropping it");
                reply.reply(None);
                return Err(e);
            }
        };

        trace!(
            "[Message Handler] Forwarding {} to {}",
            payload.map_or_else(|| "no payload".to_string(), |p| format!("{} bytes", p.len())),
            in_use.handle()
        );
        self.runtime.dispatch_message(in_use.handle(), payload, reply);
        Ok(())
    }

    pub fn handle(&self) -> ForeignHandle {
        self.holder.handle()
    }

    pub fn is_closed(&self) -> bool {
        self.holder.is_closed()
    }

    pub fn close(&self) -> BridgeResult<()> {
        self.holder.close()
    }

    pub fn holder(&self) -> &ForeignObjectHolder {
        &self.holder
    }
}

impl fmt::Debug for BinaryMessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryMessageHandler")
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}
