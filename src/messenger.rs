//! Channel name to message handler registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::error::{BridgeError, BridgeResult};
use crate::message_handler::BinaryMessageHandler;
use crate::reply::BinaryReply;

/// Connection id returned when a channel's handler is cleared.
pub const NO_CONNECTION: u64 = 0;

struct Registration {
    connection: u64,
    handler: Arc<BinaryMessageHandler>,
}

/// Routes messages sent on a named channel to the handler registered for it.
///
/// Replacing or removing a handler drops the messenger's reference to it;
/// its native object is released once no sender still holds it.
#[derive(Default)]
pub struct BinaryMessenger {
    handlers: RwLock<HashMap<String, Registration>>,
    last_connection: AtomicU64,
}

impl BinaryMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` on `channel`, or clears the channel when `None`.
    ///
    /// Returns a fresh connection id, or [`NO_CONNECTION`] when clearing.
    pub fn set_message_handler(
        &self,
        channel: &str,
        handler: Option<BinaryMessageHandler>,
    ) -> u64 {
        let Some(handler) = handler else {
            let removed = self.handlers.write().remove(channel);
            if removed.is_some() {
                info!("[Messenger] Cleared handler on '{}'", channel);
            }
            return NO_CONNECTION;
        };

        let connection = self
            .last_connection
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);
        let registration = Registration {
            connection,
            handler: Arc::new(handler),
        };
        // drop the replaced handler outside the lock, it may release natively
        let replaced = self
            .handlers
            .write()
            .insert(channel.to_string(), registration);
        info!(
            "[Messenger] Handler set on '{}' (connection {})",
            channel, connection
        );
        drop(replaced);
        connection
    }

    /// Delivers `message` to the handler on `channel`.
    pub fn send(
        &self,
        channel: &str,
        message: Option<&[u8]>,
        reply: Option<BinaryReply>,
    ) -> BridgeResult<()> {
        let reply = reply.unwrap_or_else(BinaryReply::noop);
        let Some(handler) = self.handler(channel) else {
            warn!("[Messenger] No handler on '{}', message dropped", channel);
            reply.reply(None);
            return Err(BridgeError::UnknownChannel {
                channel: channel.to_string(),
            });
        };

        debug!(
            "[Messenger] Sending on '{}' ({} bytes)",
            channel,
            message.map_or(0, <[u8]>::len)
        );
        handler.on_message(message, reply)
    }

    /// Removes the handler installed under `connection`, if it is still the
    /// current one for its channel.
    pub fn clean_up_connection(&self, connection: u64) -> bool {
        if connection == NO_CONNECTION {
            return false;
        }
        let mut handlers = self.handlers.write();
        let channel = handlers
            .iter()
            .find(|(_, r)| r.connection == connection)
            .map(|(c, _)| c.clone());
        let removed = channel.and_then(|c| handlers.remove(&c));
        drop(handlers);

        match removed {
            Some(_) => {
                debug!("[Messenger] Cleaned up connection {}", connection);
                true
            }
            None => false,
        }
    }

    pub fn handler(&self, channel: &str) -> Option<Arc<BinaryMessageHandler>> {
        self.handlers
            .read()
            .get(channel)
            .map(|r| r.handler.clone())
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        self.handlers.read().contains_key(channel)
    }
}

impl std::fmt::Debug for BinaryMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("BinaryMessenger")
            .field("channels", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
