//! Lifetime bridge for objects owned by a native runtime, and the binary
//! message plumbing that rides on it.
//!
//! - [`ForeignObjectHolder`] takes one retain on a native object named by an
//!   integer handle and gives it back exactly once, on `close()` or drop
//! - [`BinaryMessageHandler`] forwards binary messages and their reply to
//!   the native object it holds
//! - [`BinaryMessenger`] routes messages by channel name to handlers
//! - [`NativeLibrary`] loads the native side's retain/release/dispatch symbols
//! - [`Cleaner`] runs deferred releases on a worker thread

mod cleaner;
mod config;
mod constants;
mod error;
mod exports;
mod handle;
mod holder;
mod message_handler;
mod messenger;
mod native;
mod native_library;
mod payload;
mod reply;

use std::sync::Once;

use env_logger::{Builder, Env};

pub use cleaner::{Cleanable, Cleaner, CleanupAction};
pub use config::BridgeConfig;
pub use constants::{CONFIG_ENV_VAR, DEFAULT_SYMBOL_PREFIX, NULL_HANDLE};
pub use error::{BridgeError, BridgeResult};
pub use exports::{flutter_bridge_pending_replies, flutter_bridge_reply};
pub use handle::ForeignHandle;
pub use holder::{DropPolicy, ForeignObjectHolder, InUse};
pub use message_handler::BinaryMessageHandler;
pub use messenger::{BinaryMessenger, NO_CONNECTION};
pub use native::NativeRuntime;
pub use native_library::{NativeLibrary, default_library_path};
pub use payload::RawPayload;
pub use reply::{BinaryReply, PendingReplies, ReplyId, pending_replies};

// the host may load, unload and reload us within one process, and
// env_logger refuses a second init
static LOGGER_INIT: Once = Once::new();

/// Initializes `env_logger` once per process. `RUST_LOG` wins over `filter`.
pub fn init_logging(filter: &str) {
    LOGGER_INIT.call_once(|| {
        let _ = Builder::from_env(Env::default().default_filter_or(filter)).try_init();
    });
}
