/// Raw value of the invalid/released handle.
pub const NULL_HANDLE: i64 = 0;

/// Default prefix of the symbols exported by the native library
/// (`<prefix>_retain`, `<prefix>_release`, `<prefix>_dispatch_message`).
pub const DEFAULT_SYMBOL_PREFIX: &str = "flutter_swift";

pub const RETAIN_SUFFIX: &str = "_retain";
pub const RELEASE_SUFFIX: &str = "_release";
pub const DISPATCH_SUFFIX: &str = "_dispatch_message";

/// Environment variable holding the path of a JSON config file.
pub const CONFIG_ENV_VAR: &str = "FLUTTER_BRIDGE_CONFIG";

/// Default `env_logger` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Name of the finalization worker thread.
pub const CLEANER_THREAD_NAME: &str = "flutter-bridge-cleaner";
