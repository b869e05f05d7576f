//! Bridge configuration, read from JSON.

use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::constants::{CONFIG_ENV_VAR, DEFAULT_LOG_FILTER, DEFAULT_SYMBOL_PREFIX};
use crate::error::BridgeResult;
use crate::holder::{DropPolicy, ForeignObjectHolder};
use crate::message_handler::BinaryMessageHandler;
use crate::native::NativeRuntime;
use crate::native_library::NativeLibrary;

/// ```json
/// {
///   "library_path": "/data/app/lib/arm64/libFlutterSwift.so",
///   "symbol_prefix": "flutter_swift",
///   "drop_policy": "deferred",
///   "log_filter": "debug"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Native library to load; `lib<symbol_prefix>` beside the executable when unset.
    pub library_path: Option<PathBuf>,
    pub symbol_prefix: String,
    pub drop_policy: DropPolicy,
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            symbol_prefix: DEFAULT_SYMBOL_PREFIX.to_string(),
            drop_policy: DropPolicy::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse bridge config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading bridge config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }

    /// Reads the file named by `FLUTTER_BRIDGE_CONFIG`, or returns the defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                info!("[Config] Loading {}", path.display());
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Starts logging with `log_filter` unless `RUST_LOG` says otherwise.
    pub fn init_logging(&self) {
        crate::init_logging(&self.log_filter);
    }

    pub fn load_library(&self) -> Result<Arc<NativeLibrary>> {
        NativeLibrary::get_for(self.library_path.as_deref(), &self.symbol_prefix)
    }

    /// A holder whose unclosed drop follows `drop_policy`.
    pub fn holder(
        &self,
        raw: i64,
        runtime: Arc<dyn NativeRuntime>,
    ) -> BridgeResult<ForeignObjectHolder> {
        ForeignObjectHolder::create_with_policy(raw, runtime, self.drop_policy)
    }

    /// A message handler whose unclosed drop follows `drop_policy`.
    pub fn handler(
        &self,
        raw: i64,
        runtime: Arc<dyn NativeRuntime>,
    ) -> BridgeResult<BinaryMessageHandler> {
        BinaryMessageHandler::with_policy(raw, runtime, self.drop_policy)
    }
}
