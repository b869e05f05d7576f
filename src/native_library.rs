use anyhow::{Context, Result, anyhow};
use libloading::{Library, Symbol};
use log::{debug, info};
use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::constants::{DISPATCH_SUFFIX, RELEASE_SUFFIX, RETAIN_SUFFIX};
use crate::handle::ForeignHandle;
use crate::native::NativeRuntime;
use crate::payload::RawPayload;
use crate::reply::{BinaryReply, ReplyId, pending_replies};

/// A native library exporting `<prefix>_retain`, `<prefix>_release` and
/// `<prefix>_dispatch_message`.
///
/// The library stays loaded for the life of the process.
#[derive(Debug)]
pub struct NativeLibrary {
    _lib: &'static Library,
    path: PathBuf,
    prefix: String,

    pub retain: Symbol<'static, unsafe extern "C" fn(handle: i64)>,
    pub release: Symbol<'static, unsafe extern "C" fn(handle: i64)>,
    pub dispatch_message: Symbol<
        'static,
        unsafe extern "C" fn(handle: i64, payload: RawPayload, reply_id: ReplyId),
    >,
}

static LIBRARY_CACHE: Lazy<Mutex<HashMap<(PathBuf, String), Arc<NativeLibrary>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// `lib<prefix>.so` / `<prefix>.dll` / `lib<prefix>.dylib` beside the executable.
pub fn default_library_path(prefix: &str) -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()
        .context("Failed to get current exe path")?
        .parent()
        .map(PathBuf::from)
        .context("Exe has no parent directory")?;
    Ok(exe_dir.join(libloading::library_filename(prefix)))
}

impl NativeLibrary {
    pub fn load(path: &Path, prefix: &str) -> Result<Self> {
        let lib_static: &'static Library = Box::leak(Box::new(
            unsafe { Library::new(path) }
                .with_context(|| format!("Failed to load {}", path.display()))?,
        ));

        macro_rules! load_symbol {
            ($lib:expr, $suffix:expr) => {{
                let name = format!("{}{}\0", prefix, $suffix);
                unsafe { $lib.get(name.as_bytes()) }.with_context(|| {
                    format!(
                        "Missing symbol: {} in {}",
                        name.trim_end_matches('\0'),
                        path.display()
                    )
                })
            }};
        }

        let library = NativeLibrary {
            _lib: lib_static,
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
            retain: load_symbol!(lib_static, RETAIN_SUFFIX)?,
            release: load_symbol!(lib_static, RELEASE_SUFFIX)?,
            dispatch_message: load_symbol!(lib_static, DISPATCH_SUFFIX)?,
        };
        info!(
            "[Native Library] Loaded {} (prefix `{}`)",
            path.display(),
            prefix
        );
        Ok(library)
    }

    /// Loads `path` once per `(path, prefix)` and shares it afterwards.
    pub fn get_for(path: Option<&Path>, prefix: &str) -> Result<Arc<Self>> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_library_path(prefix)?,
        };
        let key = (path, prefix.to_string());

        let mut cache = LIBRARY_CACHE
            .lock()
            .map_err(|_| anyhow!("Failed to acquire native library cache lock"))?;

        if let Some(existing) = cache.get(&key) {
            return Ok(existing.clone());
        }

        let library = Self::load(&key.0, prefix).with_context(|| {
            format!("Failed to load native library from {}", key.0.display())
        })?;
        let arc_library = Arc::new(library);
        cache.insert(key, arc_library.clone());
        Ok(arc_library)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl NativeRuntime for NativeLibrary {
    fn retain(&self, handle: ForeignHandle) {
        unsafe { (self.retain)(handle.raw()) };
    }

    fn release(&self, handle: ForeignHandle) {
        unsafe { (self.release)(handle.raw()) };
    }

    fn dispatch_message(&self, handle: ForeignHandle, payload: Option<&[u8]>, reply: BinaryReply) {
        park_and_dispatch(handle, payload, reply, |handle, raw, reply_id| unsafe {
            (self.dispatch_message)(handle, raw, reply_id)
        });
    }
}

/// Parks `reply` in [`pending_replies`] and hands the message to `dispatch`
/// in its C form. Native code answers later through
/// `flutter_bridge_reply(reply_id, ..)`.
///
/// `payload` is only borrowed for the duration of `dispatch`.
fn park_and_dispatch<F>(
    handle: ForeignHandle,
    payload: Option<&[u8]>,
    reply: BinaryReply,
    dispatch: F,
) -> ReplyId
where
    F: FnOnce(i64, RawPayload, ReplyId),
{
    let reply_id = pending_replies().insert(reply);
    let raw = RawPayload::from_slice(payload);
    debug!(
        "[Native Library] Dispatching {} bytes to {} (reply {})",
        raw.len, handle, reply_id
    );
    dispatch(handle.raw(), raw, reply_id);
    reply_id
}
