//! Reference-count contribution on a foreign heap object.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::cleaner::{Cleanable, Cleaner};
use crate::constants::NULL_HANDLE;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::ForeignHandle;
use crate::native::NativeRuntime;

/// Where the release of a holder that was never closed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// On the thread that drops the holder.
    #[default]
    Inline,
    /// On the global [`Cleaner`] worker thread.
    Deferred,
}

/// Holds one retain on the object named by a [`ForeignHandle`].
///
/// The retain is taken in [`ForeignObjectHolder::create`] and given back
/// exactly once: by [`ForeignObjectHolder::close`], or when the holder is
/// dropped without being closed.
///
/// # Concurrency
///
/// Code that passes the handle to native code should hold an [`InUse`]
/// guard from [`ForeignObjectHolder::in_use`] for the length of the call. A
/// `close()` that lands while guards are live stops new uses at once but
/// leaves the release to the last guard, so the object is never released
/// under a running call. No lock is held across the call itself.
pub struct ForeignObjectHolder {
    handle: AtomicI64,
    // value at construction, kept for diagnostics after close
    retained: ForeignHandle,
    uses: Mutex<Uses>,
    cleanable: Cleanable,
}

#[derive(Debug, Default)]
struct Uses {
    active: usize,
    release_deferred: bool,
}

impl ForeignObjectHolder {
    pub fn create(raw: i64, runtime: Arc<dyn NativeRuntime>) -> BridgeResult<Self> {
        Self::create_with_policy(raw, runtime, DropPolicy::default())
    }

    pub fn create_with_policy(
        raw: i64,
        runtime: Arc<dyn NativeRuntime>,
        policy: DropPolicy,
    ) -> BridgeResult<Self> {
        let handle = ForeignHandle::new(raw)?;

        runtime.retain(handle);

        // capture the scalar handle and the runtime, never the holder
        let release = move || {
            debug!("[Holder] Releasing {}", handle);
            runtime.release(handle);
        };
        let cleanable = match policy {
            DropPolicy::Inline => Cleanable::inline(release),
            DropPolicy::Deferred => Cleaner::global().register(release),
        };

        debug!("[Holder] Retained {} ({:?})", handle, policy);
        Ok(Self {
            handle: AtomicI64::new(handle.raw()),
            retained: handle,
            uses: Mutex::new(Uses::default()),
            cleanable,
        })
    }

    /// The stored handle; [`ForeignHandle::NULL`] once closed.
    pub fn handle(&self) -> ForeignHandle {
        ForeignHandle::from_raw_unchecked(self.handle.load(Ordering::Acquire))
    }

    /// The stored handle, or `UseAfterClose` once closed.
    pub fn checked_handle(&self) -> BridgeResult<ForeignHandle> {
        let handle = self.handle();
        if handle.is_null() {
            return Err(BridgeError::UseAfterClose);
        }
        Ok(handle)
    }

    pub fn is_closed(&self) -> bool {
        self.handle().is_null()
    }

    pub fn drop_policy(&self) -> DropPolicy {
        if self.cleanable.is_deferred() {
            DropPolicy::Deferred
        } else {
            DropPolicy::Inline
        }
    }

    /// Pins the handle until the returned guard is dropped, or fails with
    /// `UseAfterClose`.
    pub fn in_use(&self) -> BridgeResult<InUse<'_>> {
        let mut uses = self.uses.lock();
        // read under the lock so a racing close() sees this use
        let handle = self.checked_handle()?;
        uses.active += 1;
        Ok(InUse {
            holder: self,
            handle,
        })
    }

    pub fn uses_in_flight(&self) -> usize {
        self.uses.lock().active
    }

    fn release(&self) -> BridgeResult<()> {
        if !self.cleanable.clean() {
            // cannot happen while the swap in close() guards the only other caller
            warn!("[Holder] Release of {} already ran", self.retained);
            return Err(BridgeError::DoubleRelease {
                handle: self.retained.raw(),
            });
        }
        Ok(())
    }

    /// Releases the foreign object now, or when the last [`InUse`] guard
    /// is dropped if any are live.
    ///
    /// Safe to call from several threads; only the first call releases.
    /// Later calls return `DoubleRelease` and touch nothing.
    pub fn close(&self) -> BridgeResult<()> {
        let previous = self.handle.swap(NULL_HANDLE, Ordering::AcqRel);
        if previous == NULL_HANDLE {
            warn!("[Holder] close() called again for {}", self.retained);
            return Err(BridgeError::DoubleRelease {
                handle: self.retained.raw(),
            });
        }

        {
            let mut uses = self.uses.lock();
            if uses.active > 0 {
                uses.release_deferred = true;
                debug!(
                    "[Holder] {} closed with {} use(s) in flight, release deferred",
                    self.retained, uses.active
                );
                return Ok(());
            }
        }
        self.release()
    }
}

/// Keeps a [`ForeignObjectHolder`]'s object retained while native code is
/// using it.
#[must_use]
pub struct InUse<'a> {
    holder: &'a ForeignObjectHolder,
    handle: ForeignHandle,
}

impl InUse<'_> {
    /// The handle as it was when the guard was taken.
    pub fn handle(&self) -> ForeignHandle {
        self.handle
    }
}

impl Drop for InUse<'_> {
    fn drop(&mut self) {
        let release_now = {
            let mut uses = self.holder.uses.lock();
            uses.active -= 1;
            uses.active == 0 && std::mem::take(&mut uses.release_deferred)
        };
        if release_now {
            debug!("[Holder] Last use of {} ended, releasing", self.handle);
            let _ = self.holder.release();
        }
    }
}

impl fmt::Debug for InUse<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InUse").field("handle", &self.handle).finish()
    }
}

impl fmt::Debug for ForeignObjectHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObjectHolder")
            .field("handle", &self.handle())
            .field("uses", &*self.uses.lock())
            .field("cleanable", &self.cleanable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::BinaryReply;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, i64)>>,
    }

    impl NativeRuntime for Recorder {
        fn retain(&self, handle: ForeignHandle) {
            self.calls.lock().push(("retain", handle.raw()));
        }

        fn release(&self, handle: ForeignHandle) {
            self.calls.lock().push(("release", handle.raw()));
        }

        fn dispatch_message(&self, _: ForeignHandle, _: Option<&[u8]>, reply: BinaryReply) {
            reply.reply(None);
        }
    }

    #[test]
    fn test_zero_handle_rejected_without_native_call() {
        let recorder = Arc::new(Recorder::default());
        let err = ForeignObjectHolder::create(0, recorder.clone()).unwrap_err();
        assert_eq!(err, BridgeError::InvalidHandle);
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn test_retain_then_release_on_close() {
        let recorder = Arc::new(Recorder::default());
        let holder = ForeignObjectHolder::create(0x10, recorder.clone()).unwrap();
        assert_eq!(*recorder.calls.lock(), vec![("retain", 0x10)]);

        holder.close().unwrap();
        assert!(holder.is_closed());
        assert_eq!(holder.handle(), ForeignHandle::NULL);
        assert_eq!(holder.checked_handle(), Err(BridgeError::UseAfterClose));

        drop(holder);
        assert_eq!(
            *recorder.calls.lock(),
            vec![("retain", 0x10), ("release", 0x10)]
        );
    }

    #[test]
    fn test_second_close_is_reported_not_released() {
        let recorder = Arc::new(Recorder::default());
        let holder = ForeignObjectHolder::create(0x20, recorder.clone()).unwrap();

        holder.close().unwrap();
        assert_eq!(
            holder.close(),
            Err(BridgeError::DoubleRelease { handle: 0x20 })
        );
        assert_eq!(recorder.calls.lock().len(), 2);
    }

    #[test]
    fn test_close_while_in_use_defers_release() {
        let recorder = Arc::new(Recorder::default());
        let holder = ForeignObjectHolder::create(0x40, recorder.clone()).unwrap();

        let first = holder.in_use().unwrap();
        let second = holder.in_use().unwrap();
        assert_eq!(first.handle().raw(), 0x40);

        holder.close().unwrap();
        assert!(holder.is_closed());
        assert_eq!(holder.in_use().unwrap_err(), BridgeError::UseAfterClose);
        assert_eq!(recorder.calls.lock().len(), 1);

        drop(first);
        assert_eq!(recorder.calls.lock().len(), 1);
        drop(second);
        assert_eq!(
            *recorder.calls.lock(),
            vec![("retain", 0x40), ("release", 0x40)]
        );
        assert_eq!(holder.uses_in_flight(), 0);

        drop(holder);
        assert_eq!(recorder.calls.lock().len(), 2);
    }

    #[test]
    fn test_guard_dropped_without_close_does_not_release() {
        let recorder = Arc::new(Recorder::default());
        let holder = ForeignObjectHolder::create(0x50, recorder.clone()).unwrap();

        drop(holder.in_use().unwrap());
        assert_eq!(*recorder.calls.lock(), vec![("retain", 0x50)]);

        drop(holder);
        assert_eq!(
            *recorder.calls.lock(),
            vec![("retain", 0x50), ("release", 0x50)]
        );
    }

    #[test]
    fn test_inline_drop_releases_original_value() {
        let recorder = Arc::new(Recorder::default());
        drop(ForeignObjectHolder::create(-0x30, recorder.clone()).unwrap());
        assert_eq!(
            *recorder.calls.lock(),
            vec![("retain", -0x30), ("release", -0x30)]
        );
    }
}
