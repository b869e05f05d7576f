//! Opaque handle naming an object owned by the native runtime.

use std::fmt;

use crate::constants::NULL_HANDLE;
use crate::error::{BridgeError, BridgeResult};

/// Integer handle to a native heap object.
///
/// Only meaningful when passed back to the native side; it is never
/// dereferenced here. `0` is the invalid/released sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ForeignHandle(i64);

impl ForeignHandle {
    pub const NULL: Self = Self(NULL_HANDLE);

    /// Wraps a non-sentinel handle value.
    pub fn new(raw: i64) -> BridgeResult<Self> {
        if raw == NULL_HANDLE {
            return Err(BridgeError::InvalidHandle);
        }
        Ok(Self(raw))
    }

    pub(crate) const fn from_raw_unchecked(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_HANDLE
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignHandle({:#x})", self.0)
    }
}

impl fmt::Display for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_rejected() {
        assert_eq!(ForeignHandle::new(0), Err(BridgeError::InvalidHandle));
        assert!(ForeignHandle::NULL.is_null());
    }

    #[test]
    fn test_negative_values_are_valid() {
        // pointer-width values may have the top bit set
        let handle = ForeignHandle::new(-8).unwrap();
        assert_eq!(handle.raw(), -8);
        assert!(!handle.is_null());
    }
}
