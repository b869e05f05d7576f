//! C-ABI representation of an optional byte payload.
//!
//! Flutter distinguishes a message with no body from a message whose body is
//! zero bytes long, so the pointer/length pair carries an explicit `present`
//! flag.

use std::{ptr, slice};

use crate::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawPayload {
    pub data: *const u8,
    pub len: usize,
    pub present: bool,
}

impl RawPayload {
    pub const fn absent() -> Self {
        Self {
            data: ptr::null(),
            len: 0,
            present: false,
        }
    }

    /// Borrows `bytes` for the duration of a native call.
    pub fn from_slice(bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(b) => Self {
                data: b.as_ptr(),
                len: b.len(),
                present: true,
            },
            None => Self::absent(),
        }
    }

    /// # Safety
    ///
    /// When `present` and `len > 0`, `data` must point to `len` readable bytes
    /// that outlive the returned slice.
    pub unsafe fn as_slice<'a>(&self) -> BridgeResult<Option<&'a [u8]>> {
        if !self.present {
            return Ok(None);
        }
        if self.len == 0 {
            return Ok(Some(&[]));
        }
        if self.data.is_null() {
            return Err(BridgeError::NullPayload);
        }
        Ok(Some(unsafe { slice::from_raw_parts(self.data, self.len) }))
    }

    /// Copies the payload into an owned buffer.
    ///
    /// # Safety
    ///
    /// Same requirements as [`RawPayload::as_slice`].
    pub unsafe fn to_vec(&self) -> BridgeResult<Option<Vec<u8>>> {
        Ok(unsafe { self.as_slice()? }.map(<[u8]>::to_vec))
    }
}

impl Default for RawPayload {
    fn default() -> Self {
        Self::absent()
    }
}
