//! Error objects and caller-freed byte vectors.
//!
//! Fallible boundary calls return `*mut wasm_error_t`: null on success, an
//! owned error object on failure. The caller extracts the message through
//! [`wasm_error_message`] and frees the object with [`wasm_error_delete`].

use std::mem::ManuallyDrop;
use std::ptr;

/// Error reported by a boundary call. Owns its message text.
pub struct wasm_error_t {
    message: String,
}

impl wasm_error_t {
    /// Boxes a new error and leaks it to the caller.
    pub(crate) fn raise(message: impl Into<String>) -> *mut wasm_error_t {
        Box::into_raw(Box::new(wasm_error_t {
            message: message.into(),
        }))
    }
}

/// Byte vector whose storage is owned by this boundary until
/// [`wasm_byte_vec_delete`] runs. An empty vector carries a null data
/// pointer and never an allocation.
pub struct wasm_byte_vec_t {
    data: *mut u8,
    len: usize,
    cap: usize,
}

impl wasm_byte_vec_t {
    /// An empty vector, suitable as an out-parameter target.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    /// Moves `bytes` into the vector, transferring ownership of the
    /// allocation to the boundary. Any previous contents are leaked, so
    /// only fill an empty vector.
    pub(crate) fn fill(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        let mut bytes = ManuallyDrop::new(bytes);
        self.data = bytes.as_mut_ptr();
        self.len = bytes.len();
        self.cap = bytes.capacity();
    }

    /// View of the contents. Valid until the vector is deleted or refilled.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            &[]
        } else {
            // Fields are only ever set from a live Vec in `fill`.
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }
    }
}

/// Copies the error's message into `out`. The error object stays owned by
/// the caller and still requires [`wasm_error_delete`].
///
/// # Safety
///
/// `err` must be a live error returned by this boundary; `out` must point
/// at an empty [`wasm_byte_vec_t`].
pub unsafe fn wasm_error_message(err: *const wasm_error_t, out: *mut wasm_byte_vec_t) {
    unsafe {
        debug_assert!(!err.is_null() && !out.is_null());
        (*out).fill((*err).message.clone().into_bytes());
    }
}

/// Frees an error object. Null is accepted and ignored.
///
/// # Safety
///
/// `err` must be null or a live error returned by this boundary, and must
/// not be used afterwards.
pub unsafe fn wasm_error_delete(err: *mut wasm_error_t) {
    if !err.is_null() {
        unsafe { drop(Box::from_raw(err)) };
    }
}

/// Frees a byte vector's storage and resets it to empty. Safe to call on an
/// already-empty vector.
///
/// # Safety
///
/// `vec` must point at a vector filled by this boundary (or empty).
pub unsafe fn wasm_byte_vec_delete(vec: *mut wasm_byte_vec_t) {
    unsafe {
        debug_assert!(!vec.is_null());
        let v = &mut *vec;
        if !v.data.is_null() {
            drop(Vec::from_raw_parts(v.data, v.len, v.cap));
            v.data = ptr::null_mut();
            v.len = 0;
            v.cap = 0;
        }
    }
}
