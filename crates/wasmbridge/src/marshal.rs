//! Keep-alive marshaling of host strings for foreign calls.

use std::ffi::{CString, c_char};
use std::path::Path;

use crate::error::BridgeError;

/// A host string array converted to NUL-terminated buffers plus a
/// contiguous pointer array, for the duration of one foreign call.
///
/// The value owns every allocation it built. Bind it to a local that lives
/// until the foreign call returns: the pointers handed across the boundary
/// are only valid while the value is alive, and everything is freed when
/// it drops, on the error path as much as on success.
pub(crate) struct CStringArray {
    strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl CStringArray {
    /// Converts `items`, one buffer per element.
    ///
    /// # Errors
    ///
    /// An interior NUL byte in any element is a marshaling error; nothing
    /// is sent across the boundary then.
    pub(crate) fn new<S: AsRef<str>>(items: &[S]) -> Result<Self, BridgeError> {
        let mut strings = Vec::with_capacity(items.len());
        for item in items {
            strings.push(CString::new(item.as_ref()).map_err(|_| {
                BridgeError::invalid_arg("string contains an interior NUL byte")
            })?);
        }
        let ptrs = strings.iter().map(|s| s.as_ptr()).collect();
        Ok(Self { strings, ptrs })
    }

    /// Pointer to the first element, or null for an empty array. The
    /// boundary distinguishes a null array with zero count from a pointer
    /// to an empty allocation; only the former is valid.
    pub(crate) fn as_ptr(&self) -> *const *const c_char {
        if self.ptrs.is_empty() {
            std::ptr::null()
        } else {
            self.ptrs.as_ptr()
        }
    }

    /// Element count.
    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }
}

/// Converts one string for a foreign call.
pub(crate) fn c_string(text: &str) -> Result<CString, BridgeError> {
    CString::new(text).map_err(|_| BridgeError::invalid_arg("string contains an interior NUL byte"))
}

/// Converts one path for a foreign call. Paths cross the boundary as UTF-8.
pub(crate) fn c_path(path: &Path) -> Result<CString, BridgeError> {
    let text = path
        .to_str()
        .ok_or_else(|| BridgeError::invalid_arg("path is not valid UTF-8"))?;
    c_string(text)
}
