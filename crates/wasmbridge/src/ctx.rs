//! The live sandbox's descriptor table.

use std::os::fd::{AsFd, AsRawFd};
use std::sync::Arc;

use bitflags::bitflags;
use tracing::debug;

use wasmbridge_sys as sys;

use crate::error::{BridgeError, message_from_raw};
use crate::store::StoreShared;

bitflags! {
    /// What a guest may do through a bound descriptor.
    ///
    /// A two-bit capability set: read, write, or their union. The empty set
    /// is an invalid sentinel, never a valid binding. The bit layout is
    /// this runtime's own convention and carries no numeric relationship
    /// to any OS-level open flags; only the union semantics are meaningful.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u32 {
        /// Guest reads are permitted.
        const READ = sys::WASI_FILE_ACCESS_READ;
        /// Guest writes are permitted.
        const WRITE = sys::WASI_FILE_ACCESS_WRITE;
        /// Both directions.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// One sandbox's table mapping guest descriptor numbers to host files.
///
/// Obtained from [`Store::wasi_ctx`](crate::Store::wasi_ctx); every
/// retrieval within one store's lifetime yields the same logical table, so
/// a binding made through one retrieval is visible through another. The
/// value holds a counted reference to its store: the table cannot be
/// finalized while a `WasiCtx` is outstanding, and using one after the
/// store was explicitly closed panics.
///
/// Bound descriptors are duplicates: the sandbox and the caller each own an
/// independent handle to the same open file description (they share a file
/// offset, so guest writes append after host writes and vice versa). This
/// layer never closes the caller's descriptor, neither when a binding is
/// overwritten nor when the table is torn down.
pub struct WasiCtx {
    raw: *mut sys::wasi_ctx_t,
    store: Arc<StoreShared>,
}

// The raw pointer targets storage owned by the store handle this value
// also holds, so moving the value between threads moves nothing it does
// not already keep alive. The type stays !Sync through the pointer field.
unsafe impl Send for WasiCtx {}

impl WasiCtx {
    pub(crate) fn from_store(raw: *mut sys::wasi_ctx_t, store: Arc<StoreShared>) -> Self {
        Self { raw, store }
    }

    /// Bind `file` at the caller-chosen `guest_fd`, silently replacing any
    /// prior binding at that index.
    ///
    /// # Panics
    ///
    /// Panics if `mode` is the empty set: an empty capability grant is a
    /// programming error, rejected before anything crosses the boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if `file`'s descriptor is unusable or the runtime
    /// rejects the binding. A failure leaves every other binding usable.
    pub fn insert_file(
        &self,
        guest_fd: u32,
        file: &impl AsFd,
        mode: AccessMode,
    ) -> Result<(), BridgeError> {
        assert!(
            !mode.is_empty(),
            "access mode must grant read, write, or both"
        );
        let host_fd = file.as_fd().as_raw_fd();
        let err =
            unsafe { sys::wasi_ctx_insert_file(self.raw(), guest_fd, host_fd, mode.bits()) };
        if err.is_null() {
            debug!(guest_fd, host_fd, "host file bound in sandbox");
            Ok(())
        } else {
            Err(BridgeError::file_binding(message_from_raw(err)))
        }
    }

    /// Bind `file` at a guest descriptor chosen by the runtime, returned to
    /// the caller. The descriptor is guaranteed unused immediately prior to
    /// the call; the selection policy is the runtime's own, so callers must
    /// treat the number as non-deterministic and only ever reuse the
    /// returned value.
    ///
    /// # Panics
    ///
    /// Panics if `mode` is the empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if `file`'s descriptor is unusable or the table
    /// cannot allocate.
    pub fn push_file(&self, file: &impl AsFd, mode: AccessMode) -> Result<u32, BridgeError> {
        assert!(
            !mode.is_empty(),
            "access mode must grant read, write, or both"
        );
        let host_fd = file.as_fd().as_raw_fd();
        let mut guest_fd = 0u32;
        let err =
            unsafe { sys::wasi_ctx_push_file(self.raw(), host_fd, mode.bits(), &mut guest_fd) };
        if err.is_null() {
            debug!(guest_fd, host_fd, "host file pushed into sandbox");
            Ok(guest_fd)
        } else {
            Err(BridgeError::file_binding(message_from_raw(err)))
        }
    }

    /// Liveness gate: the store handle borrow panics if the store was
    /// released, and counts as the dereference pressure point for this
    /// call.
    fn raw(&self) -> *mut sys::wasi_ctx_t {
        let _ = self.store.handle.borrow();
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_union() {
        assert_eq!(AccessMode::READ | AccessMode::WRITE, AccessMode::READ_WRITE);
        assert!(AccessMode::READ_WRITE.contains(AccessMode::READ));
        assert!(AccessMode::READ_WRITE.contains(AccessMode::WRITE));
        assert!(!AccessMode::READ.contains(AccessMode::WRITE));
    }

    #[test]
    fn test_empty_access_mode_is_invalid_sentinel() {
        assert!(AccessMode::empty().is_empty());
        assert_ne!(AccessMode::empty(), AccessMode::READ);
    }
}
