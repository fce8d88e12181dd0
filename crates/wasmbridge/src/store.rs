//! Execution sessions and their WASI context.

use std::os::fd::AsFd;
use std::sync::Arc;

use tracing::{debug, info};

use wasmbridge_sys as sys;

use crate::config::WasiConfig;
use crate::ctx::{AccessMode, WasiCtx};
use crate::engine::Engine;
use crate::error::{BridgeError, message_from_raw};
use crate::handle::{NativeHandle, NotSync};

pub(crate) struct StoreShared {
    pub(crate) handle: NativeHandle<sys::wasm_store_t>,
}

/// One execution session against an [`Engine`].
///
/// A store moves through four states: unconfigured at creation; configured
/// once a [`WasiConfig`] is attached with [`set_wasi`](Self::set_wasi);
/// active while instances run in it (a configured store can host any number
/// of instantiations); finalized when dropped or explicitly
/// [`close`](Self::close)d. Finalization is terminal: contexts, instances,
/// and functions borrowed from the store are invalid afterwards and panic
/// when used.
///
/// A store is exclusively owned by one logical session and holds at most
/// one WASI context at a time. It keeps a counted reference to its engine,
/// so the engine outlives every store derived from it.
pub struct Store {
    shared: Arc<StoreShared>,
    engine: Engine,
    _not_sync: NotSync,
}

impl Store {
    /// Create an unconfigured store.
    pub fn new(engine: &Engine) -> Self {
        let ptr = unsafe { sys::wasm_store_new(engine.raw()) };
        debug!("store created");
        Self {
            shared: Arc::new(StoreShared {
                handle: NativeHandle::new(ptr, sys::wasm_store_delete),
            }),
            engine: engine.clone(),
            _not_sync: NotSync::new(),
        }
    }

    /// Attach `config`'s accumulated settings, deriving this store's WASI
    /// context. The configuration is read, not consumed: it stays valid for
    /// further stores and may be dropped once the last store is configured.
    ///
    /// Attaching to an already-configured store resets the context table;
    /// previously retrieved [`WasiCtx`] values observe the reset. Host
    /// descriptors bound in the old table are not closed (only this
    /// layer's duplicates are).
    ///
    /// # Errors
    ///
    /// Returns an error if a recorded setting cannot be applied, such as a stdio
    /// redirect path or preopen directory that has become unusable since
    /// it was set. The store is left unconfigured (or on its previous
    /// context) then.
    pub fn set_wasi(&self, config: &WasiConfig) -> Result<(), BridgeError> {
        let err = unsafe { sys::wasm_store_set_wasi(self.shared.handle.borrow(), config.raw()) };
        if err.is_null() {
            info!("WASI context attached to store");
            Ok(())
        } else {
            Err(BridgeError::wasi_config(message_from_raw(err)))
        }
    }

    /// The store's current WASI context, or `None` before any
    /// configuration was attached.
    ///
    /// Repeated calls return the same logical context, not fresh copies: a
    /// descriptor bound through one retrieval is visible through every
    /// other.
    pub fn wasi_ctx(&self) -> Option<WasiCtx> {
        let raw = unsafe { sys::wasm_store_wasi_ctx(self.shared.handle.borrow()) };
        if raw.is_null() {
            None
        } else {
            Some(WasiCtx::from_store(raw, Arc::clone(&self.shared)))
        }
    }

    /// Convenience for [`WasiCtx::insert_file`] on the store's current
    /// context.
    ///
    /// # Errors
    ///
    /// Returns an error if the store has no WASI context or the binding
    /// fails.
    pub fn insert_file(
        &self,
        guest_fd: u32,
        file: &impl AsFd,
        mode: AccessMode,
    ) -> Result<(), BridgeError> {
        self.require_ctx()?.insert_file(guest_fd, file, mode)
    }

    /// Convenience for [`WasiCtx::push_file`] on the store's current
    /// context.
    ///
    /// # Errors
    ///
    /// Returns an error if the store has no WASI context or the binding
    /// fails.
    pub fn push_file(&self, file: &impl AsFd, mode: AccessMode) -> Result<u32, BridgeError> {
        self.require_ctx()?.push_file(file, mode)
    }

    fn require_ctx(&self) -> Result<WasiCtx, BridgeError> {
        self.wasi_ctx()
            .ok_or_else(|| BridgeError::file_binding("store has no WASI context"))
    }

    /// The engine this store was created against.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn raw(&self) -> *mut sys::wasm_store_t {
        self.shared.handle.borrow()
    }

    pub(crate) fn shared(&self) -> &Arc<StoreShared> {
        &self.shared
    }

    /// Finalize the store now instead of waiting for deferred
    /// finalization. Terminal: every context, instance, and function
    /// borrowed from this store is invalid afterwards.
    pub fn close(self) {
        self.shared.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_moves_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<Store>();
        assert_send::<crate::WasiCtx>();
        assert_send::<crate::WasiConfig>();
    }

    #[test]
    fn test_store_starts_unconfigured() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        assert!(store.wasi_ctx().is_none());
    }

    #[test]
    fn test_set_wasi_configures_the_store() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        let config = WasiConfig::new();

        store.set_wasi(&config).unwrap();
        assert!(store.wasi_ctx().is_some());
    }

    #[test]
    fn test_binding_on_unconfigured_store_is_an_error() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        let file = tempfile::tempfile().unwrap();

        let result = store.insert_file(7, &file, AccessMode::READ_WRITE);
        assert!(matches!(result, Err(BridgeError::FileBinding { .. })));
    }

    #[test]
    fn test_config_reusable_and_disposable_after_attach() {
        let engine = Engine::new();
        let config = WasiConfig::new();

        let first = Store::new(&engine);
        let second = Store::new(&engine);
        first.set_wasi(&config).unwrap();
        second.set_wasi(&config).unwrap();

        // Disposing the configuration must not disturb the stores built
        // from it.
        config.close();
        assert!(first.wasi_ctx().is_some());
        assert!(second.wasi_ctx().is_some());
    }

    #[test]
    fn test_push_file_selects_unused_descriptors() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        store.set_wasi(&WasiConfig::new()).unwrap();

        let file = tempfile::tempfile().unwrap();
        store.insert_file(9, &file, AccessMode::READ_WRITE).unwrap();

        let a = store.push_file(&file, AccessMode::READ_WRITE).unwrap();
        let b = store.push_file(&file, AccessMode::READ_WRITE).unwrap();
        assert_ne!(a, 9);
        assert_ne!(b, 9);
        assert_ne!(a, b);
    }

    #[test]
    fn test_context_identity_across_retrievals() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        store.set_wasi(&WasiConfig::new()).unwrap();

        let file = tempfile::tempfile().unwrap();
        let first = store.wasi_ctx().unwrap();
        // Occupy the first non-stdio slot, the one allocation would reach
        // for next.
        first.insert_file(3, &file, AccessMode::WRITE).unwrap();

        // A later retrieval sees the binding made through the earlier one:
        // push must skip the occupied descriptor.
        let second = store.wasi_ctx().unwrap();
        let pushed = second.push_file(&file, AccessMode::WRITE).unwrap();
        assert_ne!(pushed, 3);
    }

    #[test]
    fn test_insert_overwrites_silently() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        store.set_wasi(&WasiConfig::new()).unwrap();

        let first = tempfile::tempfile().unwrap();
        let second = tempfile::tempfile().unwrap();
        store.insert_file(5, &first, AccessMode::READ).unwrap();
        store.insert_file(5, &second, AccessMode::READ).unwrap();

        // The replaced binding never closes the caller's descriptor; the
        // host handle must still be usable.
        use std::io::Write;
        let mut still_mine = &first;
        still_mine.write_all(b"still open").unwrap();
    }

    #[test]
    #[should_panic(expected = "access mode must grant")]
    fn test_empty_access_mode_panics() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        store.set_wasi(&WasiConfig::new()).unwrap();

        let file = tempfile::tempfile().unwrap();
        let _ = store.insert_file(3, &file, AccessMode::empty());
    }

    #[test]
    fn test_reattaching_resets_the_table() {
        let engine = Engine::new();
        let store = Store::new(&engine);
        store.set_wasi(&WasiConfig::new()).unwrap();

        let file = tempfile::tempfile().unwrap();
        let fd = store.push_file(&file, AccessMode::READ_WRITE).unwrap();

        store.set_wasi(&WasiConfig::new()).unwrap();
        // The fresh table has forgotten the old binding, so the same
        // number can come back out of push.
        let fd_again = store.push_file(&file, AccessMode::READ_WRITE).unwrap();
        assert_eq!(fd, fd_again);
    }
}
