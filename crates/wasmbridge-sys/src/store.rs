//! Store construction and WASI context attachment.

use std::ptr;

use wasmtime::Store;

use crate::engine::wasm_engine_t;
use crate::error::wasm_error_t;
use crate::wasi::{wasi_config_t, wasi_ctx_t};

/// Host data carried by every store: the context derived from an attached
/// WASI configuration, if any. Boxed so the context pointer handed to
/// callers stays stable across attachments.
pub(crate) struct StoreData {
    pub(crate) wasi: Option<Box<wasi_ctx_t>>,
}

/// Opaque store handle; owns the instance state of one execution session.
pub struct wasm_store_t {
    pub(crate) store: Store<StoreData>,
}

/// Constructs a store against `engine`.
///
/// # Safety
///
/// `engine` must be a live engine handle.
pub unsafe fn wasm_store_new(engine: *mut wasm_engine_t) -> *mut wasm_store_t {
    let engine = unsafe { &(*engine).engine };
    Box::into_raw(Box::new(wasm_store_t {
        store: Store::new(engine, StoreData { wasi: None }),
    }))
}

/// Destroys a store, freeing its descriptor table (and with it every
/// duplicate descriptor the table still holds). All context pointers
/// obtained from this store become invalid.
///
/// # Safety
///
/// `store` must be a live handle from [`wasm_store_new`], not used again.
pub unsafe fn wasm_store_delete(store: *mut wasm_store_t) {
    debug_assert!(!store.is_null());
    unsafe { drop(Box::from_raw(store)) };
}

/// Derives a context from `config` and attaches it to `store`. The
/// configuration is read, not consumed, and stays reusable. Attaching to an
/// already-configured store resets the existing context in place: earlier
/// context pointers remain valid and observe the reset, and the previous
/// table's duplicate descriptors are closed.
///
/// # Safety
///
/// `store` and `config` must be live handles.
pub unsafe fn wasm_store_set_wasi(
    store: *mut wasm_store_t,
    config: *const wasi_config_t,
) -> *mut wasm_error_t {
    let (store, config) = unsafe { (&mut *store, &*config) };
    let ctx = match config.derive_ctx() {
        Ok(ctx) => ctx,
        Err(e) => return e,
    };
    let data = store.store.data_mut();
    if let Some(slot) = data.wasi.as_deref_mut() {
        slot.reset(ctx);
        return ptr::null_mut();
    }
    data.wasi = Some(Box::new(wasi_ctx_t::new(ctx)));
    ptr::null_mut()
}

/// The store's current context, or null before any configuration was
/// attached. Repeated calls return the same pointer; it stays valid until
/// the store is deleted.
///
/// # Safety
///
/// `store` must be a live handle.
pub unsafe fn wasm_store_wasi_ctx(store: *mut wasm_store_t) -> *mut wasi_ctx_t {
    match unsafe { (*store).store.data_mut().wasi.as_deref_mut() } {
        Some(ctx) => ptr::from_mut(ctx),
        None => ptr::null_mut(),
    }
}
