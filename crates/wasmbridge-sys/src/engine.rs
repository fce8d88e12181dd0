//! Engine construction and teardown.

use wasmtime::Engine;

/// Opaque engine handle. The engine is immutable once constructed and one
/// engine may back any number of stores.
pub struct wasm_engine_t {
    pub(crate) engine: Engine,
}

/// Constructs the process-shareable execution engine. Returns null only if
/// the runtime itself fails to come up, which callers must treat as fatal.
#[must_use]
pub fn wasm_engine_new() -> *mut wasm_engine_t {
    Box::into_raw(Box::new(wasm_engine_t {
        engine: Engine::default(),
    }))
}

/// Destroys an engine. Stores created from it hold their own reference to
/// the underlying runtime, so teardown order between an engine handle and
/// its stores is not observable here; the safe layer still enforces
/// engine-outlives-store with counted references.
///
/// # Safety
///
/// `engine` must be a live handle from [`wasm_engine_new`], not used again.
pub unsafe fn wasm_engine_delete(engine: *mut wasm_engine_t) {
    debug_assert!(!engine.is_null());
    unsafe { drop(Box::from_raw(engine)) };
}
