//! Module compilation.

use tracing::debug;

use wasmbridge_sys as sys;

use crate::engine::Engine;
use crate::error::{BridgeError, message_from_raw};
use crate::handle::NativeHandle;
use crate::marshal;

/// A compiled WebAssembly module.
///
/// Compilation happens against an [`Engine`] and the module keeps a counted
/// reference to it. A module is immutable; one module may be instantiated
/// into any number of stores of the same engine.
pub struct Module {
    handle: NativeHandle<sys::wasm_module_t>,
    // Counted reference: the engine outlives its compiled modules.
    _engine: Engine,
}

impl Module {
    /// Compile a module from WebAssembly binary bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid module.
    pub fn new(engine: &Engine, wasm: &[u8]) -> Result<Self, BridgeError> {
        let mut raw = std::ptr::null_mut();
        let err =
            unsafe { sys::wasm_module_new(engine.raw(), wasm.as_ptr(), wasm.len(), &mut raw) };
        if !err.is_null() {
            return Err(BridgeError::compilation(message_from_raw(err)));
        }
        debug!(bytes = wasm.len(), "module compiled");
        Ok(Self {
            handle: NativeHandle::new(raw, sys::wasm_module_delete),
            _engine: engine.clone(),
        })
    }

    pub(crate) fn raw(&self) -> *mut sys::wasm_module_t {
        self.handle.borrow()
    }

    /// Release the compiled module now instead of waiting for deferred
    /// finalization. Instances already created from it are unaffected.
    pub fn close(self) {
        self.handle.close();
    }
}

/// Translate the WebAssembly text format into binary. Intended for test
/// fixtures; production embedders ship binary modules.
///
/// # Errors
///
/// Returns an error if the text does not parse.
pub fn wat2wasm(wat: &str) -> Result<Vec<u8>, BridgeError> {
    let text = marshal::c_string(wat)?;
    let mut buf = sys::wasm_byte_vec_t::empty();
    let err = unsafe { sys::wasm_wat2wasm(text.as_ptr(), &mut buf) };
    if !err.is_null() {
        return Err(BridgeError::compilation(message_from_raw(err)));
    }
    let bytes = buf.as_slice().to_vec();
    unsafe { sys::wasm_byte_vec_delete(&mut buf) };
    Ok(bytes)
}
