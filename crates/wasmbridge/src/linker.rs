//! Import definition, instantiation, and guest calls.

use std::sync::Arc;

use tracing::{debug, info};

use wasmbridge_sys as sys;

use crate::engine::Engine;
use crate::error::{BridgeError, message_from_raw};
use crate::handle::{NativeHandle, NotSync};
use crate::marshal;
use crate::module::Module;
use crate::store::{Store, StoreShared};

/// Resolves a module's imports at instantiation time.
///
/// One linker may instantiate any number of modules into any number of
/// stores of the same engine.
pub struct Linker {
    handle: NativeHandle<sys::wasm_linker_t>,
    // Counted reference: the engine outlives its linkers.
    _engine: Engine,
    _not_sync: NotSync,
}

impl Linker {
    /// Create an empty linker.
    pub fn new(engine: &Engine) -> Self {
        let ptr = unsafe { sys::wasm_linker_new(engine.raw()) };
        Self {
            handle: NativeHandle::new(ptr, sys::wasm_linker_delete),
            _engine: engine.clone(),
            _not_sync: NotSync::new(),
        }
    }

    /// Define the WASI system imports.
    ///
    /// Guest system calls resolve against the context of the store each
    /// instance runs in. Letting a guest reach a WASI import on a store
    /// that never had a configuration attached is a programming error and
    /// panics inside the call.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the definitions (for
    /// example after conflicting imports were already defined).
    pub fn define_wasi(&self) -> Result<(), BridgeError> {
        let err = unsafe { sys::wasm_linker_define_wasi(self.handle.borrow()) };
        if err.is_null() {
            debug!("WASI imports defined");
            Ok(())
        } else {
            Err(BridgeError::instantiation(message_from_raw(err)))
        }
    }

    /// Instantiate `module` into `store`.
    ///
    /// A configured store may host any number of instantiations; each call
    /// produces an independent instance.
    ///
    /// # Errors
    ///
    /// Returns an error if an import cannot be resolved or instantiation
    /// traps.
    pub fn instantiate(&self, store: &Store, module: &Module) -> Result<Instance, BridgeError> {
        let mut raw = std::ptr::null_mut();
        let err = unsafe {
            sys::wasm_linker_instantiate(self.handle.borrow(), store.raw(), module.raw(), &mut raw)
        };
        if !err.is_null() {
            return Err(BridgeError::instantiation(message_from_raw(err)));
        }
        info!("module instantiated");
        Ok(Instance {
            handle: NativeHandle::new(raw, sys::wasm_instance_delete),
            store: Arc::clone(store.shared()),
            _not_sync: NotSync::new(),
        })
    }
}

/// A module instantiated into one store.
///
/// Holds a counted reference to its store: the instance state lives in the
/// store and an outstanding `Instance` keeps it from being finalized.
pub struct Instance {
    handle: NativeHandle<sys::wasm_instance_t>,
    store: Arc<StoreShared>,
    _not_sync: NotSync,
}

impl Instance {
    /// Look up an exported function by name. `None` when the export is
    /// absent or is not a function.
    pub fn get_func(&self, name: &str) -> Option<Func> {
        let c_name = marshal::c_string(name).ok()?;
        let raw = unsafe {
            sys::wasm_instance_export_func(
                self.handle.borrow(),
                self.store.handle.borrow(),
                c_name.as_ptr(),
            )
        };
        if raw.is_null() {
            None
        } else {
            Some(Func {
                handle: NativeHandle::new(raw, sys::wasm_func_delete),
                store: Arc::clone(&self.store),
                _not_sync: NotSync::new(),
            })
        }
    }
}

/// An exported guest function.
pub struct Func {
    handle: NativeHandle<sys::wasm_func_t>,
    store: Arc<StoreShared>,
    _not_sync: NotSync,
}

impl Func {
    /// Call the function, blocking the thread until the guest returns.
    ///
    /// Only `i32` values are marshaled: `params` must match the function's
    /// parameter list and `results` its result list, exactly. This covers
    /// start-style entry points and descriptor-number plumbing; richer
    /// signatures are outside this layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest traps, or the signature does not fit
    /// the i32 surface.
    pub fn call(&self, params: &[i32], results: &mut [i32]) -> Result<(), BridgeError> {
        let err = unsafe {
            sys::wasm_func_call(
                self.handle.borrow(),
                self.store.handle.borrow(),
                params.as_ptr(),
                params.len(),
                results.as_mut_ptr(),
                results.len(),
            )
        };
        if err.is_null() {
            Ok(())
        } else {
            Err(BridgeError::call(message_from_raw(err)))
        }
    }
}
