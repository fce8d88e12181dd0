//! Linking, instantiation, export lookup, and calls.

use std::ffi::c_char;
use std::ptr;

use wasmtime::{Func, Instance, Linker, Val};

use crate::engine::wasm_engine_t;
use crate::error::wasm_error_t;
use crate::module::wasm_module_t;
use crate::read_c_str;
use crate::store::{StoreData, wasm_store_t};

/// Opaque linker handle.
pub struct wasm_linker_t {
    pub(crate) linker: Linker<StoreData>,
}

/// Opaque instance handle, tied to the store it was instantiated into.
pub struct wasm_instance_t {
    pub(crate) instance: Instance,
}

/// Opaque exported-function handle, tied to its store.
pub struct wasm_func_t {
    pub(crate) func: Func,
}

/// Constructs a linker against `engine`.
///
/// # Safety
///
/// `engine` must be a live engine handle.
pub unsafe fn wasm_linker_new(engine: *mut wasm_engine_t) -> *mut wasm_linker_t {
    let engine = unsafe { &(*engine).engine };
    Box::into_raw(Box::new(wasm_linker_t {
        linker: Linker::new(engine),
    }))
}

/// Destroys a linker.
///
/// # Safety
///
/// `linker` must be a live handle from [`wasm_linker_new`], not used again.
pub unsafe fn wasm_linker_delete(linker: *mut wasm_linker_t) {
    debug_assert!(!linker.is_null());
    unsafe { drop(Box::from_raw(linker)) };
}

/// Registers the WASI system imports on `linker`. Guest system calls
/// resolve against the context of whichever store the instance runs in;
/// letting a guest reach a WASI import on a store that never had a
/// configuration attached is a host programming error and panics.
///
/// # Safety
///
/// `linker` must be a live handle.
pub unsafe fn wasm_linker_define_wasi(linker: *mut wasm_linker_t) -> *mut wasm_error_t {
    let linker = unsafe { &mut (*linker).linker };
    let result = wasi_common::sync::add_to_linker(linker, |data: &mut StoreData| {
        data.wasi
            .as_deref_mut()
            .expect("WASI import called on a store with no attached configuration")
            .inner_mut()
    });
    match result {
        Ok(()) => ptr::null_mut(),
        Err(e) => wasm_error_t::raise(format!("{e:#}")),
    }
}

/// Instantiates `module` into `store`, resolving its imports against
/// `linker`. On success writes the instance handle to `out` and returns
/// null.
///
/// # Safety
///
/// `linker`, `store`, and `module` must be live handles sharing one
/// engine; `out` must be writable.
pub unsafe fn wasm_linker_instantiate(
    linker: *mut wasm_linker_t,
    store: *mut wasm_store_t,
    module: *mut wasm_module_t,
    out: *mut *mut wasm_instance_t,
) -> *mut wasm_error_t {
    let linker = unsafe { &(*linker).linker };
    let store = unsafe { &mut (*store).store };
    let module = unsafe { &(*module).module };
    match linker.instantiate(&mut *store, module) {
        Ok(instance) => {
            unsafe { *out = Box::into_raw(Box::new(wasm_instance_t { instance })) };
            ptr::null_mut()
        }
        Err(e) => wasm_error_t::raise(format!("{e:#}")),
    }
}

/// Destroys an instance handle. The instance state itself lives in the
/// store and is freed with it.
///
/// # Safety
///
/// `instance` must be a live handle, not used again.
pub unsafe fn wasm_instance_delete(instance: *mut wasm_instance_t) {
    debug_assert!(!instance.is_null());
    unsafe { drop(Box::from_raw(instance)) };
}

/// Looks up an export of `instance` by name. Returns null when the export
/// is absent or is not a function.
///
/// # Safety
///
/// `instance` and `store` must be live handles, `store` the one the
/// instance was instantiated into; `name` must be a readable
/// NUL-terminated string.
pub unsafe fn wasm_instance_export_func(
    instance: *mut wasm_instance_t,
    store: *mut wasm_store_t,
    name: *const c_char,
) -> *mut wasm_func_t {
    let instance = unsafe { &(*instance).instance };
    let store = unsafe { &mut (*store).store };
    let Some(name) = (unsafe { read_c_str(name) }) else {
        return ptr::null_mut();
    };
    match instance.get_func(&mut *store, &name) {
        Some(func) => Box::into_raw(Box::new(wasm_func_t { func })),
        None => ptr::null_mut(),
    }
}

/// Destroys a function handle.
///
/// # Safety
///
/// `func` must be a live handle, not used again.
pub unsafe fn wasm_func_delete(func: *mut wasm_func_t) {
    debug_assert!(!func.is_null());
    unsafe { drop(Box::from_raw(func)) };
}

/// Calls `func` with `nargs` i32 arguments, writing `nresults` i32 results.
/// The counts must match the function's type exactly and only i32 values
/// are marshaled; traps, arity mismatches, and non-i32 signatures all
/// surface as errors. The call blocks the thread until the guest returns.
///
/// # Safety
///
/// `func` and `store` must be live handles, `store` the one the function
/// belongs to; `args` must point at `nargs` readable values (null only with
/// zero `nargs`) and `results` at `nresults` writable slots.
pub unsafe fn wasm_func_call(
    func: *mut wasm_func_t,
    store: *mut wasm_store_t,
    args: *const i32,
    nargs: usize,
    results: *mut i32,
    nresults: usize,
) -> *mut wasm_error_t {
    let func = unsafe { &(*func).func };
    let store = unsafe { &mut (*store).store };
    let params: Vec<Val> = if args.is_null() {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(args, nargs) }
            .iter()
            .map(|v| Val::I32(*v))
            .collect()
    };
    let mut out = vec![Val::I32(0); nresults];
    if let Err(e) = func.call(&mut *store, &params, &mut out) {
        return wasm_error_t::raise(format!("{e:#}"));
    }
    for (i, val) in out.iter().enumerate() {
        match val {
            Val::I32(v) => unsafe { *results.add(i) = *v },
            _ => return wasm_error_t::raise("function returned a non-i32 result"),
        }
    }
    ptr::null_mut()
}
