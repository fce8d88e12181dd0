//! Module compilation and the textual-format translation used by fixtures.

use std::ffi::c_char;
use std::ptr;

use wasmtime::Module;

use crate::engine::wasm_engine_t;
use crate::error::{wasm_byte_vec_t, wasm_error_t};
use crate::read_c_str;

/// Opaque compiled-module handle.
pub struct wasm_module_t {
    pub(crate) module: Module,
}

/// Compiles a binary module against `engine`. On success writes the new
/// handle to `out` and returns null; on failure returns an error and leaves
/// `out` untouched.
///
/// # Safety
///
/// `engine` must be live; `wasm` must point at `len` readable bytes (null
/// only with a zero `len`); `out` must be writable.
pub unsafe fn wasm_module_new(
    engine: *mut wasm_engine_t,
    wasm: *const u8,
    len: usize,
    out: *mut *mut wasm_module_t,
) -> *mut wasm_error_t {
    let engine = unsafe { &(*engine).engine };
    let bytes: &[u8] = if wasm.is_null() {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(wasm, len) }
    };
    match Module::from_binary(engine, bytes) {
        Ok(module) => {
            unsafe { *out = Box::into_raw(Box::new(wasm_module_t { module })) };
            ptr::null_mut()
        }
        Err(e) => wasm_error_t::raise(format!("{e:#}")),
    }
}

/// Destroys a compiled module. Instances created from it are unaffected.
///
/// # Safety
///
/// `module` must be a live handle from [`wasm_module_new`], not used again.
pub unsafe fn wasm_module_delete(module: *mut wasm_module_t) {
    debug_assert!(!module.is_null());
    unsafe { drop(Box::from_raw(module)) };
}

/// Translates the textual module format into the binary format, filling
/// `out` with an allocation the caller frees via `wasm_byte_vec_delete`.
///
/// # Safety
///
/// `wat` must be a readable NUL-terminated string; `out` must point at an
/// empty byte vector.
pub unsafe fn wasm_wat2wasm(wat: *const c_char, out: *mut wasm_byte_vec_t) -> *mut wasm_error_t {
    let Some(text) = (unsafe { read_c_str(wat) }) else {
        return wasm_error_t::raise("wat text is null or not valid utf-8");
    };
    match wat::parse_str(&text) {
        Ok(bytes) => {
            unsafe { (*out).fill(bytes) };
            ptr::null_mut()
        }
        Err(e) => wasm_error_t::raise(format!("{e}")),
    }
}
