//! Raw boundary to the WebAssembly runtime.
//!
//! This crate is the ABI seam between the safe `wasmbridge` layer and the
//! runtime that actually executes WebAssembly. Every type it exports is an
//! opaque handle: callers receive a `*mut` from a `*_new` entry point, pass
//! it back into the functions that operate on it, and hand it to the
//! matching `*_delete` exactly once. Nothing behind a handle is visible
//! through this crate's signatures, and no runtime type leaks out of it.
//!
//! The surface is deliberately C-shaped even though the implementation is
//! Rust: boolean returns for setters, error objects for fallible calls,
//! out-parameters for secondary results, NUL-terminated strings in, and
//! caller-freed byte vectors out. The safe layer's whole job is wrapping
//! this shape; keeping the seam primitive keeps the ownership rules
//! explicit.
//!
//! # Handle kinds
//!
//! | type | constructed by | destroyed by |
//! |------|----------------|--------------|
//! | [`wasm_engine_t`] | [`wasm_engine_new`] | [`wasm_engine_delete`] |
//! | [`wasm_store_t`] | [`wasm_store_new`] | [`wasm_store_delete`] |
//! | [`wasm_module_t`] | [`wasm_module_new`] | [`wasm_module_delete`] |
//! | [`wasm_linker_t`] | [`wasm_linker_new`] | [`wasm_linker_delete`] |
//! | [`wasm_instance_t`] | [`wasm_linker_instantiate`] | [`wasm_instance_delete`] |
//! | [`wasm_func_t`] | [`wasm_instance_export_func`] | [`wasm_func_delete`] |
//! | [`wasi_config_t`] | [`wasi_config_new`] | [`wasi_config_delete`] |
//! | [`wasi_ctx_t`] | owned by its store | never freed directly |
//! | [`wasm_error_t`] | any fallible call | [`wasm_error_delete`] |
//!
//! # Safety
//!
//! Every `unsafe fn` here requires pointers previously returned by this
//! crate (or null where documented) and not yet deleted. Handles must not
//! be used from two threads at once without external synchronization.

#![allow(non_camel_case_types)]

mod engine;
mod error;
mod linker;
mod module;
mod store;
mod wasi;

pub use engine::{wasm_engine_delete, wasm_engine_new, wasm_engine_t};
pub use error::{
    wasm_byte_vec_delete, wasm_byte_vec_t, wasm_error_delete, wasm_error_message, wasm_error_t,
};
pub use linker::{
    wasm_func_call, wasm_func_delete, wasm_func_t, wasm_instance_delete,
    wasm_instance_export_func, wasm_instance_t, wasm_linker_define_wasi, wasm_linker_delete,
    wasm_linker_instantiate, wasm_linker_new, wasm_linker_t,
};
pub use module::{wasm_module_delete, wasm_module_new, wasm_module_t, wasm_wat2wasm};
pub use store::{
    wasm_store_delete, wasm_store_new, wasm_store_set_wasi, wasm_store_t, wasm_store_wasi_ctx,
};
pub use wasi::{
    WASI_FILE_ACCESS_READ, WASI_FILE_ACCESS_WRITE, wasi_config_delete, wasi_config_inherit_argv,
    wasi_config_inherit_env, wasi_config_inherit_stderr, wasi_config_inherit_stdin,
    wasi_config_inherit_stdout, wasi_config_new, wasi_config_preopen_dir, wasi_config_set_argv,
    wasi_config_set_env, wasi_config_set_stderr_file, wasi_config_set_stdin_file,
    wasi_config_set_stdout_file, wasi_config_t, wasi_ctx_insert_file, wasi_ctx_push_file,
    wasi_ctx_t,
};

use std::ffi::{CStr, c_char};

/// Reads a NUL-terminated UTF-8 string from the boundary. `None` for a null
/// pointer or non-UTF-8 bytes.
pub(crate) unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_owned)
}
