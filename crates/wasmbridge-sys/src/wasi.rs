//! WASI configuration and the live sandbox descriptor table.
//!
//! A [`wasi_config_t`] is a write-only accumulator: setters record sandbox
//! settings, and [`wasm_store_set_wasi`](crate::wasm_store_set_wasi) reads
//! them to derive a context. Reading the configuration does not consume it;
//! one configuration can seed any number of stores and is deleted
//! independently of all of them.
//!
//! A [`wasi_ctx_t`] is the descriptor table of one live sandbox. Its
//! storage belongs to the owning store and is freed with the store; the
//! pointer handed out by `wasm_store_wasi_ctx` stays valid (and stable)
//! until the store is deleted.

use std::ffi::c_char;
use std::fs::File;
use std::os::fd::{BorrowedFd, RawFd};
use std::path::PathBuf;
use std::ptr;

use wasi_common::file::FileAccessMode;
use wasi_common::sync::{Dir, WasiCtxBuilder, ambient_authority, file};
use wasi_common::{WasiCtx, WasiFile};

use crate::error::wasm_error_t;
use crate::read_c_str;

/// Access bit granting reads through a bound descriptor.
pub const WASI_FILE_ACCESS_READ: u32 = 0b01;
/// Access bit granting writes through a bound descriptor.
pub const WASI_FILE_ACCESS_WRITE: u32 = 0b10;

#[derive(Default)]
enum ArgvSource {
    #[default]
    Unset,
    Inherit,
    Explicit(Vec<String>),
}

#[derive(Default)]
enum EnvSource {
    #[default]
    Unset,
    Inherit,
    Explicit(Vec<(String, String)>),
}

#[derive(Default)]
enum StreamSource {
    /// Runtime default: empty stdin, discarded stdout/stderr.
    #[default]
    Unset,
    Inherit,
    HostFile(PathBuf),
}

/// Opaque, write-only sandbox configuration.
#[derive(Default)]
pub struct wasi_config_t {
    argv: ArgvSource,
    env: EnvSource,
    stdin: StreamSource,
    stdout: StreamSource,
    stderr: StreamSource,
    preopens: Vec<(PathBuf, PathBuf)>,
}

impl wasi_config_t {
    /// Derives a fresh context from the recorded settings. Called every
    /// time the configuration is attached to a store.
    pub(crate) fn derive_ctx(&self) -> Result<WasiCtx, *mut wasm_error_t> {
        let mut builder = WasiCtxBuilder::new();

        match &self.argv {
            ArgvSource::Unset => {}
            ArgvSource::Inherit => {
                let args: Vec<String> = std::env::args().collect();
                builder
                    .args(&args)
                    .map_err(|e| wasm_error_t::raise(format!("invalid argv: {e}")))?;
            }
            ArgvSource::Explicit(args) => {
                builder
                    .args(args)
                    .map_err(|e| wasm_error_t::raise(format!("invalid argv: {e}")))?;
            }
        }

        match &self.env {
            EnvSource::Unset => {}
            EnvSource::Inherit => {
                for (key, value) in std::env::vars() {
                    builder
                        .env(&key, &value)
                        .map_err(|e| wasm_error_t::raise(format!("invalid environment: {e}")))?;
                }
            }
            EnvSource::Explicit(pairs) => {
                for (key, value) in pairs {
                    builder
                        .env(key, value)
                        .map_err(|e| wasm_error_t::raise(format!("invalid environment: {e}")))?;
                }
            }
        }

        match &self.stdin {
            StreamSource::Unset => {}
            StreamSource::Inherit => {
                builder.inherit_stdin();
            }
            StreamSource::HostFile(path) => {
                let f = File::open(path).map_err(|e| {
                    wasm_error_t::raise(format!("failed to open {} for stdin: {e}", path.display()))
                })?;
                builder.stdin(wasi_file_from(f));
            }
        }
        match &self.stdout {
            StreamSource::Unset => {}
            StreamSource::Inherit => {
                builder.inherit_stdout();
            }
            StreamSource::HostFile(path) => {
                let f = File::create(path).map_err(|e| {
                    wasm_error_t::raise(format!(
                        "failed to open {} for stdout: {e}",
                        path.display()
                    ))
                })?;
                builder.stdout(wasi_file_from(f));
            }
        }
        match &self.stderr {
            StreamSource::Unset => {}
            StreamSource::Inherit => {
                builder.inherit_stderr();
            }
            StreamSource::HostFile(path) => {
                let f = File::create(path).map_err(|e| {
                    wasm_error_t::raise(format!(
                        "failed to open {} for stderr: {e}",
                        path.display()
                    ))
                })?;
                builder.stderr(wasi_file_from(f));
            }
        }

        for (host, guest) in &self.preopens {
            let dir = Dir::open_ambient_dir(host, ambient_authority()).map_err(|e| {
                wasm_error_t::raise(format!(
                    "failed to preopen directory {}: {e}",
                    host.display()
                ))
            })?;
            builder.preopened_dir(dir, guest).map_err(|e| {
                wasm_error_t::raise(format!(
                    "failed to preopen directory {}: {e}",
                    host.display()
                ))
            })?;
        }

        Ok(builder.build())
    }
}

fn wasi_file_from(f: File) -> Box<dyn WasiFile> {
    Box::new(file::File::from_cap_std(cap_std::fs::File::from_std(f)))
}

/// Constructs an empty configuration.
#[must_use]
pub fn wasi_config_new() -> *mut wasi_config_t {
    Box::into_raw(Box::new(wasi_config_t::default()))
}

/// Destroys a configuration. Contexts already derived from it are
/// unaffected.
///
/// # Safety
///
/// `config` must be a live handle from [`wasi_config_new`], not used again.
pub unsafe fn wasi_config_delete(config: *mut wasi_config_t) {
    debug_assert!(!config.is_null());
    unsafe { drop(Box::from_raw(config)) };
}

/// Records an explicit argv, replacing any earlier argv setting. A zero
/// count must be passed with a null `argv` pointer. Returns false if any
/// element is null or not UTF-8; the configuration is left unchanged then.
///
/// # Safety
///
/// `config` must be live; `argv` must point at `argc` readable
/// NUL-terminated strings (or be null when `argc` is zero).
pub unsafe fn wasi_config_set_argv(
    config: *mut wasi_config_t,
    argc: usize,
    argv: *const *const c_char,
) -> bool {
    let cfg = unsafe { &mut *config };
    let mut args = Vec::with_capacity(argc);
    for i in 0..argc {
        match unsafe { read_c_str(*argv.add(i)) } {
            Some(arg) => args.push(arg),
            None => return false,
        }
    }
    cfg.argv = ArgvSource::Explicit(args);
    true
}

/// Records that the sandbox inherits the host process argv, replacing any
/// earlier argv setting.
///
/// # Safety
///
/// `config` must be live.
pub unsafe fn wasi_config_inherit_argv(config: *mut wasi_config_t) {
    unsafe { (*config).argv = ArgvSource::Inherit };
}

/// Records explicit environment pairs, replacing any earlier environment
/// setting. `names` and `values` each hold `nenv` strings; a zero count is
/// passed with null pointers. Returns false on a null or non-UTF-8 element.
///
/// # Safety
///
/// `config` must be live; `names`/`values` must point at `nenv` readable
/// NUL-terminated strings each (or be null when `nenv` is zero).
pub unsafe fn wasi_config_set_env(
    config: *mut wasi_config_t,
    nenv: usize,
    names: *const *const c_char,
    values: *const *const c_char,
) -> bool {
    let cfg = unsafe { &mut *config };
    let mut pairs = Vec::with_capacity(nenv);
    for i in 0..nenv {
        let name = unsafe { read_c_str(*names.add(i)) };
        let value = unsafe { read_c_str(*values.add(i)) };
        match (name, value) {
            (Some(name), Some(value)) => pairs.push((name, value)),
            _ => return false,
        }
    }
    cfg.env = EnvSource::Explicit(pairs);
    true
}

/// Records that the sandbox inherits the host environment, replacing any
/// earlier environment setting.
///
/// # Safety
///
/// `config` must be live.
pub unsafe fn wasi_config_inherit_env(config: *mut wasi_config_t) {
    unsafe { (*config).env = EnvSource::Inherit };
}

unsafe fn set_stream(
    config: *mut wasi_config_t,
    path: *const c_char,
    pick: fn(&mut wasi_config_t) -> &mut StreamSource,
    open: fn(&PathBuf) -> std::io::Result<File>,
) -> bool {
    let cfg = unsafe { &mut *config };
    let Some(path) = (unsafe { read_c_str(path) }) else {
        return false;
    };
    let path = PathBuf::from(path);
    // Open eagerly so an unusable path fails at the setter, then record the
    // path; the context derivation reopens it per store.
    if open(&path).is_err() {
        return false;
    }
    *pick(cfg) = StreamSource::HostFile(path);
    true
}

/// Redirects sandbox stdin to a host file. Returns false when the path is
/// missing or unreadable.
///
/// # Safety
///
/// `config` must be live; `path` must be a readable NUL-terminated string.
pub unsafe fn wasi_config_set_stdin_file(config: *mut wasi_config_t, path: *const c_char) -> bool {
    unsafe { set_stream(config, path, |c| &mut c.stdin, |p| File::open(p)) }
}

/// Records that the sandbox inherits the host stdin.
///
/// # Safety
///
/// `config` must be live.
pub unsafe fn wasi_config_inherit_stdin(config: *mut wasi_config_t) {
    unsafe { (*config).stdin = StreamSource::Inherit };
}

/// Redirects sandbox stdout to a host file, creating or truncating it.
/// Returns false when the path cannot be opened for writing.
///
/// # Safety
///
/// `config` must be live; `path` must be a readable NUL-terminated string.
pub unsafe fn wasi_config_set_stdout_file(config: *mut wasi_config_t, path: *const c_char) -> bool {
    unsafe { set_stream(config, path, |c| &mut c.stdout, |p| File::create(p)) }
}

/// Records that the sandbox inherits the host stdout.
///
/// # Safety
///
/// `config` must be live.
pub unsafe fn wasi_config_inherit_stdout(config: *mut wasi_config_t) {
    unsafe { (*config).stdout = StreamSource::Inherit };
}

/// Redirects sandbox stderr to a host file, creating or truncating it.
/// Returns false when the path cannot be opened for writing.
///
/// # Safety
///
/// `config` must be live; `path` must be a readable NUL-terminated string.
pub unsafe fn wasi_config_set_stderr_file(config: *mut wasi_config_t, path: *const c_char) -> bool {
    unsafe { set_stream(config, path, |c| &mut c.stderr, |p| File::create(p)) }
}

/// Records that the sandbox inherits the host stderr.
///
/// # Safety
///
/// `config` must be live.
pub unsafe fn wasi_config_inherit_stderr(config: *mut wasi_config_t) {
    unsafe { (*config).stderr = StreamSource::Inherit };
}

/// Grants the sandbox filesystem access rooted at `host_path`, visible to
/// the guest at `guest_path`. Returns false when `host_path` is not an
/// openable directory.
///
/// # Safety
///
/// `config` must be live; both paths must be readable NUL-terminated
/// strings.
pub unsafe fn wasi_config_preopen_dir(
    config: *mut wasi_config_t,
    host_path: *const c_char,
    guest_path: *const c_char,
) -> bool {
    let cfg = unsafe { &mut *config };
    let (Some(host), Some(guest)) = (unsafe { read_c_str(host_path) }, unsafe {
        read_c_str(guest_path)
    }) else {
        return false;
    };
    let host = PathBuf::from(host);
    if Dir::open_ambient_dir(&host, ambient_authority()).is_err() {
        return false;
    }
    cfg.preopens.push((host, PathBuf::from(guest)));
    true
}

/// The descriptor table of one live sandbox. Owned by its store; the
/// pointer is stable until the store is deleted.
#[repr(transparent)]
pub struct wasi_ctx_t(WasiCtx);

impl wasi_ctx_t {
    pub(crate) fn new(ctx: WasiCtx) -> Self {
        Self(ctx)
    }

    pub(crate) fn reset(&mut self, ctx: WasiCtx) {
        self.0 = ctx;
    }

    pub(crate) fn inner_mut(&mut self) -> &mut WasiCtx {
        &mut self.0
    }
}

/// Duplicates `host_fd` and resolves the access bits. The sandbox owns the
/// duplicate; the caller's descriptor is never closed by this boundary.
unsafe fn duplicate_for_guest(
    host_fd: RawFd,
    access_mode: u32,
) -> Result<(Box<dyn WasiFile>, FileAccessMode), *mut wasm_error_t> {
    let mut mode = FileAccessMode::empty();
    if access_mode & WASI_FILE_ACCESS_READ != 0 {
        mode |= FileAccessMode::READ;
    }
    if access_mode & WASI_FILE_ACCESS_WRITE != 0 {
        mode |= FileAccessMode::WRITE;
    }
    if mode.is_empty() || access_mode & !(WASI_FILE_ACCESS_READ | WASI_FILE_ACCESS_WRITE) != 0 {
        return Err(wasm_error_t::raise(format!(
            "invalid access mode {access_mode:#b}"
        )));
    }

    let borrowed = unsafe { BorrowedFd::borrow_raw(host_fd) };
    let owned = borrowed.try_clone_to_owned().map_err(|e| {
        wasm_error_t::raise(format!("failed to duplicate host descriptor {host_fd}: {e}"))
    })?;
    Ok((wasi_file_from(File::from(owned)), mode))
}

/// Binds a duplicate of `host_fd` at `guest_fd`, silently replacing any
/// prior binding at that index. The replaced binding's duplicate is closed;
/// the caller's descriptors never are.
///
/// # Safety
///
/// `ctx` must be a pointer from `wasm_store_wasi_ctx` whose store is still
/// live; `host_fd` must be the caller's open descriptor.
pub unsafe fn wasi_ctx_insert_file(
    ctx: *mut wasi_ctx_t,
    guest_fd: u32,
    host_fd: RawFd,
    access_mode: u32,
) -> *mut wasm_error_t {
    let ctx = unsafe { &mut *ctx };
    match unsafe { duplicate_for_guest(host_fd, access_mode) } {
        Ok((f, mode)) => {
            ctx.0.insert_file(guest_fd, f, mode);
            ptr::null_mut()
        }
        Err(e) => e,
    }
}

/// Binds a duplicate of `host_fd` at a guest descriptor chosen by the
/// runtime and written to `guest_fd_out`. The chosen descriptor is
/// guaranteed unused immediately prior to the call; the selection policy is
/// the runtime's own and not otherwise specified.
///
/// # Safety
///
/// As [`wasi_ctx_insert_file`]; `guest_fd_out` must be writable.
pub unsafe fn wasi_ctx_push_file(
    ctx: *mut wasi_ctx_t,
    host_fd: RawFd,
    access_mode: u32,
    guest_fd_out: *mut u32,
) -> *mut wasm_error_t {
    let ctx = unsafe { &mut *ctx };
    let (f, mode) = match unsafe { duplicate_for_guest(host_fd, access_mode) } {
        Ok(pair) => pair,
        Err(e) => return e,
    };
    match ctx.0.push_file(f, mode) {
        Ok(fd) => {
            unsafe { *guest_fd_out = fd };
            ptr::null_mut()
        }
        Err(e) => wasm_error_t::raise(format!("failed to push file: {e}")),
    }
}
