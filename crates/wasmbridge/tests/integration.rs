//! Integration tests for the WASI sandbox surface.
//!
//! These tests verify the complete embedding pipeline:
//! - WAT translation and module compilation
//! - WASI configuration and context attachment
//! - Host file binding by index and by allocation
//! - Guest writes observed through host files
//! - Preopened directory grants visible to the guest

use std::fs;

use tempfile::NamedTempFile;

use wasmbridge::{AccessMode, Engine, Instance, Linker, Module, Store, WasiConfig, wat2wasm};

/// Writes through the WASI descriptor-table syscall: `_start` writes
/// "hello world\n" to descriptor 1, `write_thanks` writes "thank you\n" to
/// the descriptor it is given.
const FD_WRITE_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))

  (memory 1)
  (export "memory" (memory 0))

  (data (i32.const 8) "hello world\n")
  (data (i32.const 32) "thank you\n")

  (func (export "_start")
    ;; iovec { base = 8, len = 12 } at memory 0
    (i32.store (i32.const 0) (i32.const 8))
    (i32.store (i32.const 4) (i32.const 12))
    (call $fd_write
      (i32.const 1)  ;; stdout
      (i32.const 0)  ;; *iovs
      (i32.const 1)  ;; iovs_len
      (i32.const 80) ;; nwritten
    )
    drop
  )

  (func (export "write_thanks") (param $fd i32)
    ;; iovec { base = 32, len = 10 } at memory 0
    (i32.store (i32.const 0) (i32.const 32))
    (i32.store (i32.const 4) (i32.const 10))
    (call $fd_write
      (local.get $fd)
      (i32.const 0)
      (i32.const 1)
      (i32.const 20)
    )
    drop
  )
)
"#;

/// Probes whether a descriptor is a preopened directory: returns the errno
/// of `fd_prestat_get`, 0 when the descriptor carries a preopen.
const PRESTAT_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "fd_prestat_get" (func $fd_prestat_get (param i32 i32) (result i32)))
  (memory 1)
  (export "memory" (memory 0))
  (func (export "probe_preopen") (param $fd i32) (result i32)
    (call $fd_prestat_get (local.get $fd) (i32.const 0)))
)
"#;

/// Creates "out.txt" inside the preopened directory (descriptor 3) and
/// writes "sandboxed\n" into it; returns the errno of the failing step, or
/// 0 on success.
const PATH_OPEN_WAT: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))

  (memory 1)
  (export "memory" (memory 0))

  (data (i32.const 100) "out.txt")
  (data (i32.const 120) "sandboxed\n")

  (func (export "write_into_preopen") (result i32)
    (local $err i32)
    ;; open "out.txt" under the preopen at descriptor 3, creating it
    (local.set $err
      (call $path_open
        (i32.const 3)    ;; preopened directory
        (i32.const 0)    ;; dirflags
        (i32.const 100)  ;; path
        (i32.const 7)    ;; path_len
        (i32.const 1)    ;; oflags: CREAT
        (i64.const 64)   ;; rights: fd_write
        (i64.const 0)    ;; rights inheriting
        (i32.const 0)    ;; fdflags
        (i32.const 200)  ;; opened fd written here
      ))
    (if (i32.ne (local.get $err) (i32.const 0))
      (then (return (local.get $err))))

    ;; iovec { base = 120, len = 10 } at memory 0
    (i32.store (i32.const 0) (i32.const 120))
    (i32.store (i32.const 4) (i32.const 10))
    (call $fd_write
      (i32.load (i32.const 200))
      (i32.const 0)
      (i32.const 1)
      (i32.const 300))
  )
)
"#;

/// Builds a configured sandbox: fresh engine and store, WASI imports
/// defined, `config` attached, `wat` compiled and instantiated.
fn sandbox(wat: &str, config: &WasiConfig) -> (Store, Instance) {
    let engine = Engine::new();
    let store = Store::new(&engine);
    let module = Module::new(&engine, &wat2wasm(wat).unwrap()).unwrap();
    let linker = Linker::new(&engine);
    linker.define_wasi().unwrap();
    store.set_wasi(config).unwrap();
    let instance = linker.instantiate(&store, &module).unwrap();
    (store, instance)
}

fn call(instance: &Instance, name: &str, params: &[i32]) {
    instance
        .get_func(name)
        .unwrap_or_else(|| panic!("export {name} missing"))
        .call(params, &mut [])
        .unwrap();
}

// ============================================================================
// Test: Hello World Through Redirected Stdout
// ============================================================================

#[test]
fn test_hello_world_reaches_redirected_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let stdout_path = dir.path().join("stdout.txt");

    let config = WasiConfig::new();
    config.set_stdout_file(&stdout_path).unwrap();

    let (_store, instance) = sandbox(FD_WRITE_WAT, &config);
    call(&instance, "_start", &[]);

    assert_eq!(fs::read_to_string(&stdout_path).unwrap(), "hello world\n");
}

// ============================================================================
// Test: Insert at a Caller-Chosen Descriptor
// ============================================================================

#[test]
fn test_insert_file_round_trip() {
    let (store, instance) = sandbox(FD_WRITE_WAT, &WasiConfig::new());
    let ctx = store.wasi_ctx().unwrap();

    let file = NamedTempFile::new().unwrap();
    ctx.insert_file(14, file.as_file(), AccessMode::READ_WRITE)
        .unwrap();

    call(&instance, "write_thanks", &[14]);

    assert_eq!(fs::read_to_string(file.path()).unwrap(), "thank you\n");
}

// ============================================================================
// Test: Writes Accumulate Across Guest Calls
// ============================================================================

#[test]
fn test_guest_writes_append_across_calls() {
    let (store, instance) = sandbox(FD_WRITE_WAT, &WasiConfig::new());
    let ctx = store.wasi_ctx().unwrap();

    let file = NamedTempFile::new().unwrap();
    ctx.insert_file(14, file.as_file(), AccessMode::READ_WRITE)
        .unwrap();

    call(&instance, "write_thanks", &[14]);
    call(&instance, "write_thanks", &[14]);

    assert_eq!(
        fs::read_to_string(file.path()).unwrap(),
        "thank you\nthank you\n"
    );
}

// ============================================================================
// Test: Push Allocates Unused Descriptors
// ============================================================================

#[test]
fn test_push_file_round_trip() {
    let (store, instance) = sandbox(FD_WRITE_WAT, &WasiConfig::new());
    let ctx = store.wasi_ctx().unwrap();

    let inserted = NamedTempFile::new().unwrap();
    ctx.insert_file(14, inserted.as_file(), AccessMode::READ_WRITE)
        .unwrap();

    let pushed = NamedTempFile::new().unwrap();
    let fd = ctx
        .push_file(pushed.as_file(), AccessMode::READ_WRITE)
        .unwrap();
    assert_ne!(fd, 14);

    #[allow(clippy::cast_possible_wrap)]
    call(&instance, "write_thanks", &[fd as i32]);
    assert_eq!(fs::read_to_string(pushed.path()).unwrap(), "thank you\n");

    // The earlier insertion is still bound and still accumulates.
    call(&instance, "write_thanks", &[14]);
    assert_eq!(fs::read_to_string(inserted.path()).unwrap(), "thank you\n");
}

// ============================================================================
// Test: Store Convenience Bindings
// ============================================================================

#[test]
fn test_store_insert_and_push() {
    let (store, instance) = sandbox(FD_WRITE_WAT, &WasiConfig::new());

    let inserted = NamedTempFile::new().unwrap();
    store
        .insert_file(24, inserted.as_file(), AccessMode::READ_WRITE)
        .unwrap();
    call(&instance, "write_thanks", &[24]);
    assert_eq!(fs::read_to_string(inserted.path()).unwrap(), "thank you\n");

    let pushed = NamedTempFile::new().unwrap();
    let fd = store
        .push_file(pushed.as_file(), AccessMode::READ_WRITE)
        .unwrap();
    assert_ne!(fd, 24);

    #[allow(clippy::cast_possible_wrap)]
    call(&instance, "write_thanks", &[fd as i32]);
    assert_eq!(fs::read_to_string(pushed.path()).unwrap(), "thank you\n");
}

// ============================================================================
// Test: Preopen Grant Visible to the Guest
// ============================================================================

#[test]
fn test_preopen_is_visible_to_the_guest() {
    let dir = tempfile::tempdir().unwrap();

    let config = WasiConfig::new();
    config.preopen_dir(dir.path(), "/sandbox").unwrap();

    let (_store, instance) = sandbox(PRESTAT_WAT, &config);
    let probe = instance.get_func("probe_preopen").unwrap();

    // Preopens occupy the first descriptors after stdio; the grant must be
    // observable where the runtime placed it.
    let mut errno = [-1];
    probe.call(&[3], &mut errno).unwrap();
    assert_eq!(errno[0], 0, "expected a preopen at descriptor 3");
}

#[test]
fn test_guest_writes_scoped_to_the_preopen_root() {
    let dir = tempfile::tempdir().unwrap();

    let config = WasiConfig::new();
    config.preopen_dir(dir.path(), "/data").unwrap();

    let (_store, instance) = sandbox(PATH_OPEN_WAT, &config);

    let mut errno = [-1];
    instance
        .get_func("write_into_preopen")
        .unwrap()
        .call(&[], &mut errno)
        .unwrap();
    assert_eq!(errno[0], 0, "guest failed to create a file in the grant");

    // The write landed under the host path backing the grant, and nowhere
    // else.
    assert_eq!(
        fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "sandboxed\n"
    );
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_no_preopen_without_a_grant() {
    let (_store, instance) = sandbox(PRESTAT_WAT, &WasiConfig::new());
    let probe = instance.get_func("probe_preopen").unwrap();

    let mut errno = [0];
    probe.call(&[3], &mut errno).unwrap();
    assert_ne!(errno[0], 0, "descriptor 3 must not carry a preopen");
}

// ============================================================================
// Test: Configuration Reuse Across Stores
// ============================================================================

#[test]
fn test_one_config_seeds_two_sandboxes() {
    let dir = tempfile::tempdir().unwrap();
    let config = WasiConfig::new();
    config.preopen_dir(dir.path(), "/data").unwrap();

    let (_store_a, instance_a) = sandbox(PRESTAT_WAT, &config);
    let (_store_b, instance_b) = sandbox(PRESTAT_WAT, &config);

    // Disposal after consumption: both sandboxes stay functional.
    config.close();

    for instance in [&instance_a, &instance_b] {
        let mut errno = [-1];
        instance
            .get_func("probe_preopen")
            .unwrap()
            .call(&[3], &mut errno)
            .unwrap();
        assert_eq!(errno[0], 0);
    }
}

// ============================================================================
// Test: Traps and Missing Exports
// ============================================================================

#[test]
fn test_trap_surfaces_as_call_error() {
    let wat = r#"
        (module
            (func (export "_start")
                unreachable
            )
        )
    "#;
    let (_store, instance) = sandbox(wat, &WasiConfig::new());

    let err = instance
        .get_func("_start")
        .unwrap()
        .call(&[], &mut [])
        .unwrap_err();
    assert!(err.is_call(), "expected a call error, got {err}");
}

#[test]
fn test_missing_export_is_none() {
    let (_store, instance) = sandbox(FD_WRITE_WAT, &WasiConfig::new());
    assert!(instance.get_func("no_such_export").is_none());
}

#[test]
fn test_arity_mismatch_is_a_call_error() {
    let (_store, instance) = sandbox(FD_WRITE_WAT, &WasiConfig::new());

    // write_thanks takes one argument; passing none must be rejected by
    // the runtime, not crash.
    let err = instance
        .get_func("write_thanks")
        .unwrap()
        .call(&[], &mut [])
        .unwrap_err();
    assert!(err.is_call());
}

// ============================================================================
// Test: Engine Shared Across Sessions
// ============================================================================

#[test]
fn test_many_stores_share_one_engine() {
    let engine = Engine::new();
    let module = Module::new(&engine, &wat2wasm(FD_WRITE_WAT).unwrap()).unwrap();
    let linker = Linker::new(&engine);
    linker.define_wasi().unwrap();

    for _ in 0..3 {
        let store = Store::new(&engine);
        store.set_wasi(&WasiConfig::new()).unwrap();
        let instance = linker.instantiate(&store, &module).unwrap();

        let file = NamedTempFile::new().unwrap();
        store
            .insert_file(14, file.as_file(), AccessMode::READ_WRITE)
            .unwrap();
        call(&instance, "write_thanks", &[14]);
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "thank you\n");
    }
}
