//! Write-only WASI sandbox configuration.

use std::path::Path;

use tracing::debug;

use wasmbridge_sys as sys;

use crate::error::BridgeError;
use crate::handle::{NativeHandle, NotSync};
use crate::marshal::{CStringArray, c_path};

/// Accumulator of sandbox settings prior to context creation.
///
/// All state lives behind the foreign handle and is write-only: setters
/// mutate it, nothing reads it back. Attaching the configuration to a store
/// ([`Store::set_wasi`](crate::Store::set_wasi)) reads it without consuming
/// it: one configuration can seed several stores and may be dropped (or
/// [`close`](Self::close)d) as soon as the last store was configured.
///
/// For argv and environment, explicit and inherit settings are mutually
/// exclusive and the last call wins.
pub struct WasiConfig {
    handle: NativeHandle<sys::wasi_config_t>,
    _not_sync: NotSync,
}

impl WasiConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self {
            handle: NativeHandle::new(sys::wasi_config_new(), sys::wasi_config_delete),
            _not_sync: NotSync::new(),
        }
    }

    /// Set the sandbox argv explicitly, replacing any earlier argv setting.
    ///
    /// # Errors
    ///
    /// Returns an error if an argument cannot be marshaled (interior NUL).
    pub fn set_argv<S: AsRef<str>>(&self, argv: &[S]) -> Result<(), BridgeError> {
        let args = CStringArray::new(argv)?;
        let ok = unsafe { sys::wasi_config_set_argv(self.handle.borrow(), args.len(), args.as_ptr()) };
        if ok {
            Ok(())
        } else {
            Err(BridgeError::invalid_arg("argv rejected by the runtime"))
        }
    }

    /// Let the sandbox see the host process argv, replacing any earlier
    /// argv setting.
    pub fn inherit_argv(&self) {
        unsafe { sys::wasi_config_inherit_argv(self.handle.borrow()) };
    }

    /// Set the sandbox environment explicitly, replacing any earlier
    /// environment setting. `keys[i]` pairs with `values[i]`.
    ///
    /// # Panics
    ///
    /// Panics if `keys` and `values` have different lengths: a mismatch is
    /// a programming error and is rejected before anything crosses the
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value cannot be marshaled.
    pub fn set_env<S: AsRef<str>>(&self, keys: &[S], values: &[S]) -> Result<(), BridgeError> {
        assert_eq!(
            keys.len(),
            values.len(),
            "mismatched environment key/value counts"
        );
        let names = CStringArray::new(keys)?;
        let vals = CStringArray::new(values)?;
        let ok = unsafe {
            sys::wasi_config_set_env(self.handle.borrow(), names.len(), names.as_ptr(), vals.as_ptr())
        };
        if ok {
            Ok(())
        } else {
            Err(BridgeError::invalid_arg("environment rejected by the runtime"))
        }
    }

    /// Let the sandbox see the host environment, replacing any earlier
    /// environment setting.
    pub fn inherit_env(&self) {
        unsafe { sys::wasi_config_inherit_env(self.handle.borrow()) };
    }

    /// Redirect sandbox stdin to read from a host file.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is missing or unreadable. The failure
    /// leaves the configuration's previous stdin setting in place.
    pub fn set_stdin_file(&self, path: impl AsRef<Path>) -> Result<(), BridgeError> {
        let path = path.as_ref();
        let c = c_path(path)?;
        let ok = unsafe { sys::wasi_config_set_stdin_file(self.handle.borrow(), c.as_ptr()) };
        if ok {
            Ok(())
        } else {
            Err(BridgeError::wasi_config(format!(
                "failed to open {} for stdin",
                path.display()
            )))
        }
    }

    /// Let the sandbox read the host's stdin.
    pub fn inherit_stdin(&self) {
        unsafe { sys::wasi_config_inherit_stdin(self.handle.borrow()) };
    }

    /// Redirect sandbox stdout to a host file, creating or truncating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened for writing.
    pub fn set_stdout_file(&self, path: impl AsRef<Path>) -> Result<(), BridgeError> {
        let path = path.as_ref();
        let c = c_path(path)?;
        let ok = unsafe { sys::wasi_config_set_stdout_file(self.handle.borrow(), c.as_ptr()) };
        if ok {
            Ok(())
        } else {
            Err(BridgeError::wasi_config(format!(
                "failed to open {} for stdout",
                path.display()
            )))
        }
    }

    /// Let the sandbox write to the host's stdout.
    pub fn inherit_stdout(&self) {
        unsafe { sys::wasi_config_inherit_stdout(self.handle.borrow()) };
    }

    /// Redirect sandbox stderr to a host file, creating or truncating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened for writing.
    pub fn set_stderr_file(&self, path: impl AsRef<Path>) -> Result<(), BridgeError> {
        let path = path.as_ref();
        let c = c_path(path)?;
        let ok = unsafe { sys::wasi_config_set_stderr_file(self.handle.borrow(), c.as_ptr()) };
        if ok {
            Ok(())
        } else {
            Err(BridgeError::wasi_config(format!(
                "failed to open {} for stderr",
                path.display()
            )))
        }
    }

    /// Let the sandbox write to the host's stderr.
    pub fn inherit_stderr(&self) {
        unsafe { sys::wasi_config_inherit_stderr(self.handle.borrow()) };
    }

    /// Grant the sandbox filesystem access rooted at `host_path`, visible
    /// to the guest at `guest_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host_path` is not an accessible directory. The
    /// failure does not disturb grants recorded earlier.
    pub fn preopen_dir(
        &self,
        host_path: impl AsRef<Path>,
        guest_path: impl AsRef<Path>,
    ) -> Result<(), BridgeError> {
        let (host, guest) = (host_path.as_ref(), guest_path.as_ref());
        let host_c = c_path(host)?;
        let guest_c = c_path(guest)?;
        let ok = unsafe {
            sys::wasi_config_preopen_dir(self.handle.borrow(), host_c.as_ptr(), guest_c.as_ptr())
        };
        if ok {
            debug!(host = %host.display(), guest = %guest.display(), "directory preopened");
            Ok(())
        } else {
            Err(BridgeError::wasi_config(format!(
                "failed to preopen directory {}",
                host.display()
            )))
        }
    }

    pub(crate) fn raw(&self) -> *const sys::wasi_config_t {
        self.handle.borrow()
    }

    /// Release the configuration now instead of waiting for deferred
    /// finalization. Contexts already derived from it are unaffected.
    pub fn close(self) {
        self.handle.close();
    }
}

impl Default for WasiConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_and_env_setters() {
        let config = WasiConfig::new();
        config.set_argv(&["prog", "--flag"]).unwrap();
        config.inherit_argv();
        config.set_env(&["KEY"], &["value"]).unwrap();
        config.inherit_env();
    }

    #[test]
    fn test_empty_argv_is_accepted() {
        let config = WasiConfig::new();
        config.set_argv::<&str>(&[]).unwrap();
    }

    #[test]
    #[should_panic(expected = "mismatched environment key/value counts")]
    fn test_env_count_mismatch_panics() {
        let config = WasiConfig::new();
        let _ = config.set_env(&["A", "B"], &["only-one"]);
    }

    #[test]
    fn test_interior_nul_in_argv_is_an_error() {
        let config = WasiConfig::new();
        let result = config.set_argv(&["bad\0arg"]);
        assert!(matches!(result, Err(BridgeError::InvalidArg { .. })));
    }

    #[test]
    fn test_stdin_redirect_to_missing_path_fails() {
        let config = WasiConfig::new();
        let result = config.set_stdin_file("/no/such/path/stdin.txt");
        assert!(matches!(result, Err(BridgeError::WasiConfig { .. })));
    }

    #[test]
    fn test_preopen_missing_dir_fails() {
        let config = WasiConfig::new();
        let result = config.preopen_dir("/no/such/dir", "/");
        assert!(matches!(result, Err(BridgeError::WasiConfig { .. })));
    }

    #[test]
    fn test_preopen_existing_dir_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = WasiConfig::new();
        config.preopen_dir(dir.path(), "/sandbox").unwrap();
    }

    #[test]
    fn test_double_release_is_a_noop() {
        let config = WasiConfig::new();
        config.close();
        // The drop inside `close` lost the release race; collection must
        // not free the foreign object a second time.
        crate::collect::collect();
    }
}
