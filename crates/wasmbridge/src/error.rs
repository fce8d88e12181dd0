//! Error types for the embedding layer.
//!
//! Every fallible boundary call is translated into [`BridgeError`] before
//! it returns to the caller; no raw error objects or foreign codes cross
//! this layer. Allocation failure inside the runtime and caller contract
//! violations (mismatched environment counts, empty access modes, handles
//! used after release) are not errors but panics; see the crate docs on
//! failure classes.

use thiserror::Error;

use wasmbridge_sys as sys;

/// Errors surfaced to embedders.
///
/// All variants are recoverable from the process's point of view: the
/// operation failed, the message says why, and previously established state
/// (other descriptors, other stores) remains usable.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A sandbox configuration setting could not be applied or attached.
    #[error("WASI configuration failed: {reason}")]
    WasiConfig {
        /// Description of the failure, including the offending path.
        reason: String,
    },

    /// A host file could not be bound into a sandbox descriptor table.
    #[error("file binding failed: {reason}")]
    FileBinding {
        /// The runtime's description of the failure.
        reason: String,
    },

    /// WebAssembly compilation or text-format translation failed.
    #[error("compilation failed: {reason}")]
    Compilation {
        /// Description of the compilation failure.
        reason: String,
    },

    /// Import resolution while defining or instantiating failed.
    #[error("instantiation failed: {reason}")]
    Instantiation {
        /// Description of the linking/instantiation failure.
        reason: String,
    },

    /// A guest call trapped or was rejected by the runtime.
    #[error("guest call failed: {reason}")]
    Call {
        /// The runtime's trap or rejection message.
        reason: String,
    },

    /// An argument could not be marshaled across the boundary.
    #[error("invalid argument: {reason}")]
    InvalidArg {
        /// Description of why the argument was rejected.
        reason: String,
    },
}

impl BridgeError {
    /// Create a new `WasiConfig` error.
    pub fn wasi_config(reason: impl Into<String>) -> Self {
        Self::WasiConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `FileBinding` error.
    pub fn file_binding(reason: impl Into<String>) -> Self {
        Self::FileBinding {
            reason: reason.into(),
        }
    }

    /// Create a new `Compilation` error.
    pub fn compilation(reason: impl Into<String>) -> Self {
        Self::Compilation {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `Call` error.
    pub fn call(reason: impl Into<String>) -> Self {
        Self::Call {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidArg` error.
    pub fn invalid_arg(reason: impl Into<String>) -> Self {
        Self::InvalidArg {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error came from binding a file descriptor.
    pub fn is_file_binding(&self) -> bool {
        matches!(self, Self::FileBinding { .. })
    }

    /// Returns `true` if this error came from a guest trap or rejected
    /// call.
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

/// Consumes a boundary error object, extracting its message text.
///
/// The byte vector the message travels through and the error object itself
/// are both freed here, error path included.
pub(crate) fn message_from_raw(raw: *mut sys::wasm_error_t) -> String {
    debug_assert!(!raw.is_null());
    let mut buf = sys::wasm_byte_vec_t::empty();
    unsafe {
        sys::wasm_error_message(raw, &mut buf);
        let message = String::from_utf8_lossy(buf.as_slice()).into_owned();
        sys::wasm_byte_vec_delete(&mut buf);
        sys::wasm_error_delete(raw);
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::wasi_config("failed to open /no/such/file for stdin");
        assert_eq!(
            err.to_string(),
            "WASI configuration failed: failed to open /no/such/file for stdin"
        );

        let err = BridgeError::file_binding("bad descriptor");
        assert_eq!(err.to_string(), "file binding failed: bad descriptor");
    }

    #[test]
    fn test_predicates() {
        assert!(BridgeError::file_binding("x").is_file_binding());
        assert!(!BridgeError::wasi_config("x").is_file_binding());
        assert!(BridgeError::call("trap").is_call());
        assert!(!BridgeError::call("trap").is_file_binding());
    }
}
