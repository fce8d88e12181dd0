//! Engine construction and sharing.

use std::sync::Arc;

use tracing::info;

use wasmbridge_sys as sys;

use crate::handle::NativeHandle;

pub(crate) struct EngineShared {
    pub(crate) handle: NativeHandle<sys::wasm_engine_t>,
}

/// The shared execution engine.
///
/// An engine is immutable once constructed and may back any number of
/// stores, modules, and linkers, from any thread. `Engine` is `Clone`;
/// every object derived from it keeps a counted reference, so the engine's
/// foreign object outlives everything built on it regardless of drop
/// order.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Create the process-shareable engine.
    pub fn new() -> Self {
        let ptr = sys::wasm_engine_new();
        let engine = Self {
            shared: Arc::new(EngineShared {
                handle: NativeHandle::new(ptr, sys::wasm_engine_delete),
            }),
        };
        info!("engine initialized");
        engine
    }

    pub(crate) fn raw(&self) -> *mut sys::wasm_engine_t {
        self.shared.handle.borrow()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("refs", &Arc::strong_count(&self.shared))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = Engine::new();
        assert!(!engine.raw().is_null());
    }

    #[test]
    fn test_engine_clone_shares_one_foreign_object() {
        let engine = Engine::new();
        let clone = engine.clone();
        assert_eq!(engine.raw(), clone.raw());
    }

    #[test]
    fn test_engine_debug() {
        let engine = Engine::new();
        let debug_str = format!("{engine:?}");
        assert!(debug_str.contains("Engine"));
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
