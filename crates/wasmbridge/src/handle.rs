//! Ownership wrapper for foreign runtime pointers.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collect;

/// Marker field that keeps a wrapper `Send` but not `Sync`.
///
/// Wrappers whose operations mutate foreign state through `&self` carry
/// this so one value cannot be driven from two threads at once; moving the
/// value to another thread stays allowed.
pub(crate) struct NotSync(PhantomData<Cell<()>>);

impl NotSync {
    pub(crate) const fn new() -> Self {
        Self(PhantomData)
    }
}

/// Owner of exactly one foreign runtime pointer.
///
/// The wrapper's whole contract is "freed at most once, and only after the
/// last use": an atomic release flag is checked-and-set before any
/// deletion, so an explicit [`close`](Self::close) and the automatic
/// release on drop can never both reach the foreign destructor. Dropping
/// routes the destructor through the deferred finalization queue; closing
/// runs it immediately.
///
/// No two wrappers may hold the same foreign pointer.
///
/// The runtime behind the boundary never compacts or moves the objects its
/// handles point at, so the pointer returned by [`borrow`](Self::borrow)
/// is stable across non-adjacent borrows. That stability is a documented
/// contract of the boundary, not an assumption made here.
pub(crate) struct NativeHandle<T: 'static> {
    ptr: *mut T,
    released: AtomicBool,
    dtor: unsafe fn(*mut T),
}

// The release path is serialized by the atomic flag, so the handle itself
// tolerates being reached from several threads. Concurrent non-release use
// of one foreign object still needs external synchronization; the wrapper
// types that mutate through their handle stay !Sync (see [`NotSync`]) and
// enforce it structurally.
unsafe impl<T: 'static> Send for NativeHandle<T> {}
unsafe impl<T: 'static> Sync for NativeHandle<T> {}

impl<T: 'static> NativeHandle<T> {
    /// Wraps a freshly constructed foreign object.
    ///
    /// # Panics
    ///
    /// Panics if the runtime returned null: allocation failure inside the
    /// runtime is a fatal configuration error with nothing to retry.
    pub(crate) fn new(ptr: *mut T, dtor: unsafe fn(*mut T)) -> Self {
        assert!(!ptr.is_null(), "foreign runtime returned a null handle");
        Self {
            ptr,
            released: AtomicBool::new(false),
            dtor,
        }
    }

    /// The raw pointer, for the duration of one synchronous foreign call.
    /// Ownership stays with the wrapper. Every borrow is a
    /// collection-pressure point.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already released: using a handle after
    /// `close` (or after its store was finalized) is a programming error.
    pub(crate) fn borrow(&self) -> *mut T {
        assert!(
            !self.released.load(Ordering::Acquire),
            "native handle used after release"
        );
        collect::maybe_collect();
        self.ptr
    }

    /// Releases the foreign object now. Whichever of `close` and drop runs
    /// first performs the deletion; the loser is a no-op.
    pub(crate) fn close(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            unsafe { (self.dtor)(self.ptr) };
        }
    }
}

impl<T: 'static> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let ptr = self.ptr as usize;
            let dtor = self.dtor;
            collect::defer_release(Box::new(move || unsafe { dtor(ptr as *mut T) }));
        }
    }
}
