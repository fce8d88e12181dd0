//! Deferred finalization and the collection-pressure hook.
//!
//! Dropped handle wrappers do not free their foreign object inline; they
//! queue the foreign destructor here. The queue drains at two kinds of
//! point:
//!
//! - **Advisory**: [`maybe_collect`], invoked on every handle dereference.
//!   It only attempts a drain once enough dereferences or enough queued
//!   releases have accumulated, and it takes the queue with `try_lock`, so
//!   it can never block a call path or deadlock against a thread already
//!   draining.
//! - **Forced**: [`collect`], which drains unconditionally.
//!
//! Whether a given release runs here or ran earlier via an explicit
//! `close` is decided per handle by its release flag; a queued finalizer
//! only exists for handles whose flag was won by `Drop`.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

type Finalizer = Box<dyn FnOnce() + Send>;

static PENDING: Mutex<Vec<Finalizer>> = Mutex::new(Vec::new());
static PENDING_LEN: AtomicUsize = AtomicUsize::new(0);
static DEREFS: AtomicUsize = AtomicUsize::new(0);

/// Dereference interval between advisory drain attempts.
const PRESSURE_INTERVAL: usize = 64;

/// Queue depth past which every advisory check attempts a drain.
const PENDING_HIGH_WATER: usize = 32;

/// Queues a foreign destructor to run at the next drain.
pub(crate) fn defer_release(finalizer: Finalizer) {
    PENDING.lock().push(finalizer);
    PENDING_LEN.fetch_add(1, Ordering::Release);
}

/// Advisory collection point, invoked on every handle dereference.
///
/// May be a no-op: it runs queued finalizers only when pressure thresholds
/// are met and the queue lock is immediately available.
pub(crate) fn maybe_collect() {
    let derefs = DEREFS.fetch_add(1, Ordering::Relaxed) + 1;
    let pending = PENDING_LEN.load(Ordering::Acquire);
    if pending == 0 {
        return;
    }
    if pending < PENDING_HIGH_WATER && derefs % PRESSURE_INTERVAL != 0 {
        return;
    }
    if let Some(mut queue) = PENDING.try_lock() {
        let drained = take_all(&mut queue);
        drop(queue);
        run(drained);
    }
}

/// Forced collection: runs every queued finalizer before returning.
///
/// Embedders can call this at quiescent points to bound how long released
/// foreign objects linger; it is also useful before process-wide teardown.
pub fn collect() {
    let drained = take_all(&mut PENDING.lock());
    run(drained);
}

/// Number of queued finalizers awaiting a drain. Advisory: another thread
/// may drain or grow the queue between this read and any action taken on
/// it.
#[must_use]
pub fn pending_count() -> usize {
    PENDING_LEN.load(Ordering::Acquire)
}

fn take_all(queue: &mut Vec<Finalizer>) -> Vec<Finalizer> {
    PENDING_LEN.store(0, Ordering::Release);
    std::mem::take(queue)
}

// Runs with the queue lock already released so concurrent defer_release
// callers never wait on foreign destructors.
fn run(finalizers: Vec<Finalizer>) {
    if finalizers.is_empty() {
        return;
    }
    let released = finalizers.len();
    for finalizer in finalizers {
        finalizer();
    }
    debug!(released, "drained deferred finalizers");
}
