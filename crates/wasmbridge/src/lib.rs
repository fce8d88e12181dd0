//! Host embedding layer for a WebAssembly runtime with a WASI sandbox.
//!
//! This crate owns the resource-lifetime contract between host code and the
//! runtime behind `wasmbridge-sys`: every runtime object is held through a
//! wrapper that frees it exactly once, every buffer lent across the
//! boundary outlives the call it was lent to, and every handle dereference
//! gives deferred finalization a chance to run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Engine                           │
//! │  (Shared, immutable, reference-counted by everything    │
//! │   derived from it)                                      │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Module  /  Linker                      │
//! │  (Compiled code; WASI import definitions)               │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Store + WasiCtx                         │
//! │  (One execution session; sandbox descriptor table       │
//! │   derived from a WasiConfig)                            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`WasiConfig`] accumulates sandbox settings (argv, environment, stdio
//! redirection, preopened directories). Attaching it to a [`Store`] derives
//! that store's [`WasiCtx`], the guest descriptor table into which host
//! files are bound by index ([`WasiCtx::insert_file`]) or by allocation
//! ([`WasiCtx::push_file`]).
//!
//! # Threading
//!
//! [`Engine`] and [`Module`] are immutable and freely shareable. Every
//! other handle is `Send` but not `Sync`: one configuration, store,
//! context, instance, or function must not be driven from two threads at
//! once, and concurrent sandboxes use one store (with its context) per
//! thread. All calls are synchronous, block until the runtime returns, and
//! cannot be cancelled once invoked.

pub mod collect;
pub mod config;
pub mod ctx;
pub mod engine;
pub mod error;
pub mod linker;
pub mod module;
pub mod store;

mod handle;
mod marshal;

pub use collect::collect;
pub use config::WasiConfig;
pub use ctx::{AccessMode, WasiCtx};
pub use engine::Engine;
pub use error::BridgeError;
pub use linker::{Func, Instance, Linker};
pub use module::{Module, wat2wasm};
pub use store::Store;
