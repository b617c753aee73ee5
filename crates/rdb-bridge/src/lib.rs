//! C-ABI bridge between a storage engine and a pluggable reference backend.
//!
//! The engine consumes a fixed-layout table of function pointers. This crate
//! builds such tables for any [`RefdbBackend`](rdb_refs::RefdbBackend) and for
//! the iterators it produces, and routes every call back to the right Rust
//! instance.
//!
//! # How a call travels
//!
//! 1. [`BackendBridge::call_table`] registers the backend in a process-wide
//!    registry and builds a [`RefdbBackendTable`]: the engine's
//!    [`NativeRefdbBackend`] followed by a [`ContextToken`].
//! 2. The engine calls a slot with a pointer to that table. The trampoline
//!    reads the token at [`CONTEXT_OFFSET`], resolves the instance, converts
//!    the arguments, and calls the trait method.
//! 3. The outcome becomes a [`Status`] code. Failures and panics never cross
//!    the boundary: they become [`Status::Error`] with a message readable
//!    through [`rdb_error_last`].
//! 4. The engine's `free` call tears the backend down and releases its token
//!    for good. Stale tables then fail with [`Status::Error`].
//!
//! Iterators follow the same scheme with their own table
//! ([`NativeRefIterator`]), their own tokens, and an explicit exhausted state.
//!
//! [`RefdbClient`] plays the engine's side, for tools and tests.

pub mod client;
pub mod error;
pub mod iterator;
pub mod native;
pub mod registry;
pub mod status;
pub mod table;

mod trampoline;

pub use client::{RefIterClient, RefdbClient};
pub use error::{clear_last_error, last_error, rdb_error_last, BridgeResult, ClientError, Fault};
pub use iterator::{
    iterator_is_live, live_iterators, IteratorBridge, NativeRefIterator, RefIterTable,
    ITER_CONTEXT_OFFSET,
};
pub use native::{
    rdb_reference_free, BoxedReferenceFactory, NativeRecord, NativeReference,
    OwnedNativeReference, ReferenceFactory, REFERENCE_DIRECT, REFERENCE_SYMBOLIC,
};
pub use registry::{ContextToken, HandleRegistry};
pub use status::Status;
pub use table::{
    backend_is_live, live_backends, BackendBridge, NativeRefdbBackend, RefdbBackendTable,
    CONTEXT_OFFSET, REFDB_BACKEND_VERSION,
};
