//! Engine-facing backend call table and its builder.
//!
//! [`NativeRefdbBackend`] is the exact structure the engine consumes. The
//! bridge allocates a [`RefdbBackendTable`], which is that structure followed
//! by the [`ContextToken`] of the backend it serves. The engine only sees a
//! pointer to the first field; trampolines read the token back at
//! [`CONTEXT_OFFSET`].

use std::mem;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr::NonNull;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rdb_refs::{Capabilities, RefdbBackend};
use tracing::debug;

use crate::error::{BridgeResult, Fault};
use crate::iterator::NativeRefIterator;
use crate::native::{NativeReference, ReferenceFactory};
use crate::registry::{ContextToken, HandleRegistry};
use crate::trampoline;

/// Layout version the engine checks before using a table.
pub const REFDB_BACKEND_VERSION: c_uint = 1;

pub type ExistsFn =
    unsafe extern "C" fn(exists: *mut c_int, backend: *mut NativeRefdbBackend, name: *const c_char) -> c_int;
pub type LookupFn = unsafe extern "C" fn(
    out: *mut *mut NativeReference,
    backend: *mut NativeRefdbBackend,
    name: *const c_char,
) -> c_int;
pub type IteratorFn = unsafe extern "C" fn(
    out: *mut *mut NativeRefIterator,
    backend: *mut NativeRefdbBackend,
    glob: *const c_char,
) -> c_int;
pub type WriteFn = unsafe extern "C" fn(
    backend: *mut NativeRefdbBackend,
    reference: *const NativeReference,
    force: c_int,
) -> c_int;
pub type RenameFn = unsafe extern "C" fn(
    out: *mut *mut NativeReference,
    backend: *mut NativeRefdbBackend,
    old_name: *const c_char,
    new_name: *const c_char,
    force: c_int,
) -> c_int;
pub type DeleteFn = unsafe extern "C" fn(backend: *mut NativeRefdbBackend, name: *const c_char) -> c_int;
pub type CompressFn = unsafe extern "C" fn(backend: *mut NativeRefdbBackend) -> c_int;
pub type HasLogFn = unsafe extern "C" fn(backend: *mut NativeRefdbBackend, name: *const c_char) -> c_int;
pub type EnsureLogFn = unsafe extern "C" fn(backend: *mut NativeRefdbBackend, name: *const c_char) -> c_int;
pub type FreeFn = unsafe extern "C" fn(backend: *mut NativeRefdbBackend);

/// The backend structure as the engine declares it. Field order is fixed.
///
/// Absent slots are `None` (null); the engine checks before calling.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NativeRefdbBackend {
    pub version: c_uint,
    pub exists: Option<ExistsFn>,
    pub lookup: Option<LookupFn>,
    pub iterator: Option<IteratorFn>,
    pub write: Option<WriteFn>,
    /// Reserved; never wired.
    pub rename: Option<RenameFn>,
    pub del: Option<DeleteFn>,
    pub compress: Option<CompressFn>,
    /// Reserved; never wired.
    pub has_log: Option<HasLogFn>,
    /// Reserved; never wired.
    pub ensure_log: Option<EnsureLogFn>,
    pub free: Option<FreeFn>,
}

/// [`NativeRefdbBackend`] plus the bridge's bookkeeping.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RefdbBackendTable {
    pub native: NativeRefdbBackend,
    context: ContextToken,
}

/// Offset of the context token, right after the last engine field.
pub const CONTEXT_OFFSET: usize = mem::offset_of!(RefdbBackendTable, context);

impl RefdbBackendTable {
    fn build(capabilities: Capabilities, context: ContextToken) -> Self {
        let native = NativeRefdbBackend {
            version: REFDB_BACKEND_VERSION,
            exists: Some(trampoline::backend_exists),
            lookup: Some(trampoline::backend_lookup),
            iterator: capabilities
                .contains(Capabilities::FOREACH_GLOB)
                .then_some(trampoline::backend_iterator as IteratorFn),
            write: Some(trampoline::backend_write),
            rename: None,
            del: Some(trampoline::backend_delete),
            compress: capabilities
                .contains(Capabilities::COMPRESS)
                .then_some(trampoline::backend_compress as CompressFn),
            has_log: None,
            ensure_log: None,
            free: Some(trampoline::backend_free),
        };
        Self { native, context }
    }

    pub fn context(&self) -> ContextToken {
        self.context
    }
}

/// Read the token of the table `backend` points into.
///
/// # Safety
///
/// A non-null `backend` must point at the `native` field of a live (or
/// copied) [`RefdbBackendTable`].
pub(crate) unsafe fn context_of(backend: *const NativeRefdbBackend) -> BridgeResult<ContextToken> {
    if backend.is_null() {
        return Err(Fault::NullArgument("backend"));
    }
    Ok(backend
        .cast::<u8>()
        .add(CONTEXT_OFFSET)
        .cast::<ContextToken>()
        .read())
}

/// Heap allocation whose address is handed to the engine.
///
/// Only ever holds one of the two call tables.
pub(crate) struct Pinned<T>(Box<T>);

// SAFETY: a backend table holds function pointers and a token.
unsafe impl Send for Pinned<RefdbBackendTable> {}

// SAFETY: an iterator table also holds the owning backend's address, which
// the bridge never dereferences.
unsafe impl Send for Pinned<crate::iterator::RefIterTable> {}

impl<T> Pinned<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Box::new(value))
    }

    pub(crate) fn as_non_null(&self) -> NonNull<T> {
        NonNull::from(&*self.0)
    }
}

/// Registry entry for a backend exposed to the engine.
pub(crate) struct BackendSlot {
    pub(crate) backend: Box<dyn RefdbBackend>,
    pub(crate) factory: Arc<dyn ReferenceFactory>,
    table: Pinned<RefdbBackendTable>,
}

pub(crate) static BACKENDS: Lazy<HandleRegistry<BackendSlot>> =
    Lazy::new(|| HandleRegistry::new("refdb backend"));

/// Whether `token` still names a live backend.
pub fn backend_is_live(token: ContextToken) -> bool {
    BACKENDS.contains(token)
}

/// Number of backends currently exposed to the engine.
pub fn live_backends() -> usize {
    BACKENDS.len()
}

enum BridgeState {
    Pending {
        backend: Box<dyn RefdbBackend>,
        factory: Arc<dyn ReferenceFactory>,
    },
    Exposed {
        token: ContextToken,
        table: NonNull<NativeRefdbBackend>,
    },
    Building,
}

/// Owner of a backend until the engine takes it over.
///
/// The first [`call_table`](Self::call_table) registers the backend and
/// builds its table; later calls return the same pointer. From then on the
/// engine owns the backend and ends its life through the table's `free`
/// slot. A bridge dropped before exposing its table drops the backend without
/// calling [`RefdbBackend::free`].
pub struct BackendBridge {
    state: BridgeState,
}

impl BackendBridge {
    pub fn new<B>(backend: B, factory: Arc<dyn ReferenceFactory>) -> Self
    where
        B: RefdbBackend + 'static,
    {
        Self::from_boxed(Box::new(backend), factory)
    }

    pub fn from_boxed(backend: Box<dyn RefdbBackend>, factory: Arc<dyn ReferenceFactory>) -> Self {
        Self {
            state: BridgeState::Pending { backend, factory },
        }
    }

    /// The engine-facing table, built on first use.
    pub fn call_table(&mut self) -> NonNull<NativeRefdbBackend> {
        let (token, table) = match mem::replace(&mut self.state, BridgeState::Building) {
            BridgeState::Exposed { token, table } => (token, table),
            BridgeState::Pending { backend, factory } => expose(backend, factory),
            BridgeState::Building => unreachable!("backend call table built re-entrantly"),
        };
        self.state = BridgeState::Exposed { token, table };
        table
    }

    /// The backend's token, once the table exists.
    pub fn token(&self) -> Option<ContextToken> {
        match self.state {
            BridgeState::Exposed { token, .. } => Some(token),
            _ => None,
        }
    }
}

fn expose(
    backend: Box<dyn RefdbBackend>,
    factory: Arc<dyn ReferenceFactory>,
) -> (ContextToken, NonNull<NativeRefdbBackend>) {
    let capabilities = backend.capabilities();
    let (token, table) = BACKENDS.register_with(|token| {
        let slot = BackendSlot {
            backend,
            factory,
            table: Pinned::new(RefdbBackendTable::build(capabilities, token)),
        };
        let table = slot.table_ptr();
        (slot, table)
    });
    debug!(token = token.get(), capabilities = ?capabilities, "refdb backend call table built");
    (token, table)
}

impl BackendSlot {
    /// Address of the table this slot backs, for linking iterators.
    pub(crate) fn table_ptr(&self) -> NonNull<NativeRefdbBackend> {
        self.table.as_non_null().cast()
    }
}
