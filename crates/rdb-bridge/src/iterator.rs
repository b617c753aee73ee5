//! Engine-facing iterator call table.
//!
//! An iterator table is built for every [`RefIterator`] a backend produces.
//! It links back to the owning backend's table and carries its own
//! [`ContextToken`], so freeing one never touches the other.
//!
//! Lifecycle: created, iterating, exhausted, freed. Once the implementation
//! reports the end, the bridge stops calling it and keeps answering
//! [`Status::IterationOver`] until the engine frees the iterator.

use std::ffi::CString;
use std::mem;
use std::os::raw::{c_char, c_int};
use std::ptr::NonNull;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rdb_refs::{RefIterator, Reference};
use tracing::debug;

use crate::error::{BridgeResult, Fault};
use crate::native::{NativeReference, ReferenceFactory};
use crate::registry::{ContextToken, HandleRegistry};
use crate::status::Status;
use crate::table::{NativeRefdbBackend, Pinned};
use crate::trampoline::{guard, guard_teardown, out_slot};

pub type NextFn =
    unsafe extern "C" fn(out: *mut *mut NativeReference, iter: *mut NativeRefIterator) -> c_int;
pub type NextNameFn =
    unsafe extern "C" fn(out: *mut *const c_char, iter: *mut NativeRefIterator) -> c_int;
pub type IterFreeFn = unsafe extern "C" fn(iter: *mut NativeRefIterator);

/// The iterator structure as the engine declares it. Field order is fixed.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NativeRefIterator {
    /// Table of the backend that produced this iterator.
    pub db: *mut NativeRefdbBackend,
    pub next: Option<NextFn>,
    pub next_name: Option<NextNameFn>,
    pub free: Option<IterFreeFn>,
}

/// [`NativeRefIterator`] plus the bridge's bookkeeping.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RefIterTable {
    pub native: NativeRefIterator,
    context: ContextToken,
}

/// Offset of the context token in an iterator table.
pub const ITER_CONTEXT_OFFSET: usize = mem::offset_of!(RefIterTable, context);

impl RefIterTable {
    fn build(owner: NonNull<NativeRefdbBackend>, context: ContextToken) -> Self {
        Self {
            native: NativeRefIterator {
                db: owner.as_ptr(),
                next: Some(iter_next),
                next_name: Some(iter_next_name),
                free: Some(iter_free),
            },
            context,
        }
    }

    pub fn context(&self) -> ContextToken {
        self.context
    }
}

unsafe fn iter_context_of(iter: *const NativeRefIterator) -> BridgeResult<ContextToken> {
    if iter.is_null() {
        return Err(Fault::NullArgument("iterator"));
    }
    Ok(iter
        .cast::<u8>()
        .add(ITER_CONTEXT_OFFSET)
        .cast::<ContextToken>()
        .read())
}

/// Registry entry for an iterator exposed to the engine.
pub(crate) struct IteratorSlot {
    iter: Box<dyn RefIterator>,
    factory: Arc<dyn ReferenceFactory>,
    exhausted: bool,
    /// Backs the pointer returned by the last `next_name`.
    last_name: Option<CString>,
    _table: Pinned<RefIterTable>,
}

impl IteratorSlot {
    fn advance(&mut self) -> BridgeResult<Option<Reference>> {
        if self.exhausted {
            return Ok(None);
        }
        let next = self.iter.next()?;
        self.exhausted = next.is_none();
        Ok(next)
    }

    fn advance_name(&mut self) -> BridgeResult<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }
        let next = self.iter.next_name()?;
        self.exhausted = next.is_none();
        Ok(next)
    }
}

pub(crate) static ITERATORS: Lazy<HandleRegistry<IteratorSlot>> =
    Lazy::new(|| HandleRegistry::new("refdb iterator"));

/// Whether `token` still names a live iterator.
pub fn iterator_is_live(token: ContextToken) -> bool {
    ITERATORS.contains(token)
}

/// Number of iterators currently exposed to the engine.
pub fn live_iterators() -> usize {
    ITERATORS.len()
}

/// Owner of an iterator until the engine takes it over.
///
/// Mirrors [`BackendBridge`](crate::BackendBridge): the table is built and the
/// iterator registered on the first [`call_table`](Self::call_table), and the
/// same pointer is returned afterwards.
pub struct IteratorBridge {
    pending: Option<(Box<dyn RefIterator>, Arc<dyn ReferenceFactory>)>,
    exposed: Option<(ContextToken, NonNull<NativeRefIterator>)>,
}

impl IteratorBridge {
    pub fn new(iter: Box<dyn RefIterator>, factory: Arc<dyn ReferenceFactory>) -> Self {
        Self {
            pending: Some((iter, factory)),
            exposed: None,
        }
    }

    /// The engine-facing table, linked to `owner`, built on first use.
    pub fn call_table(&mut self, owner: NonNull<NativeRefdbBackend>) -> NonNull<NativeRefIterator> {
        if let Some((_, table)) = self.exposed {
            return table;
        }
        let Some((iter, factory)) = self.pending.take() else {
            unreachable!("iterator bridge holds its iterator until exposed");
        };
        let (token, table) = ITERATORS.register_with(|token| {
            let pinned = Pinned::new(RefIterTable::build(owner, token));
            let table = pinned.as_non_null().cast::<NativeRefIterator>();
            let slot = IteratorSlot {
                iter,
                factory,
                exhausted: false,
                last_name: None,
                _table: pinned,
            };
            (slot, table)
        });
        debug!(token = token.get(), "refdb iterator call table built");
        self.exposed = Some((token, table));
        table
    }

    pub fn token(&self) -> Option<ContextToken> {
        self.exposed.map(|(token, _)| token)
    }
}

pub(crate) unsafe extern "C" fn iter_next(
    out: *mut *mut NativeReference,
    iter: *mut NativeRefIterator,
) -> c_int {
    guard("iterator next", || {
        let out = out_slot(out, "next output")?;
        let entry = ITERATORS.resolve(iter_context_of(iter)?)?;

        let mut slot = entry.lock();
        let Some(reference) = slot.advance()? else {
            return Ok(Status::IterationOver);
        };
        let native = slot.factory.allocate(&reference)?;
        *out.as_ptr() = native.as_ptr();
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn iter_next_name(
    out: *mut *const c_char,
    iter: *mut NativeRefIterator,
) -> c_int {
    guard("iterator next_name", || {
        let out = out_slot(out, "next_name output")?;
        let entry = ITERATORS.resolve(iter_context_of(iter)?)?;

        let mut slot = entry.lock();
        let Some(name) = slot.advance_name()? else {
            slot.last_name = None;
            return Ok(Status::IterationOver);
        };
        let name = CString::new(name).map_err(|e| {
            Fault::InteriorNul(String::from_utf8_lossy(&e.into_vec()).into_owned())
        })?;
        let name_ptr = slot.last_name.insert(name).as_ptr();
        *out.as_ptr() = name_ptr;
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn iter_free(iter: *mut NativeRefIterator) {
    guard_teardown("iterator free", || {
        let token = iter_context_of(iter)?;
        // Same order as the backend teardown: unregister first.
        let entry = ITERATORS.release(token)?;
        entry.lock().iter.free();
        debug!(token = token.get(), "refdb iterator freed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::BoxedReferenceFactory;
    use rdb_refs::MemoryRefIter;
    use rdb_types::ObjectId;
    use std::ptr;

    fn dangling_owner() -> NonNull<NativeRefdbBackend> {
        NonNull::dangling()
    }

    fn bridge(names: &[&str]) -> IteratorBridge {
        let refs = names
            .iter()
            .map(|n| Reference::direct(*n, ObjectId::hash_of(n.as_bytes())))
            .collect();
        IteratorBridge::new(
            Box::new(MemoryRefIter::new(refs)),
            Arc::new(BoxedReferenceFactory),
        )
    }

    #[test]
    fn context_sits_right_after_native_fields() {
        assert_eq!(ITER_CONTEXT_OFFSET, mem::size_of::<NativeRefIterator>());
    }

    #[test]
    fn call_table_is_memoized_and_linked() {
        let owner = dangling_owner();
        let mut bridge = bridge(&["refs/heads/a"]);
        let first = bridge.call_table(owner);
        let second = bridge.call_table(owner);
        assert_eq!(first, second);

        let native = unsafe { *first.as_ptr() };
        assert_eq!(native.db, owner.as_ptr());
        let token = bridge.token().unwrap();
        assert!(iterator_is_live(token));

        unsafe { (native.free.unwrap())(first.as_ptr()) };
        assert!(!iterator_is_live(token));
    }

    #[test]
    fn exhausted_iterator_stays_exhausted() {
        let mut bridge = bridge(&["refs/heads/a"]);
        let table = bridge.call_table(dangling_owner());
        let native = unsafe { *table.as_ptr() };
        let next_name = native.next_name.unwrap();

        let mut name: *const c_char = ptr::null();
        assert_eq!(unsafe { next_name(&mut name, table.as_ptr()) }, Status::Ok.code());
        let read = unsafe { std::ffi::CStr::from_ptr(name) };
        assert_eq!(read.to_str().unwrap(), "refs/heads/a");

        for _ in 0..3 {
            let mut out: *mut NativeReference = ptr::null_mut();
            assert_eq!(
                unsafe { (native.next.unwrap())(&mut out, table.as_ptr()) },
                Status::IterationOver.code()
            );
            assert!(out.is_null());
        }

        unsafe { (native.free.unwrap())(table.as_ptr()) };
    }

    #[test]
    fn freed_iterator_does_not_resolve() {
        let mut bridge = bridge(&["refs/heads/a", "refs/heads/b"]);
        let table = bridge.call_table(dangling_owner());
        // Keep a copy: the real table is deallocated by free.
        let mut stale = unsafe { *table.cast::<RefIterTable>().as_ptr() };
        let stale_ptr = &mut stale as *mut RefIterTable as *mut NativeRefIterator;

        unsafe { (stale.native.free.unwrap())(table.as_ptr()) };

        let mut out: *mut NativeReference = ptr::null_mut();
        let code = unsafe { (stale.native.next.unwrap())(&mut out, stale_ptr) };
        assert_eq!(code, Status::Error.code());
        assert!(out.is_null());

        let mut name: *const c_char = ptr::null();
        let code = unsafe { (stale.native.next_name.unwrap())(&mut name, stale_ptr) };
        assert_eq!(code, Status::Error.code());
        assert!(name.is_null());

        // A second free hits the registry's not-found path.
        unsafe { (stale.native.free.unwrap())(stale_ptr) };
        assert!(crate::error::last_error().unwrap().contains("no live instance"));
    }
}
