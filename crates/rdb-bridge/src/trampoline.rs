//! Backend-side callbacks wired into [`NativeRefdbBackend`].
//!
//! Every trampoline follows the same steps: resolve the context token, decode
//! the native arguments, call the backend, then encode the result. Failures
//! and panics stop at [`guard`], which turns them into [`Status::Error`] plus
//! a message on the error channel. Output slots are written last, only on
//! success.

use std::any::Any;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

use rdb_refs::ReferenceTarget;
use tracing::{debug, warn};

use crate::error::{set_last_error, BridgeResult, Fault};
use crate::iterator::{IteratorBridge, NativeRefIterator};
use crate::native::NativeReference;
use crate::status::Status;
use crate::table::{context_of, NativeRefdbBackend, BACKENDS};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn report(operation: &'static str, fault: &Fault) {
    warn!(operation, error = %fault, "refdb callback failed");
    set_last_error(&format!("{operation}: {fault}"));
}

/// Run one callback body, translating its outcome into a status code.
pub(crate) fn guard<F>(operation: &'static str, body: F) -> c_int
where
    F: FnOnce() -> BridgeResult<Status>,
{
    let fault = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(status)) => return status.code(),
        Ok(Err(fault)) => fault,
        Err(payload) => Fault::Panic(panic_message(payload)),
    };
    report(operation, &fault);
    Status::Error.code()
}

/// Like [`guard`] for teardown callbacks, which have no return channel.
pub(crate) fn guard_teardown<F>(operation: &'static str, body: F)
where
    F: FnOnce() -> BridgeResult<()>,
{
    let fault = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => return,
        Ok(Err(fault)) => fault,
        Err(payload) => Fault::Panic(panic_message(payload)),
    };
    report(operation, &fault);
}

pub(crate) fn out_slot<T>(ptr: *mut T, what: &'static str) -> BridgeResult<NonNull<T>> {
    NonNull::new(ptr).ok_or(Fault::NullArgument(what))
}

/// Borrow a NUL-terminated UTF-8 argument.
///
/// # Safety
///
/// A non-null `ptr` must point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn text_arg<'a>(ptr: *const c_char, what: &'static str) -> BridgeResult<&'a str> {
    if ptr.is_null() {
        return Err(Fault::NullArgument(what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| Fault::InvalidUtf8(what))
}

pub(crate) unsafe extern "C" fn backend_exists(
    exists: *mut c_int,
    backend: *mut NativeRefdbBackend,
    name: *const c_char,
) -> c_int {
    guard("exists", || {
        let out = out_slot(exists, "exists output")?;
        let entry = BACKENDS.resolve(context_of(backend)?)?;
        let name = text_arg(name, "reference name")?;

        let found = entry.lock().backend.exists(name)?;
        *out.as_ptr() = c_int::from(found);
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn backend_lookup(
    out: *mut *mut NativeReference,
    backend: *mut NativeRefdbBackend,
    name: *const c_char,
) -> c_int {
    guard("lookup", || {
        let out = out_slot(out, "lookup output")?;
        let entry = BACKENDS.resolve(context_of(backend)?)?;
        let name = text_arg(name, "reference name")?;

        let slot = entry.lock();
        let Some(reference) = slot.backend.lookup(name)? else {
            return Ok(Status::NotFound);
        };
        let native = slot.factory.allocate(&reference)?;
        *out.as_ptr() = native.as_ptr();
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn backend_write(
    backend: *mut NativeRefdbBackend,
    reference: *const NativeReference,
    _force: c_int,
) -> c_int {
    guard("write", || {
        let entry = BACKENDS.resolve(context_of(backend)?)?;
        let native = NonNull::new(reference.cast_mut()).ok_or(Fault::NullArgument("reference"))?;

        let mut slot = entry.lock();
        let record = slot.factory.describe(native)?;
        if slot.backend.exists(&record.name)? {
            debug!(name = %record.name, "write refused: reference exists");
            return Ok(Status::Exists);
        }

        let reference = record.into_reference()?;
        match reference.target() {
            ReferenceTarget::Direct(oid) => slot.backend.write_direct_reference(reference.name(), oid)?,
            ReferenceTarget::Symbolic(target) => {
                slot.backend.write_symbolic_reference(reference.name(), target)?
            }
        }
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn backend_delete(
    backend: *mut NativeRefdbBackend,
    name: *const c_char,
) -> c_int {
    guard("delete", || {
        let entry = BACKENDS.resolve(context_of(backend)?)?;
        let name = text_arg(name, "reference name")?;

        entry.lock().backend.delete(name)?;
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn backend_compress(backend: *mut NativeRefdbBackend) -> c_int {
    guard("compress", || {
        let entry = BACKENDS.resolve(context_of(backend)?)?;
        entry.lock().backend.compress()?;
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn backend_iterator(
    out: *mut *mut NativeRefIterator,
    backend: *mut NativeRefdbBackend,
    glob: *const c_char,
) -> c_int {
    guard("iterator", || {
        let out = out_slot(out, "iterator output")?;
        let entry = BACKENDS.resolve(context_of(backend)?)?;
        let pattern = if glob.is_null() {
            None
        } else {
            Some(text_arg(glob, "glob")?)
        };

        let (iter, factory, owner) = {
            let mut slot = entry.lock();
            let iter = slot.backend.foreach_glob(pattern)?;
            (iter, slot.factory.clone(), slot.table_ptr())
        };
        let table = IteratorBridge::new(iter, factory).call_table(owner);
        *out.as_ptr() = table.as_ptr();
        Ok(Status::Ok)
    })
}

pub(crate) unsafe extern "C" fn backend_free(backend: *mut NativeRefdbBackend) {
    guard_teardown("free", || {
        let token = context_of(backend)?;
        // Unregister before any implementation code runs, so a panicking
        // `free` cannot leave the token live. Dropping the entry frees the
        // table `backend` points into.
        let entry = BACKENDS.release(token)?;
        entry.lock().backend.free();
        debug!(token = token.get(), "refdb backend freed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::last_error;

    #[test]
    fn guard_passes_status_through() {
        assert_eq!(guard("test", || Ok(Status::NotFound)), Status::NotFound.code());
    }

    #[test]
    fn guard_reports_faults() {
        let code = guard("test", || Err(Fault::NullArgument("thing")));
        assert_eq!(code, Status::Error.code());
        assert_eq!(
            last_error().as_deref(),
            Some("test: null pointer passed for thing")
        );
    }

    #[test]
    fn guard_catches_panics() {
        let code = guard("test", || panic!("kaboom"));
        assert_eq!(code, Status::Error.code());
        assert_eq!(
            last_error().as_deref(),
            Some("test: implementation panicked: kaboom")
        );
    }

    #[test]
    fn teardown_guard_swallows_faults() {
        guard_teardown("teardown", || Err(Fault::NullArgument("backend")));
        assert_eq!(
            last_error().as_deref(),
            Some("teardown: null pointer passed for backend")
        );
    }

    #[test]
    fn text_arg_rejects_null_and_bad_utf8() {
        assert!(matches!(
            unsafe { text_arg(std::ptr::null(), "name") },
            Err(Fault::NullArgument("name"))
        ));
        let bad = b"\xff\xfe\0";
        assert!(matches!(
            unsafe { text_arg(bad.as_ptr().cast(), "name") },
            Err(Fault::InvalidUtf8("name"))
        ));
    }
}
