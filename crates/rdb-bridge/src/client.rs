//! Engine-side view of a call table.
//!
//! [`RefdbClient`] drives a [`NativeRefdbBackend`] exactly the way the storage
//! engine does: through its function pointers, with C strings and status
//! codes. It is what tools and tests use to talk to a bridged backend without
//! linking the engine itself.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use rdb_refs::Reference;

use crate::error::{last_error, ClientError, Fault};
use crate::iterator::NativeRefIterator;
use crate::native::{NativeReference, ReferenceFactory};
use crate::status::Status;
use crate::table::NativeRefdbBackend;

type ClientResult<T> = Result<T, ClientError>;

/// Map a returned code to a status, turning `Error` into a [`ClientError`]
/// carrying the error channel's message.
fn check(operation: &'static str, code: c_int) -> ClientResult<Status> {
    match Status::from_code(code) {
        Some(Status::Error) => Err(ClientError::Call {
            operation,
            status: Status::Error,
            message: last_error(),
        }),
        Some(status) => Ok(status),
        None => Err(ClientError::UnknownStatus { operation, code }),
    }
}

fn unexpected(operation: &'static str, status: Status) -> ClientError {
    ClientError::Call {
        operation,
        status,
        message: None,
    }
}

fn c_arg(s: &str) -> ClientResult<CString> {
    CString::new(s).map_err(|_| Fault::InteriorNul(s.to_string()).into())
}

/// Take ownership of an engine reference returned by a callback.
///
/// # Safety
///
/// `native` must be a reference allocated by `factory` and not yet released.
unsafe fn adopt(
    factory: &dyn ReferenceFactory,
    native: *mut NativeReference,
) -> ClientResult<Reference> {
    let native = NonNull::new(native).ok_or(Fault::NullArgument("returned reference"))?;
    let record = factory.describe(native);
    factory.release(native);
    Ok(record?.into_reference()?)
}

/// Owning handle on a backend call table.
///
/// Dropping the client calls the table's `free` slot, ending the backend's
/// life.
pub struct RefdbClient {
    table: NonNull<NativeRefdbBackend>,
    factory: Arc<dyn ReferenceFactory>,
}

impl RefdbClient {
    /// Wrap a call table.
    ///
    /// # Safety
    ///
    /// `table` must be a live call table that nothing else frees, and
    /// `factory` must be the factory the backend side allocates with.
    pub unsafe fn new(table: NonNull<NativeRefdbBackend>, factory: Arc<dyn ReferenceFactory>) -> Self {
        Self { table, factory }
    }

    fn native(&self) -> NativeRefdbBackend {
        // SAFETY: the table stays live until `self` is dropped.
        unsafe { *self.table.as_ptr() }
    }

    pub fn version(&self) -> c_uint {
        self.native().version
    }

    pub fn supports_glob(&self) -> bool {
        self.native().iterator.is_some()
    }

    pub fn supports_compress(&self) -> bool {
        self.native().compress.is_some()
    }

    pub fn exists(&self, name: &str) -> ClientResult<bool> {
        let exists_fn = self.native().exists.ok_or(ClientError::Unsupported("exists"))?;
        let name = c_arg(name)?;
        let mut found: c_int = 0;
        let code = unsafe { exists_fn(&mut found, self.table.as_ptr(), name.as_ptr()) };
        match check("exists", code)? {
            Status::Ok => Ok(found != 0),
            status => Err(unexpected("exists", status)),
        }
    }

    /// Read a reference; `Ok(None)` when the backend reports it absent.
    pub fn lookup(&self, name: &str) -> ClientResult<Option<Reference>> {
        let lookup_fn = self.native().lookup.ok_or(ClientError::Unsupported("lookup"))?;
        let name = c_arg(name)?;
        let mut out: *mut NativeReference = ptr::null_mut();
        let code = unsafe { lookup_fn(&mut out, self.table.as_ptr(), name.as_ptr()) };
        match check("lookup", code)? {
            Status::Ok => unsafe { adopt(&*self.factory, out) }.map(Some),
            Status::NotFound => Ok(None),
            status => Err(unexpected("lookup", status)),
        }
    }

    /// Create a reference. A collision surfaces as a [`ClientError`] whose
    /// [`status`](ClientError::status) is [`Status::Exists`].
    pub fn write(&self, reference: &Reference, force: bool) -> ClientResult<()> {
        let write_fn = self.native().write.ok_or(ClientError::Unsupported("write"))?;
        let native = self.factory.allocate(reference)?;
        let code = unsafe { write_fn(self.table.as_ptr(), native.as_ptr(), c_int::from(force)) };
        unsafe { self.factory.release(native) };
        match check("write", code)? {
            Status::Ok => Ok(()),
            status => Err(unexpected("write", status)),
        }
    }

    pub fn delete(&self, name: &str) -> ClientResult<()> {
        let delete_fn = self.native().del.ok_or(ClientError::Unsupported("delete"))?;
        let name = c_arg(name)?;
        let code = unsafe { delete_fn(self.table.as_ptr(), name.as_ptr()) };
        match check("delete", code)? {
            Status::Ok => Ok(()),
            status => Err(unexpected("delete", status)),
        }
    }

    pub fn compress(&self) -> ClientResult<()> {
        let compress_fn = self
            .native()
            .compress
            .ok_or(ClientError::Unsupported("compress"))?;
        let code = unsafe { compress_fn(self.table.as_ptr()) };
        match check("compress", code)? {
            Status::Ok => Ok(()),
            status => Err(unexpected("compress", status)),
        }
    }

    /// Enumerate references matching `pattern` (all of them for `None`).
    pub fn iter(&self, pattern: Option<&str>) -> ClientResult<RefIterClient> {
        let iterator_fn = self
            .native()
            .iterator
            .ok_or(ClientError::Unsupported("iterator"))?;
        let pattern = pattern.map(c_arg).transpose()?;
        let glob = pattern.as_ref().map_or(ptr::null(), |p| p.as_ptr());

        let mut out: *mut NativeRefIterator = ptr::null_mut();
        let code = unsafe { iterator_fn(&mut out, self.table.as_ptr(), glob) };
        match check("iterator", code)? {
            Status::Ok => {
                let iter = NonNull::new(out).ok_or(Fault::NullArgument("returned iterator"))?;
                Ok(RefIterClient {
                    iter,
                    factory: Arc::clone(&self.factory),
                })
            }
            status => Err(unexpected("iterator", status)),
        }
    }

    /// Free the backend now rather than at drop.
    pub fn free(self) {}
}

impl Drop for RefdbClient {
    fn drop(&mut self) {
        if let Some(free_fn) = self.native().free {
            unsafe { free_fn(self.table.as_ptr()) };
        }
    }
}

/// Owning handle on an iterator call table. Dropping it frees the iterator.
pub struct RefIterClient {
    iter: NonNull<NativeRefIterator>,
    factory: Arc<dyn ReferenceFactory>,
}

impl RefIterClient {
    fn native(&self) -> NativeRefIterator {
        // SAFETY: the table stays live until `self` is dropped.
        unsafe { *self.iter.as_ptr() }
    }

    /// Table of the backend that produced this iterator.
    pub fn owner(&self) -> *mut NativeRefdbBackend {
        self.native().db
    }

    /// The next reference, or `Ok(None)` once the backend reports the end.
    pub fn next_reference(&mut self) -> ClientResult<Option<Reference>> {
        let next_fn = self.native().next.ok_or(ClientError::Unsupported("next"))?;
        let mut out: *mut NativeReference = ptr::null_mut();
        let code = unsafe { next_fn(&mut out, self.iter.as_ptr()) };
        match check("next", code)? {
            Status::Ok => unsafe { adopt(&*self.factory, out) }.map(Some),
            Status::IterationOver => Ok(None),
            status => Err(unexpected("next", status)),
        }
    }

    /// The name of the next reference, or `Ok(None)` at the end.
    pub fn next_name(&mut self) -> ClientResult<Option<String>> {
        let next_name_fn = self
            .native()
            .next_name
            .ok_or(ClientError::Unsupported("next_name"))?;
        let mut out: *const c_char = ptr::null();
        let code = unsafe { next_name_fn(&mut out, self.iter.as_ptr()) };
        match check("next_name", code)? {
            Status::Ok => {
                if out.is_null() {
                    return Err(Fault::NullArgument("returned name").into());
                }
                let name = unsafe { CStr::from_ptr(out) }
                    .to_str()
                    .map_err(|_| Fault::InvalidUtf8("returned name"))?;
                Ok(Some(name.to_owned()))
            }
            Status::IterationOver => Ok(None),
            status => Err(unexpected("next_name", status)),
        }
    }
}

impl Iterator for RefIterClient {
    type Item = ClientResult<Reference>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_reference().transpose()
    }
}

impl Drop for RefIterClient {
    fn drop(&mut self) {
        if let Some(free_fn) = self.native().free {
            unsafe { free_fn(self.iter.as_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_maps_codes() {
        assert_eq!(check("op", 0).unwrap(), Status::Ok);
        assert_eq!(check("op", -3).unwrap(), Status::NotFound);
        assert!(matches!(
            check("op", 7),
            Err(ClientError::UnknownStatus { operation: "op", code: 7 })
        ));
    }

    #[test]
    fn error_code_carries_channel_message() {
        crate::error::set_last_error("lookup: backend unavailable");
        let err = check("lookup", -1).unwrap_err();
        assert_eq!(err.status(), Some(Status::Error));
        assert_eq!(
            err.to_string(),
            "lookup: error: lookup: backend unavailable"
        );
    }

    #[test]
    fn interior_nul_arguments_are_refused() {
        assert!(matches!(
            c_arg("refs/heads/a\0b"),
            Err(ClientError::Fault(Fault::InteriorNul(_)))
        ));
    }
}
