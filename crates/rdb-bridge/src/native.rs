//! Native reference objects and the factory that builds them.
//!
//! The engine owns the representation of a reference. The bridge never builds
//! one itself: it asks a [`ReferenceFactory`] to allocate one from a
//! [`Reference`], and to describe one the engine hands over for a write.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr::{self, NonNull};

use rdb_refs::{Reference, ReferenceTarget};
use rdb_types::{ObjectId, OID_RAWSZ};

use crate::error::{BridgeResult, Fault};

/// Engine kind value for a direct reference.
pub const REFERENCE_DIRECT: c_int = 1;
/// Engine kind value for a symbolic reference.
pub const REFERENCE_SYMBOLIC: c_int = 2;

/// Opaque engine reference object. Only ever handled by pointer.
#[repr(C)]
pub struct NativeReference {
    _private: [u8; 0],
}

/// What the engine reports about one of its references.
///
/// The kind is the raw engine value; [`into_reference`](Self::into_reference)
/// rejects anything the bridge does not understand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeRecord {
    pub name: String,
    pub kind: c_int,
    pub direct: Option<ObjectId>,
    pub symbolic: Option<String>,
}

impl NativeRecord {
    pub fn into_reference(self) -> BridgeResult<Reference> {
        match self.kind {
            REFERENCE_DIRECT => match self.direct {
                Some(oid) => Ok(Reference::direct(self.name, oid)),
                None => Err(Fault::MalformedReference {
                    name: self.name,
                    reason: "direct reference without a target id",
                }),
            },
            REFERENCE_SYMBOLIC => match self.symbolic {
                Some(target) => Ok(Reference::symbolic(self.name, target)),
                None => Err(Fault::MalformedReference {
                    name: self.name,
                    reason: "symbolic reference without a target name",
                }),
            },
            kind => Err(Fault::UnknownReferenceKind {
                name: self.name,
                kind,
            }),
        }
    }
}

/// Builds and reads engine reference objects.
pub trait ReferenceFactory: Send + Sync {
    /// Allocate an engine reference for `reference`. Ownership passes to the
    /// caller, who returns it with [`release`](Self::release).
    fn allocate(&self, reference: &Reference) -> BridgeResult<NonNull<NativeReference>>;

    /// Read an engine reference.
    ///
    /// # Safety
    ///
    /// `native` must point to a live reference in this factory's format.
    unsafe fn describe(&self, native: NonNull<NativeReference>) -> BridgeResult<NativeRecord>;

    /// Free a reference produced by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `native` must come from this factory and must not be used afterwards.
    unsafe fn release(&self, native: NonNull<NativeReference>);
}

/// Heap layout used by [`BoxedReferenceFactory`].
#[repr(C)]
#[derive(Debug)]
pub struct OwnedNativeReference {
    pub kind: c_int,
    pub oid: [u8; OID_RAWSZ],
    pub name: *mut c_char,
    /// Null for direct references.
    pub symbolic: *mut c_char,
}

/// A [`ReferenceFactory`] whose references are boxed [`OwnedNativeReference`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxedReferenceFactory;

fn to_cstring(s: &str) -> BridgeResult<CString> {
    CString::new(s).map_err(|_| Fault::InteriorNul(s.to_string()))
}

unsafe fn read_str(ptr: *const c_char, what: &'static str) -> BridgeResult<String> {
    if ptr.is_null() {
        return Err(Fault::NullArgument(what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| Fault::InvalidUtf8(what))
}

impl ReferenceFactory for BoxedReferenceFactory {
    fn allocate(&self, reference: &Reference) -> BridgeResult<NonNull<NativeReference>> {
        let name = to_cstring(reference.name())?;
        let (kind, oid, symbolic) = match reference.target() {
            ReferenceTarget::Direct(oid) => (REFERENCE_DIRECT, *oid.as_bytes(), ptr::null_mut()),
            ReferenceTarget::Symbolic(target) => (
                REFERENCE_SYMBOLIC,
                [0u8; OID_RAWSZ],
                to_cstring(target)?.into_raw(),
            ),
        };
        let owned = Box::new(OwnedNativeReference {
            kind,
            oid,
            name: name.into_raw(),
            symbolic,
        });
        Ok(NonNull::from(Box::leak(owned)).cast())
    }

    unsafe fn describe(&self, native: NonNull<NativeReference>) -> BridgeResult<NativeRecord> {
        let owned = native.cast::<OwnedNativeReference>().as_ref();
        let name = read_str(owned.name, "reference name")?;
        let (direct, symbolic) = match owned.kind {
            REFERENCE_DIRECT => (Some(ObjectId::from_raw(owned.oid)), None),
            REFERENCE_SYMBOLIC => (None, Some(read_str(owned.symbolic, "symbolic target")?)),
            _ => (None, None),
        };
        Ok(NativeRecord {
            name,
            kind: owned.kind,
            direct,
            symbolic,
        })
    }

    unsafe fn release(&self, native: NonNull<NativeReference>) {
        let owned = Box::from_raw(native.cast::<OwnedNativeReference>().as_ptr());
        if !owned.name.is_null() {
            drop(CString::from_raw(owned.name));
        }
        if !owned.symbolic.is_null() {
            drop(CString::from_raw(owned.symbolic));
        }
    }
}

/// C entry point releasing a reference allocated by [`BoxedReferenceFactory`].
///
/// # Safety
///
/// `reference` must be null or come from [`BoxedReferenceFactory::allocate`]
/// and not have been released yet.
#[no_mangle]
pub unsafe extern "C" fn rdb_reference_free(reference: *mut NativeReference) {
    if let Some(native) = NonNull::new(reference) {
        BoxedReferenceFactory.release(native);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_release_is_a_no_op() {
        unsafe { rdb_reference_free(ptr::null_mut()) };
        let native = BoxedReferenceFactory
            .allocate(&Reference::direct("refs/heads/x", ObjectId::null()))
            .unwrap();
        unsafe { rdb_reference_free(native.as_ptr()) };
    }

    #[test]
    fn direct_reference_survives_allocation() {
        let factory = BoxedReferenceFactory;
        let oid = ObjectId::hash_of(b"tip");
        let native = factory
            .allocate(&Reference::direct("refs/heads/main", oid))
            .unwrap();

        let record = unsafe { factory.describe(native) }.unwrap();
        assert_eq!(record.kind, REFERENCE_DIRECT);
        assert_eq!(
            record.into_reference().unwrap(),
            Reference::direct("refs/heads/main", oid)
        );
        unsafe { factory.release(native) };
    }

    #[test]
    fn symbolic_reference_survives_allocation() {
        let factory = BoxedReferenceFactory;
        let native = factory
            .allocate(&Reference::symbolic("HEAD", "refs/heads/main"))
            .unwrap();

        let record = unsafe { factory.describe(native) }.unwrap();
        assert_eq!(record.direct, None);
        assert_eq!(
            record.into_reference().unwrap(),
            Reference::symbolic("HEAD", "refs/heads/main")
        );
        unsafe { factory.release(native) };
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let record = NativeRecord {
            name: "refs/heads/x".into(),
            kind: 0,
            direct: None,
            symbolic: None,
        };
        assert!(matches!(
            record.into_reference(),
            Err(Fault::UnknownReferenceKind { kind: 0, .. })
        ));
    }

    #[test]
    fn payload_must_match_kind() {
        let record = NativeRecord {
            name: "HEAD".into(),
            kind: REFERENCE_SYMBOLIC,
            direct: Some(ObjectId::null()),
            symbolic: None,
        };
        assert!(matches!(
            record.into_reference(),
            Err(Fault::MalformedReference { .. })
        ));
    }

    #[test]
    fn interior_nul_is_refused() {
        let err = BoxedReferenceFactory
            .allocate(&Reference::symbolic("HEAD", "refs/heads/a\0b"))
            .unwrap_err();
        assert!(matches!(err, Fault::InteriorNul(_)));
    }
}
