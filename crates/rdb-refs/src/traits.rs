//! The [`RefdbBackend`] and [`RefIterator`] traits defining the pluggable
//! storage contract.
//!
//! Any storage (in-memory, database, network service) implements these traits
//! to serve references to the engine through the bridge.

use bitflags::bitflags;
use rdb_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{RefError, Result};
use crate::types::Reference;

bitflags! {
    /// Optional operations a backend advertises.
    ///
    /// Queried once when the engine-facing call table is built. Advertising a
    /// flag without overriding the matching trait method is a bug in the
    /// backend; it only surfaces as [`RefError::Unsupported`] at call time.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u32 {
        /// [`RefdbBackend::foreach_glob`] is implemented.
        const FOREACH_GLOB = 1 << 0;
        /// [`RefdbBackend::compress`] is implemented.
        const COMPRESS = 1 << 1;
    }
}

/// Storage backend for named references.
///
/// The engine serializes calls into one backend instance, so mutating
/// operations take `&mut self`. Implementations shared between several
/// instances must synchronize internally.
///
/// A backend never observes an overwrite through the bridge: writes are only
/// forwarded for names that [`exists`](Self::exists) reported absent.
pub trait RefdbBackend: Send {
    /// Optional operations this backend implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Whether a reference with this name exists.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Read a reference by its full name.
    ///
    /// Returns `Ok(None)` if the reference does not exist.
    fn lookup(&self, name: &str) -> Result<Option<Reference>>;

    /// Create a reference pointing at an object.
    fn write_direct_reference(&mut self, name: &str, target: &ObjectId) -> Result<()>;

    /// Create a reference pointing at another reference by name.
    fn write_symbolic_reference(&mut self, name: &str, target: &str) -> Result<()>;

    /// Delete a reference. Whether deleting an absent name fails is up to the
    /// implementation.
    fn delete(&mut self, name: &str) -> Result<()>;

    /// Start enumerating the references whose names match `pattern`.
    ///
    /// `None` enumerates every reference. Pattern syntax is defined by the
    /// implementation.
    fn foreach_glob(&mut self, pattern: Option<&str>) -> Result<Box<dyn RefIterator>> {
        let _ = pattern;
        Err(RefError::Unsupported {
            operation: "foreach_glob",
        })
    }

    /// Optimize the underlying storage.
    fn compress(&mut self) -> Result<()> {
        Err(RefError::Unsupported {
            operation: "compress",
        })
    }

    /// Release backend resources. Called exactly once, when the engine tears
    /// the backend down. Must not panic.
    fn free(&mut self);
}

/// Forward-only cursor over references produced by
/// [`RefdbBackend::foreach_glob`].
///
/// [`next`](Self::next) and [`next_name`](Self::next_name) advance the same
/// cursor: mixing them yields whatever entry comes next.
pub trait RefIterator: Send {
    /// The next reference, or `Ok(None)` once the sequence is exhausted.
    ///
    /// After exhaustion, every further call must keep returning `Ok(None)`.
    fn next(&mut self) -> Result<Option<Reference>>;

    /// The name of the next reference, or `Ok(None)` once exhausted.
    fn next_name(&mut self) -> Result<Option<String>> {
        Ok(self.next()?.map(Reference::into_name))
    }

    /// Release iterator resources. Must not panic.
    fn free(&mut self);
}
