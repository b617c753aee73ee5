//! Reference records and the pluggable reference-database backend contract.
//!
//! A reference database maps names such as `refs/heads/main` or `HEAD` to
//! either an object identifier (a *direct* reference) or another reference's
//! name (a *symbolic* reference). This crate defines the records, the
//! [`RefdbBackend`] and [`RefIterator`] traits that a pluggable storage
//! implementation provides, and an in-memory implementation of both.
//!
//! # Architecture
//!
//! - **Backends** answer existence checks, lookups, writes, and deletes by
//!   name. Enumeration and compression are optional and advertised through
//!   [`Capabilities`].
//! - **Iterators** are forward-only cursors over the references matching a
//!   glob. They are produced by a backend and never restart.
//! - **Symbolic targets** are stored verbatim; resolving them is left to the
//!   consumer.
//!
//! # Modules
//!
//! - [`error`]: Error types for backend operations
//! - [`types`]: Core record types: [`Reference`], [`ReferenceTarget`]
//! - [`traits`]: The [`RefdbBackend`] and [`RefIterator`] traits
//! - [`names`]: Reference name validation
//! - [`config`]: Configuration for the in-memory backend
//! - [`memory`]: In-memory [`MemoryRefdb`] for tests and embedding

pub mod config;
pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use config::{CapabilityConfig, MemoryBackendConfig};
pub use error::{RefError, Result};
pub use memory::{MemoryRefIter, MemoryRefdb};
pub use names::validate_reference_name;
pub use traits::{Capabilities, RefIterator, RefdbBackend};
pub use types::{Reference, ReferenceKind, ReferenceTarget};
