//! Foundation types for the refdb bridge.
//!
//! Every other `rdb-*` crate depends on `rdb-types` for the identifier that a
//! direct reference points at.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Raw 20-byte content identifier, as the storage engine
//!   stores it
//! - [`TypeError`]: Parsing failures for identifiers

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::{ObjectId, OID_HEXSZ, OID_RAWSZ};
