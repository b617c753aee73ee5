use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Size of a raw object identifier in bytes.
pub const OID_RAWSZ: usize = 20;

/// Size of a hex-encoded object identifier.
pub const OID_HEXSZ: usize = OID_RAWSZ * 2;

/// Content identifier a direct reference points at.
///
/// The bridge never interprets the bytes: it copies them verbatim between the
/// engine's raw identifier slot and the backend. The layout is the engine's
/// 20-byte raw form so it can be passed across the boundary by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ObjectId([u8; OID_RAWSZ]);

impl ObjectId {
    /// Derive an `ObjectId` from arbitrary content (BLAKE3, truncated).
    pub fn hash_of(data: &[u8]) -> Self {
        let mut raw = [0u8; OID_RAWSZ];
        raw.copy_from_slice(&blake3::hash(data).as_bytes()[..OID_RAWSZ]);
        Self(raw)
    }

    /// Wrap raw identifier bytes.
    pub const fn from_raw(raw: [u8; OID_RAWSZ]) -> Self {
        Self(raw)
    }

    /// Copy an identifier out of a byte slice of exactly [`OID_RAWSZ`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != OID_RAWSZ {
            return Err(TypeError::InvalidLength {
                expected: OID_RAWSZ,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; OID_RAWSZ];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// The null object ID (all zeros).
    pub const fn null() -> Self {
        Self([0u8; OID_RAWSZ])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; OID_RAWSZ]
    }

    /// The raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; OID_RAWSZ] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 7 characters).
    pub fn short_hex(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(7);
        s
    }

    /// Parse from a full-length hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; OID_RAWSZ]> for ObjectId {
    fn from(raw: [u8; OID_RAWSZ]) -> Self {
        Self(raw)
    }
}

impl From<ObjectId> for [u8; OID_RAWSZ] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hash_of_is_deterministic() {
        let id1 = ObjectId::hash_of(b"hello world");
        let id2 = ObjectId::hash_of(b"hello world");
        assert_eq!(id1, id2);
        assert_ne!(id1, ObjectId::hash_of(b"hello"));
    }

    #[test]
    fn null_is_all_zeros() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.as_bytes(), &[0u8; OID_RAWSZ]);
    }

    #[test]
    fn display_is_full_hex() {
        let id = ObjectId::from_raw([0xab; OID_RAWSZ]);
        let display = format!("{id}");
        assert_eq!(display.len(), OID_HEXSZ);
        assert_eq!(id.short_hex(), "abababa");
    }

    #[test]
    fn rejects_wrong_length() {
        let err = ObjectId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: OID_RAWSZ,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_non_hex() {
        let err = "zz".repeat(OID_RAWSZ).parse::<ObjectId>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::hash_of(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn hex_parse_accepts_any_raw_id(raw in prop::array::uniform20(any::<u8>())) {
            let id = ObjectId::from_raw(raw);
            prop_assert_eq!(ObjectId::from_hex(&id.to_hex()).unwrap(), id);
        }
    }
}
