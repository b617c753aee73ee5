//! Core reference record types.
//!
//! A [`Reference`] pairs a name with exactly one kind of target. The target is
//! an enum, so a direct record can never carry a symbolic name and vice versa.

use std::fmt;

use rdb_types::ObjectId;
use serde::{Deserialize, Serialize};

/// The value a reference points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTarget {
    /// Points at a fixed object identifier.
    Direct(ObjectId),
    /// Points at another reference by name (e.g. HEAD -> "refs/heads/main").
    ///
    /// The target is not resolved here; consumers follow the chain lazily.
    Symbolic(String),
}

/// Discriminant of a [`ReferenceTarget`], without the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Direct,
    Symbolic,
}

/// A named reference record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    name: String,
    target: ReferenceTarget,
}

impl Reference {
    /// Create a direct reference.
    pub fn direct(name: impl Into<String>, target: ObjectId) -> Self {
        Self {
            name: name.into(),
            target: ReferenceTarget::Direct(target),
        }
    }

    /// Create a symbolic reference.
    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: ReferenceTarget::Symbolic(target.into()),
        }
    }

    /// The canonical name (e.g. "refs/heads/main").
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &ReferenceTarget {
        &self.target
    }

    pub fn kind(&self) -> ReferenceKind {
        match self.target {
            ReferenceTarget::Direct(_) => ReferenceKind::Direct,
            ReferenceTarget::Symbolic(_) => ReferenceKind::Symbolic,
        }
    }

    /// Returns `true` if this reference names another reference.
    pub fn is_symbolic(&self) -> bool {
        matches!(self.target, ReferenceTarget::Symbolic(_))
    }

    /// The object identifier, for direct references.
    pub fn direct_target(&self) -> Option<&ObjectId> {
        match &self.target {
            ReferenceTarget::Direct(oid) => Some(oid),
            ReferenceTarget::Symbolic(_) => None,
        }
    }

    /// The target name, for symbolic references.
    pub fn symbolic_target(&self) -> Option<&str> {
        match &self.target {
            ReferenceTarget::Direct(_) => None,
            ReferenceTarget::Symbolic(name) => Some(name),
        }
    }

    /// Consume the record, returning its name.
    pub fn into_name(self) -> String {
        self.name
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ReferenceTarget::Direct(oid) => write!(f, "{} {}", oid, self.name),
            ReferenceTarget::Symbolic(target) => write!(f, "ref: {} {}", target, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_reference_has_no_symbolic_target() {
        let oid = ObjectId::hash_of(b"commit");
        let r = Reference::direct("refs/heads/main", oid);
        assert_eq!(r.kind(), ReferenceKind::Direct);
        assert!(!r.is_symbolic());
        assert_eq!(r.direct_target(), Some(&oid));
        assert_eq!(r.symbolic_target(), None);
    }

    #[test]
    fn symbolic_reference_has_no_direct_target() {
        let r = Reference::symbolic("HEAD", "refs/heads/main");
        assert_eq!(r.kind(), ReferenceKind::Symbolic);
        assert!(r.is_symbolic());
        assert_eq!(r.symbolic_target(), Some("refs/heads/main"));
        assert_eq!(r.direct_target(), None);
    }

    #[test]
    fn display_matches_loose_ref_format() {
        let r = Reference::symbolic("HEAD", "refs/heads/main");
        assert_eq!(r.to_string(), "ref: refs/heads/main HEAD");
    }

    #[test]
    fn serializes_target_with_kind_tag() {
        let r = Reference::symbolic("HEAD", "refs/heads/main");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["target"]["symbolic"], "refs/heads/main");
    }
}
