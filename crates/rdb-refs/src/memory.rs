//! In-memory reference backend for testing and embedding.
//!
//! [`MemoryRefdb`] stores all references in a `HashMap` protected by a
//! `RwLock`. Clones share the same store, so a test can keep one handle while
//! another is handed to the engine. Enumeration snapshots the matching
//! entries in lexical name order when the iterator is created.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use globset::{GlobBuilder, GlobMatcher};
use rdb_types::ObjectId;
use tracing::debug;

use crate::config::MemoryBackendConfig;
use crate::error::{RefError, Result};
use crate::names::validate_reference_name;
use crate::traits::{Capabilities, RefIterator, RefdbBackend};
use crate::types::Reference;

#[derive(Debug, Default)]
struct MemoryState {
    refs: HashMap<String, Reference>,
    compressions: u64,
}

/// An in-memory implementation of [`RefdbBackend`].
#[derive(Clone, Debug)]
pub struct MemoryRefdb {
    state: Arc<RwLock<MemoryState>>,
    config: MemoryBackendConfig,
}

impl MemoryRefdb {
    /// Create a new empty backend with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            config,
        }
    }

    pub fn config(&self) -> &MemoryBackendConfig {
        &self.config
    }

    /// Insert or replace a reference directly, bypassing the no-overwrite
    /// rule. Used to seed a store before handing it to the engine.
    pub fn insert(&self, reference: Reference) -> Result<()> {
        validate_reference_name(reference.name())?;
        let mut state = self.write_state()?;
        state.refs.insert(reference.name().to_string(), reference);
        Ok(())
    }

    /// Number of references currently stored.
    pub fn len(&self) -> usize {
        self.counters().refs.len()
    }

    /// Returns `true` if the store holds no references.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times [`RefdbBackend::compress`] has run.
    pub fn compressions(&self) -> u64 {
        self.counters().compressions
    }

    /// All stored references in name order.
    pub fn snapshot(&self) -> Result<Vec<Reference>> {
        let state = self.read_state()?;
        let mut refs: Vec<Reference> = state.refs.values().cloned().collect();
        refs.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(refs)
    }

    /// Read access for counts, which stay accurate even if a writer panicked.
    fn counters(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|e| RefError::Backend(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|e| RefError::Backend(format!("lock poisoned: {e}")))
    }

    fn insert_new(&self, reference: Reference) -> Result<()> {
        validate_reference_name(reference.name())?;
        let mut state = self.write_state()?;
        if state.refs.contains_key(reference.name()) {
            return Err(RefError::AlreadyExists {
                name: reference.name().to_string(),
            });
        }
        state.refs.insert(reference.name().to_string(), reference);
        Ok(())
    }

    fn is_excluded_root(&self, name: &str) -> bool {
        self.config.exclude_root && name == self.config.root_name
    }
}

impl Default for MemoryRefdb {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile an enumeration pattern.
///
/// `*` may cross `/`, `?` matches one character, `[...]` is a class. A pattern
/// without metacharacters only matches the identical name.
fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| RefError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.kind().to_string(),
        })
}

impl RefdbBackend for MemoryRefdb {
    fn capabilities(&self) -> Capabilities {
        self.config.capabilities.flags()
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.read_state()?.refs.contains_key(name))
    }

    fn lookup(&self, name: &str) -> Result<Option<Reference>> {
        Ok(self.read_state()?.refs.get(name).cloned())
    }

    fn write_direct_reference(&mut self, name: &str, target: &ObjectId) -> Result<()> {
        self.insert_new(Reference::direct(name, *target))
    }

    fn write_symbolic_reference(&mut self, name: &str, target: &str) -> Result<()> {
        validate_reference_name(target)?;
        self.insert_new(Reference::symbolic(name, target))
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        let mut state = self.write_state()?;
        match state.refs.remove(name) {
            Some(_) => Ok(()),
            None => Err(RefError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn foreach_glob(&mut self, pattern: Option<&str>) -> Result<Box<dyn RefIterator>> {
        let matcher = pattern.map(compile_pattern).transpose()?;
        let entries: Vec<Reference> = self
            .snapshot()?
            .into_iter()
            .filter(|r| !self.is_excluded_root(r.name()))
            .filter(|r| matcher.as_ref().map_or(true, |m| m.is_match(r.name())))
            .collect();
        debug!(pattern = ?pattern, matched = entries.len(), "memory refdb iterator created");
        Ok(Box::new(MemoryRefIter::new(entries)))
    }

    fn compress(&mut self) -> Result<()> {
        let mut state = self.write_state()?;
        state.refs.shrink_to_fit();
        state.compressions += 1;
        Ok(())
    }

    fn free(&mut self) {
        debug!(refs = self.len(), "memory refdb freed");
    }
}

/// Iterator over a snapshot of a [`MemoryRefdb`].
#[derive(Debug)]
pub struct MemoryRefIter {
    entries: std::vec::IntoIter<Reference>,
    freed: bool,
}

impl MemoryRefIter {
    pub fn new(entries: Vec<Reference>) -> Self {
        Self {
            entries: entries.into_iter(),
            freed: false,
        }
    }

    /// Entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl RefIterator for MemoryRefIter {
    fn next(&mut self) -> Result<Option<Reference>> {
        if self.freed {
            return Err(RefError::IteratorFreed);
        }
        Ok(self.entries.next())
    }

    fn free(&mut self) {
        self.freed = true;
        self.entries = Vec::new().into_iter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(seed: u8) -> ObjectId {
        ObjectId::from_raw([seed; 20])
    }

    fn names(iter: &mut dyn RefIterator) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(name) = iter.next_name().unwrap() {
            out.push(name);
        }
        out
    }

    fn seeded(config: MemoryBackendConfig) -> MemoryRefdb {
        let db = MemoryRefdb::with_config(config);
        db.insert(Reference::direct("refs/heads/a", oid(1))).unwrap();
        db.insert(Reference::direct("refs/heads/b", oid(2))).unwrap();
        db.insert(Reference::direct("refs/tags/c", oid(3))).unwrap();
        db.insert(Reference::symbolic("HEAD", "refs/heads/a")).unwrap();
        db
    }

    #[test]
    fn write_and_lookup_direct() {
        let mut db = MemoryRefdb::new();
        db.write_direct_reference("refs/heads/main", &oid(10)).unwrap();

        let read = db.lookup("refs/heads/main").unwrap().unwrap();
        assert_eq!(read.direct_target(), Some(&oid(10)));
        assert!(db.exists("refs/heads/main").unwrap());
    }

    #[test]
    fn write_and_lookup_symbolic() {
        let mut db = MemoryRefdb::new();
        db.write_symbolic_reference("HEAD", "refs/heads/main").unwrap();

        let read = db.lookup("HEAD").unwrap().unwrap();
        assert_eq!(read.symbolic_target(), Some("refs/heads/main"));
    }

    #[test]
    fn lookup_missing_returns_none() {
        let db = MemoryRefdb::new();
        assert!(db.lookup("refs/heads/nope").unwrap().is_none());
        assert!(!db.exists("refs/heads/nope").unwrap());
    }

    #[test]
    fn write_refuses_overwrite() {
        let mut db = MemoryRefdb::new();
        db.write_direct_reference("refs/heads/main", &oid(1)).unwrap();
        let err = db
            .write_direct_reference("refs/heads/main", &oid(2))
            .unwrap_err();
        assert!(matches!(err, RefError::AlreadyExists { .. }));
        assert_eq!(
            db.lookup("refs/heads/main").unwrap().unwrap().direct_target(),
            Some(&oid(1))
        );
    }

    #[test]
    fn write_rejects_invalid_names() {
        let mut db = MemoryRefdb::new();
        assert!(db.write_direct_reference("refs/heads/a..b", &oid(1)).is_err());
        assert!(db.write_symbolic_reference("HEAD", "not a ref").is_err());
        assert!(db.is_empty());
    }

    #[test]
    fn delete_missing_is_an_error() {
        let mut db = MemoryRefdb::new();
        let err = db.delete("refs/heads/ghost").unwrap_err();
        assert!(matches!(err, RefError::NotFound { .. }));
    }

    #[test]
    fn delete_then_lookup() {
        let mut db = seeded(MemoryBackendConfig::default());
        db.delete("refs/heads/a").unwrap();
        assert!(db.lookup("refs/heads/a").unwrap().is_none());
    }

    #[test]
    fn clones_share_the_store() {
        let db = MemoryRefdb::new();
        let mut other = db.clone();
        other.write_direct_reference("refs/heads/x", &oid(5)).unwrap();
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn glob_star_selects_namespace_in_name_order() {
        let mut db = seeded(MemoryBackendConfig::default());
        let mut iter = db.foreach_glob(Some("refs/heads/*")).unwrap();
        assert_eq!(names(iter.as_mut()), vec!["refs/heads/a", "refs/heads/b"]);
        assert!(iter.next().unwrap().is_none());
        assert!(iter.next_name().unwrap().is_none());
    }

    #[test]
    fn glob_star_crosses_slashes() {
        let mut db = MemoryRefdb::new();
        db.insert(Reference::direct("refs/heads/feature/x", oid(1))).unwrap();
        let mut iter = db.foreach_glob(Some("refs/heads/*")).unwrap();
        assert_eq!(names(iter.as_mut()), vec!["refs/heads/feature/x"]);
    }

    #[test]
    fn glob_question_mark_matches_one_char() {
        let mut db = MemoryRefdb::new();
        db.insert(Reference::direct("refs/heads/testref", oid(1))).unwrap();
        db.insert(Reference::direct("refs/heads/bestref", oid(2))).unwrap();
        db.insert(Reference::direct("refs/heads/estref", oid(3))).unwrap();
        let mut iter = db.foreach_glob(Some("refs/heads/?estref")).unwrap();
        assert_eq!(
            names(iter.as_mut()),
            vec!["refs/heads/bestref", "refs/heads/testref"]
        );
    }

    #[test]
    fn literal_pattern_matches_exact_name_only() {
        let mut db = seeded(MemoryBackendConfig::default());
        let mut iter = db.foreach_glob(Some("refs/heads/a")).unwrap();
        assert_eq!(names(iter.as_mut()), vec!["refs/heads/a"]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut db = MemoryRefdb::new();
        let err = db.foreach_glob(Some("refs/heads/[")).err().unwrap();
        assert!(matches!(err, RefError::InvalidPattern { .. }));
    }

    #[test]
    fn root_entry_excluded_by_default() {
        let mut db = seeded(MemoryBackendConfig::default());
        let mut all = db.foreach_glob(None).unwrap();
        assert_eq!(
            names(all.as_mut()),
            vec!["refs/heads/a", "refs/heads/b", "refs/tags/c"]
        );
        let mut exact = db.foreach_glob(Some("HEAD")).unwrap();
        assert!(names(exact.as_mut()).is_empty());
    }

    #[test]
    fn root_entry_included_when_configured() {
        let config = MemoryBackendConfig {
            exclude_root: false,
            ..Default::default()
        };
        let mut db = seeded(config);
        let mut all = db.foreach_glob(None).unwrap();
        assert_eq!(
            names(all.as_mut()),
            vec!["HEAD", "refs/heads/a", "refs/heads/b", "refs/tags/c"]
        );
    }

    #[test]
    fn iterator_is_a_snapshot() {
        let mut db = seeded(MemoryBackendConfig::default());
        let mut iter = db.foreach_glob(Some("refs/heads/*")).unwrap();
        db.insert(Reference::direct("refs/heads/z", oid(9))).unwrap();
        assert_eq!(names(iter.as_mut()).len(), 2);
    }

    #[test]
    fn next_and_next_name_share_a_cursor() {
        let mut db = seeded(MemoryBackendConfig::default());
        let mut iter = db.foreach_glob(Some("refs/*")).unwrap();
        assert_eq!(iter.next().unwrap().unwrap().name(), "refs/heads/a");
        assert_eq!(iter.next_name().unwrap().unwrap(), "refs/heads/b");
        assert_eq!(iter.next().unwrap().unwrap().name(), "refs/tags/c");
        assert!(iter.next().unwrap().is_none());
    }

    #[test]
    fn freed_iterator_reports_error() {
        let mut iter = MemoryRefIter::new(vec![Reference::direct("refs/heads/a", oid(1))]);
        iter.free();
        assert_eq!(iter.remaining(), 0);
        assert!(matches!(iter.next(), Err(RefError::IteratorFreed)));
    }

    #[test]
    fn compress_counts_runs() {
        let mut db = MemoryRefdb::new();
        db.compress().unwrap();
        db.compress().unwrap();
        assert_eq!(db.compressions(), 2);
    }

    #[test]
    fn capabilities_follow_config() {
        let mut config = MemoryBackendConfig::default();
        config.capabilities.compress = false;
        let db = MemoryRefdb::with_config(config);
        assert_eq!(db.capabilities(), Capabilities::FOREACH_GLOB);
    }

    #[test]
    fn counts_survive_a_poisoned_lock() {
        let db = MemoryRefdb::new();
        db.insert(Reference::direct("refs/heads/a", oid(1))).unwrap();
        let shared = db.clone();
        let _ = std::thread::spawn(move || {
            let _held = shared.state.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(db.state.is_poisoned());
        assert_eq!(db.len(), 1);
        assert!(!db.is_empty());
        assert_eq!(db.compressions(), 0);
        assert!(db.snapshot().is_err());
    }
}
