//! Context handle registry.
//!
//! The engine only ever holds a [`ContextToken`]. The registry owns the
//! instance behind it and hands out shared access on every callback. Tokens
//! come from a monotonically increasing counter and are never reused, so a
//! token that outlives its instance can never resolve to an unrelated one.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BridgeResult, Fault};

/// Opaque identifier of a registered instance, stored in a call table.
///
/// The zero value is never issued.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ContextToken(u64);

impl ContextToken {
    /// Placeholder for "no instance".
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The raw value, for logging.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextToken({})", self.0)
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context token #{}", self.0)
    }
}

/// A live registry entry. Each instance has its own lock so that a callback
/// running inside one instance can register another.
pub type Entry<T> = Arc<Mutex<T>>;

/// Token-to-instance table for one kind of instance.
pub struct HandleRegistry<T> {
    kind: &'static str,
    entries: Mutex<HashMap<u64, Entry<T>>>,
    next: AtomicU64,
}

impl<T> HandleRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
        }
    }

    /// Register an instance and return its token.
    pub fn register(&self, value: T) -> ContextToken {
        self.register_with(|_| (value, ())).0
    }

    /// Register an instance that needs to know its own token while being
    /// built (e.g. a call table that embeds it). `build` may return a side
    /// value, handed back with the token.
    pub fn register_with<R>(&self, build: impl FnOnce(ContextToken) -> (T, R)) -> (ContextToken, R) {
        let token = ContextToken(self.next.fetch_add(1, Ordering::Relaxed));
        let (value, extra) = build(token);
        self.entries
            .lock()
            .insert(token.0, Arc::new(Mutex::new(value)));
        debug!(kind = self.kind, token = token.0, "context registered");
        (token, extra)
    }

    /// Look up the instance behind `token`.
    pub fn resolve(&self, token: ContextToken) -> BridgeResult<Entry<T>> {
        self.entries
            .lock()
            .get(&token.0)
            .cloned()
            .ok_or(Fault::Unregistered(token))
    }

    /// Remove `token` for good, returning the instance so the caller decides
    /// when it is dropped.
    pub fn release(&self, token: ContextToken) -> BridgeResult<Entry<T>> {
        let entry = self
            .entries
            .lock()
            .remove(&token.0)
            .ok_or(Fault::Unregistered(token))?;
        debug!(kind = self.kind, token = token.0, "context released");
        Ok(entry)
    }

    pub fn contains(&self, token: ContextToken) -> bool {
        self.entries.lock().contains_key(&token.0)
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for HandleRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("kind", &self.kind)
            .field("live", &self.len())
            .finish()
    }
}
