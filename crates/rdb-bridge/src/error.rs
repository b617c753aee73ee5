//! Error types and the per-thread error channel.
//!
//! A callback that fails returns [`Status::Error`] and leaves a message on the
//! calling thread's channel, where the engine reads it with
//! [`rdb_error_last`] (or [`last_error`] from Rust).

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::ptr;

use rdb_refs::RefError;
use thiserror::Error;

use crate::registry::ContextToken;
use crate::status::Status;

/// Failure of a single callback, converted to [`Status::Error`] at the
/// boundary.
#[derive(Debug, Error)]
pub enum Fault {
    /// The engine passed a token that is not (or no longer) registered.
    #[error("no live instance registered for {0}")]
    Unregistered(ContextToken),

    /// A required pointer argument was null.
    #[error("null pointer passed for {0}")]
    NullArgument(&'static str),

    /// A text argument was not valid UTF-8.
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// A string to hand to the engine contains an interior NUL byte.
    #[error("string contains an interior NUL byte: {0:?}")]
    InteriorNul(String),

    /// The engine handed over a reference of a kind the bridge cannot map.
    #[error("unknown reference type {kind} for {name}")]
    UnknownReferenceKind { name: String, kind: c_int },

    /// The engine handed over a reference whose payload does not match its kind.
    #[error("malformed reference {name}: {reason}")]
    MalformedReference { name: String, reason: &'static str },

    /// The backend or iterator implementation returned an error.
    #[error(transparent)]
    Backend(#[from] RefError),

    /// The implementation panicked.
    #[error("implementation panicked: {0}")]
    Panic(String),
}

/// Result alias for bridge internals.
pub type BridgeResult<T> = Result<T, Fault>;

/// Errors seen by an engine-side caller of a call table.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The callback returned a non-ok status.
    #[error("{operation}: {status}{}", message_suffix(.message))]
    Call {
        operation: &'static str,
        status: Status,
        message: Option<String>,
    },

    /// The callback returned a code outside the protocol.
    #[error("{operation}: unknown status code {code}")]
    UnknownStatus { operation: &'static str, code: c_int },

    /// The table does not offer this optional operation.
    #[error("operation not offered by this backend: {0}")]
    Unsupported(&'static str),

    /// Converting a value returned by the engine failed.
    #[error(transparent)]
    Fault(#[from] Fault),
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ClientError {
    /// The status the callback returned, if the failure came from one.
    pub fn status(&self) -> Option<Status> {
        match self {
            ClientError::Call { status, .. } => Some(*status),
            _ => None,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Record a diagnostic for the current thread, replacing any previous one.
pub fn set_last_error(message: &str) {
    let message = CString::new(message.replace('\0', "\\0"))
        .unwrap_or_else(|_| CString::from(c"invalid error message"));
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// The last diagnostic recorded on this thread.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|m| m.to_string_lossy().into_owned())
    })
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// C entry point for the last diagnostic on the calling thread.
///
/// Returns null when no error has been recorded. The string stays valid until
/// the next failing callback on the same thread.
#[no_mangle]
pub extern "C" fn rdb_error_last() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(ptr::null(), |m| m.as_ptr())
    })
}
