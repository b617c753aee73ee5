//! Status codes crossing the engine boundary.

use std::fmt;
use std::os::raw::c_int;

/// Every outcome a callback can report to the engine.
///
/// `NotFound`, `Exists`, and `IterationOver` are expected business outcomes
/// and never carry a diagnostic message. `Error` always does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    /// Generic failure; the message is on the error channel.
    Error = -1,
    /// Lookup miss.
    NotFound = -3,
    /// Write collision.
    Exists = -4,
    /// Enumeration exhausted.
    IterationOver = -31,
}

impl Status {
    /// The integer the engine sees.
    pub const fn code(self) -> c_int {
        self as c_int
    }

    pub fn from_code(code: c_int) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            -1 => Some(Self::Error),
            -3 => Some(Self::NotFound),
            -4 => Some(Self::Exists),
            -31 => Some(Self::IterationOver),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<Status> for c_int {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::Error => "error",
            Status::NotFound => "not found",
            Status::Exists => "already exists",
            Status::IterationOver => "iteration over",
        };
        f.write_str(name)
    }
}
