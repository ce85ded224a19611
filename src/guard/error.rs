use ulid::Ulid;

use crate::model::Ms;

/// Every way a guard operation can fail, kept as distinct variants so
/// callers can tell "you can't book this" apart from "the system is down".
#[derive(Debug)]
pub enum GuardError {
    /// No authenticated principal.
    Unauthorized,
    /// Authenticated, but not allowed to touch this parking.
    Forbidden(Ulid),
    /// `start >= end` or a timestamp outside the valid window.
    InvalidInterval { start: Ms, end: Ms },
    /// The requested interval overlaps the named reservation.
    Conflict(Ulid),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    /// The backing log could not commit. Nothing was written.
    StoreUnavailable(String),
}

impl std::fmt::Display for GuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardError::Unauthorized => write!(f, "unauthorized: no authenticated principal"),
            GuardError::Forbidden(id) => write!(f, "forbidden: not the owner of {id}"),
            GuardError::InvalidInterval { start, end } => {
                write!(f, "invalid interval: [{start}, {end})")
            }
            GuardError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            GuardError::NotFound(id) => write!(f, "not found: {id}"),
            GuardError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            GuardError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            GuardError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for GuardError {}
