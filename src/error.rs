//! Error taxonomy for the B-tree: `not_found`, `already_exists`, `no_space`,
//! `io` and `integrity`, per the external interface contract. None of these
//! are retried internally; callers decide how to react.

/// Errors the tree can report to a caller.
#[derive(Debug)]
pub enum Error {
    /// No item with the given key exists.
    NotFound,
    /// An item with the given key already exists.
    AlreadyExists,
    /// A hole search found no free key in the requested range.
    NoSpace,
    /// The block manager (allocation, read-back, write-back) failed.
    Io(std::io::Error),
    /// The tree is in a shape the walker did not expect: a missing child
    /// where `NEXT_SEQ` pruning is not in play, a misaligned block handle,
    /// or a structural invariant violation. Callers must not retry.
    Integrity(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::AlreadyExists => write!(f, "key already exists"),
            Self::NoSpace => write!(f, "no free key in range"),
            Self::Io(err) => write!(f, "i/o error: {err}"),
            Self::Integrity(msg) => write!(f, "integrity error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
