//! Error and status types shared by every public operation.
//!
//! Modeled after the teacher's own `TscReadError` in `tsc_now.rs`: a plain
//! enum with a human-readable `Display`, not a derive-macro hierarchy.

use std::fmt;

/// Coarse result code reported alongside every public operation, per the
/// status table in the crate's specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    GenericError,
    TscInconsistency,
    PoorStatistics,
}

/// The five error categories spec'd for this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cannot query/set affinity, allocate memory, or read the clock.
    Environment,
    /// A TSC invariant was violated (decrease, implausible diff, empty range).
    Inconsistency,
    /// Enough samples were collected, but not enough to trust the result.
    Statistical,
    /// A probe thread failed to start, cancel, exited non-zero, or was detached.
    Supervisor,
    /// Affinity could not be restored after being narrowed.
    Restoration,
}

impl ErrorKind {
    fn status(self) -> Status {
        match self {
            ErrorKind::Environment | ErrorKind::Supervisor | ErrorKind::Restoration => {
                Status::GenericError
            }
            ErrorKind::Inconsistency => Status::TscInconsistency,
            ErrorKind::Statistical => Status::PoorStatistics,
        }
    }
}

/// A failure from any of this crate's public operations.
///
/// Carries a small message buffer, as spec'd: results are discarded and
/// this message is surfaced whenever `status() != Status::Ok`.
#[derive(Debug, Clone)]
pub struct TscError {
    kind: ErrorKind,
    message: String,
}

impl TscError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Environment, message)
    }

    pub fn inconsistency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Inconsistency, message)
    }

    pub fn statistical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Statistical, message)
    }

    pub fn supervisor(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Supervisor, message)
    }

    pub fn restoration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Restoration, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> Status {
        self.kind.status()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TscError {}

pub type Result<T> = std::result::Result<T, TscError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_documented_status() {
        assert_eq!(TscError::environment("x").status(), Status::GenericError);
        assert_eq!(TscError::inconsistency("x").status(), Status::TscInconsistency);
        assert_eq!(TscError::statistical("x").status(), Status::PoorStatistics);
        assert_eq!(TscError::supervisor("x").status(), Status::GenericError);
        assert_eq!(TscError::restoration("x").status(), Status::GenericError);
    }
}
