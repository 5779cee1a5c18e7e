//! Error types for the Galaxy3D scene core
//!
//! Most operations of the scene core never fail: malformed numeric input is
//! clamped and lookups return `None`. The variants below cover the few
//! operations that can be rejected (hierarchy edits, pool construction).

use std::fmt;

/// Result type for Galaxy3D scene operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D scene errors
#[derive(Debug, Clone)]
pub enum Error {
    /// A node key does not refer to a live scene node
    InvalidNode(String),

    /// A parent/child edit would break the hierarchy (cycle, self-parenting)
    InvalidHierarchy(String),

    /// Initialization failed (worker pool, subsystems)
    InitializationFailed(String),

    /// Operation is not valid for the target object
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidNode(msg) => write!(f, "Invalid node: {}", msg),
            Error::InvalidHierarchy(msg) => write!(f, "Invalid hierarchy: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Log an error message and build an `Error::InvalidOperation` from it.
///
/// # Example
///
/// ```ignore
/// return Err(engine_err!("galaxy3d::Scene", "Node {:?} has no drawable", key));
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::InvalidOperation(message)
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
