//! Error types for the bridge

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while marshalling values or dispatching calls
#[derive(Error, Debug)]
pub enum Error {
    /// Lua error
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// Error raised by the reflection host
    #[error("{0}")]
    Reflect(#[from] reflect::Error),

    /// KDL parsing error
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Script value does not fit the native destination
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Descriptor class the bridge cannot marshal
    #[error("Unsupported descriptor {class} for {name}")]
    UnsupportedDescriptor { name: String, class: String },

    /// The native storage behind a handle or proxy no longer exists
    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    /// Multicast delegates cannot be assigned from script
    #[error("Cannot assign to multicast delegate {0}")]
    MulticastAssignment(String),

    /// Too many nested calls through one function
    #[error("Re-entry limit of {limit} reached calling {name}")]
    ReentryLimit { name: String, limit: usize },

    /// Every overload candidate failed
    #[error("No overload of {name} accepted the arguments:\n{}", attempts.join("\n"))]
    OverloadExhausted { name: String, attempts: Vec<String> },

    /// Argument could not be marshalled into its parameter slot
    #[error("{function}: bad argument #{index} ({param}): {source}")]
    BadArgument {
        function: String,
        index: usize,
        param: String,
        source: Box<Error>,
    },

    /// Member call without a valid target object
    #[error("{0} must be called on a valid object")]
    InvalidTarget(String),

    /// Container index out of bounds (1-based, as seen from script)
    #[error("Index {index} out of range (size {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// Container cannot change size
    #[error("Fixed-size array cannot be resized")]
    FixedSize,

    /// No type, field, or function with this name
    #[error("Unknown name: {0}")]
    UnknownName(String),

    /// Configuration value missing or malformed
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The runtime was shut down
    #[error("Script runtime has been shut down")]
    Shutdown,
}

impl Error {
    pub(crate) fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
