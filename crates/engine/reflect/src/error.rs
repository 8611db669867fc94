//! Error types for the reflection host

use crate::object::ObjectId;
use thiserror::Error;

/// Result type for reflection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the type registry and object host
#[derive(Error, Debug)]
pub enum Error {
    /// No type registered under this name or id
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A type with this name is already registered
    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    /// Interfaces cannot be instantiated
    #[error("Cannot instantiate abstract class {0}")]
    AbstractClass(String),

    /// The object was destroyed or never existed
    #[error("Invalid object {0}")]
    InvalidObject(ObjectId),

    /// Field offset past the end of the object's storage
    #[error("Field {offset} out of range on {object}")]
    FieldOutOfRange { object: ObjectId, offset: usize },

    /// Parameter slot past the end of the call buffer
    #[error("Parameter slot {0} out of range")]
    ParamOutOfRange(usize),

    /// A member function was called without a target object
    #[error("Member function called without a target")]
    MissingTarget,

    /// Executing a delegate with nothing bound
    #[error("Delegate is not bound")]
    UnboundDelegate,

    /// Function has no native body and no override was found
    #[error("No implementation for {0}")]
    NoImplementation(String),

    /// Failure reported by a native function body
    #[error("Native error: {0}")]
    Native(String),

    /// Failure reported by a delegate target living in a script runtime
    #[error("Script error: {0}")]
    Script(String),
}
