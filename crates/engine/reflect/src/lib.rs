//! Reflected native object model
//!
//! This crate provides the native side that script bridges talk to:
//! - **Descriptors**: property, parameter and signature descriptors
//! - **TypeRegistry**: classes (with inheritance and overridable functions), structs and enums
//! - **Host**: live objects behind generation-checked ids, a counted root set,
//!   garbage collection and function invocation
//!
//! # Example
//!
//! ```rust,ignore
//! use reflect::{ClassBuilder, FunctionBuilder, Host, IntKind, PropertyClass, TypeRegistry};
//!
//! let mut registry = TypeRegistry::new();
//! let actor = registry.add_class(
//!     ClassBuilder::new("Actor")
//!         .property("Health", PropertyClass::Int(IntKind::I32))
//!         .function(FunctionBuilder::new("Heal").arg("Amount", PropertyClass::Int(IntKind::I32))),
//! )?;
//! let host = Host::new(registry);
//! let hero = host.spawn(actor, "Hero")?;
//! ```

mod delegate;
mod descriptor;
mod error;
mod host;
mod object;
mod registry;
mod value;

pub use delegate::{DelegateTarget, DelegateValue, MulticastValue};
pub use descriptor::{
    ClassId, EnumId, IntKind, ParamRole, PropertyClass, PropertyDesc, Signature, StructId,
};
pub use error::{Error, Result};
pub use host::{Host, NativeCall};
pub use object::{ObjectData, ObjectId, ObjectStore, RootSet};
pub use registry::{
    ClassBuilder, ClassDesc, EnumDesc, FunctionBuilder, FunctionDesc, FunctionFlags, NativeFn,
    StructDesc, TypeRef, TypeRegistry,
};
pub use value::{Name, NativeValue, StructValue};
