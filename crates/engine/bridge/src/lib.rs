//! Lua bridge for the reflected object model
//!
//! This crate provides:
//! - **ValueCodec**: moves values between Lua and native storage, per descriptor
//! - **ContainerProxy**: live array/map/set views onto native fields
//! - **Identity**: one script handle per live object, rooting it while script holds it
//! - **CallFrame**: argument and return marshalling for native calls, safe under re-entry
//! - **Overloads**: several native functions behind one script name
//! - **ScriptRuntime**: a Lua state wired to a [`reflect::Host`]
//!
//! # Example
//!
//! ```rust,ignore
//! use bridge::{BridgeConfig, ScriptRuntime};
//!
//! let config = BridgeConfig::from_file("config/bridge.kdl")?;
//! let runtime = ScriptRuntime::with_config(host, config)?;
//! runtime.require("Actor")?;
//! runtime.set_global("hero", runtime.push_object(hero_id)?)?;
//! runtime.exec_string(r#"
//!     hero.Health = hero.Health + 10
//!     hero.Tags:Add("healed")
//! "#)?;
//! ```

mod adapter;
mod codec;
mod config;
mod context;
mod delegate;
mod error;
mod frame;
mod handle;
mod identity;
mod namespace;
mod overload;
mod place;
mod proxy;
mod report;
mod runtime;

pub use adapter::{parse_type_name, TypeAdapter, ValueKind};
pub use codec::{Family, Shape, StructLayout, ValueCodec};
pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use delegate::ScriptDelegate;
pub use error::{Error, Result};
pub use frame::CallFrame;
pub use handle::{ClassHandle, DelegateHandle, FieldAccessor, MulticastHandle, ObjectHandle, StructHandle};
pub use identity::{IdentityRegistry, LivenessSet, RootGuard};
pub use overload::BoundFunction;
pub use place::{Place, Root, Step};
pub use proxy::ContainerProxy;
pub use report::{ErrorNotifier, ErrorReport, ErrorReporter};
pub use runtime::{Binding, ScriptRuntime};

// Re-export mlua for downstream crates
pub use mlua;
