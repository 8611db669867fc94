//! Value codec: moves single values between Lua and native storage
//!
//! One [`ValueCodec`] exists per (runtime, descriptor) pair and is cached in
//! the [`BridgeContext`]. Container codecs own the codecs of their elements;
//! struct codecs reach their fields through the per-runtime [`StructLayout`]
//! cache so self-referencing struct graphs stay finite.
//!
//! The operations mirror how values cross the boundary:
//! - [`ValueCodec::push`]: read native storage in place. Structs, containers
//!   and delegates become live handles onto the place; scalars are copied.
//! - [`ValueCodec::push_container`]: `push` of this field inside a record.
//! - [`ValueCodec::push_ret`]: a value whose storage does not outlive the
//!   call. Structs and containers become runtime-owned copies.
//! - [`ValueCodec::push_ref`]: write back into a compatible handle the caller
//!   already holds, keeping its identity.
//! - [`ValueCodec::pop`] / [`ValueCodec::pop_into`]: type-checked decode; a
//!   failed decode never touches the destination.

mod composite;
mod container;
mod scalar;

pub use composite::StructLayout;

use crate::adapter::{TypeAdapter, ValueKind};
use crate::context::BridgeContext;
use crate::handle::{DelegateHandle, MulticastHandle, StructHandle};
use crate::place::Place;
use crate::proxy::ContainerProxy;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{NativeValue, PropertyDesc};
use std::fmt;
use std::rc::Rc;

pub(crate) use container::{decode_container, encode_container};

/// Element layout of a container codec
#[derive(Clone)]
pub enum Shape {
    Array(Rc<ValueCodec>),
    /// Fixed-size field array with its arity
    Fixed(Rc<ValueCodec>, usize),
    Map(Rc<ValueCodec>, Rc<ValueCodec>),
    Set(Rc<ValueCodec>),
}

/// Container family, ignoring element types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Sequence,
    Map,
    Set,
}

impl Shape {
    pub fn family(&self) -> Family {
        match self {
            Shape::Array(_) | Shape::Fixed(..) => Family::Sequence,
            Shape::Map(..) => Family::Map,
            Shape::Set(_) => Family::Set,
        }
    }

    /// Whether both shapes store elements of the same native type
    pub fn same_elements(&self, other: &Shape) -> bool {
        match (self, other) {
            (Shape::Array(a) | Shape::Fixed(a, _), Shape::Array(b) | Shape::Fixed(b, _))
            | (Shape::Set(a), Shape::Set(b)) => a.same_type(b),
            (Shape::Map(ak, av), Shape::Map(bk, bv)) => ak.same_type(bk) && av.same_type(bv),
            _ => false,
        }
    }

    /// Codec of the elements (the values, for maps)
    pub fn element(&self) -> &Rc<ValueCodec> {
        match self {
            Shape::Array(e) | Shape::Fixed(e, _) | Shape::Set(e) => e,
            Shape::Map(_, v) => v,
        }
    }

    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            Shape::Fixed(_, arity) => Some(*arity),
            _ => None,
        }
    }

    /// A value of this shape with no elements (defaults, for fixed arrays)
    pub fn empty(&self, ctx: &BridgeContext) -> NativeValue {
        match self {
            Shape::Array(_) => NativeValue::Array(Vec::new()),
            Shape::Fixed(element, arity) => NativeValue::Array(
                (0..*arity)
                    .map(|_| element.default_value(ctx))
                    .collect(),
            ),
            Shape::Map(..) => NativeValue::Map(Vec::new()),
            Shape::Set(_) => NativeValue::Set(Vec::new()),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Shape::Array(e) => format!("TArray<{}>", e.type_name()),
            Shape::Fixed(e, arity) => format!("{}[{}]", e.type_name(), arity),
            Shape::Map(k, v) => format!("TMap<{}, {}>", k.type_name(), v.type_name()),
            Shape::Set(e) => format!("TSet<{}>", e.type_name()),
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

/// Marshalling logic for one descriptor
pub struct ValueCodec {
    adapter: TypeAdapter,
    shape: Option<Shape>,
}

impl ValueCodec {
    pub fn new(ctx: &BridgeContext, desc: Rc<PropertyDesc>) -> Result<Self> {
        let adapter = TypeAdapter::new(ctx.host().registry(), Rc::clone(&desc))?;
        let shape = if adapter.is_fixed_array() {
            let element = ctx.codec_for(desc.class.clone())?;
            Some(Shape::Fixed(element, adapter.arity()))
        } else {
            match adapter.kind() {
                ValueKind::Array(inner) => Some(Shape::Array(ctx.codec(inner)?)),
                ValueKind::Set(inner) => Some(Shape::Set(ctx.codec(inner)?)),
                ValueKind::Map(key, value) => Some(Shape::Map(ctx.codec(key)?, ctx.codec(value)?)),
                _ => None,
            }
        };
        Ok(Self { adapter, shape })
    }

    pub fn adapter(&self) -> &TypeAdapter {
        &self.adapter
    }

    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn type_name(&self) -> String {
        match &self.shape {
            Some(Shape::Fixed(..)) | None => self.adapter.type_name(),
            Some(shape) => shape.type_name(),
        }
    }

    /// Structural type equality with another codec
    pub fn same_type(&self, other: &ValueCodec) -> bool {
        let (a, b) = (self.adapter.desc(), other.adapter.desc());
        a.arity == b.arity && a.class.same_type(&b.class)
    }

    /// Default-constructed value for this descriptor
    pub fn default_value(&self, ctx: &BridgeContext) -> NativeValue {
        ctx.host().registry().default_value(self.adapter.desc())
    }

    /// Push the value stored at `place`
    pub fn push(&self, lua: &Lua, ctx: &BridgeContext, place: &Place) -> Result<LuaValue> {
        if ctx.config().trace_marshalling {
            tracing::trace!("push {} from {}", self.type_name(), place);
        }
        let host = ctx.host();
        if let Some(shape) = &self.shape {
            if !place.is_live(host) {
                return Err(Error::DanglingReference(place.to_string()));
            }
            let proxy = ContainerProxy::new(place.clone(), shape.clone());
            return Ok(LuaValue::UserData(lua.create_userdata(proxy)?));
        }
        match self.adapter.kind() {
            ValueKind::Struct(id) => {
                if !place.is_live(host) {
                    return Err(Error::DanglingReference(place.to_string()));
                }
                let handle = StructHandle::new(place.clone(), *id);
                Ok(LuaValue::UserData(lua.create_userdata(handle)?))
            }
            ValueKind::Delegate(signature) => {
                let handle = DelegateHandle::new(place.clone(), Rc::clone(signature));
                Ok(LuaValue::UserData(lua.create_userdata(handle)?))
            }
            ValueKind::Multicast(signature) => {
                let handle = MulticastHandle::new(place.clone(), Rc::clone(signature));
                Ok(LuaValue::UserData(lua.create_userdata(handle)?))
            }
            _ => {
                let value = place.read(host)?;
                scalar::encode(lua, ctx, value)
            }
        }
    }

    /// Push this field of the record at `record`
    pub fn push_container(&self, lua: &Lua, ctx: &BridgeContext, record: &Place) -> Result<LuaValue> {
        self.push(lua, ctx, &record.child(self.adapter.offset()))
    }

    /// Push a value whose native storage goes away after the call
    pub fn push_ret(&self, lua: &Lua, ctx: &BridgeContext, value: NativeValue) -> Result<LuaValue> {
        if ctx.config().trace_marshalling {
            tracing::trace!("push_ret {} {:?}", self.type_name(), value);
        }
        if self.shape.is_some() || self.is_handle_kind() {
            return self.push(lua, ctx, &Place::owned(value));
        }
        scalar::encode(lua, ctx, value)
    }

    /// Update the caller's existing handle in place when compatible,
    /// otherwise push a fresh value
    pub fn push_ref(
        &self,
        lua: &Lua,
        ctx: &BridgeContext,
        existing: &LuaValue,
        value: NativeValue,
    ) -> Result<LuaValue> {
        if let Some(place) = self.compatible_place(existing) {
            place.write(ctx.host(), value)?;
            return Ok(existing.clone());
        }
        self.push_ret(lua, ctx, value)
    }

    /// Place behind `value` if it is a handle this codec can write through
    fn compatible_place(&self, value: &LuaValue) -> Option<Place> {
        let LuaValue::UserData(ud) = value else {
            return None;
        };
        if let Some(shape) = &self.shape {
            let proxy = ud.borrow::<ContainerProxy>().ok()?;
            let place = proxy.place().clone();
            let compatible = proxy.shape().same_elements(shape);
            return compatible.then_some(place);
        }
        match self.adapter.kind() {
            ValueKind::Struct(id) => {
                let handle = ud.borrow::<StructHandle>().ok()?;
                let place = handle.place().clone();
                let compatible = handle.struct_id() == *id;
                compatible.then_some(place)
            }
            ValueKind::Delegate(_) => {
                let handle = ud.borrow::<DelegateHandle>().ok()?;
                let place = handle.place().clone();
                Some(place)
            }
            _ => None,
        }
    }

    /// Decode a Lua value into a fresh native value
    pub fn pop(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue) -> Result<NativeValue> {
        if ctx.config().trace_marshalling {
            tracing::trace!("pop {} from {}", self.type_name(), value.type_name());
        }
        if let Some(shape) = &self.shape {
            return decode_container(lua, ctx, shape, value);
        }
        match self.adapter.kind() {
            ValueKind::Struct(id) => composite::decode_struct(lua, ctx, *id, value),
            ValueKind::Delegate(signature) => {
                crate::delegate::decode_delegate(lua, ctx, signature, value)
            }
            ValueKind::Multicast(_) => Err(Error::MulticastAssignment(self.name().to_string())),
            kind => scalar::decode(ctx, kind, value),
        }
    }

    /// Decode into `place`; on failure the destination keeps its value
    pub fn pop_into(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue, place: &Place) -> Result<()> {
        let decoded = self.pop(lua, ctx, value)?;
        place.write(ctx.host(), decoded)
    }

    fn is_handle_kind(&self) -> bool {
        matches!(
            self.adapter.kind(),
            ValueKind::Struct(_) | ValueKind::Delegate(_) | ValueKind::Multicast(_)
        )
    }
}

impl fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueCodec({}: {})", self.name(), self.type_name())
    }
}
