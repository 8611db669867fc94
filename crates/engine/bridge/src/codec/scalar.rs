//! Scalars, strings and references

use crate::adapter::ValueKind;
use crate::context::BridgeContext;
use crate::handle::{ClassHandle, ObjectHandle};
use crate::namespace::class_name;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{ClassId, IntKind, Name, NativeValue, ObjectId};

/// Native value to Lua, for values that have no place of their own
pub(crate) fn encode(lua: &Lua, ctx: &BridgeContext, value: NativeValue) -> Result<LuaValue> {
    let encoded = match value {
        NativeValue::Empty => LuaValue::Nil,
        NativeValue::Bool(b) => LuaValue::Boolean(b),
        NativeValue::I8(v) => LuaValue::Integer(v as i64),
        NativeValue::I16(v) => LuaValue::Integer(v as i64),
        NativeValue::I32(v) => LuaValue::Integer(v as i64),
        NativeValue::I64(v) => LuaValue::Integer(v),
        NativeValue::U8(v) => LuaValue::Integer(v as i64),
        NativeValue::U16(v) => LuaValue::Integer(v as i64),
        NativeValue::U32(v) => LuaValue::Integer(v as i64),
        // Bit-cast: Lua integers are 64-bit signed
        NativeValue::U64(v) => LuaValue::Integer(v as i64),
        NativeValue::F32(v) => LuaValue::Number(v as f64),
        NativeValue::F64(v) => LuaValue::Number(v),
        NativeValue::Str(s) | NativeValue::Text(s) => LuaValue::String(lua.create_string(&s)?),
        NativeValue::Name(n) => LuaValue::String(lua.create_string(n.as_str())?),
        NativeValue::Object(Some(id))
        | NativeValue::WeakObject(Some(id))
        | NativeValue::Interface(Some(id)) => ctx.identity().push(lua, ctx, id)?,
        NativeValue::Object(None) | NativeValue::WeakObject(None) | NativeValue::Interface(None) => {
            LuaValue::Nil
        }
        NativeValue::Class(Some(class)) => {
            LuaValue::UserData(lua.create_userdata(ClassHandle::new(class))?)
        }
        NativeValue::Class(None) => LuaValue::Nil,
        other @ (NativeValue::Struct(_)
        | NativeValue::Array(_)
        | NativeValue::Map(_)
        | NativeValue::Set(_)
        | NativeValue::Delegate(_)
        | NativeValue::Multicast(_)) => {
            return Err(Error::mismatch("scalar", other.kind_name()));
        }
    };
    Ok(encoded)
}

/// Lua value to a native scalar of the given kind
pub(crate) fn decode(ctx: &BridgeContext, kind: &ValueKind, value: &LuaValue) -> Result<NativeValue> {
    match kind {
        ValueKind::Bool => match value {
            LuaValue::Boolean(b) => Ok(NativeValue::Bool(*b)),
            other => Err(Error::mismatch("bool", other.type_name())),
        },
        ValueKind::Int(int) => decode_int(*int, value, ctx.config().strict_integers),
        ValueKind::Float => decode_number(value, "float").map(|f| NativeValue::F32(f as f32)),
        ValueKind::Double => decode_number(value, "double").map(NativeValue::F64),
        ValueKind::Str => decode_string(value, "FString").map(NativeValue::Str),
        ValueKind::Name => decode_string(value, "FName").map(|s| NativeValue::Name(Name::new(s))),
        ValueKind::Text => decode_string(value, "FText").map(NativeValue::Text),
        ValueKind::Object(base) => decode_object(ctx, *base, value).map(NativeValue::Object),
        ValueKind::WeakObject(base) => {
            decode_object(ctx, *base, value).map(NativeValue::WeakObject)
        }
        ValueKind::Interface(base) => decode_object(ctx, *base, value).map(NativeValue::Interface),
        ValueKind::Class(base) => decode_class(ctx, *base, value).map(NativeValue::Class),
        ValueKind::Struct(_)
        | ValueKind::Array(_)
        | ValueKind::Map(..)
        | ValueKind::Set(_)
        | ValueKind::Delegate(_)
        | ValueKind::Multicast(_) => Err(Error::mismatch("scalar kind", "composite descriptor")),
    }
}

/// Integers must be whole and in range; `uint64` takes the full Lua integer range bit-cast
fn decode_int(kind: IntKind, value: &LuaValue, strict: bool) -> Result<NativeValue> {
    let wide: i128 = match value {
        LuaValue::Integer(i) if kind == IntKind::U64 => return Ok(NativeValue::U64(*i as u64)),
        LuaValue::Integer(i) => *i as i128,
        LuaValue::Number(n) if n.is_finite() && n.fract() == 0.0 => *n as i128,
        LuaValue::Number(n) => {
            return Err(Error::mismatch(kind.name(), format!("non-integral number {n}")))
        }
        other => return Err(Error::mismatch(kind.name(), other.type_name())),
    };
    match NativeValue::from_int(kind, wide) {
        Some(v) => Ok(v),
        None if !strict => Ok(NativeValue::from_int_wrapping(kind, wide as i64)),
        None => Err(Error::mismatch(kind.name(), format!("{wide} (out of range)"))),
    }
}

fn decode_number(value: &LuaValue, expected: &str) -> Result<f64> {
    match value {
        LuaValue::Integer(i) => Ok(*i as f64),
        LuaValue::Number(n) => Ok(*n),
        other => Err(Error::mismatch(expected, other.type_name())),
    }
}

fn decode_string(value: &LuaValue, expected: &str) -> Result<String> {
    match value {
        LuaValue::String(s) => Ok(s.to_str()?.to_string()),
        other => Err(Error::mismatch(expected, other.type_name())),
    }
}

fn decode_object(ctx: &BridgeContext, base: ClassId, value: &LuaValue) -> Result<Option<ObjectId>> {
    let ud = match value {
        LuaValue::Nil => return Ok(None),
        LuaValue::UserData(ud) => ud,
        other => return Err(Error::mismatch(class_name(ctx, base), other.type_name())),
    };
    let id = ud
        .borrow::<ObjectHandle>()
        .map_err(|_| Error::mismatch(class_name(ctx, base), "userdata"))?
        .id();
    let host = ctx.host();
    let class = host
        .class_of(id)
        .ok_or_else(|| Error::DanglingReference(format!("object {id}")))?;
    if !host.registry().is_a(class, base) {
        return Err(Error::mismatch(class_name(ctx, base), class_name(ctx, class)));
    }
    Ok(Some(id))
}

fn decode_class(ctx: &BridgeContext, base: ClassId, value: &LuaValue) -> Result<Option<ClassId>> {
    let expected = || format!("class of {}", class_name(ctx, base));
    let ud = match value {
        LuaValue::Nil => return Ok(None),
        LuaValue::UserData(ud) => ud,
        other => return Err(Error::mismatch(expected(), other.type_name())),
    };
    let class = ud
        .borrow::<ClassHandle>()
        .map_err(|_| Error::mismatch(expected(), "userdata"))?
        .id();
    if !ctx.host().registry().is_a(class, base) {
        return Err(Error::mismatch(expected(), class_name(ctx, class)));
    }
    Ok(Some(class))
}
