//! Container marshalling
//!
//! A container destination accepts, in order of preference:
//! 1. a runtime-owned proxy with the same element types: copied directly
//! 2. any other proxy of the same family: copied element by element through
//!    the source's element codec and this container's element codec
//! 3. a plain Lua table: iterated, with map keys and set elements de-duplicated

use super::{Family, Shape, ValueCodec};
use crate::adapter::ValueKind;
use crate::context::BridgeContext;
use crate::proxy::ContainerProxy;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::NativeValue;

pub(crate) fn decode_container(
    lua: &Lua,
    ctx: &BridgeContext,
    shape: &Shape,
    value: &LuaValue,
) -> Result<NativeValue> {
    match value {
        LuaValue::UserData(ud) => {
            let source = ud
                .borrow::<ContainerProxy>()
                .map_err(|_| Error::mismatch(shape.type_name(), "userdata"))?
                .clone();
            if source.shape().family() != shape.family() {
                return Err(Error::mismatch(shape.type_name(), source.shape().type_name()));
            }
            let items = source.place().read(ctx.host())?;
            if source.is_glue() && source.shape().same_elements(shape) {
                return fit(ctx, shape, items);
            }
            convert(lua, ctx, source.shape(), shape, items)
        }
        LuaValue::Table(table) => from_table(lua, ctx, shape, table),
        other => Err(Error::mismatch(shape.type_name(), other.type_name())),
    }
}

/// Re-marshal every element through Lua from one element type to another
fn convert(
    lua: &Lua,
    ctx: &BridgeContext,
    from: &Shape,
    to: &Shape,
    items: NativeValue,
) -> Result<NativeValue> {
    let converted = match (items, from, to) {
        (NativeValue::Map(entries), Shape::Map(fk, fv), Shape::Map(..)) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key = fk.push_ret(lua, ctx, key)?;
                let value = fv.push_ret(lua, ctx, value)?;
                insert_entry(lua, ctx, to, &mut out, &key, &value)?;
            }
            NativeValue::Map(out)
        }
        (NativeValue::Set(items), Shape::Set(from_element), Shape::Set(to_element)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let item = from_element.push_ret(lua, ctx, item)?;
                insert_unique(&mut out, to_element.pop(lua, ctx, &item)?);
            }
            NativeValue::Set(out)
        }
        (NativeValue::Array(items), from, to) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let item = from.element().push_ret(lua, ctx, item)?;
                out.push(to.element().pop(lua, ctx, &item)?);
            }
            NativeValue::Array(out)
        }
        (other, _, _) => return Err(Error::mismatch(to.type_name(), other.kind_name())),
    };
    fit(ctx, to, converted)
}

fn from_table(lua: &Lua, ctx: &BridgeContext, shape: &Shape, table: &LuaTable) -> Result<NativeValue> {
    let value = match shape {
        Shape::Array(element) | Shape::Fixed(element, _) => {
            let len = table.raw_len();
            let mut out = Vec::with_capacity(len);
            for i in 1..=len {
                let item: LuaValue = table.raw_get(i)?;
                out.push(element_at(lua, ctx, element, &item, i)?);
            }
            NativeValue::Array(out)
        }
        Shape::Map(..) => {
            let mut out = Vec::new();
            for pair in table.pairs::<LuaValue, LuaValue>() {
                let (key, value) = pair?;
                insert_entry(lua, ctx, shape, &mut out, &key, &value)?;
            }
            NativeValue::Map(out)
        }
        Shape::Set(element) => {
            let pairs: Vec<(LuaValue, LuaValue)> = table
                .pairs::<LuaValue, LuaValue>()
                .collect::<LuaResult<_>>()?;
            // `{[e] = true, ...}` lists elements as keys, anything else as values.
            // A sequence of `true` is a list of values for a bool set.
            let sequence = pairs.len() == table.raw_len()
                && pairs.iter().all(|(k, _)| matches!(k, LuaValue::Integer(_)));
            let as_keys = !pairs.is_empty()
                && !(sequence && matches!(element.adapter().kind(), ValueKind::Bool))
                && pairs
                    .iter()
                    .all(|(_, v)| matches!(v, LuaValue::Boolean(true)));
            let mut out = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                let item = if as_keys { key } else { value };
                insert_unique(&mut out, element.pop(lua, ctx, &item)?);
            }
            NativeValue::Set(out)
        }
    };
    fit(ctx, shape, value)
}

fn element_at(
    lua: &Lua,
    ctx: &BridgeContext,
    element: &ValueCodec,
    item: &LuaValue,
    index: usize,
) -> Result<NativeValue> {
    element
        .pop(lua, ctx, item)
        .map_err(|e| Error::mismatch(format!("element {index}"), e.to_string()))
}

fn insert_entry(
    lua: &Lua,
    ctx: &BridgeContext,
    shape: &Shape,
    entries: &mut Vec<(NativeValue, NativeValue)>,
    key: &LuaValue,
    value: &LuaValue,
) -> Result<()> {
    let Shape::Map(key_codec, value_codec) = shape else {
        return Err(Error::mismatch(shape.type_name(), "map"));
    };
    let key = key_codec.pop(lua, ctx, key)?;
    let value = value_codec.pop(lua, ctx, value)?;
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
    Ok(())
}

fn insert_unique(items: &mut Vec<NativeValue>, item: NativeValue) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Fixed arrays keep their arity: short sources are padded with defaults
fn fit(ctx: &BridgeContext, shape: &Shape, value: NativeValue) -> Result<NativeValue> {
    let Some(arity) = shape.fixed_len() else {
        return Ok(value);
    };
    let NativeValue::Array(mut items) = value else {
        return Err(Error::mismatch(shape.type_name(), value.kind_name()));
    };
    if items.len() > arity {
        return Err(Error::mismatch(
            shape.type_name(),
            format!("{} elements", items.len()),
        ));
    }
    while items.len() < arity {
        items.push(shape.element().default_value(ctx));
    }
    Ok(NativeValue::Array(items))
}

/// Plain-table snapshot of a container value: arrays as sequences, maps as
/// key/value tables, sets as `{[element] = true}`. Elements are copies.
pub(crate) fn encode_container(
    lua: &Lua,
    ctx: &BridgeContext,
    shape: &Shape,
    value: NativeValue,
    table: &LuaTable,
) -> Result<()> {
    match (shape, value) {
        (Shape::Array(element) | Shape::Fixed(element, _), NativeValue::Array(items)) => {
            for (i, item) in items.into_iter().enumerate() {
                table.raw_set(i + 1, element.push_ret(lua, ctx, item)?)?;
            }
        }
        (Shape::Map(key_codec, value_codec), NativeValue::Map(entries)) => {
            for (key, value) in entries {
                table.raw_set(
                    key_codec.push_ret(lua, ctx, key)?,
                    value_codec.push_ret(lua, ctx, value)?,
                )?;
            }
        }
        (Shape::Set(element), NativeValue::Set(items)) => {
            for item in items {
                table.raw_set(element.push_ret(lua, ctx, item)?, true)?;
            }
        }
        (shape, other) => return Err(Error::mismatch(shape.type_name(), other.kind_name())),
    }
    Ok(())
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::Sequence => "array",
            Family::Map => "map",
            Family::Set => "set",
        }
    }
}
