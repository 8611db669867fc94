//! Namespace installation
//!
//! `require(name)` installs one reflected type into the namespace table:
//!
//! - classes: a table of their functions (member and static, overloads
//!   resolved by [`crate::overload`]), plus `StaticClass()` and `Cast(obj)`
//! - structs: a table with `new(init?)` returning an owned struct handle
//! - enums: a table of entry name to value
//!
//! Looking up an unknown key on the namespace requires it on the spot, so
//! `UE.Actor` works without an explicit `require`. The namespace also holds
//! the `TArray`/`TMap`/`TSet` factories and `NewObject`.

use crate::adapter::parse_type_name;
use crate::context::BridgeContext;
use crate::handle::{ClassHandle, ObjectHandle};
use crate::overload;
use crate::place::Place;
use crate::report::Funnel;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{ClassId, EnumId, PropertyClass, PropertyDesc, StructId, TypeRef};

pub(crate) fn class_name(ctx: &BridgeContext, id: ClassId) -> String {
    ctx.host()
        .registry()
        .class(id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|_| format!("class #{}", id.0))
}

/// Install a type by name; `false` when no such type exists
pub fn require(lua: &Lua, ctx: &BridgeContext, name: &str) -> Result<bool> {
    if ctx.is_required(name) {
        return Ok(true);
    }
    let Some(found) = ctx.host().registry().lookup(name) else {
        tracing::debug!("require {}: no such type", name);
        return Ok(false);
    };
    let table = match found {
        TypeRef::Class(id) => install_class(lua, ctx, id)?,
        TypeRef::Struct(id) => install_struct(lua, id)?,
        TypeRef::Enum(id) => install_enum(lua, ctx, id)?,
    };
    ctx.namespace(lua)?.raw_set(name, table)?;
    ctx.mark_required(name);
    tracing::debug!("required {}", name);
    Ok(true)
}

/// The installed table of a class, requiring it on first use
pub(crate) fn class_table(lua: &Lua, ctx: &BridgeContext, class: ClassId) -> Result<LuaTable> {
    let name = class_name(ctx, class);
    let namespace = ctx.namespace(lua)?;
    if let LuaValue::Table(table) = namespace.raw_get::<LuaValue>(name.as_str())? {
        return Ok(table);
    }
    require(lua, ctx, &name)?;
    match namespace.raw_get::<LuaValue>(name.as_str())? {
        LuaValue::Table(table) => Ok(table),
        _ => Err(Error::UnknownName(name)),
    }
}

fn install_class(lua: &Lua, ctx: &BridgeContext, id: ClassId) -> Result<LuaTable> {
    let registry = ctx.host().registry();
    let table = lua.create_table()?;
    let names = registry.function_names(id);
    for name in &names {
        let candidates = registry.find_functions(id, name);
        // A function that cannot be bound fails alone; the class stays usable
        if let Err(e) = overload::install(lua, ctx, &table, name, &candidates, &names) {
            tracing::warn!("{}.{} not bound: {}", class_name(ctx, id), name, e);
        }
    }

    table.raw_set(
        "StaticClass",
        lua.create_function(move |_, ()| Ok(ClassHandle::new(id)))?,
    )?;
    table.raw_set(
        "Cast",
        lua.create_function(move |lua, value: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            let LuaValue::UserData(ud) = &value else {
                return Ok(LuaValue::Nil);
            };
            let Ok(object) = ud.borrow::<ObjectHandle>().map(|h| h.id()) else {
                return Ok(LuaValue::Nil);
            };
            let host = ctx.host();
            let fits = host
                .class_of(object)
                .is_some_and(|class| host.registry().is_a(class, id));
            Ok(if fits { value } else { LuaValue::Nil })
        })?,
    )?;
    Ok(table)
}

fn install_struct(lua: &Lua, id: StructId) -> Result<LuaTable> {
    let table = lua.create_table()?;
    table.raw_set(
        "new",
        lua.create_function(move |lua, init: Option<LuaValue>| {
            let ctx = BridgeContext::current(lua)?;
            let codec = ctx.codec_for(PropertyClass::Struct(id)).funnel(lua)?;
            let value = match init {
                Some(init) => codec.pop(lua, &ctx, &init),
                None => Ok(codec.default_value(&ctx)),
            };
            value
                .and_then(|value| codec.push_ret(lua, &ctx, value))
                .funnel(lua)
        })?,
    )?;
    Ok(table)
}

fn install_enum(lua: &Lua, ctx: &BridgeContext, id: EnumId) -> Result<LuaTable> {
    let desc = ctx.host().registry().enum_desc(id)?;
    let table = lua.create_table()?;
    for (name, value) in &desc.entries {
        table.raw_set(name.as_str(), *value)?;
    }
    Ok(table)
}

/// Element descriptor from a script type name
fn element(ctx: &BridgeContext, name: &str) -> Result<std::rc::Rc<PropertyDesc>> {
    let class = parse_type_name(ctx.host().registry(), name)?;
    Ok(PropertyDesc::element(class))
}

/// A runtime-owned container of `class`, optionally filled from `init`
fn new_container(lua: &Lua, ctx: &BridgeContext, class: PropertyClass, init: Option<LuaValue>) -> Result<LuaValue> {
    let codec = ctx.codec_for(class)?;
    let value = match init {
        Some(init) => codec.pop(lua, ctx, &init)?,
        None => codec.default_value(ctx),
    };
    codec.push(lua, ctx, &Place::owned(value))
}

/// Install the container factories, `NewObject` and lazy type lookup
pub(crate) fn install_builtins(lua: &Lua, ctx: &BridgeContext) -> Result<()> {
    let namespace = ctx.namespace(lua)?;

    namespace.raw_set(
        "TArray",
        lua.create_function(|lua, (elem, init): (String, Option<LuaValue>)| {
            let ctx = BridgeContext::current(lua)?;
            element(&ctx, &elem)
                .and_then(|e| new_container(lua, &ctx, PropertyClass::Array(e), init))
                .funnel(lua)
        })?,
    )?;

    namespace.raw_set(
        "TSet",
        lua.create_function(|lua, (elem, init): (String, Option<LuaValue>)| {
            let ctx = BridgeContext::current(lua)?;
            element(&ctx, &elem)
                .and_then(|e| new_container(lua, &ctx, PropertyClass::Set(e), init))
                .funnel(lua)
        })?,
    )?;

    namespace.raw_set(
        "TMap",
        lua.create_function(
            |lua, (key, value, init): (String, String, Option<LuaValue>)| {
                let ctx = BridgeContext::current(lua)?;
                let class = element(&ctx, &key)
                    .and_then(|k| Ok(PropertyClass::Map(k, element(&ctx, &value)?)));
                class
                    .and_then(|class| new_container(lua, &ctx, class, init))
                    .funnel(lua)
            },
        )?,
    )?;

    namespace.raw_set(
        "NewObject",
        lua.create_function(|lua, (class, name): (LuaValue, Option<String>)| {
            let ctx = BridgeContext::current(lua)?;
            new_object(lua, &ctx, &class, name).funnel(lua)
        })?,
    )?;

    namespace.raw_set(
        "Require",
        lua.create_function(|lua, name: String| {
            let ctx = BridgeContext::current(lua)?;
            require(lua, &ctx, &name).funnel(lua)
        })?,
    )?;

    let lazy = lua.create_table()?;
    lazy.raw_set(
        "__index",
        lua.create_function(|lua, (namespace, key): (LuaTable, LuaValue)| {
            let LuaValue::String(key) = key else {
                return Ok(LuaValue::Nil);
            };
            let key = key.to_str()?.to_string();
            let ctx = BridgeContext::current(lua)?;
            if !require(lua, &ctx, &key).funnel(lua)? {
                return Ok(LuaValue::Nil);
            }
            namespace.raw_get(key)
        })?,
    )?;
    let setmetatable: LuaFunction = lua.globals().get("setmetatable")?;
    setmetatable.call::<()>((namespace, lazy))?;
    Ok(())
}

/// Create a transient host object; it lives as long as script holds a handle
fn new_object(lua: &Lua, ctx: &BridgeContext, class: &LuaValue, name: Option<String>) -> Result<LuaValue> {
    let registry = ctx.host().registry();
    let id = match class {
        LuaValue::UserData(ud) => ud
            .borrow::<ClassHandle>()
            .map_err(|_| Error::mismatch("class", "userdata"))?
            .id(),
        LuaValue::String(s) => {
            let s = s.to_str()?.to_string();
            registry
                .find_class(&s)
                .ok_or(Error::UnknownName(s))?
        }
        other => return Err(Error::mismatch("class", other.type_name())),
    };
    let name = name.unwrap_or_else(|| format!("{}_{}", class_name(ctx, id), ctx.host().object_count()));
    let object = ctx.host().spawn_transient(id, name)?;
    ctx.identity().push(lua, ctx, object)
}
