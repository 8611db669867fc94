//! Function binding and overload resolution
//!
//! A name with one candidate is installed as a plain Lua function. A name
//! with several candidates gets one alias per candidate (`Name1`, `Name2`, …
//! in registration order) plus a dispatcher under `Name` that tries each
//! candidate in turn and returns the first success. Nothing is selected
//! statically: a candidate fails when its arguments do not marshal or its
//! invocation fails, and only a successful candidate marshals any returns.

use crate::context::BridgeContext;
use crate::frame::CallFrame;
use crate::handle::ObjectHandle;
use crate::report::Funnel;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{FunctionDesc, ObjectId};
use std::rc::Rc;

/// One native function with its call frame
pub struct BoundFunction {
    desc: Rc<FunctionDesc>,
    frame: CallFrame,
}

impl BoundFunction {
    pub fn new(ctx: &BridgeContext, desc: Rc<FunctionDesc>) -> Result<Self> {
        let name = match desc.owner {
            Some(owner) => format!("{}.{}", crate::namespace::class_name(ctx, owner), desc.name),
            None => desc.name.clone(),
        };
        let leading = if desc.is_static() { 0 } else { 1 };
        let frame = CallFrame::new(ctx, name, Rc::clone(&desc.signature))?.with_leading_args(leading);
        Ok(Self { desc, frame })
    }

    pub fn desc(&self) -> &Rc<FunctionDesc> {
        &self.desc
    }

    pub fn frame(&self) -> &CallFrame {
        &self.frame
    }

    /// Call with raw Lua arguments; member functions take their target first
    pub fn call(&self, lua: &Lua, ctx: &BridgeContext, args: &[LuaValue]) -> Result<LuaMultiValue> {
        let (target, args) = if self.desc.is_static() {
            (None, args)
        } else {
            let (first, rest) = args
                .split_first()
                .ok_or_else(|| Error::InvalidTarget(self.frame.name().to_string()))?;
            (Some(self.target(ctx, first)?), rest)
        };

        let desc = &self.desc;
        self.frame.call(lua, ctx, args, |host, params| {
            if desc.is_fast_path() {
                host.call_native(desc, target, params)
            } else {
                host.invoke(desc, target, params)
            }
        })
    }

    fn target(&self, ctx: &BridgeContext, value: &LuaValue) -> Result<ObjectId> {
        let invalid = || Error::InvalidTarget(self.frame.name().to_string());
        let LuaValue::UserData(ud) = value else {
            return Err(invalid());
        };
        let id = ud.borrow::<ObjectHandle>().map_err(|_| invalid())?.id();
        if !ctx.host().is_valid(id) {
            return Err(invalid());
        }
        Ok(id)
    }
}

fn single(lua: &Lua, function: Rc<BoundFunction>) -> Result<LuaFunction> {
    Ok(lua.create_function(move |lua, args: LuaMultiValue| {
        let ctx = BridgeContext::current(lua)?;
        let args = args.into_vec();
        function.call(lua, &ctx, &args).funnel(lua)
    })?)
}

fn dispatcher(lua: &Lua, name: String, candidates: Vec<Rc<BoundFunction>>) -> Result<LuaFunction> {
    Ok(lua.create_function(move |lua, args: LuaMultiValue| {
        let ctx = BridgeContext::current(lua)?;
        let args = args.into_vec();
        let mut attempts = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match candidate.call(lua, &ctx, &args) {
                Ok(results) => return Ok(results),
                Err(e) => attempts.push(format!("  {}{}: {}", name, candidate.desc.signature, e)),
            }
        }
        Err(Error::OverloadExhausted {
            name: name.clone(),
            attempts,
        })
        .funnel(lua)
    })?)
}

/// Install `candidates` under `name` in `table`; returns how many were usable.
///
/// A candidate whose signature cannot be marshalled is skipped with a
/// warning. Aliases that would shadow a name in `reserved` are not installed.
pub fn install(
    lua: &Lua,
    ctx: &BridgeContext,
    table: &LuaTable,
    name: &str,
    candidates: &[Rc<FunctionDesc>],
    reserved: &[String],
) -> Result<usize> {
    let mut bound = Vec::with_capacity(candidates.len());
    let mut first_error = None;
    for (i, desc) in candidates.iter().enumerate() {
        match BoundFunction::new(ctx, Rc::clone(desc)) {
            Ok(function) => bound.push((i + 1, Rc::new(function))),
            Err(e) => {
                tracing::warn!("{} candidate {} not bound: {}", name, i + 1, e);
                first_error.get_or_insert(e);
            }
        }
    }

    if bound.is_empty() {
        return Err(first_error.unwrap_or_else(|| Error::UnknownName(name.to_string())));
    }

    if candidates.len() == 1 {
        let (_, function) = bound.remove(0);
        table.set(name, single(lua, function)?)?;
        return Ok(1);
    }

    for (position, function) in &bound {
        let alias = format!("{name}{position}");
        if reserved.contains(&alias) {
            tracing::debug!("alias {} shadows a function, not installed", alias);
            continue;
        }
        table.set(alias, single(lua, Rc::clone(function))?)?;
    }
    let count = bound.len();
    let functions = bound.into_iter().map(|(_, f)| f).collect();
    table.set(name, dispatcher(lua, name.to_string(), functions)?)?;
    tracing::debug!("{} bound with {} overloads", name, count);
    Ok(count)
}
