//! Script functions as native delegate targets
//!
//! A Lua function stored into a delegate becomes a [`ScriptDelegate`]. When
//! native code fires the delegate, the argument-taking parameters are pushed
//! as fresh values, the function runs, and its results are popped back into
//! the parameter buffer: the return value first, then every output
//! parameter in declared order.

use crate::context::BridgeContext;
use crate::handle::DelegateHandle;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{DelegateTarget, DelegateValue, Host, NativeValue, ParamRole, Signature};
use std::rc::Rc;

pub struct ScriptDelegate {
    lua: mlua::WeakLua,
    function: LuaRegistryKey,
    identity: usize,
    signature: Rc<Signature>,
}

impl ScriptDelegate {
    pub fn new(lua: &Lua, signature: Rc<Signature>, function: &LuaFunction) -> Result<Self> {
        Ok(Self {
            lua: lua.weak(),
            function: lua.create_registry_value(function.clone())?,
            identity: identity_of(function),
            signature,
        })
    }

    fn call(&self, lua: &Lua, params: &mut [NativeValue]) -> Result<()> {
        let ctx = BridgeContext::from_lua(lua)?;
        let function: LuaFunction = lua.registry_value(&self.function)?;
        let roles: Vec<ParamRole> = self
            .signature
            .params
            .iter()
            .map(|p| p.param.unwrap_or(ParamRole::In))
            .collect();

        let mut args = Vec::new();
        for (slot, param) in self.signature.params.iter().enumerate() {
            if roles[slot].takes_argument() {
                let value = params.get(slot).cloned().unwrap_or_default();
                args.push(ctx.codec(param)?.push_ret(lua, &ctx, value)?);
            }
        }

        let results = function.call::<LuaMultiValue>(LuaMultiValue::from_vec(args))?;
        let mut results = results.into_vec().into_iter();

        let ret = roles.iter().position(|r| *r == ParamRole::Return);
        let outputs = (0..roles.len()).filter(|slot| {
            matches!(roles[*slot], ParamRole::Out | ParamRole::InOut | ParamRole::ByRef)
        });
        for slot in ret.into_iter().chain(outputs) {
            let Some(result) = results.next() else {
                break;
            };
            // nil leaves the slot as the native caller set it
            if result.is_nil() {
                continue;
            }
            let codec = ctx.codec(&self.signature.params[slot])?;
            let value = codec.pop(lua, &ctx, &result)?;
            if let Some(target) = params.get_mut(slot) {
                *target = value;
            }
        }
        Ok(())
    }
}

impl DelegateTarget for ScriptDelegate {
    fn execute(&self, _host: &Host, params: &mut [NativeValue]) -> reflect::Result<()> {
        let lua = self
            .lua
            .try_upgrade()
            .ok_or_else(|| reflect::Error::Script("script runtime is closed".into()))?;
        self.call(&lua, params)
            .map_err(|e| reflect::Error::Script(e.to_string()))
    }

    fn identity(&self) -> usize {
        self.identity
    }

    fn describe(&self) -> String {
        format!("script function@{:#x}", self.identity)
    }
}

/// Identity used to find a bound script function again
pub fn identity_of(function: &LuaFunction) -> usize {
    function.to_pointer() as usize
}

/// Whether delegates of these signatures can hold each other's targets
pub fn same_signature(a: &Signature, b: &Signature) -> bool {
    a.params.len() == b.params.len()
        && a.params
            .iter()
            .zip(&b.params)
            .all(|(x, y)| x.param == y.param && x.class.same_type(&y.class))
}

/// A function binds, nil unbinds, and another delegate handle is copied
pub(crate) fn decode_delegate(
    lua: &Lua,
    ctx: &BridgeContext,
    signature: &Rc<Signature>,
    value: &LuaValue,
) -> Result<NativeValue> {
    match value {
        LuaValue::Nil => Ok(NativeValue::Delegate(DelegateValue::default())),
        LuaValue::Function(function) => {
            let target = ScriptDelegate::new(lua, Rc::clone(signature), function)?;
            Ok(NativeValue::Delegate(DelegateValue::bound(Rc::new(target))))
        }
        LuaValue::UserData(ud) => {
            let handle = ud
                .borrow::<DelegateHandle>()
                .map_err(|_| Error::mismatch(format!("delegate{signature}"), "userdata"))?;
            if !same_signature(handle.signature(), signature) {
                return Err(Error::mismatch(
                    format!("delegate{signature}"),
                    format!("delegate{}", handle.signature()),
                ));
            }
            handle.place().read(ctx.host())
        }
        other => Err(Error::mismatch(format!("delegate{signature}"), other.type_name())),
    }
}
