//! Call frame marshalling
//!
//! A [`CallFrame`] is built once per exposed function (or delegate handle)
//! and runs every call through the same steps:
//!
//! ```text
//! Init -> BuildArgs -> Invoke -> MarshalReturns -> Destroy
//! ```
//!
//! Init leases the frame's persistent parameter buffer. A nested call through
//! the same frame (a native function calling back into script, which calls
//! the same function again) finds the buffer already lent out and gets a
//! fresh one of the same shape, so the outer call's arguments are never
//! clobbered. Destroy runs in the lease's `Drop`, on every path.

use crate::codec::ValueCodec;
use crate::context::BridgeContext;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{Host, NativeValue, ParamRole, Signature};
use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

pub struct CallFrame {
    name: String,
    signature: Rc<Signature>,
    codecs: Vec<Rc<ValueCodec>>,
    defaults: Vec<NativeValue>,
    /// Lua arguments before the first parameter (the target of a member call)
    leading_args: usize,
    buffer: RefCell<Option<Vec<NativeValue>>>,
    depth: Cell<usize>,
    fresh_buffers: Cell<usize>,
}

impl CallFrame {
    /// Fails when any parameter has a descriptor the bridge cannot marshal
    pub fn new(ctx: &BridgeContext, name: impl Into<String>, signature: Rc<Signature>) -> Result<Self> {
        let codecs = signature
            .params
            .iter()
            .map(|param| ctx.codec(param))
            .collect::<Result<Vec<_>>>()?;
        let defaults = codecs.iter().map(|c| c.default_value(ctx)).collect();
        Ok(Self {
            name: name.into(),
            buffer: RefCell::new(Some(Vec::with_capacity(codecs.len()))),
            signature,
            codecs,
            defaults,
            leading_args: 0,
            depth: Cell::new(0),
            fresh_buffers: Cell::new(0),
        })
    }

    /// Number argument positions from after `count` leading arguments
    pub fn with_leading_args(mut self, count: usize) -> Self {
        self.leading_args = count;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Rc<Signature> {
        &self.signature
    }

    /// Calls currently in flight through this frame
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// How many calls needed a buffer of their own
    pub fn fresh_buffers(&self) -> usize {
        self.fresh_buffers.get()
    }

    /// Run one call. `args` are the Lua arguments after any leading ones;
    /// `invoke` runs the native side on the filled buffer.
    pub fn call<F>(&self, lua: &Lua, ctx: &BridgeContext, args: &[LuaValue], invoke: F) -> Result<LuaMultiValue>
    where
        F: FnOnce(&Host, &mut [NativeValue]) -> reflect::Result<()>,
    {
        let _depth = DepthGuard::enter(self, ctx.config().max_reentry_depth)?;
        let mut lease = BufferLease::take(self);

        self.build_args(lua, ctx, args, lease.slots())?;
        invoke(ctx.host(), lease.slots())?;
        self.marshal_returns(lua, ctx, args, lease.slots())
    }

    fn build_args(&self, lua: &Lua, ctx: &BridgeContext, args: &[LuaValue], slots: &mut [NativeValue]) -> Result<()> {
        let mut position = 0;
        for (slot, param) in self.signature.params.iter().enumerate() {
            let takes_argument = param.param.is_some_and(ParamRole::takes_argument);
            if !takes_argument {
                continue;
            }
            // Missing trailing arguments keep their default
            if let Some(arg) = args.get(position) {
                slots[slot] = self.codecs[slot]
                    .pop(lua, ctx, arg)
                    .map_err(|source| Error::BadArgument {
                        function: self.name.clone(),
                        index: self.leading_args + position + 1,
                        param: param.name.clone(),
                        source: Box::new(source),
                    })?;
            }
            position += 1;
        }
        Ok(())
    }

    fn marshal_returns(
        &self,
        lua: &Lua,
        ctx: &BridgeContext,
        args: &[LuaValue],
        slots: &mut [NativeValue],
    ) -> Result<LuaMultiValue> {
        let mut results = Vec::new();
        let params = &self.signature.params;

        if let Some(ret) = params.iter().position(|p| p.param == Some(ParamRole::Return)) {
            let value = mem::take(&mut slots[ret]);
            results.push(self.codecs[ret].push_ret(lua, ctx, value)?);
        }

        let mut position = 0;
        for (slot, param) in params.iter().enumerate() {
            let role = param.param.unwrap_or(ParamRole::In);
            match role {
                ParamRole::Out | ParamRole::InOut => {
                    let value = mem::take(&mut slots[slot]);
                    results.push(self.codecs[slot].push_ret(lua, ctx, value)?);
                }
                ParamRole::ByRef => {
                    let value = mem::take(&mut slots[slot]);
                    let existing = args.get(position).cloned().unwrap_or(LuaValue::Nil);
                    results.push(self.codecs[slot].push_ref(lua, ctx, &existing, value)?);
                }
                ParamRole::In | ParamRole::Return => {}
            }
            if role.takes_argument() {
                position += 1;
            }
        }
        Ok(LuaMultiValue::from_vec(results))
    }
}

impl std::fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallFrame({}{})", self.name, self.signature)
    }
}

struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn enter(frame: &'a CallFrame, limit: usize) -> Result<Self> {
        let depth = frame.depth.get();
        if depth >= limit {
            return Err(Error::ReentryLimit {
                name: frame.name.clone(),
                limit,
            });
        }
        frame.depth.set(depth + 1);
        Ok(Self {
            depth: &frame.depth,
        })
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// Parameter buffer of one in-flight call
struct BufferLease<'a> {
    frame: &'a CallFrame,
    slots: Vec<NativeValue>,
    persistent: bool,
}

impl<'a> BufferLease<'a> {
    fn take(frame: &'a CallFrame) -> Self {
        let lent = frame.buffer.borrow_mut().take();
        let persistent = lent.is_some();
        let mut slots = lent.unwrap_or_else(|| {
            frame.fresh_buffers.set(frame.fresh_buffers.get() + 1);
            Vec::with_capacity(frame.defaults.len())
        });
        slots.clear();
        slots.extend(frame.defaults.iter().cloned());
        Self {
            frame,
            slots,
            persistent,
        }
    }

    fn slots(&mut self) -> &mut [NativeValue] {
        &mut self.slots
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        // Destruct every slot before the buffer goes back to the frame
        for slot in &mut self.slots {
            *slot = NativeValue::Empty;
        }
        if self.persistent {
            *self.frame.buffer.borrow_mut() = Some(mem::take(&mut self.slots));
        }
    }
}
