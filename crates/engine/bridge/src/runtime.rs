//! Script runtime: one Lua state bridged to one reflection host

use crate::codec::ValueCodec;
use crate::config::BridgeConfig;
use crate::context::BridgeContext;
use crate::handle::FieldAccessor;
use crate::namespace;
use crate::overload;
use crate::place::Place;
use crate::report::ErrorReport;
use crate::Result;
use mlua::prelude::*;
use reflect::{FunctionDesc, Host, NativeValue, ObjectId, PropertyDesc};
use std::path::Path;
use std::rc::Rc;

/// What `bind` installs under a name
pub enum Binding {
    /// Functions sharing one name; more than one makes an overload set
    Functions(Vec<Rc<FunctionDesc>>),
    /// A group of fields of one object, read and written by name
    Fields {
        owner: ObjectId,
        fields: Vec<Rc<PropertyDesc>>,
    },
}

pub struct ScriptRuntime {
    lua: Lua,
    ctx: Rc<BridgeContext>,
}

impl ScriptRuntime {
    /// Create a runtime with default configuration
    pub fn new(host: Rc<Host>) -> Result<Self> {
        Self::with_config(host, BridgeConfig::default())
    }

    pub fn with_config(host: Rc<Host>, config: BridgeConfig) -> Result<Self> {
        Self::with_lua(Lua::new(), host, config)
    }

    /// Bridge an existing Lua state (for example one with the debug library
    /// loaded, so error reports carry a traceback)
    pub fn with_lua(lua: Lua, host: Rc<Host>, config: BridgeConfig) -> Result<Self> {
        let ctx = BridgeContext::new(&lua, host, config)?;
        lua.set_app_data(Rc::clone(&ctx));
        namespace::install_builtins(&lua, &ctx)?;
        tracing::info!("script runtime ready, namespace {}", ctx.config().namespace);
        Ok(Self { lua, ctx })
    }

    /// Get the underlying Lua state
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn host(&self) -> &Rc<Host> {
        self.ctx.host_rc()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.ctx.config()
    }

    pub fn context(&self) -> &Rc<BridgeContext> {
        &self.ctx
    }

    /// Install a reflected type into the namespace; idempotent
    pub fn require(&self, name: &str) -> Result<bool> {
        namespace::require(&self.lua, &self.ctx, name)
    }

    /// Install a binding under `name` in the namespace. Fails, installing
    /// nothing, when none of its descriptors can be marshalled.
    pub fn bind(&self, name: &str, binding: Binding) -> Result<()> {
        let table = self.ctx.namespace(&self.lua)?;
        match binding {
            Binding::Functions(functions) => {
                let count = overload::install(&self.lua, &self.ctx, &table, name, &functions, &[])?;
                tracing::debug!("bound {} ({} functions)", name, count);
            }
            Binding::Fields { owner, fields } => {
                let codecs = fields
                    .iter()
                    .map(|field| self.ctx.codec(field))
                    .collect::<Result<Vec<_>>>()?;
                tracing::debug!("bound {} ({} fields)", name, codecs.len());
                table.raw_set(name, FieldAccessor::new(owner, codecs))?;
            }
        }
        Ok(())
    }

    fn codec(&self, desc: &Rc<PropertyDesc>) -> Result<Rc<ValueCodec>> {
        self.ctx.codec(desc)
    }

    /// Push the value stored at `place`
    pub fn push_value(&self, desc: &Rc<PropertyDesc>, place: &Place) -> Result<LuaValue> {
        self.codec(desc)?.push(&self.lua, &self.ctx, place)
    }

    /// Decode a script value into `place`; on failure `place` is unchanged
    pub fn pop_value(&self, desc: &Rc<PropertyDesc>, value: &LuaValue, place: &Place) -> Result<()> {
        self.codec(desc)?.pop_into(&self.lua, &self.ctx, value, place)
    }

    /// Decode a script value into a fresh native value
    pub fn decode(&self, desc: &Rc<PropertyDesc>, value: &LuaValue) -> Result<NativeValue> {
        self.codec(desc)?.pop(&self.lua, &self.ctx, value)
    }

    /// Push a value that does not outlive the call
    pub fn push_return(&self, desc: &Rc<PropertyDesc>, value: NativeValue) -> Result<LuaValue> {
        self.codec(desc)?.push_ret(&self.lua, &self.ctx, value)
    }

    /// Update `existing` in place when it is a compatible handle
    pub fn push_by_ref(&self, desc: &Rc<PropertyDesc>, existing: &LuaValue, value: NativeValue) -> Result<LuaValue> {
        self.codec(desc)?.push_ref(&self.lua, &self.ctx, existing, value)
    }

    /// The script handle of an object (nil for invalid objects)
    pub fn push_object(&self, id: ObjectId) -> Result<LuaValue> {
        self.ctx.identity().push(&self.lua, &self.ctx, id)
    }

    /// Load and execute a Lua file
    pub fn exec_file(&self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.exec_string(&content)
    }

    /// Execute a Lua string
    pub fn exec_string(&self, code: &str) -> Result<()> {
        self.lua.load(code).exec()?;
        Ok(())
    }

    /// Evaluate a Lua expression or chunk
    pub fn eval<R: FromLuaMulti>(&self, code: &str) -> Result<R> {
        Ok(self.lua.load(code).eval()?)
    }

    /// Call a Lua function by name
    pub fn call_function<A, R>(&self, name: &str, args: A) -> Result<R>
    where
        A: IntoLuaMulti,
        R: FromLuaMulti,
    {
        let func: LuaFunction = self.lua.globals().get(name)?;
        Ok(func.call(args)?)
    }

    /// Get a global value from Lua
    pub fn get_global<T: FromLua>(&self, name: &str) -> Result<T> {
        Ok(self.lua.globals().get(name)?)
    }

    /// Set a global value in Lua
    pub fn set_global<T: IntoLua>(&self, name: &str, value: T) -> Result<()> {
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    /// Receive every error funneled into script from now on
    pub fn set_error_notifier(&self, notifier: impl Fn(&ErrorReport) + 'static) {
        self.ctx.reporter().set_notifier(Some(Rc::new(notifier)));
    }

    pub fn clear_error_notifier(&self) {
        self.ctx.reporter().set_notifier(None);
    }

    pub fn errors_reported(&self) -> u64 {
        self.ctx.reporter().reported()
    }

    /// Objects currently rooted on behalf of script handles
    pub fn rooted_objects(&self) -> usize {
        self.ctx.liveness().len()
    }

    /// Handles still reachable through the identity registry
    pub fn cached_handles(&self) -> Result<usize> {
        self.ctx.identity().len(&self.lua)
    }

    /// Run a full Lua collection cycle so unreachable handles release their roots
    pub fn collect_garbage(&self) -> Result<()> {
        // Twice: userdata finalizers run on the cycle after they become unreachable
        self.lua.gc_collect()?;
        self.lua.gc_collect()?;
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.ctx.is_shut_down()
    }

    /// Release every root and handle mapping; later handle use fails cleanly
    pub fn shutdown(&self) -> Result<()> {
        if self.ctx.is_shut_down() {
            return Ok(());
        }
        self.ctx.shutdown(&self.lua)?;
        self.lua.remove_app_data::<Rc<BridgeContext>>();
        Ok(())
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("script runtime shutdown failed: {}", e);
        }
    }
}
