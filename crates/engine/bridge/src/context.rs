//! Per-runtime bridge state
//!
//! One [`BridgeContext`] exists per Lua state. It lives in the state's app
//! data so every callback can reach it from the `&Lua` it is handed, and it
//! only references Lua values through registry keys.

use crate::codec::{StructLayout, ValueCodec};
use crate::config::BridgeConfig;
use crate::identity::{IdentityRegistry, LivenessSet};
use crate::report::ErrorReporter;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{Host, PropertyClass, PropertyDesc, StructId};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct BridgeContext {
    host: Rc<Host>,
    config: BridgeConfig,
    liveness: Rc<LivenessSet>,
    identity: IdentityRegistry,
    reporter: ErrorReporter,
    namespace: LuaRegistryKey,
    /// Codecs keyed by descriptor address; the codec keeps its descriptor alive
    codecs: RefCell<HashMap<usize, Rc<ValueCodec>>>,
    /// Codecs for anonymous descriptors, keyed by [`cache_key`]
    named: RefCell<HashMap<String, Rc<ValueCodec>>>,
    layouts: RefCell<HashMap<StructId, Rc<StructLayout>>>,
    required: RefCell<HashSet<String>>,
    shut_down: Cell<bool>,
}

impl BridgeContext {
    pub(crate) fn new(lua: &Lua, host: Rc<Host>, config: BridgeConfig) -> Result<Rc<Self>> {
        let liveness = LivenessSet::new(Rc::clone(&host));
        let identity = IdentityRegistry::new(lua)?;
        let namespace = lua.create_table()?;
        lua.globals().set(config.namespace.as_str(), namespace.clone())?;

        Ok(Rc::new(Self {
            reporter: ErrorReporter::new(config.capture_traceback),
            namespace: lua.create_registry_value(namespace)?,
            host,
            config,
            liveness,
            identity,
            codecs: RefCell::new(HashMap::new()),
            named: RefCell::new(HashMap::new()),
            layouts: RefCell::new(HashMap::new()),
            required: RefCell::new(HashSet::new()),
            shut_down: Cell::new(false),
        }))
    }

    /// The context of the runtime owning `lua`
    pub fn from_lua(lua: &Lua) -> Result<Rc<Self>> {
        lua.app_data_ref::<Rc<BridgeContext>>()
            .map(|ctx| Rc::clone(&ctx))
            .ok_or(Error::Shutdown)
    }

    /// [`Self::from_lua`] for callbacks that answer to Lua directly
    pub(crate) fn current(lua: &Lua) -> LuaResult<Rc<Self>> {
        Self::from_lua(lua).map_err(|e| LuaError::RuntimeError(e.to_string()))
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn host_rc(&self) -> &Rc<Host> {
        &self.host
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityRegistry {
        &self.identity
    }

    pub fn liveness(&self) -> &Rc<LivenessSet> {
        &self.liveness
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// The namespace table types are installed into
    pub fn namespace(&self, lua: &Lua) -> Result<LuaTable> {
        Ok(lua.registry_value(&self.namespace)?)
    }

    /// Cached codec for a descriptor, created on first use
    pub fn codec(&self, desc: &Rc<PropertyDesc>) -> Result<Rc<ValueCodec>> {
        let key = Rc::as_ptr(desc) as usize;
        if let Some(codec) = self.codecs.borrow().get(&key) {
            return Ok(Rc::clone(codec));
        }
        // Built outside the borrow: composite codecs request their children
        let codec = Rc::new(ValueCodec::new(self, Rc::clone(desc))?);
        self.codecs
            .borrow_mut()
            .insert(key, Rc::clone(&codec));
        Ok(codec)
    }

    /// Cached codec for an anonymous descriptor identified by its type
    pub fn codec_for(&self, class: PropertyClass) -> Result<Rc<ValueCodec>> {
        let key = cache_key(&class);
        if let Some(codec) = self.named.borrow().get(&key) {
            return Ok(Rc::clone(codec));
        }
        let desc = Rc::new(PropertyDesc::new(class.type_name(), class));
        let codec = Rc::new(ValueCodec::new(self, desc)?);
        self.named.borrow_mut().insert(key, Rc::clone(&codec));
        Ok(codec)
    }

    /// Field codecs of a struct
    pub fn struct_layout(&self, id: StructId) -> Result<Rc<StructLayout>> {
        if let Some(layout) = self.layouts.borrow().get(&id) {
            return Ok(Rc::clone(layout));
        }
        let layout = Rc::new(StructLayout::new(self, id)?);
        self.layouts.borrow_mut().insert(id, Rc::clone(&layout));
        Ok(layout)
    }

    pub(crate) fn is_required(&self, name: &str) -> bool {
        self.required.borrow().contains(name)
    }

    pub(crate) fn mark_required(&self, name: &str) {
        self.required.borrow_mut().insert(name.to_string());
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// Drop every handle mapping and every root this runtime holds
    pub(crate) fn shutdown(&self, lua: &Lua) -> Result<()> {
        if self.shut_down.replace(true) {
            return Ok(());
        }
        self.identity.clear(lua)?;
        let released = self.liveness.release_all();
        tracing::info!("bridge shut down, released {} roots", released);
        Ok(())
    }
}

/// Type name, except that delegate signatures are told apart by address
fn cache_key(class: &PropertyClass) -> String {
    match class {
        PropertyClass::Delegate(sig) => format!("delegate@{:p}", Rc::as_ptr(sig)),
        PropertyClass::MulticastDelegate(sig) => format!("multicast@{:p}", Rc::as_ptr(sig)),
        PropertyClass::Array(inner) => format!("TArray<{}>", cache_key(&inner.class)),
        PropertyClass::Set(inner) => format!("TSet<{}>", cache_key(&inner.class)),
        PropertyClass::Map(k, v) => format!("TMap<{}, {}>", cache_key(&k.class), cache_key(&v.class)),
        other => other.type_name(),
    }
}
