//! Object identity and liveness
//!
//! The [`IdentityRegistry`] maps object ids to their script handle through a
//! weak-valued Lua table, so pushing the same live object twice yields the
//! same userdata. The [`LivenessSet`] counts handles per object and keeps the
//! object in the host's root set while the count is positive; each handle owns
//! its share of that count through a [`RootGuard`].

use crate::context::BridgeContext;
use crate::handle::ObjectHandle;
use crate::Result;
use mlua::prelude::*;
use reflect::{Host, ObjectId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Counted set of objects rooted on behalf of one runtime
#[derive(Debug)]
pub struct LivenessSet {
    host: Rc<Host>,
    counts: RefCell<HashMap<ObjectId, usize>>,
    closed: Cell<bool>,
}

impl LivenessSet {
    pub fn new(host: Rc<Host>) -> Rc<Self> {
        Rc::new(Self {
            host,
            counts: RefCell::new(HashMap::new()),
            closed: Cell::new(false),
        })
    }

    /// Add one reference; the first one roots the object in the host
    pub fn add_ref(&self, id: ObjectId) -> usize {
        if self.closed.get() {
            return 0;
        }
        let count = {
            let mut counts = self.counts.borrow_mut();
            let count = counts.entry(id).or_insert(0);
            *count += 1;
            *count
        };
        if count == 1 {
            self.host.add_root(id);
            tracing::trace!("rooted {}", id);
        }
        count
    }

    /// Drop one reference; the last one unroots the object
    pub fn remove_ref(&self, id: ObjectId) -> usize {
        let count = {
            let mut counts = self.counts.borrow_mut();
            match counts.get_mut(&id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    return *count;
                }
                Some(_) => {
                    counts.remove(&id);
                    0
                }
                None => return 0,
            }
        };
        self.host.remove_root(id);
        tracing::trace!("unrooted {}", id);
        count
    }

    pub fn count(&self, id: ObjectId) -> usize {
        self.counts.borrow().get(&id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.borrow().is_empty()
    }

    /// Unroot everything and refuse new references; returns how many objects were released
    pub fn release_all(&self) -> usize {
        self.closed.set(true);
        let ids: Vec<ObjectId> = self.counts.borrow_mut().drain().map(|(id, _)| id).collect();
        for id in &ids {
            self.host.remove_root(*id);
        }
        ids.len()
    }
}

/// One handle's share of an object's liveness count
#[derive(Debug)]
pub struct RootGuard {
    liveness: Rc<LivenessSet>,
    id: ObjectId,
}

impl RootGuard {
    pub fn new(liveness: &Rc<LivenessSet>, id: ObjectId) -> Self {
        liveness.add_ref(id);
        Self {
            liveness: Rc::clone(liveness),
            id,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        self.liveness.remove_ref(self.id);
    }
}

/// Object id to script handle, with weak values
pub struct IdentityRegistry {
    table: LuaRegistryKey,
}

impl IdentityRegistry {
    pub(crate) fn new(lua: &Lua) -> Result<Self> {
        let table: LuaTable = lua
            .load("return setmetatable({}, { __mode = 'v' })")
            .set_name("=identity")
            .eval()?;
        Ok(Self {
            table: lua.create_registry_value(table)?,
        })
    }

    fn table(&self, lua: &Lua) -> Result<LuaTable> {
        Ok(lua.registry_value(&self.table)?)
    }

    /// The cached handle for an object, if one is still alive in script
    pub fn lookup_or_nil(&self, lua: &Lua, id: ObjectId) -> Result<Option<LuaAnyUserData>> {
        Ok(self.table(lua)?.raw_get(id.to_bits())?)
    }

    pub fn register(&self, lua: &Lua, id: ObjectId, handle: &LuaAnyUserData) -> Result<()> {
        self.table(lua)?.raw_set(id.to_bits(), handle.clone())?;
        Ok(())
    }

    /// Push an object: the cached handle if there is one, a fresh rooted
    /// handle otherwise, or nil if the object is no longer valid
    pub fn push(&self, lua: &Lua, ctx: &BridgeContext, id: ObjectId) -> Result<LuaValue> {
        let host = ctx.host();
        let Some(class) = host.class_of(id) else {
            tracing::debug!("pushing invalid object {} as nil", id);
            return Ok(LuaValue::Nil);
        };
        if let Some(handle) = self.lookup_or_nil(lua, id)? {
            return Ok(LuaValue::UserData(handle));
        }
        if ctx.is_shut_down() {
            return Ok(LuaValue::Nil);
        }

        let guard = RootGuard::new(ctx.liveness(), id);
        let handle = lua.create_userdata(ObjectHandle::new(id, class, guard))?;
        self.register(lua, id, &handle)?;
        Ok(LuaValue::UserData(handle))
    }

    /// Number of handles still cached
    pub fn len(&self, lua: &Lua) -> Result<usize> {
        let mut count = 0;
        for pair in self.table(lua)?.pairs::<LuaValue, LuaValue>() {
            pair?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self, lua: &Lua) -> Result<bool> {
        Ok(self.len(lua)? == 0)
    }

    /// Forget every cached handle
    pub(crate) fn clear(&self, lua: &Lua) -> Result<()> {
        let table = self.table(lua)?;
        let keys: Vec<LuaValue> = table
            .pairs::<LuaValue, LuaValue>()
            .map(|pair| pair.map(|(key, _)| key))
            .collect::<LuaResult<_>>()?;
        for key in keys {
            table.raw_set(key, LuaValue::Nil)?;
        }
        Ok(())
    }
}
