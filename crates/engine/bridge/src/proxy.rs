//! Container proxies
//!
//! A [`ContainerProxy`] is a live view of an array, map or set stored at a
//! [`Place`]. Creating one allocates nothing on the native side; every
//! operation re-resolves the place, so a proxy whose owner was destroyed
//! fails with a dangling-reference error instead of reading freed storage.
//!
//! Script-created containers (`TArray`, `TMap`, `TSet`) use the same type
//! with a runtime-owned place; those are the "glue" containers a native
//! destination of the same element type copies directly.
//!
//! Indices are 1-based, as everywhere else in Lua. Array elements are pushed
//! in place (a struct element is a handle onto the element); map values and
//! set elements are not addressable and are pushed as copies.
//!
//! Method names win over map keys on read: `scores.Keys` is the method even
//! when the map holds a `"Keys"` entry. `Find` reads any key, and assignment
//! always writes the entry.

use crate::codec::{decode_container, encode_container, Family, Shape};
use crate::context::BridgeContext;
use crate::place::Place;
use crate::report::Funnel;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::NativeValue;

#[derive(Clone)]
pub struct ContainerProxy {
    place: Place,
    shape: Shape,
}

impl ContainerProxy {
    pub fn new(place: Place, shape: Shape) -> Self {
        Self { place, shape }
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Whether the storage is owned by the script runtime
    pub fn is_glue(&self) -> bool {
        self.place.is_owned()
    }

    fn is_fixed(&self) -> bool {
        self.shape.fixed_len().is_some()
    }

    fn expect(&self, family: Family) -> Result<()> {
        if self.shape.family() == family {
            Ok(())
        } else {
            Err(Error::mismatch(family.name(), self.shape.type_name()))
        }
    }

    fn resizable(&self) -> Result<()> {
        self.expect(Family::Sequence)?;
        if self.is_fixed() {
            return Err(Error::FixedSize);
        }
        Ok(())
    }

    pub fn len(&self, ctx: &BridgeContext) -> Result<usize> {
        let len = self.place.with(ctx.host(), |value| match value {
            NativeValue::Array(items) | NativeValue::Set(items) => Some(items.len()),
            NativeValue::Map(entries) => Some(entries.len()),
            _ => None,
        })?;
        len.ok_or_else(|| Error::DanglingReference(self.place.to_string()))
    }

    /// 0-based slot of a 1-based script index
    fn slot(&self, ctx: &BridgeContext, index: i64) -> Result<usize> {
        let len = self.len(ctx)?;
        if index < 1 || index as u64 > len as u64 {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok((index - 1) as usize)
    }

    fn edit<R>(&self, ctx: &BridgeContext, f: impl FnOnce(&mut NativeValue) -> R) -> Result<R> {
        self.place.with_mut(ctx.host(), f)
    }

    // -- arrays --

    pub fn get(&self, lua: &Lua, ctx: &BridgeContext, index: i64) -> Result<LuaValue> {
        self.expect(Family::Sequence)?;
        let slot = self.slot(ctx, index)?;
        self.shape.element().push(lua, ctx, &self.place.element(slot))
    }

    pub fn set(&self, lua: &Lua, ctx: &BridgeContext, index: i64, value: &LuaValue) -> Result<()> {
        self.expect(Family::Sequence)?;
        let slot = self.slot(ctx, index)?;
        self.shape
            .element()
            .pop_into(lua, ctx, value, &self.place.element(slot))
    }

    /// Append; returns the new element's index
    pub fn push(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue) -> Result<usize> {
        self.resizable()?;
        let item = self.shape.element().pop(lua, ctx, value)?;
        self.edit(ctx, |items| match items {
            NativeValue::Array(items) => {
                items.push(item);
                items.len()
            }
            _ => 0,
        })
    }

    pub fn insert(&self, lua: &Lua, ctx: &BridgeContext, index: i64, value: &LuaValue) -> Result<()> {
        self.resizable()?;
        let len = self.len(ctx)?;
        if index < 1 || index as u64 > len as u64 + 1 {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let item = self.shape.element().pop(lua, ctx, value)?;
        self.edit(ctx, |items| {
            if let NativeValue::Array(items) = items {
                items.insert((index - 1) as usize, item);
            }
        })
    }

    pub fn remove_at(&self, ctx: &BridgeContext, index: i64) -> Result<()> {
        self.resizable()?;
        let slot = self.slot(ctx, index)?;
        self.edit(ctx, |items| {
            if let NativeValue::Array(items) = items {
                items.remove(slot);
            }
        })
    }

    /// 1-based index of the first element equal to `value`
    pub fn find_index(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue) -> Result<Option<usize>> {
        self.expect(Family::Sequence)?;
        // A value of the wrong type is simply not in the container
        let Ok(needle) = self.shape.element().pop(lua, ctx, value) else {
            return Ok(None);
        };
        let found = self.place.with(ctx.host(), |items| match items {
            NativeValue::Array(items) => items.iter().position(|item| *item == needle),
            _ => None,
        })?;
        Ok(found.map(|i| i + 1))
    }

    pub fn contains(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue) -> Result<bool> {
        match self.shape.family() {
            Family::Sequence => Ok(self.find_index(lua, ctx, value)?.is_some()),
            Family::Set => {
                let Ok(needle) = self.shape.element().pop(lua, ctx, value) else {
                    return Ok(false);
                };
                self.place.with(ctx.host(), |items| match items {
                    NativeValue::Set(items) => items.contains(&needle),
                    _ => false,
                })
            }
            Family::Map => self.find_key(lua, ctx, value).map(|v| !v.is_nil()),
        }
    }

    // -- maps --

    /// Copy of the value stored under `key`, or nil
    pub fn find_key(&self, lua: &Lua, ctx: &BridgeContext, key: &LuaValue) -> Result<LuaValue> {
        let Shape::Map(key_codec, value_codec) = &self.shape else {
            return Err(Error::mismatch("map", self.shape.type_name()));
        };
        let Ok(key) = key_codec.pop(lua, ctx, key) else {
            return Ok(LuaValue::Nil);
        };
        let found = self.place.with(ctx.host(), |entries| match entries {
            NativeValue::Map(entries) => entries
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        })?;
        match found {
            Some(value) => value_codec.push_ret(lua, ctx, value),
            None => Ok(LuaValue::Nil),
        }
    }

    /// Insert or replace
    pub fn put(&self, lua: &Lua, ctx: &BridgeContext, key: &LuaValue, value: &LuaValue) -> Result<()> {
        let Shape::Map(key_codec, value_codec) = &self.shape else {
            return Err(Error::mismatch("map", self.shape.type_name()));
        };
        let key = key_codec.pop(lua, ctx, key)?;
        let value = value_codec.pop(lua, ctx, value)?;
        self.edit(ctx, |entries| {
            if let NativeValue::Map(entries) = entries {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
            }
        })
    }

    /// Keys or values as a fresh sequence table
    fn column(&self, lua: &Lua, ctx: &BridgeContext, keys: bool) -> Result<LuaTable> {
        let Shape::Map(key_codec, value_codec) = &self.shape else {
            return Err(Error::mismatch("map", self.shape.type_name()));
        };
        let NativeValue::Map(entries) = self.place.read(ctx.host())? else {
            return Err(Error::DanglingReference(self.place.to_string()));
        };
        let table = lua.create_table_with_capacity(entries.len(), 0)?;
        for (i, (key, value)) in entries.into_iter().enumerate() {
            let item = if keys {
                key_codec.push_ret(lua, ctx, key)?
            } else {
                value_codec.push_ret(lua, ctx, value)?
            };
            table.raw_set(i + 1, item)?;
        }
        Ok(table)
    }

    // -- sets --

    /// Insert; returns false when the element was already present
    pub fn insert_unique(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue) -> Result<bool> {
        self.expect(Family::Set)?;
        let item = self.shape.element().pop(lua, ctx, value)?;
        self.edit(ctx, |items| match items {
            NativeValue::Set(items) if !items.contains(&item) => {
                items.push(item);
                true
            }
            _ => false,
        })
    }

    // -- any family --

    /// Remove by key (maps) or by element (sets); returns whether anything was removed
    pub fn remove_value(&self, lua: &Lua, ctx: &BridgeContext, value: &LuaValue) -> Result<bool> {
        let codec = match &self.shape {
            Shape::Map(key, _) => key,
            Shape::Set(element) => element,
            _ => return Err(Error::mismatch("map or set", self.shape.type_name())),
        };
        let Ok(needle) = codec.pop(lua, ctx, value) else {
            return Ok(false);
        };
        self.edit(ctx, |container| match container {
            NativeValue::Map(entries) => {
                let before = entries.len();
                entries.retain(|(k, _)| *k != needle);
                entries.len() != before
            }
            NativeValue::Set(items) => {
                let before = items.len();
                items.retain(|item| *item != needle);
                items.len() != before
            }
            _ => false,
        })
    }

    pub fn clear(&self, ctx: &BridgeContext) -> Result<()> {
        if self.shape.family() == Family::Sequence && self.is_fixed() {
            return Err(Error::FixedSize);
        }
        self.edit(ctx, |container| match container {
            NativeValue::Array(items) | NativeValue::Set(items) => items.clear(),
            NativeValue::Map(entries) => entries.clear(),
            _ => {}
        })
    }

    /// Snapshot as a plain table
    pub fn to_table(&self, lua: &Lua, ctx: &BridgeContext) -> Result<LuaTable> {
        let value = self.place.read(ctx.host())?;
        let table = lua.create_table()?;
        encode_container(lua, ctx, &self.shape, value, &table)?;
        Ok(table)
    }

    /// Replace the contents from another proxy or a plain table
    pub fn copy_from(&self, lua: &Lua, ctx: &BridgeContext, source: &LuaValue) -> Result<()> {
        let value = decode_container(lua, ctx, &self.shape, source)?;
        self.place.write(ctx.host(), value)
    }

    /// Copy into another proxy or table; with no destination a new table is returned
    pub fn copy_to(&self, lua: &Lua, ctx: &BridgeContext, this: LuaValue, dest: LuaValue) -> Result<LuaValue> {
        match &dest {
            LuaValue::Nil => Ok(LuaValue::Table(self.to_table(lua, ctx)?)),
            LuaValue::Table(table) => {
                table.clear()?;
                let value = self.place.read(ctx.host())?;
                encode_container(lua, ctx, &self.shape, value, table)?;
                Ok(dest)
            }
            LuaValue::UserData(ud) => {
                let target = ud
                    .borrow::<ContainerProxy>()
                    .map_err(|_| Error::mismatch(self.shape.type_name(), "userdata"))?
                    .clone();
                target.copy_from(lua, ctx, &this)?;
                Ok(dest)
            }
            other => Err(Error::mismatch(self.shape.type_name(), other.type_name())),
        }
    }

    fn describe(&self, ctx: &BridgeContext) -> String {
        match self.len(ctx) {
            Ok(len) => format!("{} ({} elements)", self.shape.type_name(), len),
            Err(_) => format!("{} (dangling)", self.shape.type_name()),
        }
    }
}

/// Integer index from a script key, accepting integral floats
fn script_index(key: &LuaValue) -> Option<i64> {
    match key {
        LuaValue::Integer(i) => Some(*i),
        LuaValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

impl LuaUserData for ContainerProxy {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("Num", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.len(&ctx).funnel(lua)
        });

        methods.add_method("Get", |lua, this, index: i64| {
            let ctx = BridgeContext::current(lua)?;
            this.get(lua, &ctx, index).funnel(lua)
        });

        methods.add_method("Set", |lua, this, (index, value): (i64, LuaValue)| {
            let ctx = BridgeContext::current(lua)?;
            this.set(lua, &ctx, index, &value).funnel(lua)
        });

        // Arrays: Add(value) -> index; maps: Add(key, value); sets: Add(element) -> inserted
        methods.add_method("Add", |lua, this, (first, second): (LuaValue, LuaValue)| {
            let ctx = BridgeContext::current(lua)?;
            let result = match this.shape.family() {
                Family::Sequence => this
                    .push(lua, &ctx, &first)
                    .map(|i| LuaValue::Integer(i as i64)),
                Family::Map => this.put(lua, &ctx, &first, &second).map(|_| LuaValue::Nil),
                Family::Set => this
                    .insert_unique(lua, &ctx, &first)
                    .map(LuaValue::Boolean),
            };
            result.funnel(lua)
        });

        methods.add_method("Insert", |lua, this, (index, value): (i64, LuaValue)| {
            let ctx = BridgeContext::current(lua)?;
            this.insert(lua, &ctx, index, &value).funnel(lua)
        });

        // Arrays remove by index, maps by key, sets by element
        methods.add_method("Remove", |lua, this, value: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            let result = match this.shape.family() {
                Family::Sequence => {
                    let index = script_index(&value)
                        .ok_or_else(|| Error::mismatch("index", value.type_name()));
                    index
                        .and_then(|i| this.remove_at(&ctx, i))
                        .map(|_| true)
                }
                Family::Map | Family::Set => this.remove_value(lua, &ctx, &value),
            };
            result.funnel(lua)
        });

        methods.add_method("Clear", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.clear(&ctx).funnel(lua)
        });

        methods.add_method("Contains", |lua, this, value: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            this.contains(lua, &ctx, &value).funnel(lua)
        });

        // Arrays: index of a value; maps: value under a key, including keys named like methods
        methods.add_method("Find", |lua, this, value: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            let result = match this.shape.family() {
                Family::Map => this.find_key(lua, &ctx, &value),
                _ => this
                    .find_index(lua, &ctx, &value)
                    .map(|i| i.map_or(LuaValue::Nil, |i| LuaValue::Integer(i as i64))),
            };
            result.funnel(lua)
        });

        methods.add_method("Keys", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.column(lua, &ctx, true).funnel(lua)
        });

        methods.add_method("Values", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.column(lua, &ctx, false).funnel(lua)
        });

        methods.add_method("ToArray", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            let result = this.expect(Family::Set).and_then(|_| {
                let NativeValue::Set(items) = this.place.read(ctx.host())? else {
                    return Err(Error::DanglingReference(this.place.to_string()));
                };
                let table = lua.create_table_with_capacity(items.len(), 0)?;
                for (i, item) in items.into_iter().enumerate() {
                    table.raw_set(i + 1, this.shape.element().push_ret(lua, &ctx, item)?)?;
                }
                Ok(table)
            });
            result.funnel(lua)
        });

        methods.add_method("ToTable", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.to_table(lua, &ctx).funnel(lua)
        });

        methods.add_function("CopyTo", |lua, (ud, dest): (LuaAnyUserData, LuaValue)| {
            let ctx = BridgeContext::current(lua)?;
            let this = ud.borrow::<ContainerProxy>()?.clone();
            this.copy_to(lua, &ctx, LuaValue::UserData(ud), dest).funnel(lua)
        });

        methods.add_method("CopyFrom", |lua, this, source: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            this.copy_from(lua, &ctx, &source).funnel(lua)
        });

        methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            let result = match this.shape.family() {
                Family::Sequence => match script_index(&key) {
                    Some(index) => this.get(lua, &ctx, index),
                    None => Err(Error::mismatch("index", key.type_name())),
                },
                Family::Map => this.find_key(lua, &ctx, &key),
                Family::Set => this.contains(lua, &ctx, &key).map(LuaValue::Boolean),
            };
            result.funnel(lua)
        });

        methods.add_meta_method(
            LuaMetaMethod::NewIndex,
            |lua, this, (key, value): (LuaValue, LuaValue)| {
                let ctx = BridgeContext::current(lua)?;
                let result = match this.shape.family() {
                    Family::Sequence => match script_index(&key) {
                        Some(index) => this.set(lua, &ctx, index, &value),
                        None => Err(Error::mismatch("index", key.type_name())),
                    },
                    Family::Map if value.is_nil() => this.remove_value(lua, &ctx, &key).map(|_| ()),
                    Family::Map => this.put(lua, &ctx, &key, &value),
                    Family::Set => match value {
                        LuaValue::Nil | LuaValue::Boolean(false) => {
                            this.remove_value(lua, &ctx, &key).map(|_| ())
                        }
                        _ => this.insert_unique(lua, &ctx, &key).map(|_| ()),
                    },
                };
                result.funnel(lua)
            },
        );

        methods.add_meta_method(LuaMetaMethod::Len, |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.len(&ctx).funnel(lua)
        });

        // Iterates a snapshot; writes during iteration go to the container, not the snapshot
        methods.add_meta_method(LuaMetaMethod::Pairs, |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            let table = this.to_table(lua, &ctx).funnel(lua)?;
            let next: LuaFunction = lua.globals().get("next")?;
            Ok((next, table, LuaValue::Nil))
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            Ok(this.describe(&ctx))
        });
    }
}
