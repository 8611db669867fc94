//! Script handles for native values
//!
//! - [`ObjectHandle`]: one per live object (see the identity registry), owns
//!   a [`RootGuard`] so the object stays rooted while script can reach it
//! - [`StructHandle`]: a struct at a place; field writes go through
//! - [`ClassHandle`]: a class reference
//! - [`DelegateHandle`], [`MulticastHandle`]: delegates at a place
//! - [`FieldAccessor`]: a named group of object fields installed by `bind`

use crate::codec::ValueCodec;
use crate::context::BridgeContext;
use crate::delegate::{identity_of, ScriptDelegate};
use crate::frame::CallFrame;
use crate::identity::RootGuard;
use crate::namespace;
use crate::place::Place;
use crate::report::Funnel;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{ClassId, NativeValue, ObjectId, Signature, StructId};
use std::cell::OnceCell;
use std::rc::Rc;

/// Script-side reference to a host object
pub struct ObjectHandle {
    id: ObjectId,
    class: ClassId,
    _guard: RootGuard,
}

impl ObjectHandle {
    pub fn new(id: ObjectId, class: ClassId, guard: RootGuard) -> Self {
        Self {
            id,
            class,
            _guard: guard,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    fn live(&self, ctx: &BridgeContext) -> Result<()> {
        if ctx.host().is_valid(self.id) {
            Ok(())
        } else {
            Err(Error::DanglingReference(format!("object {}", self.id)))
        }
    }

    fn get(&self, lua: &Lua, ctx: &BridgeContext, key: &str) -> Result<LuaValue> {
        self.live(ctx)?;
        if let Some(property) = ctx.host().registry().find_property(self.class, key) {
            let codec = ctx.codec(&property)?;
            return codec.push_container(lua, ctx, &Place::object(self.id));
        }
        let table = namespace::class_table(lua, ctx, self.class)?;
        match table.raw_get::<LuaValue>(key)? {
            LuaValue::Nil => Err(Error::UnknownName(format!(
                "{}.{}",
                namespace::class_name(ctx, self.class),
                key
            ))),
            found => Ok(found),
        }
    }

    fn set(&self, lua: &Lua, ctx: &BridgeContext, key: &str, value: &LuaValue) -> Result<()> {
        self.live(ctx)?;
        let property = ctx
            .host()
            .registry()
            .find_property(self.class, key)
            .ok_or_else(|| {
                Error::UnknownName(format!("{}.{}", namespace::class_name(ctx, self.class), key))
            })?;
        let codec = ctx.codec(&property)?;
        codec.pop_into(lua, ctx, value, &Place::field(self.id, property.offset))
    }
}

impl LuaUserData for ObjectHandle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("IsValid", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            Ok(ctx.host().is_valid(this.id))
        });

        methods.add_method("GetName", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            Ok(ctx.host().object_name(this.id))
        });

        methods.add_method("GetClass", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            Ok(ctx.host().class_of(this.id).map(ClassHandle::new))
        });

        methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: String| {
            let ctx = BridgeContext::current(lua)?;
            this.get(lua, &ctx, &key).funnel(lua)
        });

        methods.add_meta_method(
            LuaMetaMethod::NewIndex,
            |lua, this, (key, value): (String, LuaValue)| {
                let ctx = BridgeContext::current(lua)?;
                this.set(lua, &ctx, &key, &value).funnel(lua)
            },
        );

        methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
            Ok(other
                .borrow::<ObjectHandle>()
                .map(|other| other.id == this.id)
                .unwrap_or(false))
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            let name = ctx.host().object_name(this.id);
            Ok(match name {
                Some(name) => format!("{} ({})", name, namespace::class_name(&ctx, this.class)),
                None => format!("invalid object ({})", namespace::class_name(&ctx, this.class)),
            })
        });
    }
}

/// A struct living at a place
#[derive(Clone)]
pub struct StructHandle {
    place: Place,
    id: StructId,
}

impl StructHandle {
    pub fn new(place: Place, id: StructId) -> Self {
        Self { place, id }
    }

    pub fn struct_id(&self) -> StructId {
        self.id
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    fn field(&self, ctx: &BridgeContext, key: &str) -> Result<Rc<ValueCodec>> {
        let layout = ctx.struct_layout(self.id)?;
        layout
            .field(key)
            .cloned()
            .ok_or_else(|| Error::UnknownName(format!("{}.{}", layout.name, key)))
    }

    fn describe(&self, ctx: &BridgeContext) -> Result<String> {
        let layout = ctx.struct_layout(self.id)?;
        let value = self.place.read(ctx.host())?;
        let NativeValue::Struct(value) = value else {
            return Ok(layout.name.clone());
        };
        let fields: Vec<String> = layout
            .fields()
            .iter()
            .filter_map(|field| {
                let value = value.fields.get(field.adapter().offset())?;
                Some(format!("{}={}", field.name(), render(value)))
            })
            .collect();
        Ok(format!("{}({})", layout.name, fields.join(", ")))
    }
}

fn render(value: &NativeValue) -> String {
    if let Some(i) = value.as_int() {
        return i.to_string();
    }
    if let Some(f) = value.as_float() {
        return f.to_string();
    }
    if let Some(b) = value.as_bool() {
        return b.to_string();
    }
    if let Some(s) = value.as_str() {
        return format!("{s:?}");
    }
    value.kind_name().to_string()
}

impl LuaUserData for StructHandle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        // Detached copy owned by the script runtime
        methods.add_method("Copy", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            let value = this.place.read(ctx.host()).funnel(lua)?;
            Ok(StructHandle::new(Place::owned(value), this.id))
        });

        methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: String| {
            let ctx = BridgeContext::current(lua)?;
            this.field(&ctx, &key)
                .and_then(|field| field.push_container(lua, &ctx, &this.place))
                .funnel(lua)
        });

        methods.add_meta_method(
            LuaMetaMethod::NewIndex,
            |lua, this, (key, value): (String, LuaValue)| {
                let ctx = BridgeContext::current(lua)?;
                this.field(&ctx, &key)
                    .and_then(|field| {
                        let place = this.place.child(field.adapter().offset());
                        field.pop_into(lua, &ctx, &value, &place)
                    })
                    .funnel(lua)
            },
        );

        methods.add_meta_method(LuaMetaMethod::Eq, |lua, this, other: LuaAnyUserData| {
            let ctx = BridgeContext::current(lua)?;
            let Ok(other) = other.borrow::<StructHandle>().map(|o| o.clone()) else {
                return Ok(false);
            };
            if other.id != this.id {
                return Ok(false);
            }
            let host = ctx.host();
            let equal = this.place.read(host).and_then(|a| Ok(a == other.place.read(host)?));
            equal.funnel(lua)
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.describe(&ctx).funnel(lua)
        });
    }
}

/// A class reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassHandle(ClassId);

impl ClassHandle {
    pub fn new(id: ClassId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> ClassId {
        self.0
    }
}

impl LuaUserData for ClassHandle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("GetName", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            Ok(namespace::class_name(&ctx, this.0))
        });

        methods.add_method("IsChildOf", |lua, this, base: LuaAnyUserData| {
            let ctx = BridgeContext::current(lua)?;
            let base = base.borrow::<ClassHandle>()?.0;
            Ok(ctx.host().registry().is_a(this.0, base))
        });

        methods.add_meta_method(LuaMetaMethod::Eq, |_, this, other: LuaAnyUserData| {
            Ok(other.borrow::<ClassHandle>().map(|o| *o == *this).unwrap_or(false))
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            Ok(format!("Class'{}'", namespace::class_name(&ctx, this.0)))
        });
    }
}

/// A single-cast delegate at a place
pub struct DelegateHandle {
    place: Place,
    signature: Rc<Signature>,
    frame: OnceCell<Rc<CallFrame>>,
}

impl DelegateHandle {
    pub fn new(place: Place, signature: Rc<Signature>) -> Self {
        Self {
            place,
            signature,
            frame: OnceCell::new(),
        }
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    pub fn signature(&self) -> &Rc<Signature> {
        &self.signature
    }

    fn execute(&self, lua: &Lua, ctx: &BridgeContext, args: &[LuaValue]) -> Result<LuaMultiValue> {
        let frame = frame_for(&self.frame, ctx, "Execute", &self.signature)?;
        let NativeValue::Delegate(delegate) = self.place.read(ctx.host())? else {
            return Err(Error::DanglingReference(self.place.to_string()));
        };
        frame.call(lua, ctx, args, |host, params| delegate.execute(host, params))
    }

    fn is_bound(&self, ctx: &BridgeContext) -> Result<bool> {
        self.place.with(ctx.host(), |value| {
            matches!(value, NativeValue::Delegate(d) if d.is_bound())
        })
    }
}

fn frame_for(
    cell: &OnceCell<Rc<CallFrame>>,
    ctx: &BridgeContext,
    name: &str,
    signature: &Rc<Signature>,
) -> Result<Rc<CallFrame>> {
    if let Some(frame) = cell.get() {
        return Ok(Rc::clone(frame));
    }
    let frame = Rc::new(CallFrame::new(ctx, name, Rc::clone(signature))?);
    Ok(Rc::clone(cell.get_or_init(|| frame)))
}

impl LuaUserData for DelegateHandle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("Bind", |lua, this, function: LuaValue| {
            let ctx = BridgeContext::current(lua)?;
            let value = crate::delegate::decode_delegate(lua, &ctx, &this.signature, &function);
            value
                .and_then(|value| this.place.write(ctx.host(), value))
                .funnel(lua)
        });

        methods.add_method("Unbind", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.place
                .with_mut(ctx.host(), |value| {
                    if let NativeValue::Delegate(d) = value {
                        d.unbind();
                    }
                })
                .funnel(lua)
        });

        methods.add_method("IsBound", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.is_bound(&ctx).funnel(lua)
        });

        methods.add_method("Execute", |lua, this, args: LuaMultiValue| {
            let ctx = BridgeContext::current(lua)?;
            let args = args.into_vec();
            this.execute(lua, &ctx, &args).funnel(lua)
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            Ok(format!("delegate{}", this.signature))
        });
    }
}

/// A multicast delegate at a place; script can add and remove its own
/// functions and broadcast, but never assign the whole list
pub struct MulticastHandle {
    place: Place,
    signature: Rc<Signature>,
    frame: OnceCell<Rc<CallFrame>>,
}

impl MulticastHandle {
    pub fn new(place: Place, signature: Rc<Signature>) -> Self {
        Self {
            place,
            signature,
            frame: OnceCell::new(),
        }
    }

    fn edit<R>(&self, ctx: &BridgeContext, f: impl FnOnce(&mut reflect::MulticastValue) -> R) -> Result<R> {
        let result = self.place.with_mut(ctx.host(), |value| match value {
            NativeValue::Multicast(m) => Some(f(m)),
            _ => None,
        })?;
        result.ok_or_else(|| Error::DanglingReference(self.place.to_string()))
    }

    fn broadcast(&self, lua: &Lua, ctx: &BridgeContext, args: &[LuaValue]) -> Result<LuaMultiValue> {
        let frame = frame_for(&self.frame, ctx, "Broadcast", &self.signature)?;
        let NativeValue::Multicast(multicast) = self.place.read(ctx.host())? else {
            return Err(Error::DanglingReference(self.place.to_string()));
        };
        frame.call(lua, ctx, args, |host, params| multicast.broadcast(host, params))
    }
}

impl LuaUserData for MulticastHandle {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("Add", |lua, this, function: LuaFunction| {
            let ctx = BridgeContext::current(lua)?;
            let target = ScriptDelegate::new(lua, Rc::clone(&this.signature), &function);
            target
                .and_then(|target| this.edit(&ctx, |m| m.add(Rc::new(target))))
                .funnel(lua)
        });

        methods.add_method("Remove", |lua, this, function: LuaFunction| {
            let ctx = BridgeContext::current(lua)?;
            let identity = identity_of(&function);
            this.edit(&ctx, |m| m.remove(identity)).funnel(lua)
        });

        methods.add_method("Clear", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.edit(&ctx, |m| m.clear()).funnel(lua)
        });

        methods.add_method("IsBound", |lua, this, ()| {
            let ctx = BridgeContext::current(lua)?;
            this.edit(&ctx, |m| m.is_bound()).funnel(lua)
        });

        methods.add_method("Broadcast", |lua, this, args: LuaMultiValue| {
            let ctx = BridgeContext::current(lua)?;
            let args = args.into_vec();
            this.broadcast(lua, &ctx, &args).funnel(lua)
        });

        methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
            Ok(format!("multicast delegate{}", this.signature))
        });
    }
}

/// Named group of fields of one object, installed by `bind`
pub struct FieldAccessor {
    owner: ObjectId,
    fields: Vec<Rc<ValueCodec>>,
}

impl FieldAccessor {
    pub fn new(owner: ObjectId, fields: Vec<Rc<ValueCodec>>) -> Self {
        Self { owner, fields }
    }

    fn field(&self, key: &str) -> Result<&Rc<ValueCodec>> {
        self.fields
            .iter()
            .find(|f| f.name() == key)
            .ok_or_else(|| Error::UnknownName(key.to_string()))
    }
}

impl LuaUserData for FieldAccessor {
    fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(LuaMetaMethod::Index, |lua, this, key: String| {
            let ctx = BridgeContext::current(lua)?;
            this.field(&key)
                .and_then(|field| field.push_container(lua, &ctx, &Place::object(this.owner)))
                .funnel(lua)
        });

        methods.add_meta_method(
            LuaMetaMethod::NewIndex,
            |lua, this, (key, value): (String, LuaValue)| {
                let ctx = BridgeContext::current(lua)?;
                this.field(&key)
                    .and_then(|field| {
                        let place = Place::field(this.owner, field.adapter().offset());
                        field.pop_into(lua, &ctx, &value, &place)
                    })
                    .funnel(lua)
            },
        );
    }
}
