//! Struct layouts and struct decoding

use super::ValueCodec;
use crate::context::BridgeContext;
use crate::handle::StructHandle;
use crate::{Error, Result};
use mlua::prelude::*;
use reflect::{NativeValue, PropertyClass, StructId};
use std::rc::Rc;

/// Field codecs of one struct, in declaration order
#[derive(Debug)]
pub struct StructLayout {
    pub id: StructId,
    pub name: String,
    fields: Vec<Rc<ValueCodec>>,
}

impl StructLayout {
    pub(crate) fn new(ctx: &BridgeContext, id: StructId) -> Result<Self> {
        let desc = ctx.host().registry().struct_desc(id)?;
        let mut fields = Vec::with_capacity(desc.properties.len());
        for property in &desc.properties {
            match ctx.codec(property) {
                Ok(codec) => fields.push(codec),
                // Only this field is unusable; the rest of the struct still marshals
                Err(e) => tracing::warn!("{}.{} is not exposed: {}", desc.name, property.name, e),
            }
        }
        Ok(Self {
            id,
            name: desc.name.clone(),
            fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Rc<ValueCodec>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn fields(&self) -> &[Rc<ValueCodec>] {
        &self.fields
    }
}

/// Struct handle of the same type (copied) or a table of fields.
///
/// Tables may name fields (`{X = 1}`) or list them positionally (`{1, 2, 3}`);
/// missing fields are default-constructed.
pub(crate) fn decode_struct(
    lua: &Lua,
    ctx: &BridgeContext,
    id: StructId,
    value: &LuaValue,
) -> Result<NativeValue> {
    let layout = ctx.struct_layout(id)?;
    match value {
        LuaValue::UserData(ud) => {
            let handle = ud
                .borrow::<StructHandle>()
                .map_err(|_| Error::mismatch(layout.name.as_str(), "userdata"))?;
            if handle.struct_id() != id {
                let actual = ctx.struct_layout(handle.struct_id())?;
                return Err(Error::mismatch(layout.name.as_str(), actual.name.as_str()));
            }
            handle.place().read(ctx.host())
        }
        LuaValue::Table(table) => {
            let mut value = ctx.host().registry().default_of(&PropertyClass::Struct(id));
            let mut decoded = Vec::new();
            for field in layout.fields() {
                let offset = field.adapter().offset();
                let mut entry: LuaValue = table.raw_get(field.name())?;
                if entry.is_nil() {
                    entry = table.raw_get(offset as i64 + 1)?;
                }
                if entry.is_nil() {
                    continue;
                }
                let native = field.pop(lua, ctx, &entry).map_err(|e| {
                    Error::mismatch(
                        format!("{}.{}", layout.name, field.name()),
                        e.to_string(),
                    )
                })?;
                decoded.push((offset, native));
            }
            if let NativeValue::Struct(s) = &mut value {
                for (offset, native) in decoded {
                    if let Some(slot) = s.fields.get_mut(offset) {
                        *slot = native;
                    }
                }
            }
            Ok(value)
        }
        other => Err(Error::mismatch(layout.name.as_str(), other.type_name())),
    }
}
