//! Type descriptor adapter
//!
//! Answers "what kind, what size, what nested descriptors" for one
//! [`PropertyDesc`] without ever touching instance data. Enum-backed
//! descriptors forward to their underlying integer kind, and host-specific
//! `Opaque` classes are rejected here so the failure stays local to the
//! binding that asked for them.

use crate::{Error, Result};
use reflect::{
    ClassId, IntKind, PropertyClass, PropertyDesc, Signature, StructId, TypeRef, TypeRegistry,
};
use std::rc::Rc;

/// The wire kind of a descriptor, as the codecs see it
#[derive(Debug, Clone)]
pub enum ValueKind {
    Bool,
    Int(IntKind),
    Float,
    Double,
    Str,
    Name,
    Text,
    Object(ClassId),
    WeakObject(ClassId),
    Class(ClassId),
    Interface(ClassId),
    Struct(StructId),
    Array(Rc<PropertyDesc>),
    Map(Rc<PropertyDesc>, Rc<PropertyDesc>),
    Set(Rc<PropertyDesc>),
    Delegate(Rc<Signature>),
    Multicast(Rc<Signature>),
}

/// Capability view over one borrowed descriptor
#[derive(Debug, Clone)]
pub struct TypeAdapter {
    desc: Rc<PropertyDesc>,
    kind: ValueKind,
    size: usize,
}

impl TypeAdapter {
    pub fn new(registry: &TypeRegistry, desc: Rc<PropertyDesc>) -> Result<Self> {
        let kind = match &desc.class {
            PropertyClass::Bool => ValueKind::Bool,
            PropertyClass::Int(kind) => ValueKind::Int(*kind),
            PropertyClass::Enum { underlying, .. } => ValueKind::Int(*underlying),
            PropertyClass::Float => ValueKind::Float,
            PropertyClass::Double => ValueKind::Double,
            PropertyClass::Str => ValueKind::Str,
            PropertyClass::Name => ValueKind::Name,
            PropertyClass::Text => ValueKind::Text,
            PropertyClass::Object(id) => ValueKind::Object(*id),
            PropertyClass::WeakObject(id) => ValueKind::WeakObject(*id),
            PropertyClass::Class(id) => ValueKind::Class(*id),
            PropertyClass::Interface(id) => ValueKind::Interface(*id),
            PropertyClass::Struct(id) => {
                registry.struct_desc(*id)?;
                ValueKind::Struct(*id)
            }
            PropertyClass::Array(inner) => ValueKind::Array(Rc::clone(inner)),
            PropertyClass::Map(key, value) => ValueKind::Map(Rc::clone(key), Rc::clone(value)),
            PropertyClass::Set(inner) => ValueKind::Set(Rc::clone(inner)),
            PropertyClass::Delegate(sig) => ValueKind::Delegate(Rc::clone(sig)),
            PropertyClass::MulticastDelegate(sig) => ValueKind::Multicast(Rc::clone(sig)),
            PropertyClass::Opaque(class) => {
                return Err(Error::UnsupportedDescriptor {
                    name: desc.name.clone(),
                    class: class.clone(),
                })
            }
        };
        let size = registry.class_size(&desc.class) * desc.arity;
        Ok(Self { desc, kind, size })
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn desc(&self) -> &Rc<PropertyDesc> {
        &self.desc
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// Size in bytes of the whole field (all elements for fixed arrays)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slot of the field inside its owning record
    pub fn offset(&self) -> usize {
        self.desc.offset
    }

    pub fn arity(&self) -> usize {
        self.desc.arity
    }

    pub fn is_fixed_array(&self) -> bool {
        self.desc.is_fixed_array()
    }

    /// Element descriptors of a container (element, or key and value)
    pub fn nested(&self) -> Vec<Rc<PropertyDesc>> {
        match &self.kind {
            ValueKind::Array(inner) | ValueKind::Set(inner) => vec![Rc::clone(inner)],
            ValueKind::Map(key, value) => vec![Rc::clone(key), Rc::clone(value)],
            _ => Vec::new(),
        }
    }

    pub fn type_name(&self) -> String {
        self.desc.class.type_name()
    }
}

/// Resolve a script-facing type name (`"int32"`, `"FString"`, `"FVector"`, ...)
/// to a property class, for containers created from script
pub fn parse_type_name(registry: &TypeRegistry, name: &str) -> Result<PropertyClass> {
    let class = match name {
        "bool" => PropertyClass::Bool,
        "int8" => PropertyClass::Int(IntKind::I8),
        "int16" => PropertyClass::Int(IntKind::I16),
        "int" | "int32" => PropertyClass::Int(IntKind::I32),
        "int64" => PropertyClass::Int(IntKind::I64),
        "uint8" | "byte" => PropertyClass::Int(IntKind::U8),
        "uint16" => PropertyClass::Int(IntKind::U16),
        "uint32" => PropertyClass::Int(IntKind::U32),
        "uint64" => PropertyClass::Int(IntKind::U64),
        "float" => PropertyClass::Float,
        "double" | "number" => PropertyClass::Double,
        "string" | "FString" => PropertyClass::Str,
        "FName" => PropertyClass::Name,
        "FText" => PropertyClass::Text,
        other => match registry.lookup(other) {
            Some(TypeRef::Struct(id)) => PropertyClass::Struct(id),
            Some(TypeRef::Class(id)) => PropertyClass::Object(id),
            Some(TypeRef::Enum(id)) => PropertyClass::Enum {
                id,
                underlying: registry.enum_desc(id)?.underlying,
            },
            None => return Err(Error::UnknownName(other.to_string())),
        },
    };
    Ok(class)
}
