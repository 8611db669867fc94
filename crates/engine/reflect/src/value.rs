//! Native storage for reflected values

use crate::delegate::{DelegateValue, MulticastValue};
use crate::descriptor::{ClassId, IntKind, StructId};
use crate::object::ObjectId;
use std::fmt;

/// An interned-style identifier; compares case-insensitively
#[derive(Debug, Clone, Default, Eq)]
pub struct Name(String);

impl Name {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty() || self.0.eq_ignore_ascii_case("None")
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A struct instance: its type and its fields in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub id: StructId,
    pub fields: Vec<NativeValue>,
}

/// A value living in native storage (object fields, struct fields,
/// container elements, or call buffer slots)
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NativeValue {
    /// Unconstructed slot
    #[default]
    Empty,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Name(Name),
    Text(String),
    Object(Option<ObjectId>),
    WeakObject(Option<ObjectId>),
    Class(Option<ClassId>),
    Interface(Option<ObjectId>),
    Struct(StructValue),
    Array(Vec<NativeValue>),
    Map(Vec<(NativeValue, NativeValue)>),
    Set(Vec<NativeValue>),
    Delegate(DelegateValue),
    Multicast(MulticastValue),
}

impl NativeValue {
    /// Build an integer of the given kind, or `None` when out of range
    pub fn from_int(kind: IntKind, value: i128) -> Option<Self> {
        if !kind.contains(value) {
            return None;
        }
        let value = match kind {
            IntKind::I8 => NativeValue::I8(value as i8),
            IntKind::I16 => NativeValue::I16(value as i16),
            IntKind::I32 => NativeValue::I32(value as i32),
            IntKind::I64 => NativeValue::I64(value as i64),
            IntKind::U8 => NativeValue::U8(value as u8),
            IntKind::U16 => NativeValue::U16(value as u16),
            IntKind::U32 => NativeValue::U32(value as u32),
            IntKind::U64 => NativeValue::U64(value as u64),
        };
        Some(value)
    }

    /// Build an integer of the given kind, wrapping out-of-range values
    pub fn from_int_wrapping(kind: IntKind, value: i64) -> Self {
        match kind {
            IntKind::I8 => NativeValue::I8(value as i8),
            IntKind::I16 => NativeValue::I16(value as i16),
            IntKind::I32 => NativeValue::I32(value as i32),
            IntKind::I64 => NativeValue::I64(value),
            IntKind::U8 => NativeValue::U8(value as u8),
            IntKind::U16 => NativeValue::U16(value as u16),
            IntKind::U32 => NativeValue::U32(value as u32),
            IntKind::U64 => NativeValue::U64(value as u64),
        }
    }

    /// Zero of the given integer kind
    pub fn zero(kind: IntKind) -> Self {
        Self::from_int_wrapping(kind, 0)
    }

    pub fn as_int(&self) -> Option<i128> {
        match *self {
            NativeValue::I8(v) => Some(v as i128),
            NativeValue::I16(v) => Some(v as i128),
            NativeValue::I32(v) => Some(v as i128),
            NativeValue::I64(v) => Some(v as i128),
            NativeValue::U8(v) => Some(v as i128),
            NativeValue::U16(v) => Some(v as i128),
            NativeValue::U32(v) => Some(v as i128),
            NativeValue::U64(v) => Some(v as i128),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            NativeValue::F32(v) => Some(v as f64),
            NativeValue::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            NativeValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Str(s) | NativeValue::Text(s) => Some(s),
            NativeValue::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    /// The referenced object for object, weak object and interface values
    pub fn as_object(&self) -> Option<ObjectId> {
        match *self {
            NativeValue::Object(id) | NativeValue::WeakObject(id) | NativeValue::Interface(id) => {
                id
            }
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            NativeValue::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[NativeValue]> {
        match self {
            NativeValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            NativeValue::Empty => "empty",
            NativeValue::Bool(_) => "bool",
            NativeValue::I8(_) => "int8",
            NativeValue::I16(_) => "int16",
            NativeValue::I32(_) => "int32",
            NativeValue::I64(_) => "int64",
            NativeValue::U8(_) => "uint8",
            NativeValue::U16(_) => "uint16",
            NativeValue::U32(_) => "uint32",
            NativeValue::U64(_) => "uint64",
            NativeValue::F32(_) => "float",
            NativeValue::F64(_) => "double",
            NativeValue::Str(_) => "FString",
            NativeValue::Name(_) => "FName",
            NativeValue::Text(_) => "FText",
            NativeValue::Object(_) => "object",
            NativeValue::WeakObject(_) => "weak object",
            NativeValue::Class(_) => "class",
            NativeValue::Interface(_) => "interface",
            NativeValue::Struct(_) => "struct",
            NativeValue::Array(_) => "array",
            NativeValue::Map(_) => "map",
            NativeValue::Set(_) => "set",
            NativeValue::Delegate(_) => "delegate",
            NativeValue::Multicast(_) => "multicast delegate",
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<i32> for NativeValue {
    fn from(i: i32) -> Self {
        NativeValue::I32(i)
    }
}

impl From<i64> for NativeValue {
    fn from(i: i64) -> Self {
        NativeValue::I64(i)
    }
}

impl From<f32> for NativeValue {
    fn from(f: f32) -> Self {
        NativeValue::F32(f)
    }
}

impl From<f64> for NativeValue {
    fn from(f: f64) -> Self {
        NativeValue::F64(f)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::Str(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_construction() {
        assert_eq!(NativeValue::from_int(IntKind::U8, 255), Some(NativeValue::U8(255)));
        assert_eq!(NativeValue::from_int(IntKind::U8, 256), None);
        assert_eq!(NativeValue::from_int_wrapping(IntKind::U8, 257), NativeValue::U8(1));
        assert_eq!(NativeValue::I16(-4).as_int(), Some(-4));
    }

    #[test]
    fn test_names_ignore_case() {
        assert_eq!(Name::new("Player"), Name::new("player"));
        assert!(Name::new("None").is_none());
        assert!(!Name::new("Hero").is_none());
    }
}
