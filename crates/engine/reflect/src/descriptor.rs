//! Type descriptors for fields and parameters
//!
//! A [`PropertyDesc`] describes one field of a class or struct, one element of
//! a container, or one parameter of a function. Descriptors are immutable once
//! built and shared through `Rc`; consumers only ever borrow them.

use std::fmt;
use std::rc::Rc;

/// Identifier of a registered class (or interface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// Identifier of a registered struct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

/// Identifier of a registered enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub u32);

/// Width and signedness of an integer field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntKind {
    /// Size in bytes
    pub fn size(self) -> usize {
        match self {
            IntKind::I8 | IntKind::U8 => 1,
            IntKind::I16 | IntKind::U16 => 2,
            IntKind::I32 | IntKind::U32 => 4,
            IntKind::I64 | IntKind::U64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64)
    }

    /// Smallest representable value
    pub fn min(self) -> i128 {
        match self {
            IntKind::I8 => i8::MIN as i128,
            IntKind::I16 => i16::MIN as i128,
            IntKind::I32 => i32::MIN as i128,
            IntKind::I64 => i64::MIN as i128,
            _ => 0,
        }
    }

    /// Largest representable value
    pub fn max(self) -> i128 {
        match self {
            IntKind::I8 => i8::MAX as i128,
            IntKind::I16 => i16::MAX as i128,
            IntKind::I32 => i32::MAX as i128,
            IntKind::I64 => i64::MAX as i128,
            IntKind::U8 => u8::MAX as i128,
            IntKind::U16 => u16::MAX as i128,
            IntKind::U32 => u32::MAX as i128,
            IntKind::U64 => u64::MAX as i128,
        }
    }

    pub fn contains(self, value: i128) -> bool {
        value >= self.min() && value <= self.max()
    }

    pub fn name(self) -> &'static str {
        match self {
            IntKind::I8 => "int8",
            IntKind::I16 => "int16",
            IntKind::I32 => "int32",
            IntKind::I64 => "int64",
            IntKind::U8 => "uint8",
            IntKind::U16 => "uint16",
            IntKind::U32 => "uint32",
            IntKind::U64 => "uint64",
        }
    }
}

/// Role a parameter plays in a function signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    /// Passed by value, read from the caller
    In,
    /// Written by the callee only
    Out,
    /// Read from the caller and written back as a fresh value
    InOut,
    /// Passed by reference; the caller's handle is updated in place
    ByRef,
    /// The function's return value
    Return,
}

impl ParamRole {
    /// Whether the caller supplies a value for this parameter
    pub fn takes_argument(self) -> bool {
        matches!(self, ParamRole::In | ParamRole::InOut | ParamRole::ByRef)
    }

    /// Whether the value is handed back to the caller after the call
    pub fn is_output(self) -> bool {
        !matches!(self, ParamRole::In)
    }
}

/// The class of a property: what kind of value it stores
#[derive(Debug, Clone)]
pub enum PropertyClass {
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
    Enum { id: EnumId, underlying: IntKind },
    Struct(StructId),
    Array(Rc<PropertyDesc>),
    Map(Rc<PropertyDesc>, Rc<PropertyDesc>),
    Set(Rc<PropertyDesc>),
    Delegate(Rc<Signature>),
    MulticastDelegate(Rc<Signature>),
    /// A host-specific property class with no value semantics exposed
    Opaque(String),
}

impl PropertyClass {
    /// Size in bytes of one element, when it does not depend on a struct layout
    pub fn fixed_size(&self) -> Option<usize> {
        let size = match self {
            PropertyClass::Bool => 1,
            PropertyClass::Int(kind) => kind.size(),
            PropertyClass::Enum { underlying, .. } => underlying.size(),
            PropertyClass::Float => 4,
            PropertyClass::Double => 8,
            PropertyClass::Str => 16,
            PropertyClass::Name => 8,
            PropertyClass::Text => 24,
            PropertyClass::Object(_) | PropertyClass::Class(_) => 8,
            PropertyClass::WeakObject(_) => 8,
            PropertyClass::Interface(_) => 16,
            PropertyClass::Array(_) => 16,
            PropertyClass::Map(..) | PropertyClass::Set(_) => 80,
            PropertyClass::Delegate(_) => 16,
            PropertyClass::MulticastDelegate(_) => 16,
            PropertyClass::Struct(_) | PropertyClass::Opaque(_) => return None,
        };
        Some(size)
    }

    /// Structural type equality, ignoring names and offsets
    pub fn same_type(&self, other: &PropertyClass) -> bool {
        use PropertyClass as P;
        match (self, other) {
            (P::Bool, P::Bool)
            | (P::Float, P::Float)
            | (P::Double, P::Double)
            | (P::Str, P::Str)
            | (P::Name, P::Name)
            | (P::Text, P::Text) => true,
            (P::Int(a), P::Int(b)) => a == b,
            (P::Object(a), P::Object(b))
            | (P::WeakObject(a), P::WeakObject(b))
            | (P::Class(a), P::Class(b))
            | (P::Interface(a), P::Interface(b)) => a == b,
            (P::Enum { id: a, .. }, P::Enum { id: b, .. }) => a == b,
            (P::Struct(a), P::Struct(b)) => a == b,
            (P::Array(a), P::Array(b)) | (P::Set(a), P::Set(b)) => a.class.same_type(&b.class),
            (P::Map(ak, av), P::Map(bk, bv)) => {
                ak.class.same_type(&bk.class) && av.class.same_type(&bv.class)
            }
            (P::Delegate(a), P::Delegate(b))
            | (P::MulticastDelegate(a), P::MulticastDelegate(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Short type name used in diagnostics
    pub fn type_name(&self) -> String {
        match self {
            PropertyClass::Bool => "bool".into(),
            PropertyClass::Int(kind) => kind.name().into(),
            PropertyClass::Float => "float".into(),
            PropertyClass::Double => "double".into(),
            PropertyClass::Str => "FString".into(),
            PropertyClass::Name => "FName".into(),
            PropertyClass::Text => "FText".into(),
            PropertyClass::Object(id) => format!("object<{}>", id.0),
            PropertyClass::WeakObject(id) => format!("weak<{}>", id.0),
            PropertyClass::Class(id) => format!("class<{}>", id.0),
            PropertyClass::Interface(id) => format!("interface<{}>", id.0),
            PropertyClass::Enum { id, .. } => format!("enum<{}>", id.0),
            PropertyClass::Struct(id) => format!("struct<{}>", id.0),
            PropertyClass::Array(inner) => format!("TArray<{}>", inner.class.type_name()),
            PropertyClass::Map(k, v) => {
                format!("TMap<{}, {}>", k.class.type_name(), v.class.type_name())
            }
            PropertyClass::Set(inner) => format!("TSet<{}>", inner.class.type_name()),
            PropertyClass::Delegate(_) => "delegate".into(),
            PropertyClass::MulticastDelegate(_) => "multicast delegate".into(),
            PropertyClass::Opaque(name) => name.clone(),
        }
    }
}

/// Descriptor of one field, container element, or parameter
#[derive(Debug, Clone)]
pub struct PropertyDesc {
    pub name: String,
    pub class: PropertyClass,
    /// Slot of this property inside its owning record or call buffer
    pub offset: usize,
    /// Number of elements for fixed-size array fields (1 for plain fields)
    pub arity: usize,
    /// Role when this descriptor is a function parameter
    pub param: Option<ParamRole>,
}

impl PropertyDesc {
    pub fn new(name: impl Into<String>, class: PropertyClass) -> Self {
        Self {
            name: name.into(),
            class,
            offset: 0,
            arity: 1,
            param: None,
        }
    }

    /// Descriptor for an anonymous container element
    pub fn element(class: PropertyClass) -> Rc<Self> {
        Rc::new(Self::new("", class))
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = arity.max(1);
        self
    }

    pub fn with_role(mut self, role: ParamRole) -> Self {
        self.param = Some(role);
        self
    }

    pub fn is_fixed_array(&self) -> bool {
        self.arity > 1
    }
}

/// Ordered parameter list of a function or delegate
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Rc<PropertyDesc>>,
}

impl Signature {
    /// Build a signature, assigning each parameter its buffer slot
    pub fn new(params: Vec<PropertyDesc>) -> Self {
        let params = params
            .into_iter()
            .enumerate()
            .map(|(slot, param)| {
                let role = param.param.unwrap_or(ParamRole::In);
                Rc::new(param.with_offset(slot).with_role(role))
            })
            .collect();
        Self { params }
    }

    /// The return parameter, if any
    pub fn return_param(&self) -> Option<&Rc<PropertyDesc>> {
        self.params
            .iter()
            .find(|p| p.param == Some(ParamRole::Return))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .params
            .iter()
            .filter(|p| p.param != Some(ParamRole::Return))
            .map(|p| format!("{}: {}", p.name, p.class.type_name()))
            .collect();
        write!(f, "({})", args.join(", "))?;
        if let Some(ret) = self.return_param() {
            write!(f, " -> {}", ret.class.type_name())?;
        }
        Ok(())
    }
}
