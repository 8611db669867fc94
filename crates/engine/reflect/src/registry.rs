//! Type registry: classes, structs, enums and functions

use crate::descriptor::{
    ClassId, EnumId, IntKind, ParamRole, PropertyClass, PropertyDesc, Signature, StructId,
};
use crate::host::NativeCall;
use crate::value::{NativeValue, StructValue};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Native implementation of a function
pub type NativeFn = Rc<dyn Fn(&mut NativeCall<'_>) -> Result<()>>;

/// Call behaviour of a function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// No target object
    pub is_static: bool,
    /// Subclasses may override it, so calls go through dynamic dispatch
    pub overridable: bool,
}

/// Descriptor of an invokable function
pub struct FunctionDesc {
    pub name: String,
    pub owner: Option<ClassId>,
    pub signature: Rc<Signature>,
    pub flags: FunctionFlags,
    pub native: Option<NativeFn>,
}

impl FunctionDesc {
    /// Functions with a native body and no overrides can be called directly
    pub fn is_fast_path(&self) -> bool {
        self.native.is_some() && !self.flags.overridable
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static
    }
}

impl fmt::Debug for FunctionDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDesc")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("signature", &self.signature.to_string())
            .field("flags", &self.flags)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// Builder for [`FunctionDesc`]
pub struct FunctionBuilder {
    name: String,
    params: Vec<PropertyDesc>,
    flags: FunctionFlags,
    native: Option<NativeFn>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            flags: FunctionFlags::default(),
            native: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, class: PropertyClass, role: ParamRole) -> Self {
        self.params.push(PropertyDesc::new(name, class).with_role(role));
        self
    }

    pub fn arg(self, name: impl Into<String>, class: PropertyClass) -> Self {
        self.param(name, class, ParamRole::In)
    }

    pub fn returns(self, class: PropertyClass) -> Self {
        self.param("ReturnValue", class, ParamRole::Return)
    }

    pub fn is_static(mut self) -> Self {
        self.flags.is_static = true;
        self
    }

    pub fn overridable(mut self) -> Self {
        self.flags.overridable = true;
        self
    }

    pub fn native<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut NativeCall<'_>) -> Result<()> + 'static,
    {
        self.native = Some(Rc::new(body));
        self
    }

    /// Build a free-standing function (no owning class)
    pub fn build(self) -> Rc<FunctionDesc> {
        Rc::new(self.build_for(None))
    }

    fn build_for(self, owner: Option<ClassId>) -> FunctionDesc {
        FunctionDesc {
            name: self.name,
            owner,
            signature: Rc::new(Signature::new(self.params)),
            flags: self.flags,
            native: self.native,
        }
    }
}

/// Descriptor of a class or interface
#[derive(Debug)]
pub struct ClassDesc {
    pub id: ClassId,
    pub name: String,
    pub parent: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
    /// All properties including inherited ones; offsets index object fields
    pub properties: Vec<Rc<PropertyDesc>>,
    /// Functions declared by this class only
    pub functions: Vec<Rc<FunctionDesc>>,
}

/// Builder for [`ClassDesc`]
pub struct ClassBuilder {
    name: String,
    parent: Option<ClassId>,
    interfaces: Vec<ClassId>,
    is_interface: bool,
    properties: Vec<PropertyDesc>,
    functions: Vec<FunctionBuilder>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            is_interface: false,
            properties: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn implements(mut self, interface: ClassId) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn interface(mut self) -> Self {
        self.is_interface = true;
        self
    }

    pub fn property(mut self, name: impl Into<String>, class: PropertyClass) -> Self {
        self.properties.push(PropertyDesc::new(name, class));
        self
    }

    /// A fixed-size array field (`T Name[arity]`)
    pub fn fixed_array(
        mut self,
        name: impl Into<String>,
        class: PropertyClass,
        arity: usize,
    ) -> Self {
        self.properties
            .push(PropertyDesc::new(name, class).with_arity(arity));
        self
    }

    pub fn function(mut self, function: FunctionBuilder) -> Self {
        self.functions.push(function);
        self
    }
}

/// Descriptor of a struct
#[derive(Debug)]
pub struct StructDesc {
    pub id: StructId,
    pub name: String,
    pub properties: Vec<Rc<PropertyDesc>>,
    pub size: usize,
}

/// Descriptor of an enum
#[derive(Debug)]
pub struct EnumDesc {
    pub id: EnumId,
    pub name: String,
    pub underlying: IntKind,
    pub entries: Vec<(String, i64)>,
}

impl EnumDesc {
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| *value)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

/// Registry of every reflected type
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: Vec<ClassDesc>,
    structs: Vec<StructDesc>,
    enums: Vec<EnumDesc>,
    names: HashMap<String, TypeRef>,
}

/// What a registered name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Class(ClassId),
    Struct(StructId),
    Enum(EnumId),
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_name(&mut self, name: &str, ty: TypeRef) -> Result<()> {
        if self.names.contains_key(name) {
            return Err(Error::DuplicateType(name.to_string()));
        }
        self.names.insert(name.to_string(), ty);
        Ok(())
    }

    /// Register a struct; fields are laid out in declaration order
    pub fn add_struct(
        &mut self,
        name: impl Into<String>,
        fields: Vec<(&str, PropertyClass)>,
    ) -> Result<StructId> {
        let name = name.into();
        let id = StructId(self.structs.len() as u32);
        self.claim_name(&name, TypeRef::Struct(id))?;

        let mut size = 0;
        let properties: Vec<Rc<PropertyDesc>> = fields
            .into_iter()
            .enumerate()
            .map(|(slot, (field, class))| {
                size += self.class_size(&class);
                Rc::new(PropertyDesc::new(field, class).with_offset(slot))
            })
            .collect();

        self.structs.push(StructDesc {
            id,
            name,
            properties,
            size,
        });
        Ok(id)
    }

    /// Register an enum backed by the given integer kind
    pub fn add_enum(
        &mut self,
        name: impl Into<String>,
        underlying: IntKind,
        entries: Vec<(&str, i64)>,
    ) -> Result<EnumId> {
        let name = name.into();
        let id = EnumId(self.enums.len() as u32);
        self.claim_name(&name, TypeRef::Enum(id))?;
        self.enums.push(EnumDesc {
            id,
            name,
            underlying,
            entries: entries
                .into_iter()
                .map(|(entry, value)| (entry.to_string(), value))
                .collect(),
        });
        Ok(id)
    }

    /// Register a class; inherited properties keep their parent offsets
    pub fn add_class(&mut self, builder: ClassBuilder) -> Result<ClassId> {
        let id = ClassId(self.classes.len() as u32);
        if let Some(parent) = builder.parent {
            self.class(parent)?;
        }
        self.claim_name(&builder.name, TypeRef::Class(id))?;

        let mut properties = match builder.parent {
            Some(parent) => self.class(parent)?.properties.clone(),
            None => Vec::new(),
        };
        for property in builder.properties {
            let slot = properties.len();
            properties.push(Rc::new(property.with_offset(slot)));
        }

        let functions = builder
            .functions
            .into_iter()
            .map(|f| Rc::new(f.build_for(Some(id))))
            .collect();

        self.classes.push(ClassDesc {
            id,
            name: builder.name,
            parent: builder.parent,
            interfaces: builder.interfaces,
            is_interface: builder.is_interface,
            properties,
            functions,
        });
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.names.get(name).copied()
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        match self.lookup(name)? {
            TypeRef::Class(id) => Some(id),
            _ => None,
        }
    }

    pub fn find_struct(&self, name: &str) -> Option<StructId> {
        match self.lookup(name)? {
            TypeRef::Struct(id) => Some(id),
            _ => None,
        }
    }

    pub fn find_enum(&self, name: &str) -> Option<EnumId> {
        match self.lookup(name)? {
            TypeRef::Enum(id) => Some(id),
            _ => None,
        }
    }

    pub fn class(&self, id: ClassId) -> Result<&ClassDesc> {
        self.classes
            .get(id.0 as usize)
            .ok_or_else(|| Error::UnknownType(format!("class #{}", id.0)))
    }

    pub fn struct_desc(&self, id: StructId) -> Result<&StructDesc> {
        self.structs
            .get(id.0 as usize)
            .ok_or_else(|| Error::UnknownType(format!("struct #{}", id.0)))
    }

    pub fn enum_desc(&self, id: EnumId) -> Result<&EnumDesc> {
        self.enums
            .get(id.0 as usize)
            .ok_or_else(|| Error::UnknownType(format!("enum #{}", id.0)))
    }

    /// Whether `class` is `base` or derives from it (or implements it, for interfaces)
    pub fn is_a(&self, class: ClassId, base: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            let Ok(desc) = self.class(id) else {
                return false;
            };
            if desc.interfaces.contains(&base) {
                return true;
            }
            current = desc.parent;
        }
        false
    }

    pub fn find_property(&self, class: ClassId, name: &str) -> Option<Rc<PropertyDesc>> {
        self.class(class)
            .ok()?
            .properties
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Same-named functions declared by the nearest class in the chain,
    /// in registration order
    pub fn find_functions(&self, class: ClassId, name: &str) -> Vec<Rc<FunctionDesc>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let Ok(desc) = self.class(id) else {
                break;
            };
            let found: Vec<_> = desc
                .functions
                .iter()
                .filter(|f| f.name == name)
                .cloned()
                .collect();
            if !found.is_empty() {
                return found;
            }
            current = desc.parent;
        }
        Vec::new()
    }

    /// Most-derived implementation of `function` for an instance of `class`
    pub fn resolve_override(&self, class: ClassId, function: &FunctionDesc) -> Option<Rc<FunctionDesc>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let desc = self.class(id).ok()?;
            let found = desc.functions.iter().find(|f| {
                f.name == function.name
                    && f.signature.len() == function.signature.len()
                    && f.native.is_some()
            });
            if let Some(found) = found {
                return Some(Rc::clone(found));
            }
            current = desc.parent;
        }
        None
    }

    /// Every function name reachable from `class`, most-derived first
    pub fn function_names(&self, class: ClassId) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let Ok(desc) = self.class(id) else {
                break;
            };
            for function in &desc.functions {
                if !names.contains(&function.name) {
                    names.push(function.name.clone());
                }
            }
            current = desc.parent;
        }
        names
    }

    /// Size in bytes of one value of the given class
    pub fn class_size(&self, class: &PropertyClass) -> usize {
        match class {
            PropertyClass::Struct(id) => self.struct_desc(*id).map(|s| s.size).unwrap_or(0),
            other => other.fixed_size().unwrap_or(0),
        }
    }

    /// Default-constructed value for a descriptor (fixed arrays included)
    pub fn default_value(&self, desc: &PropertyDesc) -> NativeValue {
        if desc.is_fixed_array() {
            return NativeValue::Array(
                (0..desc.arity)
                    .map(|_| self.default_of(&desc.class))
                    .collect(),
            );
        }
        self.default_of(&desc.class)
    }

    /// Default-constructed value of a property class
    pub fn default_of(&self, class: &PropertyClass) -> NativeValue {
        match class {
            PropertyClass::Bool => NativeValue::Bool(false),
            PropertyClass::Int(kind) => NativeValue::zero(*kind),
            PropertyClass::Enum { underlying, .. } => NativeValue::zero(*underlying),
            PropertyClass::Float => NativeValue::F32(0.0),
            PropertyClass::Double => NativeValue::F64(0.0),
            PropertyClass::Str => NativeValue::Str(String::new()),
            PropertyClass::Name => NativeValue::Name(Default::default()),
            PropertyClass::Text => NativeValue::Text(String::new()),
            PropertyClass::Object(_) => NativeValue::Object(None),
            PropertyClass::WeakObject(_) => NativeValue::WeakObject(None),
            PropertyClass::Class(_) => NativeValue::Class(None),
            PropertyClass::Interface(_) => NativeValue::Interface(None),
            PropertyClass::Struct(id) => match self.struct_desc(*id) {
                Ok(desc) => NativeValue::Struct(StructValue {
                    id: *id,
                    fields: desc
                        .properties
                        .iter()
                        .map(|p| self.default_value(p))
                        .collect(),
                }),
                Err(_) => NativeValue::Empty,
            },
            PropertyClass::Array(_) => NativeValue::Array(Vec::new()),
            PropertyClass::Map(..) => NativeValue::Map(Vec::new()),
            PropertyClass::Set(_) => NativeValue::Set(Vec::new()),
            PropertyClass::Delegate(_) => NativeValue::Delegate(Default::default()),
            PropertyClass::MulticastDelegate(_) => NativeValue::Multicast(Default::default()),
            PropertyClass::Opaque(_) => NativeValue::Empty,
        }
    }
}
