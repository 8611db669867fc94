//! The reflection host: type registry, live objects, GC roots and invocation
//!
//! Every accessor borrows the object store only for the duration of the call,
//! so native functions are free to call back into script code (which in turn
//! reads and writes objects) while they run.

use crate::descriptor::ClassId;
use crate::object::{ObjectData, ObjectId, ObjectStore, RootSet};
use crate::registry::{FunctionDesc, TypeRegistry};
use crate::value::NativeValue;
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// Arguments of one native invocation
pub struct NativeCall<'a> {
    pub host: &'a Host,
    pub target: Option<ObjectId>,
    pub params: &'a mut [NativeValue],
}

impl<'a> NativeCall<'a> {
    /// The target object of a member call
    pub fn target(&self) -> Result<ObjectId> {
        self.target.ok_or(Error::MissingTarget)
    }

    pub fn param(&self, slot: usize) -> Result<&NativeValue> {
        self.params.get(slot).ok_or(Error::ParamOutOfRange(slot))
    }

    pub fn set(&mut self, slot: usize, value: NativeValue) -> Result<()> {
        let param = self
            .params
            .get_mut(slot)
            .ok_or(Error::ParamOutOfRange(slot))?;
        *param = value;
        Ok(())
    }

    pub fn int(&self, slot: usize) -> Result<i64> {
        self.param(slot)?
            .as_int()
            .map(|v| v as i64)
            .ok_or_else(|| self.mismatch(slot, "integer"))
    }

    pub fn float(&self, slot: usize) -> Result<f64> {
        self.param(slot)?
            .as_float()
            .ok_or_else(|| self.mismatch(slot, "float"))
    }

    pub fn bool(&self, slot: usize) -> Result<bool> {
        self.param(slot)?
            .as_bool()
            .ok_or_else(|| self.mismatch(slot, "bool"))
    }

    pub fn str(&self, slot: usize) -> Result<&str> {
        self.param(slot)?
            .as_str()
            .ok_or_else(|| self.mismatch(slot, "string"))
    }

    fn mismatch(&self, slot: usize, expected: &str) -> Error {
        let actual = self
            .params
            .get(slot)
            .map(NativeValue::kind_name)
            .unwrap_or("nothing");
        Error::Native(format!(
            "parameter {slot}: expected {expected}, got {actual}"
        ))
    }
}

/// The native side of the bridge
#[derive(Debug)]
pub struct Host {
    registry: TypeRegistry,
    objects: RefCell<ObjectStore>,
    roots: RefCell<RootSet>,
    invocations: Cell<u64>,
}

impl Host {
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            objects: RefCell::new(ObjectStore::new()),
            roots: RefCell::new(RootSet::default()),
            invocations: Cell::new(0),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Create a permanent object with default-constructed fields
    pub fn spawn(&self, class: ClassId, name: impl Into<String>) -> Result<ObjectId> {
        self.create(class, name.into(), false)
    }

    /// Create an object that garbage collection reclaims once unreachable
    pub fn spawn_transient(&self, class: ClassId, name: impl Into<String>) -> Result<ObjectId> {
        self.create(class, name.into(), true)
    }

    fn create(&self, class: ClassId, name: String, transient: bool) -> Result<ObjectId> {
        let desc = self.registry.class(class)?;
        if desc.is_interface {
            return Err(Error::AbstractClass(desc.name.clone()));
        }
        let fields = desc
            .properties
            .iter()
            .map(|p| self.registry.default_value(p))
            .collect();
        let id = self.objects.borrow_mut().insert(ObjectData {
            class,
            name,
            fields,
            transient,
        });
        tracing::trace!("spawned {} of class {}", id, desc.name);
        Ok(id)
    }

    /// Destroy an object immediately, regardless of roots
    pub fn destroy(&self, id: ObjectId) -> bool {
        let removed = self.objects.borrow_mut().remove(id).is_some();
        if removed {
            let mut roots = self.roots.borrow_mut();
            while roots.remove(id) > 0 {}
        }
        removed
    }

    /// Whether the object is still alive
    pub fn is_valid(&self, id: ObjectId) -> bool {
        self.objects.borrow().contains(id)
    }

    pub fn class_of(&self, id: ObjectId) -> Option<ClassId> {
        self.objects.borrow().get(id).map(|o| o.class)
    }

    pub fn object_name(&self, id: ObjectId) -> Option<String> {
        self.objects.borrow().get(id).map(|o| o.name.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Run `f` with shared access to an object's data
    pub fn with_object<R>(&self, id: ObjectId, f: impl FnOnce(&ObjectData) -> R) -> Result<R> {
        let objects = self.objects.borrow();
        let data = objects.get(id).ok_or(Error::InvalidObject(id))?;
        Ok(f(data))
    }

    /// Run `f` with exclusive access to an object's data.
    ///
    /// `f` must not call back into the host.
    pub fn with_object_mut<R>(
        &self,
        id: ObjectId,
        f: impl FnOnce(&mut ObjectData) -> R,
    ) -> Result<R> {
        let mut objects = self.objects.borrow_mut();
        let data = objects.get_mut(id).ok_or(Error::InvalidObject(id))?;
        Ok(f(data))
    }

    /// Copy of one field
    pub fn read_field(&self, id: ObjectId, offset: usize) -> Result<NativeValue> {
        self.with_object(id, |o| o.fields.get(offset).cloned())?
            .ok_or(Error::FieldOutOfRange { object: id, offset })
    }

    pub fn write_field(&self, id: ObjectId, offset: usize, value: NativeValue) -> Result<()> {
        self.with_object_mut(id, |o| match o.fields.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })?
        .then_some(())
        .ok_or(Error::FieldOutOfRange { object: id, offset })
    }

    /// Add one root reference; returns the new count
    pub fn add_root(&self, id: ObjectId) -> usize {
        self.roots.borrow_mut().add(id)
    }

    /// Drop one root reference; returns the new count
    pub fn remove_root(&self, id: ObjectId) -> usize {
        self.roots.borrow_mut().remove(id)
    }

    pub fn is_rooted(&self, id: ObjectId) -> bool {
        self.roots.borrow().contains(id)
    }

    pub fn root_count(&self) -> usize {
        self.roots.borrow().len()
    }

    /// Reclaim transient objects not reachable from roots or permanent objects.
    /// Weak references do not keep objects alive. Returns the number reclaimed.
    pub fn collect_garbage(&self) -> usize {
        let mut marked: HashSet<ObjectId> = HashSet::new();
        let mut pending: Vec<ObjectId> = {
            let objects = self.objects.borrow();
            let mut seeds: Vec<ObjectId> = self.roots.borrow().iter().collect();
            seeds.extend(
                objects
                    .ids()
                    .into_iter()
                    .filter(|id| objects.get(*id).is_some_and(|o| !o.transient)),
            );
            seeds
        };

        {
            let objects = self.objects.borrow();
            while let Some(id) = pending.pop() {
                if !marked.insert(id) {
                    continue;
                }
                if let Some(data) = objects.get(id) {
                    for field in &data.fields {
                        collect_strong_refs(field, &mut pending);
                    }
                }
            }
        }

        let doomed: Vec<ObjectId> = self
            .objects
            .borrow()
            .ids()
            .into_iter()
            .filter(|id| !marked.contains(id))
            .collect();
        let mut objects = self.objects.borrow_mut();
        for id in &doomed {
            objects.remove(*id);
        }
        if !doomed.is_empty() {
            tracing::debug!("garbage collection reclaimed {} objects", doomed.len());
        }
        doomed.len()
    }

    /// Number of invocations performed through either call path
    pub fn invocation_count(&self) -> u64 {
        self.invocations.get()
    }

    /// Direct call of a function's own native body
    pub fn call_native(
        &self,
        function: &FunctionDesc,
        target: Option<ObjectId>,
        params: &mut [NativeValue],
    ) -> Result<()> {
        let body = function
            .native
            .as_ref()
            .ok_or_else(|| Error::NoImplementation(function.name.clone()))?;
        self.check_target(function, target)?;
        self.invocations.set(self.invocations.get() + 1);
        let mut call = NativeCall {
            host: self,
            target,
            params,
        };
        body(&mut call)
    }

    /// Dynamic dispatch: the most-derived implementation for the target's
    /// runtime class runs
    pub fn invoke(
        &self,
        function: &FunctionDesc,
        target: Option<ObjectId>,
        params: &mut [NativeValue],
    ) -> Result<()> {
        self.check_target(function, target)?;
        let resolved = match target {
            Some(id) if !function.is_static() => {
                let class = self.class_of(id).ok_or(Error::InvalidObject(id))?;
                self.registry.resolve_override(class, function)
            }
            _ => None,
        };
        match resolved {
            Some(implementation) => self.call_native(&implementation, target, params),
            None => self.call_native(function, target, params),
        }
    }

    fn check_target(&self, function: &FunctionDesc, target: Option<ObjectId>) -> Result<()> {
        if function.is_static() {
            return Ok(());
        }
        let id = target.ok_or(Error::MissingTarget)?;
        let class = self.class_of(id).ok_or(Error::InvalidObject(id))?;
        if let Some(owner) = function.owner {
            if !self.registry.is_a(class, owner) {
                return Err(Error::Native(format!(
                    "{} is not a valid target for {}",
                    id, function.name
                )));
            }
        }
        Ok(())
    }
}

fn collect_strong_refs(value: &NativeValue, out: &mut Vec<ObjectId>) {
    match value {
        NativeValue::Object(Some(id)) | NativeValue::Interface(Some(id)) => out.push(*id),
        NativeValue::Struct(s) => s.fields.iter().for_each(|f| collect_strong_refs(f, out)),
        NativeValue::Array(items) | NativeValue::Set(items) => {
            items.iter().for_each(|f| collect_strong_refs(f, out))
        }
        NativeValue::Map(entries) => entries.iter().for_each(|(k, v)| {
            collect_strong_refs(k, out);
            collect_strong_refs(v, out);
        }),
        _ => {}
    }
}
