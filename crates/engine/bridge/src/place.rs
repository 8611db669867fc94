//! Generation-checked paths to native storage
//!
//! A [`Place`] names a value by its root (a host object or a runtime-owned
//! cell) plus a path of field/element steps. Every access re-resolves the
//! path, so a handle whose owner was destroyed, or whose element was removed,
//! fails with [`Error::DanglingReference`] instead of touching stale data.

use crate::{Error, Result};
use reflect::{Host, NativeValue, ObjectId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Where a place's path starts
#[derive(Clone)]
pub enum Root {
    /// A field of a host object
    Object(ObjectId),
    /// Storage owned by the script runtime (copies, script-created containers)
    Owned(Rc<RefCell<NativeValue>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Field slot of a struct (or of the object, as the first step)
    Field(usize),
    /// Element of an array
    Index(usize),
}

/// Path to one native value
#[derive(Clone)]
pub struct Place {
    root: Root,
    path: Vec<Step>,
}

impl Place {
    /// The field record of a host object; only its children resolve
    pub fn object(object: ObjectId) -> Self {
        Self {
            root: Root::Object(object),
            path: Vec::new(),
        }
    }

    /// A field of a host object
    pub fn field(object: ObjectId, offset: usize) -> Self {
        Self::object(object).child(offset)
    }

    /// Fresh runtime-owned storage holding `value`
    pub fn owned(value: NativeValue) -> Self {
        Self {
            root: Root::Owned(Rc::new(RefCell::new(value))),
            path: Vec::new(),
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Whether the storage belongs to the script runtime
    pub fn is_owned(&self) -> bool {
        matches!(self.root, Root::Owned(_))
    }

    /// The owning object, for places rooted in the host
    pub fn owner(&self) -> Option<ObjectId> {
        match self.root {
            Root::Object(id) => Some(id),
            Root::Owned(_) => None,
        }
    }

    /// Child place for a struct field
    pub fn child(&self, offset: usize) -> Self {
        self.step(Step::Field(offset))
    }

    /// Child place for an array element (0-based)
    pub fn element(&self, index: usize) -> Self {
        self.step(Step::Index(index))
    }

    fn step(&self, step: Step) -> Self {
        let mut path = self.path.clone();
        path.push(step);
        Self {
            root: self.root.clone(),
            path,
        }
    }

    /// Whether both places name the same storage
    pub fn same_as(&self, other: &Place) -> bool {
        let same_root = match (&self.root, &other.root) {
            (Root::Object(a), Root::Object(b)) => a == b,
            (Root::Owned(a), Root::Owned(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        same_root && self.path == other.path
    }

    /// Run `f` on the value; the host must not be re-entered from `f`
    pub fn with<R>(&self, host: &Host, f: impl FnOnce(&NativeValue) -> R) -> Result<R> {
        match &self.root {
            Root::Object(id) => {
                let path = &self.path;
                host.with_object(*id, |data| {
                    let (first, rest) = path.split_first()?;
                    let Step::Field(slot) = first else {
                        return None;
                    };
                    resolve(data.fields.get(*slot)?, rest).map(f)
                })
                .map_err(|_| self.dangling())?
                .ok_or_else(|| self.dangling())
            }
            Root::Owned(cell) => {
                let value = cell.borrow();
                let result = resolve(&value, &self.path).map(f);
                result.ok_or_else(|| self.dangling())
            }
        }
    }

    /// Run `f` on the value mutably; the host must not be re-entered from `f`
    pub fn with_mut<R>(&self, host: &Host, f: impl FnOnce(&mut NativeValue) -> R) -> Result<R> {
        match &self.root {
            Root::Object(id) => {
                let path = &self.path;
                host.with_object_mut(*id, |data| {
                    let (first, rest) = path.split_first()?;
                    let Step::Field(slot) = first else {
                        return None;
                    };
                    resolve_mut(data.fields.get_mut(*slot)?, rest).map(f)
                })
                .map_err(|_| self.dangling())?
                .ok_or_else(|| self.dangling())
            }
            Root::Owned(cell) => {
                let mut value = cell.borrow_mut();
                let result = resolve_mut(&mut value, &self.path).map(f);
                result.ok_or_else(|| self.dangling())
            }
        }
    }

    /// Copy of the current value
    pub fn read(&self, host: &Host) -> Result<NativeValue> {
        self.with(host, NativeValue::clone)
    }

    /// Replace the value
    pub fn write(&self, host: &Host, value: NativeValue) -> Result<()> {
        self.with_mut(host, |slot| *slot = value)
    }

    /// Whether the path still resolves
    pub fn is_live(&self, host: &Host) -> bool {
        self.with(host, |_| ()).is_ok()
    }

    fn dangling(&self) -> Error {
        Error::DanglingReference(self.to_string())
    }
}

fn resolve<'a>(mut value: &'a NativeValue, path: &[Step]) -> Option<&'a NativeValue> {
    for step in path {
        value = match (step, value) {
            (Step::Field(i), NativeValue::Struct(s)) => s.fields.get(*i)?,
            (Step::Index(i), NativeValue::Array(items)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(value)
}

fn resolve_mut<'a>(mut value: &'a mut NativeValue, path: &[Step]) -> Option<&'a mut NativeValue> {
    for step in path {
        value = match (step, value) {
            (Step::Field(i), NativeValue::Struct(s)) => s.fields.get_mut(*i)?,
            (Step::Index(i), NativeValue::Array(items)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(value)
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Root::Object(id) => write!(f, "object {id}")?,
            Root::Owned(_) => f.write_str("owned value")?,
        }
        for step in &self.path {
            match step {
                Step::Field(i) => write!(f, ".{i}")?,
                Step::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Place({self})")
    }
}
