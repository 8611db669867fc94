//! Object storage with generation-checked handles and a counted root set

use crate::descriptor::ClassId;
use crate::value::NativeValue;
use std::collections::HashMap;
use std::fmt;

/// Handle to a live object. Stale handles (destroyed objects, reused slots)
/// never resolve because the generation no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into one integer (usable as a table key)
    pub fn to_bits(self) -> i64 {
        ((self.generation as i64) << 32) | self.index as i64
    }

    pub fn from_bits(bits: i64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// The data of one object instance
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub class: ClassId,
    pub name: String,
    /// Field storage, indexed by property offset
    pub fields: Vec<NativeValue>,
    /// Transient objects are reclaimed by garbage collection when unreachable
    pub transient: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    data: Option<ObjectData>,
}

/// Arena of objects addressed by [`ObjectId`]
#[derive(Debug, Default)]
pub struct ObjectStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, data: ObjectData) -> ObjectId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            return ObjectId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
        });
        ObjectId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectData> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.as_ref()
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectData> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.data.as_mut()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Destroy an object; its id (and every copy of it) becomes invalid
    pub fn remove(&mut self, id: ObjectId) -> Option<ObjectData> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(data)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.data.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every live object
    pub fn ids(&self) -> Vec<ObjectId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.data.is_some())
            .map(|(index, slot)| ObjectId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }
}

/// Objects kept alive from outside the object graph, with a count per object
#[derive(Debug, Default)]
pub struct RootSet {
    counts: HashMap<ObjectId, usize>,
}

impl RootSet {
    /// Returns the new count
    pub fn add(&mut self, id: ObjectId) -> usize {
        let count = self.counts.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the new count; removing an unrooted object is a no-op
    pub fn remove(&mut self, id: ObjectId) -> usize {
        match self.counts.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                self.counts.remove(&id);
                0
            }
            None => 0,
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.counts.contains_key(&id)
    }

    pub fn count(&self, id: ObjectId) -> usize {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.counts.keys().copied()
    }
}
