//! Call table
//!
//! Owns every live call of one worker, addressed by generation-checked tags.
//! Removing a call bumps its slot's generation, so a tag can name at most one
//! call over the table's lifetime and a stale tag resolves to nothing.

use crate::rpc::Tag;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with a free list
pub struct CallTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> CallTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value, returning its tag
    pub fn insert(&mut self, value: T) -> Tag {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Tag::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Tag::new(index, 0)
    }

    fn slot(&self, tag: Tag) -> Option<&Slot<T>> {
        self.slots
            .get(tag.index as usize)
            .filter(|slot| slot.generation == tag.generation)
    }

    pub fn get(&self, tag: Tag) -> Option<&T> {
        self.slot(tag)?.value.as_ref()
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut T> {
        self.slots
            .get_mut(tag.index as usize)
            .filter(|slot| slot.generation == tag.generation)?
            .value
            .as_mut()
    }

    /// Take a value out and invalidate its tag
    pub fn remove(&mut self, tag: Tag) -> Option<T> {
        let slot = self
            .slots
            .get_mut(tag.index as usize)
            .filter(|slot| slot.generation == tag.generation)?;
        let value = slot.value.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(tag.index);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live values in slot order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }
}

impl<T> Default for CallTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
