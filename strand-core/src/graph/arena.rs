//! Generational Arena
//!
//! Cells, edges and scopes all live in arenas and refer to each other by
//! key. A key is a slot index plus the slot's generation at insertion time;
//! removing an entry bumps the generation, so a stale key held by a handle
//! or a walk in progress resolves to `None` instead of aliasing whatever
//! reuses the slot.

use std::fmt;
use std::marker::PhantomData;

/// Implemented by the typed keys stored in an [`Arena`].
pub trait ArenaKey: Copy + Eq {
    /// Build a key from its raw parts.
    fn from_parts(slot: u32, generation: u32) -> Self;

    /// The slot index.
    fn slot(self) -> u32;

    /// The generation the key was minted with.
    fn generation(self) -> u32;
}

/// Declares a typed arena key.
macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        pub struct $name {
            slot: u32,
            generation: u32,
        }

        impl $crate::graph::arena::ArenaKey for $name {
            fn from_parts(slot: u32, generation: u32) -> Self {
                Self { slot, generation }
            }

            fn slot(self) -> u32 {
                self.slot
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.slot)?;
                if self.generation > 0 {
                    write!(f, "@{}", self.generation)?;
                }
                Ok(())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(self, f)
            }
        }
    };
}

pub(crate) use arena_key;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generation-checked keys and a free list.
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaKey, T> Arena<K, T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// Store a value and return its key.
    pub fn insert(&mut self, value: T) -> K {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return K::from_parts(slot, entry.generation);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        K::from_parts(slot, 0)
    }

    /// Remove the value behind `key`, if the key is still live.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let entry = self.slots.get_mut(key.slot() as usize)?;
        if entry.generation != key.generation() || entry.value.is_none() {
            return None;
        }
        let value = entry.value.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(key.slot());
        self.len -= 1;
        value
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots
            .get(key.slot() as usize)
            .filter(|entry| entry.generation == key.generation())
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots
            .get_mut(key.slot() as usize)
            .filter(|entry| entry.generation == key.generation())
            .and_then(|entry| entry.value.as_mut())
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry
                .value
                .as_ref()
                .map(|value| (K::from_parts(slot as u32, entry.generation), value))
        })
    }
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    arena_key!(TestKey, "t");

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<TestKey, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn stale_key_does_not_alias_reused_slot() {
        let mut arena: Arena<TestKey, u32> = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);

        let new = arena.insert(2);
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn display_includes_generation_after_reuse() {
        let mut arena: Arena<TestKey, u32> = Arena::new();
        let first = arena.insert(1);
        assert_eq!(first.to_string(), "t0");
        arena.remove(first);
        let second = arena.insert(2);
        assert_eq!(second.to_string(), "t0@1");
    }

    #[test]
    fn iter_skips_removed() {
        let mut arena: Arena<TestKey, u32> = Arena::new();
        let a = arena.insert(1);
        arena.insert(2);
        arena.insert(3);
        arena.remove(a);

        let values: Vec<u32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);
    }
}
