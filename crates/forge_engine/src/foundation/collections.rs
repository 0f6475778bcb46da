//! Specialized collection types
//!
//! [`Registry`] is the slot allocator behind every integer handle the engine
//! hands out (meshes, textures, pipelines, memory allocations). Handles are
//! generational: a slot index can be reused after `remove`, but the handle
//! that referred to the old occupant keeps resolving to `None`.

use std::collections::VecDeque;
use std::fmt;

/// Stable handle into a [`Registry`]
///
/// `index` names the slot, `generation` tells apart successive occupants of
/// the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryIndex {
    index: u32,
    generation: u32,
}

impl RegistryIndex {
    /// Build a handle from its parts
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot occupant this handle refers to
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a single `u64` (generation in the high half)
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`RegistryIndex::to_bits`]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for RegistryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Array of optional slots plus a FIFO queue of freed indices
///
/// `add` reuses the oldest freed slot before growing the backing storage, so
/// steady add/remove churn never grows the registry. Lookups with a handle
/// that was never issued, or whose slot has since been vacated or reused,
/// return `None`.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
    len: usize,
}

impl<T> Registry<T> {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            len: 0,
        }
    }

    /// Create an empty registry with room for `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: VecDeque::new(),
            len: 0,
        }
    }

    /// Store `value` and return its handle
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, value: T) -> RegistryIndex {
        self.len += 1;
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RegistryIndex::new(index, slot.generation);
        }

        // Vec growth doubles the backing storage when it runs out.
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        RegistryIndex::new(index, 0)
    }

    /// Look up the value behind `handle`
    pub fn get(&self, handle: RegistryIndex) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutable lookup of the value behind `handle`
    pub fn get_mut(&mut self, handle: RegistryIndex) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `handle` currently resolves to a value
    pub fn contains(&self, handle: RegistryIndex) -> bool {
        self.get(handle).is_some()
    }

    /// Take the value out and free its slot for reuse
    pub fn remove(&mut self, handle: RegistryIndex) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Number of live values
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no values are stored
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live and free)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over live values with their handles
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (RegistryIndex, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (RegistryIndex::new(index as u32, slot.generation), value))
        })
    }

    /// Remove every value, yielding them in slot order
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                #[allow(clippy::cast_possible_truncation)]
                self.free.push_back(index as u32);
                drained.push(value);
            }
        }
        self.len = 0;
        drained
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_get() {
        let mut registry = Registry::new();
        let a = registry.add("a");
        let b = registry.add("b");
        assert_eq!(registry.get(a), Some(&"a"));
        assert_eq!(registry.get(b), Some(&"b"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_makes_handle_absent() {
        let mut registry = Registry::new();
        let a = registry.add(10);
        assert_eq!(registry.remove(a), Some(10));
        assert_eq!(registry.get(a), None);
        assert_eq!(registry.remove(a), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_never_issued_handle_is_absent() {
        let mut registry: Registry<u8> = Registry::new();
        assert!(registry.get(RegistryIndex::new(7, 0)).is_none());
        assert!(registry.remove(RegistryIndex::new(0, 0)).is_none());
        registry.add(1);
        assert!(registry.get(RegistryIndex::new(0, 3)).is_none());
    }

    #[test]
    fn test_freed_index_reused_before_growth() {
        let mut registry = Registry::new();
        let handles: Vec<_> = (0..4).map(|i| registry.add(i)).collect();
        registry.remove(handles[1]);
        for _ in 0..100 {
            let h = registry.add(42);
            assert_eq!(h.index(), 1);
            registry.remove(h);
        }
        assert_eq!(registry.slot_count(), 4);
    }

    #[test]
    fn test_stale_handle_does_not_alias_new_occupant() {
        let mut registry = Registry::new();
        let old = registry.add("old");
        registry.remove(old);
        let new = registry.add("new");
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(registry.get(old), None);
        assert_eq!(registry.get(new), Some(&"new"));
    }

    #[test]
    fn test_free_indices_reused_in_release_order() {
        let mut registry = Registry::new();
        let a = registry.add(0);
        let b = registry.add(1);
        let c = registry.add(2);
        registry.remove(c);
        registry.remove(a);
        registry.remove(b);
        assert_eq!(registry.add(3).index(), c.index());
        assert_eq!(registry.add(4).index(), a.index());
        assert_eq!(registry.add(5).index(), b.index());
    }

    #[test]
    fn test_add_remove_sequence_matches_model() {
        // Deterministic pseudo-random churn checked against a simple model.
        let mut registry = Registry::new();
        let mut model: Vec<(RegistryIndex, u32)> = Vec::new();
        let mut removed: Vec<RegistryIndex> = Vec::new();
        let mut seed: u32 = 0x9E37_79B9;
        for step in 0..2_000u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 == 0 && !model.is_empty() {
                let victim = model.swap_remove(seed as usize % model.len());
                assert_eq!(registry.remove(victim.0), Some(victim.1));
                removed.push(victim.0);
            } else {
                let handle = registry.add(step);
                model.push((handle, step));
            }
        }
        for (handle, value) in &model {
            assert_eq!(registry.get(*handle), Some(value));
        }
        for handle in &removed {
            assert!(registry.get(*handle).is_none());
        }
        assert_eq!(registry.len(), model.len());
        assert!(registry.slot_count() <= 2_000);
    }

    #[test]
    fn test_bits_round_trip() {
        let handle = RegistryIndex::new(12, 3);
        assert_eq!(RegistryIndex::from_bits(handle.to_bits()), handle);
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = Registry::new();
        let a = registry.add(1);
        registry.add(2);
        assert_eq!(registry.drain(), vec![1, 2]);
        assert!(registry.is_empty());
        assert!(registry.get(a).is_none());
    }
}
