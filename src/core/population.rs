//! Bounded, insertion-ordered entity populations.
//!
//! Every subsystem keeps its entities in a [`Population`]: a FIFO with a hard
//! cap (spawning into a full population evicts the oldest entry) and an
//! optional vitality floor (entities that decay below it are dropped in the
//! same tick).

use std::collections::VecDeque;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque entity token, unique within the allocator that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityId(u64);

impl EntityId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

pub trait Entity {
    fn id(&self) -> EntityId;

    /// Current health, compared against the population floor after each tick.
    fn vitality(&self) -> f32;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopulationStats {
    pub spawned: u64,
    pub evicted: u64,
    pub expired: u64,
    pub expired_last_tick: usize,
}

#[derive(Debug, Clone)]
pub struct Population<T> {
    capacity: usize,
    floor: Option<f32>,
    items: VecDeque<T>,
    stats: PopulationStats,
}

impl<T: Entity> Population<T> {
    /// Population without an extinction floor; entities leave only by eviction.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            floor: None,
            items: VecDeque::with_capacity(capacity),
            stats: PopulationStats::default(),
        }
    }

    /// Population whose entities die the first tick their vitality drops below `floor`.
    pub fn with_floor(capacity: usize, floor: f32) -> Self {
        Self {
            floor: Some(floor),
            ..Self::new(capacity)
        }
    }

    /// Append `candidate`, evicting the oldest entries first if the population is full.
    ///
    /// Returns `false` only for a zero-capacity population.
    pub fn spawn(&mut self, candidate: T) -> bool {
        if self.capacity == 0 {
            return false;
        }
        while self.items.len() >= self.capacity {
            if let Some(old) = self.items.pop_front() {
                tracing::trace!(id = %old.id(), "evicted oldest entity");
                self.stats.evicted += 1;
            }
        }
        self.items.push_back(candidate);
        self.stats.spawned += 1;
        true
    }

    /// Apply `update` to every entity, then drop the ones below the floor.
    ///
    /// Returns how many entities expired during this tick.
    pub fn tick<F: FnMut(&mut T)>(&mut self, mut update: F) -> usize {
        for e in self.items.iter_mut() {
            update(e);
        }

        let before = self.items.len();
        if let Some(floor) = self.floor {
            // NaN vitality fails the comparison and is removed with the rest.
            self.items.retain(|e| e.vitality() >= floor);
        }
        let expired = before - self.items.len();

        self.stats.expired += expired as u64;
        self.stats.expired_last_tick = expired;
        expired
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn floor(&self) -> Option<f32> {
        self.floor
    }

    pub fn stats(&self) -> PopulationStats {
        self.stats
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.items.iter().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Entity + Clone> Population<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Blob {
        id: EntityId,
        health: f32,
    }

    impl Entity for Blob {
        fn id(&self) -> EntityId {
            self.id
        }

        fn vitality(&self) -> f32 {
            self.health
        }
    }

    fn blob(ids: &mut IdAllocator, health: f32) -> Blob {
        Blob {
            id: ids.next_id(),
            health,
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut ids = IdAllocator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "#0");
    }

    #[test]
    fn spawn_at_cap_evicts_oldest() {
        let mut ids = IdAllocator::new();
        let mut pop = Population::new(3);
        let first = blob(&mut ids, 1.0);
        let first_id = first.id;
        assert!(pop.spawn(first));
        for _ in 0..2 {
            pop.spawn(blob(&mut ids, 1.0));
        }
        assert!(pop.is_full());

        let late = blob(&mut ids, 1.0);
        let late_id = late.id;
        assert!(pop.spawn(late));

        assert_eq!(pop.len(), 3);
        assert!(!pop.contains(first_id));
        assert_eq!(pop.newest().map(|b| b.id), Some(late_id));
        assert_eq!(pop.stats().evicted, 1);
        assert_eq!(pop.stats().spawned, 4);
    }

    #[test]
    fn zero_capacity_rejects() {
        let mut ids = IdAllocator::new();
        let mut pop: Population<Blob> = Population::new(0);
        assert!(!pop.spawn(blob(&mut ids, 1.0)));
        assert!(pop.is_empty());
    }

    #[test]
    fn tick_removes_below_floor_same_call() {
        let mut ids = IdAllocator::new();
        let mut pop = Population::with_floor(4, 0.5);
        pop.spawn(blob(&mut ids, 0.52));
        pop.spawn(blob(&mut ids, 0.9));

        let expired = pop.tick(|b| b.health -= 0.05);
        assert_eq!(expired, 1);
        assert_eq!(pop.len(), 1);
        assert_eq!(pop.stats().expired_last_tick, 1);

        let expired = pop.tick(|_| {});
        assert_eq!(expired, 0);
        assert_eq!(pop.stats().expired, 1);
        assert_eq!(pop.stats().expired_last_tick, 0);
    }

    #[test]
    fn nan_vitality_is_removed() {
        let mut ids = IdAllocator::new();
        let mut pop = Population::with_floor(2, 0.0);
        pop.spawn(blob(&mut ids, 1.0));
        pop.tick(|b| b.health = f32::NAN);
        assert!(pop.is_empty());
    }

    #[test]
    fn no_floor_keeps_everything() {
        let mut ids = IdAllocator::new();
        let mut pop = Population::new(2);
        pop.spawn(blob(&mut ids, -5.0));
        pop.tick(|b| b.health -= 100.0);
        assert_eq!(pop.len(), 1);
        assert_eq!(pop.floor(), None);
    }
}
