//! Capacity-limited flow table with random eviction.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rand::Rng;

use super::{allocate, FlowKey, FlowState};
use crate::record::Timestamp;

struct Slot<V> {
    state: FlowState,
    resource: V,
}

/// A live entry of a [`BoundedFlowTable`].
pub struct BoundedEntry<'a, V> {
    pub index: u32,
    pub state: &'a mut FlowState,
    pub resource: &'a mut V,
}

/// Flow table holding at most `capacity` entries, each owning a resource `V`.
///
/// Inserting into a full table is the caller's decision: check
/// [`is_full`](Self::is_full) and call [`evict_some`](Self::evict_some) first,
/// closing whatever resources come back.
pub struct BoundedFlowTable<V> {
    flows: HashMap<FlowKey, Slot<V>>,
    capacity: usize,
    next_index: u32,
}

impl<V> BoundedFlowTable<V> {
    pub fn new(base: u32, capacity: usize) -> Self {
        BoundedFlowTable {
            flows: HashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            next_index: base,
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.flows.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.flows.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &FlowKey) -> Option<BoundedEntry<'_, V>> {
        self.flows.get_mut(key).map(|slot| BoundedEntry {
            index: slot.state.index,
            state: &mut slot.state,
            resource: &mut slot.resource,
        })
    }

    /// Insert `key` under a new index, replacing any existing entry.
    pub fn insert(&mut self, key: FlowKey, now: Timestamp, resource: V) -> BoundedEntry<'_, V> {
        let mut state = FlowState::new(allocate(&mut self.next_index));
        state.last_time = Some(now);
        let slot = Slot { state, resource };
        let slot = match self.flows.entry(key) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(slot);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(slot),
        };
        BoundedEntry {
            index: slot.state.index,
            state: &mut slot.state,
            resource: &mut slot.resource,
        }
    }

    /// Remove a random subset of entries and return their resources.
    ///
    /// Each entry is evicted independently with probability `fraction`, so it
    /// survives with probability `1 - fraction`. A fraction of 1 or more
    /// empties the table.
    pub fn evict_some<R: Rng + ?Sized>(&mut self, fraction: f64, rng: &mut R) -> Vec<(FlowKey, V)> {
        if fraction >= 1.0 {
            return self.drain();
        }

        let p = fraction.max(0.0);
        let doomed: Vec<FlowKey> = self
            .flows
            .keys()
            .filter(|_| rng.gen_bool(p))
            .copied()
            .collect();

        doomed
            .into_iter()
            .filter_map(|key| self.flows.remove(&key).map(|slot| (key, slot.resource)))
            .collect()
    }

    /// Remove every entry, returning the resources.
    pub fn drain(&mut self) -> Vec<(FlowKey, V)> {
        self.flows
            .drain()
            .map(|(key, slot)| (key, slot.resource))
            .collect()
    }
}
