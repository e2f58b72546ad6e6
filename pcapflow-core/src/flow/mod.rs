//! Flow identification.
//!
//! A [`FlowTable`] maps each [`FlowKey`] seen during one extraction run to a
//! monotonically assigned flow index and the running [`FlowState`] the TCP
//! sequencer and interval computation need. Indices are handed out in order
//! of first appearance, starting from a configurable base, and are never
//! reused within a run.
//!
//! [`BoundedFlowTable`] is the capacity-limited variant used when every flow
//! owns an open resource (a file handle). Under pressure it evicts a random
//! subset of entries. A key that comes back after eviction is a brand-new
//! entry with a new index: one logical flow becomes several. Callers accept
//! this approximation in exchange for bounded resource use.

mod bounded;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::record::Timestamp;

pub use bounded::{BoundedEntry, BoundedFlowTable};

/// The 5-tuple identifying a flow.
///
/// For TCP and UDP the selectors are the ports. ICMP has no ports, so the
/// identifier takes the source slot and `type << 8 | code` the destination
/// slot. Other protocols use zero selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_sel: u16,
    pub dst_sel: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{}",
            self.protocol, self.src, self.src_sel, self.dst, self.dst_sel
        )
    }
}

/// Running state of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowState {
    index: u32,
    /// Time of the last accepted packet; `None` until the first one.
    pub last_time: Option<Timestamp>,
    /// Sequence number of the last TCP byte counted (TCP flows only).
    pub last_seqno: u32,
}

impl FlowState {
    pub fn new(index: u32) -> Self {
        FlowState {
            index,
            last_time: None,
            last_seqno: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Result of [`FlowTable::lookup_or_create`].
#[derive(Debug)]
pub struct FlowEntry<'a> {
    pub index: u32,
    pub state: &'a mut FlowState,
    /// The caller must persist a flow record when this is set.
    pub is_new: bool,
}

/// Unbounded flow table for a single extraction run.
#[derive(Debug)]
pub struct FlowTable {
    flows: HashMap<FlowKey, FlowState>,
    next_index: u32,
    max_interval: Option<f64>,
}

impl FlowTable {
    /// Create a table whose first flow gets index `base`.
    pub fn new(base: u32) -> Self {
        FlowTable {
            flows: HashMap::new(),
            next_index: base,
            max_interval: None,
        }
    }

    /// Create a table that starts a new flow whenever a key goes quiet for
    /// longer than `max_interval` seconds.
    pub fn with_max_interval(base: u32, max_interval: Option<f64>) -> Self {
        FlowTable {
            max_interval,
            ..FlowTable::new(base)
        }
    }

    /// Find the flow for `key` at time `now`, creating it if needed.
    ///
    /// A known key whose last packet is more than the maximum inter-arrival
    /// gap before `now` is restarted under a fresh index, exactly as if it
    /// had never been seen.
    pub fn lookup_or_create(&mut self, key: FlowKey, now: Timestamp) -> FlowEntry<'_> {
        let max_interval = self.max_interval;
        let next_index = &mut self.next_index;

        match self.flows.entry(key) {
            Entry::Occupied(occupied) => {
                let state = occupied.into_mut();
                let expired = match (max_interval, state.last_time) {
                    (Some(gap), Some(last)) => now.seconds_since(last) > gap,
                    _ => false,
                };
                if expired {
                    *state = FlowState::new(allocate(next_index));
                }
                FlowEntry {
                    index: state.index,
                    state,
                    is_new: expired,
                }
            }
            Entry::Vacant(vacant) => {
                let state = vacant.insert(FlowState::new(allocate(next_index)));
                FlowEntry {
                    index: state.index,
                    state,
                    is_new: true,
                }
            }
        }
    }

    /// Number of live keys (restarted flows share their key's slot).
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Index the next new flow will receive.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, &FlowState)> {
        self.flows.iter()
    }
}

fn allocate(next_index: &mut u32) -> u32 {
    let index = *next_index;
    *next_index = next_index.wrapping_add(1);
    index
}
