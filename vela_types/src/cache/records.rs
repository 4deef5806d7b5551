// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::AHashMap;
use tracing::trace;

use crate::execution::Agent;
use crate::heap::indexes::{InlineCacheId, ObjectIndex, PolyCacheId, TypeIndex};
use crate::types::{PropertyKey, SlotLocation};

/// Entries a call site may remember about a completed property operation.
///
/// Every variant is guarded by a [`TypeIndex`]: a probe first re-verifies
/// that the receiver still has exactly that type, and anything else is a
/// miss. Arena rows are never reused, so a stale index can only ever fail
/// the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntry {
    /// Data property read off the receiver itself. Read population does not
    /// screen for writability, so loads and stores never share an entry
    /// kind.
    Local { ty: TypeIndex, slot: SlotLocation },
    /// Data-property overwrite on the receiver itself. Populated only after
    /// the handler's write bookkeeping ran, so a store entry always denotes
    /// a writable, non-speculated slot of its guard type.
    StoreField { ty: TypeIndex, slot: SlotLocation },
    /// Property add: move the receiver from `old_ty` to `new_ty` and write
    /// the new slot. When `required_aux_slot_capacity` is non-zero the
    /// receiver's auxiliary slot array must first grow to exactly that many
    /// slots.
    Transition {
        old_ty: TypeIndex,
        new_ty: TypeIndex,
        slot: SlotLocation,
        required_aux_slot_capacity: u16,
    },
    /// Data property found on a prototype; the value is read live from the
    /// owner's slot.
    Proto {
        ty: TypeIndex,
        owner: ObjectIndex,
        slot: SlotLocation,
    },
    /// The receiver's whole prototype chain lacked the key.
    Missing { ty: TypeIndex },
    /// Accessor write: the setter function lives in the owner's slot.
    Setter {
        ty: TypeIndex,
        owner: ObjectIndex,
        slot: SlotLocation,
    },
}

/// A monomorphic call-site cache: remembers one entry, last population wins.
#[derive(Debug, Default)]
pub struct InlineCacheRecord {
    pub(crate) entry: Option<CacheEntry>,
}

pub(crate) const POLY_CACHE_SIZE: usize = 8;

/// A polymorphic call-site cache: a fixed eight-entry table replaced
/// round-robin. Probing scans all entries; population overwrites the oldest.
#[derive(Debug)]
pub struct PolyCacheRecord {
    pub(crate) entries: [Option<CacheEntry>; POLY_CACHE_SIZE],
    pub(crate) next: u8,
}

impl Default for PolyCacheRecord {
    fn default() -> Self {
        Self {
            entries: [None; POLY_CACHE_SIZE],
            next: 0,
        }
    }
}

/// Which cache a call site carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRef {
    Mono(InlineCacheId),
    Poly(PolyCacheId),
}

/// Records an entry into the call-site cache.
pub(crate) fn store(agent: &mut Agent, cache: CacheRef, entry: CacheEntry) {
    trace!(?entry, "populating property cache");
    match cache {
        CacheRef::Mono(id) => {
            agent.heap.inline_caches[id.into_index()].entry = Some(entry);
        }
        CacheRef::Poly(id) => {
            let record = &mut agent.heap.poly_caches[id.into_index()];
            // Replace an entry of the same kind guarded by the same type
            // first, so that a repopulation does not leave a stale twin
            // behind. Load and store entries for one type coexist.
            for existing in record.entries.iter_mut().flatten() {
                if guard_type(*existing) == guard_type(entry)
                    && core::mem::discriminant(existing) == core::mem::discriminant(&entry)
                {
                    *existing = entry;
                    return;
                }
            }
            let slot = record.next as usize;
            record.entries[slot] = Some(entry);
            record.next = (record.next + 1) % POLY_CACHE_SIZE as u8;
        }
    }
}

fn guard_type(entry: CacheEntry) -> TypeIndex {
    match entry {
        CacheEntry::Local { ty, .. }
        | CacheEntry::StoreField { ty, .. }
        | CacheEntry::Transition { old_ty: ty, .. }
        | CacheEntry::Proto { ty, .. }
        | CacheEntry::Missing { ty }
        | CacheEntry::Setter { ty, .. } => ty,
    }
}

/// Snapshot of a cache's entries for probing. Entries are small and `Copy`;
/// taking a snapshot keeps probes free of borrow entanglement with the
/// slot accesses they lead to.
pub(crate) fn entries(agent: &Agent, cache: CacheRef) -> [Option<CacheEntry>; POLY_CACHE_SIZE] {
    match cache {
        CacheRef::Mono(id) => {
            let mut snapshot = [None; POLY_CACHE_SIZE];
            snapshot[0] = agent.heap.inline_caches[id.into_index()].entry;
            snapshot
        }
        CacheRef::Poly(id) => agent.heap.poly_caches[id.into_index()].entries,
    }
}

fn clear(agent: &mut Agent, cache: CacheRef) {
    match cache {
        CacheRef::Mono(id) => agent.heap.inline_caches[id.into_index()].entry = None,
        CacheRef::Poly(id) => {
            let record = &mut agent.heap.poly_caches[id.into_index()];
            record.entries = [None; POLY_CACHE_SIZE];
            record.next = 0;
        }
    }
}

/// Registry of caches whose validity depends on objects other than their
/// receiver: prototype hits, setters found up the chain, and missing-key
/// results. A property change on any prototype object clears every cache
/// registered under the key.
#[derive(Debug, Default)]
pub(crate) struct CacheRegistry {
    proto_caches: AHashMap<PropertyKey, Vec<CacheRef>>,
}

impl CacheRegistry {
    pub(crate) fn register(&mut self, key: PropertyKey, cache: CacheRef) {
        self.proto_caches.entry(key).or_default().push(cache);
    }
}

/// Clears every chain-dependent cache recorded under `key`. Called whenever
/// a prototype object's own properties change shape.
pub(crate) fn invalidate_proto_caches(agent: &mut Agent, key: PropertyKey) {
    let Some(caches) = agent.caches.proto_caches.remove(&key) else {
        return;
    };
    trace!(key = ?key, count = caches.len(), "invalidating prototype caches");
    for cache in caches {
        clear(agent, cache);
    }
}

impl Agent {
    /// The entry a monomorphic cache currently holds.
    pub fn inline_cache_entry(&self, id: InlineCacheId) -> Option<CacheEntry> {
        self.heap.inline_caches[id.into_index()].entry
    }

    /// The entries a polymorphic cache currently holds.
    pub fn poly_cache_entries(&self, id: PolyCacheId) -> Vec<CacheEntry> {
        self.heap.poly_caches[id.into_index()]
            .entries
            .iter()
            .flatten()
            .copied()
            .collect()
    }
}
