// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::AHashMap;

use crate::heap::indexes::ObjectIndex;
use crate::types::PropertyKey;

/// Longest property sequence a path type may describe. Objects that grow
/// past this escape to a dictionary representation.
pub(crate) const MAX_PATH_LENGTH: usize = 128;

/// Singleton tracking for a type path.
///
/// The state only ever advances: a vacant path may claim its first instance,
/// and a claimed path retires to `Shared` when a second instance starts using
/// any type on it. `Shared` is terminal; fixed-field reasoning is only
/// possible in the `Instance` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SingletonState {
    Vacant,
    Instance(ObjectIndex),
    Shared,
}

/// An append-only sequence of property keys shared by every path type along
/// one branch of the transition tree.
///
/// Each path type sees a prefix of the sequence (its `path_length`); the
/// lookup map answers key-to-slot queries in O(1) and the caller filters the
/// result against its own prefix. Setter halves of accessor pairs occupy
/// unmapped positions.
#[derive(Debug)]
pub struct TypePathRecord {
    keys: Vec<PropertyKey>,
    map: AHashMap<PropertyKey, u8>,
    /// Slots whose first value may be speculated on as a constant.
    fixed_fields: u128,
    /// Fixed slots some call site actually speculated on; clearing one of
    /// these must invalidate the matching property guards.
    used_fixed_fields: u128,
    /// Slots below this bound have been written at least once through some
    /// type on this path; fixed bits above it are not yet meaningful.
    max_initialized_length: u8,
    singleton: SingletonState,
}

const fn bit(index: u8) -> u128 {
    1u128 << index
}

impl TypePathRecord {
    pub(crate) fn new() -> Self {
        Self {
            keys: Vec::new(),
            map: AHashMap::new(),
            fixed_fields: 0,
            used_fixed_fields: 0,
            max_initialized_length: 0,
            singleton: SingletonState::Vacant,
        }
    }

    pub(crate) fn len(&self) -> u8 {
        self.keys.len() as u8
    }

    pub(crate) fn key_at(&self, index: u8) -> PropertyKey {
        self.keys[index as usize]
    }

    /// Finds `key` among the first `path_length` positions.
    pub(crate) fn lookup(&self, key: PropertyKey, path_length: u8) -> Option<u8> {
        self.map.get(&key).copied().filter(|index| *index < path_length)
    }

    /// Appends a key. Setter entries pass `mapped = false` so that they stay
    /// invisible to lookup.
    pub(crate) fn add(&mut self, key: PropertyKey, mapped: bool) -> u8 {
        debug_assert!(self.keys.len() < MAX_PATH_LENGTH);
        let index = self.keys.len() as u8;
        self.keys.push(key);
        if mapped {
            debug_assert!(!self.map.contains_key(&key));
            self.map.insert(key, index);
        }
        index
    }

    /// Copies the first `prefix_length` positions into a fresh path for a
    /// divergent successor.
    ///
    /// The branch starts with no fixed fields of its own. When the branch
    /// point could already be visible through a shared type or a prototype,
    /// the used-fixed bits are copied conservatively so that writes through
    /// the branch still invalidate guards taken against the original.
    pub(crate) fn branch(&self, prefix_length: u8, could_see_proto: bool) -> Self {
        debug_assert!(prefix_length <= self.len());
        let keys: Vec<PropertyKey> = self.keys[..prefix_length as usize].to_vec();
        let mut map = AHashMap::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            if self.map.get(key) == Some(&(index as u8)) {
                map.insert(*key, index as u8);
            }
        }
        let mask = if prefix_length as usize >= MAX_PATH_LENGTH {
            u128::MAX
        } else {
            bit(prefix_length) - 1
        };
        Self {
            keys,
            map,
            fixed_fields: 0,
            used_fixed_fields: if could_see_proto {
                self.used_fixed_fields & mask
            } else {
                0
            },
            max_initialized_length: prefix_length,
            singleton: SingletonState::Vacant,
        }
    }

    pub(crate) fn max_initialized_length(&self) -> u8 {
        self.max_initialized_length
    }

    pub(crate) fn singleton_instance(&self) -> Option<ObjectIndex> {
        match self.singleton {
            SingletonState::Instance(object) => Some(object),
            _ => None,
        }
    }

    /// Claims the path for its first instance. A retired path stays retired.
    pub(crate) fn claim_singleton(&mut self, instance: ObjectIndex) {
        if self.singleton == SingletonState::Vacant {
            self.singleton = SingletonState::Instance(instance);
        }
    }

    /// Permanently gives up singleton tracking for this path.
    pub(crate) fn retire_singleton(&mut self) {
        self.singleton = SingletonState::Shared;
    }

    pub(crate) fn is_fixed_at(&self, index: u8) -> bool {
        index < self.max_initialized_length && self.fixed_fields & bit(index) != 0
    }

    pub(crate) fn is_used_fixed_at(&self, index: u8) -> bool {
        self.used_fixed_fields & bit(index) != 0
    }

    pub(crate) fn set_used_fixed_at(&mut self, index: u8) {
        debug_assert!(self.is_fixed_at(index));
        self.used_fixed_fields |= bit(index);
    }

    pub(crate) fn clear_fixed_at(&mut self, index: u8) {
        self.fixed_fields &= !bit(index);
        self.used_fixed_fields &= !bit(index);
    }

    /// Records the first write of `index` without any fixed-value claim.
    pub(crate) fn add_blank_field_at(&mut self, index: u8) {
        debug_assert!(index >= self.max_initialized_length);
        self.max_initialized_length = index + 1;
    }

    /// Records the first write of `index` by the path's singleton instance,
    /// optionally claiming the stored value as fixed.
    pub(crate) fn add_singleton_field_at(&mut self, instance: ObjectIndex, index: u8, fix: bool) {
        debug_assert!(index >= self.max_initialized_length);
        debug_assert_eq!(self.singleton, SingletonState::Instance(instance));
        if fix {
            self.fixed_fields |= bit(index);
        }
        self.max_initialized_length = index + 1;
    }

    /// Raises the initialized bound when a type on this path becomes shared;
    /// uninitialized trailing slots can no longer be fixed after that.
    pub(crate) fn raise_initialized_length(&mut self, length: u8) {
        if self.max_initialized_length < length {
            self.max_initialized_length = length;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyName;

    fn key(id: u32) -> PropertyKey {
        PropertyKey::String(PropertyName::from_u32_index(id))
    }

    #[test]
    fn lookup_respects_prefix_length() {
        let mut path = TypePathRecord::new();
        path.add(key(0), true);
        path.add(key(1), true);
        assert_eq!(path.lookup(key(1), 2), Some(1));
        assert_eq!(path.lookup(key(1), 1), None);
        assert_eq!(path.lookup(key(2), 2), None);
    }

    #[test]
    fn unmapped_entries_are_invisible() {
        let mut path = TypePathRecord::new();
        path.add(key(0), true);
        let setter = path.add(key(0), false);
        assert_eq!(setter, 1);
        assert_eq!(path.lookup(key(0), 2), Some(0));
    }

    #[test]
    fn branch_copies_prefix_and_drops_fixed_bits() {
        let mut path = TypePathRecord::new();
        let instance = ObjectIndex::from_index(0);
        path.claim_singleton(instance);
        path.add(key(0), true);
        path.add_singleton_field_at(instance, 0, true);
        path.add(key(1), true);
        path.add_singleton_field_at(instance, 1, true);
        path.set_used_fixed_at(0);

        let branch = path.branch(1, true);
        assert_eq!(branch.len(), 1);
        assert_eq!(branch.lookup(key(0), 1), Some(0));
        assert!(!branch.is_fixed_at(0));
        // Guard invalidation still reaches uses taken against the original.
        assert!(branch.is_used_fixed_at(0));
        assert!(!branch.is_used_fixed_at(1));
        assert_eq!(branch.singleton_instance(), None);
    }

    #[test]
    fn singleton_state_is_monotonic() {
        let mut path = TypePathRecord::new();
        let first = ObjectIndex::from_index(0);
        let second = ObjectIndex::from_index(1);
        path.claim_singleton(first);
        assert_eq!(path.singleton_instance(), Some(first));
        path.claim_singleton(second);
        assert_eq!(path.singleton_instance(), Some(first));
        path.retire_singleton();
        assert_eq!(path.singleton_instance(), None);
        path.claim_singleton(second);
        assert_eq!(path.singleton_instance(), None);
    }
}
