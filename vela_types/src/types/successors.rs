// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use hashbrown::HashMap;

use crate::heap::indexes::TypeIndex;
use crate::types::{PropertyKey, attributes::SlotAttributes};

/// Transition edge label: adding the same key with different attributes
/// leads to different successor types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SuccessorKey {
    pub(crate) key: PropertyKey,
    pub(crate) attributes: SlotAttributes,
}

/// Successor edges of one path type.
///
/// Most types only ever grow in one direction, so a single inline edge is
/// stored until a second distinct edge appears. The promotion to a map is
/// one-way.
#[derive(Debug)]
pub(crate) enum SuccessorInfo {
    Single(SuccessorKey, TypeIndex),
    Multi(HashMap<SuccessorKey, TypeIndex>),
}

impl SuccessorInfo {
    pub(crate) fn new(key: SuccessorKey, successor: TypeIndex) -> Self {
        Self::Single(key, successor)
    }

    pub(crate) fn get(&self, key: SuccessorKey) -> Option<TypeIndex> {
        match self {
            Self::Single(single_key, successor) => {
                (*single_key == key).then_some(*successor)
            }
            Self::Multi(map) => map.get(&key).copied(),
        }
    }

    pub(crate) fn insert(&mut self, key: SuccessorKey, successor: TypeIndex) {
        match self {
            Self::Single(single_key, existing) => {
                if *single_key == key {
                    *existing = successor;
                } else {
                    let mut map = HashMap::with_capacity(2);
                    map.insert(*single_key, *existing);
                    map.insert(key, successor);
                    *self = Self::Multi(map);
                }
            }
            Self::Multi(map) => {
                map.insert(key, successor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyName;

    fn successor_key(id: u32) -> SuccessorKey {
        SuccessorKey {
            key: PropertyKey::String(PropertyName::from_u32_index(id)),
            attributes: SlotAttributes::DEFAULT,
        }
    }

    #[test]
    fn single_edge_promotes_to_map() {
        let a = successor_key(0);
        let b = successor_key(1);
        let first = TypeIndex::from_index(0);
        let second = TypeIndex::from_index(1);

        let mut info = SuccessorInfo::new(a, first);
        assert!(matches!(info, SuccessorInfo::Single(..)));
        assert_eq!(info.get(a), Some(first));
        assert_eq!(info.get(b), None);

        info.insert(b, second);
        assert!(matches!(info, SuccessorInfo::Multi(_)));
        assert_eq!(info.get(a), Some(first));
        assert_eq!(info.get(b), Some(second));
    }

    #[test]
    fn same_key_different_attributes_are_distinct_edges() {
        let default = successor_key(0);
        let read_only = SuccessorKey {
            attributes: SlotAttributes::SETTER_ENTRY,
            ..default
        };
        let mut info = SuccessorInfo::new(default, TypeIndex::from_index(0));
        info.insert(read_only, TypeIndex::from_index(1));
        assert_eq!(info.get(default), Some(TypeIndex::from_index(0)));
        assert_eq!(info.get(read_only), Some(TypeIndex::from_index(1)));
    }
}
