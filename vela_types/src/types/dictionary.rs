// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::AHashMap;

use crate::types::{PropertyKey, attributes::SlotAttributes, handler::grown_slot_capacity};

/// Escape form for objects whose property history no longer fits a path:
/// an insertion-ordered descriptor table with per-property attributes and
/// support for deletion. No accessors and no attributed index properties;
/// those need the full [`DictionaryHandler`].
///
/// Dictionary handlers are terminal and per-instance. A shape change
/// (add, delete, attribute flip) still moves the instance to a fresh type
/// so that stale inline caches fail their type check.
#[derive(Debug, Clone)]
pub(crate) struct SimpleDictionaryHandler {
    map: AHashMap<PropertyKey, u16>,
    descriptors: Vec<DictionaryDescriptor>,
    pub(crate) slot_capacity: u16,
    pub(crate) inline_slot_capacity: u16,
}

#[derive(Debug, Clone, Copy)]
struct DictionaryDescriptor {
    key: PropertyKey,
    attributes: SlotAttributes,
}

impl SimpleDictionaryHandler {
    pub(crate) fn with_capacity(
        capacity: usize,
        slot_capacity: u16,
        inline_slot_capacity: u16,
    ) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity),
            descriptors: Vec::with_capacity(capacity),
            slot_capacity,
            inline_slot_capacity,
        }
    }

    /// Appends a descriptor for a property that already occupies `index` on
    /// the instance. Used when converting from a path handler; slot layout
    /// is preserved so no values move.
    pub(crate) fn push_existing(&mut self, key: PropertyKey, attributes: SlotAttributes) {
        let index = self.descriptors.len() as u16;
        self.descriptors.push(DictionaryDescriptor { key, attributes });
        self.map.insert(key, index);
    }

    pub(crate) fn lookup(&self, key: PropertyKey) -> Option<(u16, SlotAttributes)> {
        let index = *self.map.get(&key)?;
        let attributes = self.descriptors[index as usize].attributes;
        debug_assert!(!attributes.is_deleted());
        Some((index, attributes))
    }

    pub(crate) fn add(&mut self, key: PropertyKey, attributes: SlotAttributes) -> u16 {
        debug_assert!(!self.map.contains_key(&key));
        let index = self.descriptors.len() as u16;
        self.descriptors.push(DictionaryDescriptor { key, attributes });
        self.map.insert(key, index);
        self.slot_capacity =
            grown_slot_capacity(self.slot_capacity, self.inline_slot_capacity, index + 1);
        index
    }

    pub(crate) fn set_attributes_at(&mut self, index: u16, attributes: SlotAttributes) {
        self.descriptors[index as usize].attributes = attributes;
    }

    /// Tombstones the descriptor; the slot is not reused.
    pub(crate) fn remove(&mut self, key: PropertyKey) {
        if let Some(index) = self.map.remove(&key) {
            self.descriptors[index as usize].attributes = SlotAttributes::DELETED_ENTRY;
        }
    }
}

/// Full dictionary form: everything the simple form does, plus accessor
/// pairs (getter slot and setter slot) and attributed item properties.
/// Item values live on the instance; only their attributes live here.
#[derive(Debug, Clone)]
pub(crate) struct DictionaryHandler {
    map: AHashMap<PropertyKey, u16>,
    descriptors: Vec<FullDictionaryDescriptor>,
    item_attributes: AHashMap<u32, SlotAttributes>,
    pub(crate) slot_capacity: u16,
    pub(crate) inline_slot_capacity: u16,
}

#[derive(Debug, Clone, Copy)]
struct FullDictionaryDescriptor {
    key: PropertyKey,
    attributes: SlotAttributes,
    setter_index: Option<u16>,
}

/// Copy of one descriptor handed to callers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DictionaryLookup {
    pub(crate) index: u16,
    pub(crate) attributes: SlotAttributes,
    pub(crate) setter_index: Option<u16>,
}

impl DictionaryHandler {
    pub(crate) fn with_capacity(
        capacity: usize,
        slot_capacity: u16,
        inline_slot_capacity: u16,
    ) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity),
            descriptors: Vec::with_capacity(capacity),
            item_attributes: AHashMap::new(),
            slot_capacity,
            inline_slot_capacity,
        }
    }

    pub(crate) fn from_simple(simple: &SimpleDictionaryHandler) -> Self {
        let mut handler = Self::with_capacity(
            simple.descriptors.len(),
            simple.slot_capacity,
            simple.inline_slot_capacity,
        );
        for descriptor in &simple.descriptors {
            handler.descriptors.push(FullDictionaryDescriptor {
                key: descriptor.key,
                attributes: descriptor.attributes,
                setter_index: None,
            });
        }
        handler.map = simple.map.clone();
        handler
    }

    /// Appends a descriptor for a property that already occupies slots on
    /// the instance, preserving layout across a path conversion.
    pub(crate) fn push_existing(
        &mut self,
        key: PropertyKey,
        attributes: SlotAttributes,
        setter_index: Option<u16>,
    ) {
        let index = self.descriptors.len() as u16;
        self.descriptors.push(FullDictionaryDescriptor {
            key,
            attributes,
            setter_index,
        });
        if !attributes.is_setter_entry() {
            self.map.insert(key, index);
        }
    }

    pub(crate) fn lookup(&self, key: PropertyKey) -> Option<DictionaryLookup> {
        let index = *self.map.get(&key)?;
        let descriptor = self.descriptors[index as usize];
        Some(DictionaryLookup {
            index,
            attributes: descriptor.attributes,
            setter_index: descriptor.setter_index,
        })
    }

    pub(crate) fn add(&mut self, key: PropertyKey, attributes: SlotAttributes) -> u16 {
        debug_assert!(!self.map.contains_key(&key));
        let index = self.descriptors.len() as u16;
        self.descriptors.push(FullDictionaryDescriptor {
            key,
            attributes,
            setter_index: None,
        });
        self.map.insert(key, index);
        self.slot_capacity =
            grown_slot_capacity(self.slot_capacity, self.inline_slot_capacity, index + 1);
        index
    }

    /// Allocates a getter and setter slot pair for `key`, or reuses an
    /// existing accessor descriptor's slots.
    pub(crate) fn add_accessor(
        &mut self,
        key: PropertyKey,
        attributes: SlotAttributes,
    ) -> (u16, u16) {
        if let Some(existing) = self.lookup(key) {
            if let Some(setter_index) = existing.setter_index {
                debug_assert!(existing.attributes.is_accessor());
                return (existing.index, setter_index);
            }
            // Data property turning into an accessor: keep the getter in the
            // old slot, allocate the setter slot.
            let setter_index = self.descriptors.len() as u16;
            self.descriptors.push(FullDictionaryDescriptor {
                key,
                attributes: SlotAttributes::SETTER_ENTRY,
                setter_index: None,
            });
            let descriptor = &mut self.descriptors[existing.index as usize];
            descriptor.attributes = attributes.with_accessor();
            descriptor.setter_index = Some(setter_index);
            self.slot_capacity = grown_slot_capacity(
                self.slot_capacity,
                self.inline_slot_capacity,
                setter_index + 1,
            );
            return (existing.index, setter_index);
        }
        let getter_index = self.descriptors.len() as u16;
        let setter_index = getter_index + 1;
        self.descriptors.push(FullDictionaryDescriptor {
            key,
            attributes: attributes.with_accessor(),
            setter_index: Some(setter_index),
        });
        self.descriptors.push(FullDictionaryDescriptor {
            key,
            attributes: SlotAttributes::SETTER_ENTRY,
            setter_index: None,
        });
        self.map.insert(key, getter_index);
        self.slot_capacity = grown_slot_capacity(
            self.slot_capacity,
            self.inline_slot_capacity,
            setter_index + 1,
        );
        (getter_index, setter_index)
    }

    pub(crate) fn set_attributes_at(&mut self, index: u16, attributes: SlotAttributes) {
        self.descriptors[index as usize].attributes = attributes;
    }

    pub(crate) fn remove(&mut self, key: PropertyKey) {
        if let Some(index) = self.map.remove(&key) {
            let descriptor = &mut self.descriptors[index as usize];
            if let Some(setter_index) = descriptor.setter_index {
                self.descriptors[setter_index as usize].attributes =
                    SlotAttributes::DELETED_ENTRY;
            }
            self.descriptors[index as usize].attributes = SlotAttributes::DELETED_ENTRY;
            self.descriptors[index as usize].setter_index = None;
        }
    }

    pub(crate) fn item_attributes(&self, item: u32) -> SlotAttributes {
        self.item_attributes
            .get(&item)
            .copied()
            .unwrap_or(SlotAttributes::DEFAULT)
    }

    pub(crate) fn set_item_attributes(&mut self, item: u32, attributes: SlotAttributes) {
        self.item_attributes.insert(item, attributes);
    }

    pub(crate) fn remove_item(&mut self, item: u32) {
        self.item_attributes.remove(&item);
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
    fn deleted_descriptors_disappear_from_lookup() {
        let mut handler = SimpleDictionaryHandler::with_capacity(2, 4, 4);
        handler.add(key(0), SlotAttributes::DEFAULT);
        handler.add(key(1), SlotAttributes::DEFAULT);
        handler.remove(key(0));
        assert!(handler.lookup(key(0)).is_none());
        assert_eq!(handler.lookup(key(1)).map(|(index, _)| index), Some(1));
    }

    #[test]
    fn slot_capacity_grows_in_chunks() {
        let mut handler = SimpleDictionaryHandler::with_capacity(0, 2, 2);
        for id in 0..3 {
            handler.add(key(id), SlotAttributes::DEFAULT);
        }
        // Two inline slots plus one auxiliary chunk.
        assert_eq!(handler.slot_capacity, 6);
    }

    #[test]
    fn accessor_pair_reuses_data_slot_for_getter() {
        let mut handler = DictionaryHandler::with_capacity(1, 4, 4);
        let data_index = handler.add(key(0), SlotAttributes::DEFAULT);
        let (getter_index, setter_index) = handler.add_accessor(key(0), SlotAttributes::DEFAULT);
        assert_eq!(getter_index, data_index);
        assert_eq!(setter_index, 1);
        let found = handler.lookup(key(0)).unwrap();
        assert!(found.attributes.is_accessor());
        assert_eq!(found.setter_index, Some(setter_index));
    }
}
