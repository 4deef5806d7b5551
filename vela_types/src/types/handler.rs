// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::execution::Agent;
use crate::heap::indexes::{ObjectIndex, ScriptContextId};
use crate::types::{
    PropertyKey, Value,
    attributes::SlotAttributes,
    dictionary::{DictionaryHandler, SimpleDictionaryHandler},
    path_handler::PathTypeHandler,
};

/// A physical slot position on an object: either one of the inline slots
/// allocated with the object, or a position in its auxiliary slot array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLocation {
    pub index: u16,
    pub is_inline: bool,
}

/// The layout variants a type can take.
///
/// Objects are born with a path handler and stay on one for as long as their
/// property history fits the transition tree. Deletion, overlong paths,
/// attributed index properties and awkward accessor shapes escape to one of
/// the dictionary forms; those conversions are one-way.
#[derive(Debug)]
pub(crate) enum TypeHandler {
    Path(PathTypeHandler),
    SimpleDictionary(SimpleDictionaryHandler),
    Dictionary(DictionaryHandler),
}

impl TypeHandler {
    pub(crate) fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    pub(crate) fn slot_capacity(&self) -> u16 {
        match self {
            Self::Path(handler) => handler.slot_capacity,
            Self::SimpleDictionary(handler) => handler.slot_capacity,
            Self::Dictionary(handler) => handler.slot_capacity,
        }
    }

    pub(crate) fn inline_slot_capacity(&self) -> u16 {
        match self {
            Self::Path(handler) => handler.inline_slot_capacity,
            Self::SimpleDictionary(handler) => handler.inline_slot_capacity,
            Self::Dictionary(handler) => handler.inline_slot_capacity,
        }
    }

    /// Maps a property index to the physical slot it occupies. The split
    /// point between inline and auxiliary storage is baked into the handler.
    pub(crate) fn slot_location(&self, index: u16) -> SlotLocation {
        let inline_slot_capacity = self.inline_slot_capacity();
        if index < inline_slot_capacity {
            SlotLocation {
                index,
                is_inline: true,
            }
        } else {
            SlotLocation {
                index: index - inline_slot_capacity,
                is_inline: false,
            }
        }
    }
}

/// One engine type: layout handler plus the identity data every instance of
/// the type shares.
#[derive(Debug)]
pub struct TypeRecord {
    pub(crate) context: ScriptContextId,
    pub(crate) prototype: Option<ObjectIndex>,
    pub(crate) handler: TypeHandler,
    /// Locked types never mutate their handler in place; property changes
    /// move the instance to another type instead.
    pub(crate) locked: bool,
    /// Shared types may describe more than one live object.
    pub(crate) shared: bool,
}

/// Computes the slot capacity after growing to hold `needed` slots.
/// Auxiliary capacity grows in chunks of four so that consecutive adds
/// usually transition within the capacity already allocated.
pub(crate) fn grown_slot_capacity(current: u16, inline_slot_capacity: u16, needed: u16) -> u16 {
    if needed <= current {
        current
    } else if needed <= inline_slot_capacity {
        inline_slot_capacity
    } else {
        inline_slot_capacity + (needed - inline_slot_capacity).next_multiple_of(4)
    }
}

/// Result of an own-property probe against an object's current handler.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OwnLookup {
    Data {
        index: u16,
        attributes: SlotAttributes,
    },
    Accessor {
        getter_index: u16,
        setter_index: Option<u16>,
        attributes: SlotAttributes,
    },
    /// Numeric property held in the object's item store.
    Item {
        value: Value,
        attributes: SlotAttributes,
    },
    None,
}

/// Probes `object`'s own properties without touching the prototype chain.
pub(crate) fn lookup_own(agent: &Agent, object: ObjectIndex, key: PropertyKey) -> OwnLookup {
    let ty = agent.heap.objects[object.into_index()].ty;
    match &agent.heap.types[ty.into_index()].handler {
        TypeHandler::Path(handler) => {
            if matches!(key, PropertyKey::Index(_)) {
                // Path types never hold index properties.
                return OwnLookup::None;
            }
            let path = &agent.heap.type_paths[handler.type_path.into_index()];
            match path.lookup(key, handler.path_length) {
                Some(index) => {
                    let attributes = handler.attribute_at(index);
                    if attributes.is_accessor() {
                        OwnLookup::Accessor {
                            getter_index: index as u16,
                            setter_index: handler.setter_index_at(index).map(u16::from),
                            attributes,
                        }
                    } else {
                        OwnLookup::Data {
                            index: index as u16,
                            attributes,
                        }
                    }
                }
                None => OwnLookup::None,
            }
        }
        TypeHandler::SimpleDictionary(handler) => match handler.lookup(key) {
            Some((index, attributes)) => OwnLookup::Data { index, attributes },
            None => OwnLookup::None,
        },
        TypeHandler::Dictionary(handler) => {
            if let PropertyKey::Index(item) = key {
                let record = &agent.heap.objects[object.into_index()];
                if let Some(value) = record.item(item) {
                    return OwnLookup::Item {
                        value,
                        attributes: handler.item_attributes(item),
                    };
                }
                // Index keys with accessors live in the descriptor table.
            }
            match handler.lookup(key) {
                Some(descriptor) => {
                    if descriptor.attributes.is_accessor() {
                        OwnLookup::Accessor {
                            getter_index: descriptor.index,
                            setter_index: descriptor.setter_index,
                            attributes: descriptor.attributes,
                        }
                    } else {
                        OwnLookup::Data {
                            index: descriptor.index,
                            attributes: descriptor.attributes,
                        }
                    }
                }
                None => OwnLookup::None,
            }
        }
    }
}
