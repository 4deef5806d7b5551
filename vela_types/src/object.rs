// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::AHashMap;

use crate::execution::Agent;
use crate::heap::indexes::{ObjectIndex, ScriptContextId, TypeIndex};
use crate::types::{SlotLocation, Value};

/// Heap data of one object: its current type, the inline slots allocated
/// with it, the auxiliary slot array grown on demand, and the item store
/// used once the object holds index properties.
///
/// The object knows nothing about which property occupies which slot; that
/// mapping lives entirely in the type's handler.
#[derive(Debug)]
pub struct ObjectRecord {
    pub(crate) context: ScriptContextId,
    pub(crate) ty: TypeIndex,
    pub(crate) inline_slots: Box<[Value]>,
    pub(crate) aux_slots: Vec<Value>,
    pub(crate) items: Option<AHashMap<u32, Value>>,
    /// Set once the object is installed as some other object's prototype.
    pub(crate) is_prototype: bool,
}

impl ObjectRecord {
    pub(crate) fn new(context: ScriptContextId, ty: TypeIndex, inline_slot_capacity: u16) -> Self {
        Self {
            context,
            ty,
            inline_slots: vec![Value::Undefined; inline_slot_capacity as usize].into_boxed_slice(),
            aux_slots: Vec::new(),
            items: None,
            is_prototype: false,
        }
    }

    pub(crate) fn slot(&self, location: SlotLocation) -> Value {
        if location.is_inline {
            self.inline_slots[location.index as usize]
        } else {
            self.aux_slots[location.index as usize]
        }
    }

    pub(crate) fn set_slot(&mut self, location: SlotLocation, value: Value) {
        if location.is_inline {
            self.inline_slots[location.index as usize] = value;
        } else {
            self.aux_slots[location.index as usize] = value;
        }
    }

    /// Grows the auxiliary slot array to exactly `capacity` slots. Growing
    /// to a cached transition's required capacity alone must make the new
    /// slot addressable; nothing rounds this up further.
    pub(crate) fn ensure_aux_capacity(&mut self, capacity: u16) {
        if self.aux_slots.len() < capacity as usize {
            self.aux_slots.resize(capacity as usize, Value::Undefined);
        }
    }

    pub(crate) fn item(&self, item: u32) -> Option<Value> {
        self.items.as_ref().and_then(|items| items.get(&item).copied())
    }

    pub(crate) fn set_item(&mut self, item: u32, value: Value) {
        self.items.get_or_insert_default().insert(item, value);
    }

    pub(crate) fn remove_item(&mut self, item: u32) {
        if let Some(items) = self.items.as_mut() {
            items.remove(&item);
        }
    }
}

/// Reads the slot a property index maps to under the object's current
/// handler.
pub(crate) fn read_slot(agent: &Agent, object: ObjectIndex, index: u16) -> Value {
    let ty = agent.heap.objects[object.into_index()].ty;
    let location = agent.heap.types[ty.into_index()].handler.slot_location(index);
    agent.heap.objects[object.into_index()].slot(location)
}

/// Writes the slot a property index maps to, growing auxiliary storage to
/// the handler's capacity when needed.
pub(crate) fn write_slot(agent: &mut Agent, object: ObjectIndex, index: u16, value: Value) {
    let ty = agent.heap.objects[object.into_index()].ty;
    let (location, aux_capacity) = {
        let handler = &agent.heap.types[ty.into_index()].handler;
        (
            handler.slot_location(index),
            handler.slot_capacity() - handler.inline_slot_capacity(),
        )
    };
    let record = &mut agent.heap.objects[object.into_index()];
    if !location.is_inline {
        record.ensure_aux_capacity(aux_capacity);
    }
    record.set_slot(location, value);
}
