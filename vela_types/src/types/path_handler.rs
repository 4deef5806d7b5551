// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::{debug, trace};

use crate::cache::operators::PropertyValueInfo;
use crate::execution::Agent;
use crate::heap::indexes::{ObjectIndex, ScriptContextId, TypeIndex, TypePathIndex};
use crate::object;
use crate::types::{
    PropertyError, PropertyKey, Value,
    attributes::{PropertyAttributes, SlotAttributes},
    dictionary::{DictionaryHandler, SimpleDictionaryHandler},
    handler::{TypeHandler, TypeRecord, grown_slot_capacity},
    successors::{SuccessorInfo, SuccessorKey},
    type_path::{MAX_PATH_LENGTH, TypePathRecord},
};

/// Lazily materialized attribute side-table for a path handler. Handlers
/// whose every slot is a default data slot carry no table at all.
#[derive(Debug, Clone)]
pub(crate) struct AttributeInfo {
    /// One entry per path slot.
    pub(crate) attributes: Vec<SlotAttributes>,
    /// For getter slots, the unmapped slot holding the paired setter.
    pub(crate) setters: Vec<Option<u8>>,
}

/// Type handler for objects living on the transition tree: the handler is a
/// prefix view of a shared [`TypePathRecord`] plus the slot capacities every
/// instance of the type was allocated with.
#[derive(Debug)]
pub(crate) struct PathTypeHandler {
    pub(crate) type_path: TypePathIndex,
    pub(crate) path_length: u8,
    pub(crate) slot_capacity: u16,
    pub(crate) inline_slot_capacity: u16,
    pub(crate) predecessor: Option<TypeIndex>,
    pub(crate) successors: Option<SuccessorInfo>,
    pub(crate) attributes: Option<Box<AttributeInfo>>,
}

impl PathTypeHandler {
    pub(crate) fn root(type_path: TypePathIndex, inline_slot_capacity: u16) -> Self {
        Self {
            type_path,
            path_length: 0,
            slot_capacity: inline_slot_capacity,
            inline_slot_capacity,
            predecessor: None,
            successors: None,
            attributes: None,
        }
    }

    pub(crate) fn attribute_at(&self, index: u8) -> SlotAttributes {
        match &self.attributes {
            Some(info) => info.attributes[index as usize],
            None => SlotAttributes::DEFAULT,
        }
    }

    pub(crate) fn setter_index_at(&self, index: u8) -> Option<u8> {
        self.attributes
            .as_ref()
            .and_then(|info| info.setters[index as usize])
    }

    pub(crate) fn has_accessors(&self) -> bool {
        self.attributes.as_ref().is_some_and(|info| {
            info.attributes
                .iter()
                .any(|a| a.is_accessor() || a.is_setter_entry())
        })
    }
}

fn path(agent: &Agent, ty: TypeIndex) -> &PathTypeHandler {
    match &agent.heap.types[ty.into_index()].handler {
        TypeHandler::Path(handler) => handler,
        _ => unreachable!("expected a path type handler"),
    }
}

fn path_mut(agent: &mut Agent, ty: TypeIndex) -> &mut PathTypeHandler {
    match &mut agent.heap.types[ty.into_index()].handler {
        TypeHandler::Path(handler) => handler,
        _ => unreachable!("expected a path type handler"),
    }
}

/// Root types are interned per script context on (prototype, inline
/// capacity): two empty objects born alike start on the very same type.
pub(crate) fn get_or_create_root_type(
    agent: &mut Agent,
    context: ScriptContextId,
    prototype: Option<ObjectIndex>,
    inline_slot_capacity: u16,
) -> TypeIndex {
    if let Some(ty) = agent.heap.contexts[context.into_index()]
        .root_type(prototype, inline_slot_capacity)
    {
        return ty;
    }
    let type_path = agent.heap.create_type_path(TypePathRecord::new());
    let ty = agent.heap.create_type(TypeRecord {
        context,
        prototype,
        handler: TypeHandler::Path(PathTypeHandler::root(type_path, inline_slot_capacity)),
        locked: true,
        shared: true,
    });
    agent.heap.contexts[context.into_index()].insert_root_type(
        prototype,
        inline_slot_capacity,
        ty,
    );
    ty
}

/// Finds or creates the successor of `ty` for adding one property.
///
/// An existing successor is shared on arrival (a second object is about to
/// use it), which retires its fixed fields. A new successor extends the
/// shared path if this type sits at its tip, and otherwise branches the
/// prefix onto a fresh path. Created types are born locked; they are born
/// shared only when `share_type` is set, as for object-literal types.
///
/// Returns the successor type and the property index of the added slot.
pub(crate) fn promote_type(
    agent: &mut Agent,
    ty: TypeIndex,
    key: SuccessorKey,
    share_type: bool,
    instance: Option<ObjectIndex>,
) -> (TypeIndex, u8) {
    let (type_path, path_length, slot_capacity, inline_slot_capacity) = {
        let handler = path(agent, ty);
        (
            handler.type_path,
            handler.path_length,
            handler.slot_capacity,
            handler.inline_slot_capacity,
        )
    };
    debug_assert!((path_length as usize) < MAX_PATH_LENGTH);

    if let Some(next) = path(agent, ty).successors.as_ref().and_then(|s| s.get(key)) {
        if !agent.heap.types[next.into_index()].shared {
            // A second instance is reaching this type; its fixed fields are
            // no longer single-owner.
            add_blank_field_at(agent, next, path_length);
            do_share_type_handler(agent, next);
        }
        return (next, path_length);
    }

    let branching = agent.heap.type_paths[type_path.into_index()].len() > path_length;
    let new_type_path = if branching {
        let could_see_proto = agent.heap.types[ty.into_index()].shared
            || instance
                .is_some_and(|instance| agent.heap.objects[instance.into_index()].is_prototype);
        trace!(prefix = path_length, "branching type path");
        let branched =
            agent.heap.type_paths[type_path.into_index()].branch(path_length, could_see_proto);
        agent.heap.create_type_path(branched)
    } else {
        type_path
    };

    let mapped = !key.attributes.is_setter_entry();
    let index = agent.heap.type_paths[new_type_path.into_index()].add(key.key, mapped);
    debug_assert_eq!(index, path_length);

    let attributes = {
        let handler = path(agent, ty);
        if handler.attributes.is_some() || key.attributes != SlotAttributes::DEFAULT {
            let mut info = handler
                .attributes
                .as_deref()
                .cloned()
                .unwrap_or_else(|| AttributeInfo {
                    attributes: vec![SlotAttributes::DEFAULT; path_length as usize],
                    setters: vec![None; path_length as usize],
                });
            info.attributes.push(key.attributes);
            info.setters.push(None);
            Some(Box::new(info))
        } else {
            None
        }
    };

    let new_slot_capacity =
        grown_slot_capacity(slot_capacity, inline_slot_capacity, path_length as u16 + 1);
    let (context, prototype) = {
        let record = &agent.heap.types[ty.into_index()];
        (record.context, record.prototype)
    };
    let new_ty = agent.heap.create_type(TypeRecord {
        context,
        prototype,
        handler: TypeHandler::Path(PathTypeHandler {
            type_path: new_type_path,
            path_length: path_length + 1,
            slot_capacity: new_slot_capacity,
            inline_slot_capacity,
            predecessor: Some(ty),
            successors: None,
            attributes,
        }),
        locked: true,
        shared: share_type,
    });

    let handler = path_mut(agent, ty);
    if let Some(successors) = handler.successors.as_mut() {
        successors.insert(key, new_ty);
    } else {
        handler.successors = Some(SuccessorInfo::new(key, new_ty));
    }

    if share_type {
        add_blank_field_at(agent, new_ty, index);
    } else if let Some(instance) = instance {
        agent.heap.type_paths[new_type_path.into_index()].claim_singleton(instance);
    }
    trace!(key = ?key.key, index, shared = share_type, "created successor type");
    (new_ty, index)
}

/// Clears the fixed bit for a slot, invalidating any property guards taken
/// against it.
pub(crate) fn invalidate_fixed_field_at(
    agent: &mut Agent,
    type_path: TypePathIndex,
    key: PropertyKey,
    index: u8,
) {
    if agent.heap.type_paths[type_path.into_index()].is_used_fixed_at(index) {
        debug!(key = ?key, index, "invalidating fixed field guards");
        agent.guards.invalidate_for(key);
    }
    agent.heap.type_paths[type_path.into_index()].clear_fixed_at(index);
}

/// Marks a slot initialized without any fixed-value claim, or invalidates
/// the claim if the slot was already initialized.
pub(crate) fn add_blank_field_at(agent: &mut Agent, ty: TypeIndex, index: u8) {
    let type_path = path(agent, ty).type_path;
    if index >= agent.heap.type_paths[type_path.into_index()].max_initialized_length() {
        agent.heap.type_paths[type_path.into_index()].add_blank_field_at(index);
    } else {
        let key = agent.heap.type_paths[type_path.into_index()].key_at(index);
        invalidate_fixed_field_at(agent, type_path, key, index);
    }
}

/// Makes `ty` safe for multiple instances: every fixed field on its prefix
/// is invalidated and the path's singleton retires.
pub(crate) fn do_share_type_handler(agent: &mut Agent, ty: TypeIndex) {
    let (type_path, path_length) = {
        let handler = path(agent, ty);
        (handler.type_path, handler.path_length)
    };
    for index in 0..path_length {
        let key = agent.heap.type_paths[type_path.into_index()].key_at(index);
        invalidate_fixed_field_at(agent, type_path, key, index);
    }
    let record = &mut agent.heap.type_paths[type_path.into_index()];
    record.raise_initialized_length(path_length);
    record.retire_singleton();
    let record = &mut agent.heap.types[ty.into_index()];
    record.shared = true;
    record.locked = true;
}

/// Fixed-field bookkeeping for one slot write through an unshared handler.
///
/// Returns whether the write may be recorded in an inline cache. The first
/// write of a function-valued slot by the path's singleton claims the slot
/// as fixed and must stay on the slow path, so that a later overwrite is
/// seen and invalidates the claim.
fn process_fixed_field_change(
    agent: &mut Agent,
    instance: ObjectIndex,
    key: PropertyKey,
    index: u8,
    value: Value,
    old_ty: TypeIndex,
) -> bool {
    let ty = agent.heap.objects[instance.into_index()].ty;
    let type_path = path(agent, ty).type_path;
    if old_ty != ty {
        // A branch left the old path behind; drop any singleton claim the
        // instance held there.
        let old_type_path = path(agent, old_ty).type_path;
        if old_type_path != type_path
            && agent.heap.type_paths[old_type_path.into_index()].singleton_instance()
                == Some(instance)
        {
            agent.heap.type_paths[old_type_path.into_index()].retire_singleton();
        }
    }
    let max_initialized = agent.heap.type_paths[type_path.into_index()].max_initialized_length();
    if index >= max_initialized {
        let record = &mut agent.heap.type_paths[type_path.into_index()];
        if record.singleton_instance() == Some(instance) {
            let fix = matches!(value, Value::Function(_));
            record.add_singleton_field_at(instance, index, fix);
            !fix
        } else {
            record.add_blank_field_at(index);
            true
        }
    } else {
        invalidate_fixed_field_at(agent, type_path, key, index);
        true
    }
}

/// Reports a property as a compile-time constant candidate: the value of a
/// fixed slot on a path still owned by a single instance from the requesting
/// context. The use is recorded and a guard is handed out; any later write
/// or sharing of the slot invalidates the guard.
pub(crate) fn try_use_fixed_property(
    agent: &mut Agent,
    ty: TypeIndex,
    key: PropertyKey,
    request_context: ScriptContextId,
) -> Option<(Value, crate::execution::PropertyGuard)> {
    let TypeHandler::Path(handler) = &agent.heap.types[ty.into_index()].handler else {
        return None;
    };
    let type_path = handler.type_path;
    let index = agent.heap.type_paths[type_path.into_index()].lookup(key, handler.path_length)?;
    if handler.attribute_at(index).is_accessor() {
        return None;
    }
    let location = agent.heap.types[ty.into_index()]
        .handler
        .slot_location(index as u16);
    let record = &agent.heap.type_paths[type_path.into_index()];
    if !record.is_fixed_at(index) {
        return None;
    }
    let owner = record.singleton_instance()?;
    if agent.heap.objects[owner.into_index()].context != request_context {
        return None;
    }
    let value = agent.heap.objects[owner.into_index()].slot(location);
    agent.heap.type_paths[type_path.into_index()].set_used_fixed_at(index);
    let guard = agent.guards.register(key);
    trace!(key = ?key, index, "fixed property use recorded");
    Some((value, guard))
}

/// Writes an existing or freshly added slot and decides cache population.
pub(crate) fn set_slot_and_cache(
    agent: &mut Agent,
    instance: ObjectIndex,
    key: PropertyKey,
    index: u8,
    attributes: SlotAttributes,
    value: Value,
    old_ty: TypeIndex,
    info: &mut PropertyValueInfo,
) {
    let ty = agent.heap.objects[instance.into_index()].ty;
    let populate = if agent.heap.types[ty.into_index()].shared {
        true
    } else {
        process_fixed_field_change(agent, instance, key, index, value, old_ty)
    };
    object::write_slot(agent, instance, index as u16, value);
    if populate {
        info.set_field(instance, index as u16, attributes);
    } else {
        info.set_no_cache(instance);
    }
}

/// Adds a property to a path-typed instance. Returns false when the path
/// representation overflowed and the instance escaped to a dictionary; the
/// caller retries against the new handler.
pub(crate) fn add_property(
    agent: &mut Agent,
    instance: ObjectIndex,
    key: PropertyKey,
    value: Value,
    attributes: SlotAttributes,
    info: &mut PropertyValueInfo,
) -> bool {
    debug_assert!(matches!(key, PropertyKey::String(_)));
    let ty = agent.heap.objects[instance.into_index()].ty;
    if path(agent, ty).path_length as usize >= MAX_PATH_LENGTH {
        debug!("path length limit reached");
        convert_to_simple_dictionary(agent, instance);
        return false;
    }
    let (new_ty, index) = promote_type(
        agent,
        ty,
        SuccessorKey { key, attributes },
        false,
        Some(instance),
    );
    agent.heap.objects[instance.into_index()].ty = new_ty;
    set_slot_and_cache(agent, instance, key, index, attributes, value, ty, info);
    true
}

/// Moves one slot to different attributes by replaying the property tail
/// from the slot's position with the adjusted edge label. Slot layout is
/// unchanged, so no values move; only the instance's type does.
///
/// Returns false when the handler had to escape to a dictionary instead.
pub(crate) fn widen_attributes(
    agent: &mut Agent,
    instance: ObjectIndex,
    index: u8,
    new_attributes: SlotAttributes,
) -> bool {
    let ty = agent.heap.objects[instance.into_index()].ty;
    let (type_path, path_length) = {
        let handler = path(agent, ty);
        (handler.type_path, handler.path_length)
    };
    if path(agent, ty).attribute_at(index) == new_attributes {
        return true;
    }

    let mut edges = Vec::with_capacity(path_length as usize);
    for i in 0..path_length {
        let key = agent.heap.type_paths[type_path.into_index()].key_at(i);
        let attributes = if i == index {
            new_attributes
        } else {
            path(agent, ty).attribute_at(i)
        };
        edges.push(SuccessorKey { key, attributes });
    }
    let setters: Vec<Option<u8>> = path(agent, ty)
        .attributes
        .as_ref()
        .map(|info| info.setters.clone())
        .unwrap_or_else(|| vec![None; path_length as usize]);

    // Walk back to the type the property was added on.
    let mut current = ty;
    while path(agent, current).path_length > index {
        match path(agent, current).predecessor {
            Some(predecessor) => current = predecessor,
            None => {
                convert_to_simple_dictionary(agent, instance);
                return false;
            }
        }
    }
    // Replay the tail with the adjusted attributes.
    for (i, edge) in edges.iter().enumerate().skip(index as usize) {
        let (next, slot) = promote_type(agent, current, *edge, false, Some(instance));
        debug_assert_eq!(slot as usize, i);
        add_blank_field_at(agent, next, slot);
        current = next;
    }
    // Accessor pairing is layout information and survives the replay.
    if setters.iter().any(|setter| setter.is_some())
        && let Some(attribute_info) = path_mut(agent, current).attributes.as_deref_mut()
    {
        attribute_info.setters = setters;
    }
    agent.heap.objects[instance.into_index()].ty = current;
    debug!(index, "widened slot attributes");
    true
}

/// Installs an accessor pair for `key`: getter in the mapped slot, setter in
/// an unmapped path slot. Returns Ok(false) when the handler escaped to a
/// dictionary and the caller must retry.
pub(crate) fn set_accessors(
    agent: &mut Agent,
    instance: ObjectIndex,
    key: PropertyKey,
    getter: Value,
    setter: Value,
) -> Result<bool, PropertyError> {
    let ty = agent.heap.objects[instance.into_index()].ty;
    let existing = {
        let handler = path(agent, ty);
        agent.heap.type_paths[handler.type_path.into_index()]
            .lookup(key, handler.path_length)
            .map(|index| {
                (
                    index,
                    handler.attribute_at(index),
                    handler.setter_index_at(index),
                )
            })
    };
    match existing {
        Some((index, attributes, setter_index)) if attributes.is_accessor() => {
            let setter_index =
                setter_index.unwrap_or_else(|| unreachable!("accessor slot without setter slot"));
            object::write_slot(agent, instance, index as u16, getter);
            object::write_slot(agent, instance, setter_index as u16, setter);
            Ok(true)
        }
        Some((index, attributes, _)) => {
            if !attributes.is_configurable() {
                return Err(PropertyError::NotConfigurable);
            }
            if !widen_attributes(agent, instance, index, attributes.with_accessor()) {
                return Ok(false);
            }
            let ty = agent.heap.objects[instance.into_index()].ty;
            if path(agent, ty).path_length as usize >= MAX_PATH_LENGTH {
                convert_to_dictionary(agent, instance);
                return Ok(false);
            }
            let (new_ty, setter_slot) = promote_type(
                agent,
                ty,
                SuccessorKey {
                    key,
                    attributes: SlotAttributes::SETTER_ENTRY,
                },
                false,
                Some(instance),
            );
            agent.heap.objects[instance.into_index()].ty = new_ty;
            add_blank_field_at(agent, new_ty, setter_slot);
            if let Some(attribute_info) = path_mut(agent, new_ty).attributes.as_deref_mut() {
                attribute_info.setters[index as usize] = Some(setter_slot);
            }
            object::write_slot(agent, instance, index as u16, getter);
            object::write_slot(agent, instance, setter_slot as u16, setter);
            Ok(true)
        }
        None => {
            if path(agent, ty).path_length as usize + 2 > MAX_PATH_LENGTH {
                convert_to_dictionary(agent, instance);
                return Ok(false);
            }
            let accessor_attributes = SlotAttributes::from(PropertyAttributes {
                writable: false,
                enumerable: true,
                configurable: true,
            })
            .with_accessor();
            let (getter_ty, getter_slot) = promote_type(
                agent,
                ty,
                SuccessorKey {
                    key,
                    attributes: accessor_attributes,
                },
                false,
                Some(instance),
            );
            let (setter_ty, setter_slot) = promote_type(
                agent,
                getter_ty,
                SuccessorKey {
                    key,
                    attributes: SlotAttributes::SETTER_ENTRY,
                },
                false,
                Some(instance),
            );
            agent.heap.objects[instance.into_index()].ty = setter_ty;
            add_blank_field_at(agent, setter_ty, getter_slot);
            add_blank_field_at(agent, setter_ty, setter_slot);
            if let Some(attribute_info) = path_mut(agent, setter_ty).attributes.as_deref_mut() {
                attribute_info.setters[getter_slot as usize] = Some(setter_slot);
            }
            object::write_slot(agent, instance, getter_slot as u16, getter);
            object::write_slot(agent, instance, setter_slot as u16, setter);
            Ok(true)
        }
    }
}

/// One-way escape to the simple dictionary form. Slot layout is preserved;
/// only the instance's type changes.
pub(crate) fn convert_to_simple_dictionary(agent: &mut Agent, instance: ObjectIndex) {
    let ty = agent.heap.objects[instance.into_index()].ty;
    let (type_path, path_length, slot_capacity, inline_slot_capacity) = {
        let handler = path(agent, ty);
        (
            handler.type_path,
            handler.path_length,
            handler.slot_capacity,
            handler.inline_slot_capacity,
        )
    };
    debug_assert!(!path(agent, ty).has_accessors());
    release_path_claims(agent, type_path, path_length);

    let mut handler = SimpleDictionaryHandler::with_capacity(
        path_length as usize,
        slot_capacity,
        inline_slot_capacity,
    );
    for index in 0..path_length {
        let key = agent.heap.type_paths[type_path.into_index()].key_at(index);
        let attributes = path(agent, ty).attribute_at(index);
        handler.push_existing(key, attributes);
    }
    let (context, prototype) = {
        let record = &agent.heap.types[ty.into_index()];
        (record.context, record.prototype)
    };
    let new_ty = agent.heap.create_type(TypeRecord {
        context,
        prototype,
        handler: TypeHandler::SimpleDictionary(handler),
        locked: false,
        shared: false,
    });
    agent.heap.objects[instance.into_index()].ty = new_ty;
    debug!("converted path type to simple dictionary");
}

/// One-way escape to the full dictionary form, for accessor shapes and item
/// properties the path and simple forms cannot hold.
pub(crate) fn convert_to_dictionary(agent: &mut Agent, instance: ObjectIndex) {
    let ty = agent.heap.objects[instance.into_index()].ty;
    let (type_path, path_length, slot_capacity, inline_slot_capacity) = {
        let handler = path(agent, ty);
        (
            handler.type_path,
            handler.path_length,
            handler.slot_capacity,
            handler.inline_slot_capacity,
        )
    };
    release_path_claims(agent, type_path, path_length);

    let mut handler = DictionaryHandler::with_capacity(
        path_length as usize,
        slot_capacity,
        inline_slot_capacity,
    );
    for index in 0..path_length {
        let key = agent.heap.type_paths[type_path.into_index()].key_at(index);
        let attributes = path(agent, ty).attribute_at(index);
        let setter_index = path(agent, ty).setter_index_at(index).map(u16::from);
        handler.push_existing(key, attributes, setter_index);
    }
    let (context, prototype) = {
        let record = &agent.heap.types[ty.into_index()];
        (record.context, record.prototype)
    };
    let new_ty = agent.heap.create_type(TypeRecord {
        context,
        prototype,
        handler: TypeHandler::Dictionary(handler),
        locked: false,
        shared: false,
    });
    agent.heap.objects[instance.into_index()].ty = new_ty;
    debug!("converted path type to dictionary");
}

/// Drops every fixed-field claim on a path prefix before the layout goes
/// dynamic.
fn release_path_claims(agent: &mut Agent, type_path: TypePathIndex, path_length: u8) {
    for index in 0..path_length {
        let key = agent.heap.type_paths[type_path.into_index()].key_at(index);
        invalidate_fixed_field_at(agent, type_path, key, index);
    }
    agent.heap.type_paths[type_path.into_index()].retire_singleton();
}
