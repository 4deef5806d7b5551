// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property operation entry points: probe the call-site cache, on miss walk
//! the prototype chain through the type handlers, then let the cache
//! operators decide what the call site may remember. Each completed
//! top-level operation populates its cache at most once.

use crate::cache::operators::{PropertyValueInfo, cache_property_read, cache_property_write};
use crate::cache::records::{self, CacheEntry, CacheRef};
use crate::execution::{Agent, CachePolicy, PropertyGuard};
use crate::heap::indexes::{ObjectIndex, ScriptContextId, TypeIndex};
use crate::object;
use crate::types::{
    OwnLookup, PropertyAttributes, PropertyError, PropertyKey, TypeHandler, Value,
    attributes::SlotAttributes,
    dictionary::DictionaryHandler,
    handler::TypeRecord,
    lookup_own, path_handler,
    successors::SuccessorKey,
};

/// Result of a property read. Accessor hits are returned to the caller for
/// invocation; this crate never calls into engine values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadOutcome {
    Value(Value),
    Getter { getter: Value, owner: ObjectIndex },
    Missing,
}

/// Result of a property write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteOutcome {
    Written,
    /// Non-strict mode silently ignored an illegal write.
    Ignored,
    Setter { setter: Value, owner: ObjectIndex },
}

/// Reads `key` off `receiver`, probing the call-site cache first.
pub fn get_property(
    agent: &mut Agent,
    policy: CachePolicy,
    receiver: ObjectIndex,
    key: PropertyKey,
    cache: Option<CacheRef>,
    request_context: ScriptContextId,
) -> ReadOutcome {
    if policy.enabled
        && let Some(cache_ref) = cache
    {
        let ty = agent.heap.objects[receiver.into_index()].ty;
        for entry in records::entries(agent, cache_ref).into_iter().flatten() {
            match entry {
                CacheEntry::Local { ty: cached, slot } if cached == ty => {
                    return ReadOutcome::Value(agent.heap.objects[receiver.into_index()].slot(slot));
                }
                CacheEntry::Proto {
                    ty: cached,
                    owner,
                    slot,
                } if cached == ty => {
                    return ReadOutcome::Value(agent.heap.objects[owner.into_index()].slot(slot));
                }
                CacheEntry::Missing { ty: cached } if cached == ty => {
                    return ReadOutcome::Missing;
                }
                _ => {}
            }
        }
    }

    let mut info = PropertyValueInfo::new(cache);
    let mut current = receiver;
    loop {
        match lookup_own(agent, current, key) {
            OwnLookup::Data { index, attributes } => {
                info.set_field(current, index, attributes);
                let value = object::read_slot(agent, current, index);
                cache_property_read(
                    agent,
                    policy,
                    receiver,
                    current,
                    key,
                    false,
                    &info,
                    request_context,
                );
                return ReadOutcome::Value(value);
            }
            OwnLookup::Accessor { getter_index, .. } => {
                let getter = object::read_slot(agent, current, getter_index);
                return ReadOutcome::Getter {
                    getter,
                    owner: current,
                };
            }
            OwnLookup::Item { value, .. } => return ReadOutcome::Value(value),
            OwnLookup::None => {
                let ty = agent.heap.objects[current.into_index()].ty;
                match agent.heap.types[ty.into_index()].prototype {
                    Some(prototype) => current = prototype,
                    None => {
                        cache_property_read(
                            agent,
                            policy,
                            receiver,
                            receiver,
                            key,
                            true,
                            &info,
                            request_context,
                        );
                        return ReadOutcome::Missing;
                    }
                }
            }
        }
    }
}

/// Writes `key` on `object`, probing the call-site cache first. The fast
/// paths perform the raw slot access; the transition fast path additionally
/// grows auxiliary storage to exactly the cached capacity and swaps the
/// type without re-entering the handler.
pub fn set_property(
    agent: &mut Agent,
    policy: CachePolicy,
    object: ObjectIndex,
    key: PropertyKey,
    value: Value,
    strict: bool,
    cache: Option<CacheRef>,
    request_context: ScriptContextId,
) -> Result<WriteOutcome, PropertyError> {
    if policy.enabled
        && let Some(cache_ref) = cache
    {
        let ty = agent.heap.objects[object.into_index()].ty;
        for entry in records::entries(agent, cache_ref).into_iter().flatten() {
            match entry {
                // Read entries are never consulted here: Local population
                // does not screen for writability or fixed-field claims.
                CacheEntry::StoreField { ty: cached, slot } if cached == ty => {
                    agent.heap.objects[object.into_index()].set_slot(slot, value);
                    return Ok(WriteOutcome::Written);
                }
                CacheEntry::Transition {
                    old_ty,
                    new_ty,
                    slot,
                    required_aux_slot_capacity,
                } if old_ty == ty => {
                    let record = &mut agent.heap.objects[object.into_index()];
                    if required_aux_slot_capacity > 0 {
                        record.ensure_aux_capacity(required_aux_slot_capacity);
                    }
                    record.set_slot(slot, value);
                    record.ty = new_ty;
                    // The old type only refuses transition caching for the
                    // instance that populated the entry; a prototype sharing
                    // the type still lands here and its add must clear the
                    // chain-dependent caches, exactly as on the slow path.
                    let is_prototype = record.is_prototype;
                    if is_prototype {
                        records::invalidate_proto_caches(agent, key);
                    }
                    return Ok(WriteOutcome::Written);
                }
                CacheEntry::Setter {
                    ty: cached,
                    owner,
                    slot,
                } if cached == ty => {
                    let setter = agent.heap.objects[owner.into_index()].slot(slot);
                    return Ok(WriteOutcome::Setter { setter, owner });
                }
                _ => {}
            }
        }
    }

    let type_without_property = agent.heap.objects[object.into_index()].ty;
    let mut info = PropertyValueInfo::new(cache);
    let (outcome, added) = set_property_internal(agent, object, key, value, strict, &mut info)?;
    cache_property_write(
        agent,
        policy,
        object,
        type_without_property,
        key,
        &info,
        request_context,
    );
    if added && agent.heap.objects[object.into_index()].is_prototype {
        records::invalidate_proto_caches(agent, key);
    }
    Ok(outcome)
}

fn set_property_internal(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    value: Value,
    strict: bool,
    info: &mut PropertyValueInfo,
) -> Result<(WriteOutcome, bool), PropertyError> {
    let type_without_property = agent.heap.objects[object.into_index()].ty;
    match lookup_own(agent, object, key) {
        OwnLookup::Data { index, attributes } => {
            if !attributes.is_writable() {
                info.set_no_cache(object);
                return if strict {
                    Err(PropertyError::NotWritable)
                } else {
                    Ok((WriteOutcome::Ignored, false))
                };
            }
            if agent.heap.types[type_without_property.into_index()]
                .handler
                .is_path()
            {
                path_handler::set_slot_and_cache(
                    agent,
                    object,
                    key,
                    index as u8,
                    attributes,
                    value,
                    type_without_property,
                    info,
                );
            } else {
                object::write_slot(agent, object, index, value);
                info.set_field(object, index, attributes);
            }
            Ok((WriteOutcome::Written, false))
        }
        OwnLookup::Accessor { setter_index, .. } => match setter_index {
            Some(setter_index) => {
                info.set_setter(object, setter_index);
                let setter = object::read_slot(agent, object, setter_index);
                Ok((
                    WriteOutcome::Setter {
                        setter,
                        owner: object,
                    },
                    false,
                ))
            }
            None => {
                info.set_no_cache(object);
                if strict {
                    Err(PropertyError::NotWritable)
                } else {
                    Ok((WriteOutcome::Ignored, false))
                }
            }
        },
        OwnLookup::Item { attributes, .. } => {
            if !attributes.is_writable() {
                return if strict {
                    Err(PropertyError::NotWritable)
                } else {
                    Ok((WriteOutcome::Ignored, false))
                };
            }
            let PropertyKey::Index(item) = key else {
                unreachable!("item lookups only answer index keys")
            };
            agent.heap.objects[object.into_index()].set_item(item, value);
            Ok((WriteOutcome::Written, false))
        }
        OwnLookup::None => {
            // The prototype chain may intercept the write.
            let mut current = agent.heap.types[type_without_property.into_index()].prototype;
            while let Some(proto) = current {
                match lookup_own(agent, proto, key) {
                    OwnLookup::Data { attributes, .. } | OwnLookup::Item { attributes, .. } => {
                        if !attributes.is_writable() {
                            info.set_no_cache(object);
                            return if strict {
                                Err(PropertyError::NotWritable)
                            } else {
                                Ok((WriteOutcome::Ignored, false))
                            };
                        }
                        // Writable data up the chain: shadow it below.
                        break;
                    }
                    OwnLookup::Accessor { setter_index, .. } => {
                        return match setter_index {
                            Some(setter_index) => {
                                info.set_setter(proto, setter_index);
                                let setter = object::read_slot(agent, proto, setter_index);
                                Ok((
                                    WriteOutcome::Setter {
                                        setter,
                                        owner: proto,
                                    },
                                    false,
                                ))
                            }
                            None => {
                                info.set_no_cache(object);
                                if strict {
                                    Err(PropertyError::NotWritable)
                                } else {
                                    Ok((WriteOutcome::Ignored, false))
                                }
                            }
                        };
                    }
                    OwnLookup::None => {
                        let proto_ty = agent.heap.objects[proto.into_index()].ty;
                        current = agent.heap.types[proto_ty.into_index()].prototype;
                    }
                }
            }
            add_own_property(agent, object, key, value, SlotAttributes::DEFAULT, info);
            Ok((WriteOutcome::Written, true))
        }
    }
}

/// Adds a property the receiver does not yet have, routing through the
/// current handler and following any escape conversion it performs.
fn add_own_property(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    value: Value,
    attributes: SlotAttributes,
    info: &mut PropertyValueInfo,
) {
    if let PropertyKey::Index(item) = key {
        ensure_item_store(agent, object);
        agent.heap.objects[object.into_index()].set_item(item, value);
        if attributes != SlotAttributes::DEFAULT {
            reshape_dictionary(agent, object, |handler| {
                let TypeHandler::Dictionary(handler) = handler else {
                    unreachable!("item stores require the full dictionary handler")
                };
                handler.set_item_attributes(item, attributes);
            });
        }
        return;
    }
    let ty = agent.heap.objects[object.into_index()].ty;
    if agent.heap.types[ty.into_index()].handler.is_path()
        && path_handler::add_property(agent, object, key, value, attributes, info)
    {
        return;
    }
    // Dictionary add: the instance moves to a fresh type so that caches
    // guarding the old one miss.
    let index = reshape_dictionary(agent, object, |handler| match handler {
        TypeHandler::SimpleDictionary(handler) => handler.add(key, attributes),
        TypeHandler::Dictionary(handler) => handler.add(key, attributes),
        TypeHandler::Path(_) => unreachable!("path adds are handled above"),
    });
    object::write_slot(agent, object, index, value);
    info.set_field(object, index, attributes);
}

/// Defines or redefines a property with explicit attributes. Not routed
/// through call-site caches.
pub fn define_property(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    value: Value,
    attributes: PropertyAttributes,
) -> Result<(), PropertyError> {
    let desired = SlotAttributes::from(attributes);
    let mut info = PropertyValueInfo::new(None);
    match lookup_own(agent, object, key) {
        OwnLookup::Data {
            index,
            attributes: current,
        } => {
            if current != desired {
                check_reconfigure(current, desired)?;
                let ty = agent.heap.objects[object.into_index()].ty;
                let widened = if agent.heap.types[ty.into_index()].handler.is_path() {
                    path_handler::widen_attributes(agent, object, index as u8, desired)
                } else {
                    false
                };
                if !widened {
                    reshape_dictionary(agent, object, |handler| match handler {
                        TypeHandler::SimpleDictionary(handler) => {
                            handler.set_attributes_at(index, desired)
                        }
                        TypeHandler::Dictionary(handler) => {
                            handler.set_attributes_at(index, desired)
                        }
                        TypeHandler::Path(_) => unreachable!("path widening is handled above"),
                    });
                }
            }
            object::write_slot(agent, object, index, value);
        }
        OwnLookup::Accessor {
            attributes: current,
            ..
        } => {
            // Accessor turning back into data needs the dictionary form.
            if !current.is_configurable() {
                return Err(PropertyError::NotConfigurable);
            }
            let ty = agent.heap.objects[object.into_index()].ty;
            if agent.heap.types[ty.into_index()].handler.is_path() {
                path_handler::convert_to_dictionary(agent, object);
            }
            let index = reshape_dictionary(agent, object, |handler| {
                let TypeHandler::Dictionary(handler) = handler else {
                    unreachable!("accessors live on the full dictionary handler")
                };
                handler.remove(key);
                handler.add(key, desired)
            });
            object::write_slot(agent, object, index, value);
        }
        OwnLookup::Item { attributes: current, .. } => {
            let PropertyKey::Index(item) = key else {
                unreachable!("item lookups only answer index keys")
            };
            if current != desired {
                check_reconfigure(current, desired)?;
                reshape_dictionary(agent, object, |handler| {
                    let TypeHandler::Dictionary(handler) = handler else {
                        unreachable!("item stores require the full dictionary handler")
                    };
                    handler.set_item_attributes(item, desired);
                });
            }
            agent.heap.objects[object.into_index()].set_item(item, value);
        }
        OwnLookup::None => {
            add_own_property(agent, object, key, value, desired, &mut info);
        }
    }
    if agent.heap.objects[object.into_index()].is_prototype {
        records::invalidate_proto_caches(agent, key);
    }
    Ok(())
}

fn check_reconfigure(
    current: SlotAttributes,
    desired: SlotAttributes,
) -> Result<(), PropertyError> {
    if current.is_configurable() {
        return Ok(());
    }
    // A non-configurable data property only tolerates a writable downgrade.
    let writable_downgrade =
        current.is_writable() && PropertyAttributes {
            writable: false,
            ..PropertyAttributes::from(current)
        } == PropertyAttributes::from(desired);
    if writable_downgrade {
        Ok(())
    } else {
        Err(PropertyError::NotConfigurable)
    }
}

/// Installs an accessor pair for `key`.
pub fn set_accessors(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    getter: Value,
    setter: Value,
) -> Result<(), PropertyError> {
    let ty = agent.heap.objects[object.into_index()].ty;
    let is_path = agent.heap.types[ty.into_index()].handler.is_path();
    let done = if is_path && matches!(key, PropertyKey::String(_)) {
        path_handler::set_accessors(agent, object, key, getter, setter)?
    } else {
        if is_path {
            // Index-keyed accessors need the full dictionary form.
            path_handler::convert_to_dictionary(agent, object);
        }
        false
    };
    if !done {
        dictionary_set_accessors(agent, object, key, getter, setter)?;
    }
    if agent.heap.objects[object.into_index()].is_prototype {
        records::invalidate_proto_caches(agent, key);
    }
    Ok(())
}

fn dictionary_set_accessors(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    getter: Value,
    setter: Value,
) -> Result<(), PropertyError> {
    ensure_full_dictionary(agent, object);
    let base_attributes = match lookup_own(agent, object, key) {
        OwnLookup::Data { attributes, .. } | OwnLookup::Item { attributes, .. } => {
            if !attributes.is_configurable() {
                return Err(PropertyError::NotConfigurable);
            }
            attributes
        }
        OwnLookup::Accessor { attributes, .. } => attributes,
        OwnLookup::None => SlotAttributes::from(PropertyAttributes {
            writable: false,
            enumerable: true,
            configurable: true,
        }),
    };
    if let PropertyKey::Index(item) = key {
        // The slot pair shadows any plain item value.
        agent.heap.objects[object.into_index()].remove_item(item);
    }
    let (getter_index, setter_index) = reshape_dictionary(agent, object, |handler| {
        let TypeHandler::Dictionary(handler) = handler else {
            unreachable!("accessors live on the full dictionary handler")
        };
        handler.add_accessor(key, base_attributes)
    });
    object::write_slot(agent, object, getter_index, getter);
    object::write_slot(agent, object, setter_index, setter);
    Ok(())
}

/// Deletes `key` from `object`. Deletion breaks the append-only property
/// history, so a path type never survives it: the instance escapes to a
/// dictionary form first and the deletion happens there.
pub fn delete_property(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    strict: bool,
) -> Result<bool, PropertyError> {
    let found = lookup_own(agent, object, key);
    let attributes = match found {
        OwnLookup::None => return Ok(true),
        OwnLookup::Data { attributes, .. }
        | OwnLookup::Accessor { attributes, .. }
        | OwnLookup::Item { attributes, .. } => attributes,
    };
    if !attributes.is_configurable() {
        return if strict {
            Err(PropertyError::NotConfigurable)
        } else {
            Ok(false)
        };
    }
    let ty = agent.heap.objects[object.into_index()].ty;
    if agent.heap.types[ty.into_index()].handler.is_path() {
        let has_accessors = match &agent.heap.types[ty.into_index()].handler {
            TypeHandler::Path(handler) => handler.has_accessors(),
            _ => unreachable!(),
        };
        if has_accessors {
            path_handler::convert_to_dictionary(agent, object);
        } else {
            path_handler::convert_to_simple_dictionary(agent, object);
        }
    }
    match key {
        PropertyKey::Index(item) => {
            agent.heap.objects[object.into_index()].remove_item(item);
            reshape_dictionary(agent, object, |handler| {
                if let TypeHandler::Dictionary(handler) = handler {
                    handler.remove_item(item);
                    handler.remove(key);
                }
            });
        }
        PropertyKey::String(_) => {
            reshape_dictionary(agent, object, |handler| match handler {
                TypeHandler::SimpleDictionary(handler) => handler.remove(key),
                TypeHandler::Dictionary(handler) => handler.remove(key),
                TypeHandler::Path(_) => unreachable!("paths were converted above"),
            });
        }
    }
    if agent.heap.objects[object.into_index()].is_prototype {
        records::invalidate_proto_caches(agent, key);
    }
    Ok(true)
}

/// Whether `key` is reachable anywhere on `object`'s prototype chain.
pub fn has_property(agent: &Agent, object: ObjectIndex, key: PropertyKey) -> bool {
    let mut current = object;
    loop {
        if !matches!(lookup_own(agent, current, key), OwnLookup::None) {
            return true;
        }
        let ty = agent.heap.objects[current.into_index()].ty;
        match agent.heap.types[ty.into_index()].prototype {
            Some(prototype) => current = prototype,
            None => return false,
        }
    }
}

/// Builds an object literal: every property add walks the transition tree
/// with pre-shared successor types, so two literals with the same shape end
/// up with the very same type.
pub fn build_object_literal(
    agent: &mut Agent,
    context: ScriptContextId,
    prototype: Option<ObjectIndex>,
    inline_slot_capacity: u16,
    properties: &[(PropertyKey, Value)],
) -> ObjectIndex {
    let object = agent.create_object(context, prototype, inline_slot_capacity);
    for (key, value) in properties {
        debug_assert!(matches!(key, PropertyKey::String(_)));
        let ty = agent.heap.objects[object.into_index()].ty;
        let (new_ty, index) = path_handler::promote_type(
            agent,
            ty,
            SuccessorKey {
                key: *key,
                attributes: SlotAttributes::DEFAULT,
            },
            true,
            None,
        );
        agent.heap.objects[object.into_index()].ty = new_ty;
        object::write_slot(agent, object, index as u16, *value);
    }
    object
}

/// Reports a property as a compile-time constant candidate. See
/// [`crate::execution::PropertyGuard`] for the invalidation contract.
pub fn try_use_fixed_property(
    agent: &mut Agent,
    ty: TypeIndex,
    key: PropertyKey,
    request_context: ScriptContextId,
) -> Option<(Value, PropertyGuard)> {
    path_handler::try_use_fixed_property(agent, ty, key, request_context)
}

/// Clones the object's dictionary handler, applies `mutate`, and moves the
/// instance to a fresh type holding the result. Stale caches guarding the
/// old type miss from then on.
fn reshape_dictionary<R>(
    agent: &mut Agent,
    object: ObjectIndex,
    mutate: impl FnOnce(&mut TypeHandler) -> R,
) -> R {
    let ty = agent.heap.objects[object.into_index()].ty;
    let record = &agent.heap.types[ty.into_index()];
    let mut handler = match &record.handler {
        TypeHandler::SimpleDictionary(handler) => TypeHandler::SimpleDictionary(handler.clone()),
        TypeHandler::Dictionary(handler) => TypeHandler::Dictionary(handler.clone()),
        TypeHandler::Path(_) => unreachable!("path types are reshaped by transition"),
    };
    let (context, prototype) = (record.context, record.prototype);
    let result = mutate(&mut handler);
    let new_ty = agent.heap.create_type(TypeRecord {
        context,
        prototype,
        handler,
        locked: false,
        shared: false,
    });
    agent.heap.objects[object.into_index()].ty = new_ty;
    result
}

/// Moves the object onto the full dictionary handler if it is not already
/// there.
fn ensure_full_dictionary(agent: &mut Agent, object: ObjectIndex) {
    let ty = agent.heap.objects[object.into_index()].ty;
    match &agent.heap.types[ty.into_index()].handler {
        TypeHandler::Dictionary(_) => {}
        TypeHandler::SimpleDictionary(handler) => {
            let full = DictionaryHandler::from_simple(handler);
            let record = &agent.heap.types[ty.into_index()];
            let (context, prototype) = (record.context, record.prototype);
            let new_ty = agent.heap.create_type(TypeRecord {
                context,
                prototype,
                handler: TypeHandler::Dictionary(full),
                locked: false,
                shared: false,
            });
            agent.heap.objects[object.into_index()].ty = new_ty;
        }
        TypeHandler::Path(_) => path_handler::convert_to_dictionary(agent, object),
    }
}

/// Item stores only exist on the full dictionary handler.
fn ensure_item_store(agent: &mut Agent, object: ObjectIndex) {
    ensure_full_dictionary(agent, object);
}
