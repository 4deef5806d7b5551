// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::cache::records::{self, CacheEntry, CacheRef};
use crate::execution::{Agent, CachePolicy};
use crate::heap::indexes::{ObjectIndex, ScriptContextId, TypeIndex};
use crate::types::{PropertyKey, attributes::SlotAttributes};

/// Transient plan of one property operation: where the value came from or
/// went, and whether a call site may remember it. Populated by the handler
/// that completed the operation, consumed by the cache operators.
#[derive(Debug)]
pub(crate) struct PropertyValueInfo {
    cache: Option<CacheRef>,
    instance: Option<ObjectIndex>,
    index: Option<u16>,
    attributes: SlotAttributes,
    is_setter: bool,
    no_cache: bool,
    prototype_cache_disabled: bool,
}

impl PropertyValueInfo {
    pub(crate) fn new(cache: Option<CacheRef>) -> Self {
        Self {
            cache,
            instance: None,
            index: None,
            attributes: SlotAttributes::DEFAULT,
            is_setter: false,
            no_cache: false,
            prototype_cache_disabled: false,
        }
    }

    /// The operation read or wrote the slot of a data property on
    /// `instance`.
    pub(crate) fn set_field(
        &mut self,
        instance: ObjectIndex,
        index: u16,
        attributes: SlotAttributes,
    ) {
        self.instance = Some(instance);
        self.index = Some(index);
        self.attributes = attributes;
        self.no_cache = false;
    }

    /// The operation resolved to the setter stored in `instance`'s slot.
    pub(crate) fn set_setter(&mut self, instance: ObjectIndex, setter_index: u16) {
        self.instance = Some(instance);
        self.index = Some(setter_index);
        self.is_setter = true;
    }

    /// The operation completed but nothing about it may be cached.
    pub(crate) fn set_no_cache(&mut self, instance: ObjectIndex) {
        self.instance = Some(instance);
        self.index = None;
        self.no_cache = true;
    }
}

/// Decides what a call site may remember about a finished read.
///
/// `object_with_property` is the object the value was actually found on;
/// when the whole chain missed, `is_missing` is set and it equals the
/// receiver. Any ineligibility is a silent skip.
pub(crate) fn cache_property_read(
    agent: &mut Agent,
    policy: CachePolicy,
    starting_object: ObjectIndex,
    object_with_property: ObjectIndex,
    key: PropertyKey,
    is_missing: bool,
    info: &PropertyValueInfo,
    request_context: ScriptContextId,
) {
    if !policy.enabled || info.no_cache {
        return;
    }
    let Some(cache) = info.cache else {
        return;
    };
    if is_missing {
        // Guarded by the receiver's type and registered for chain changes.
        if agent.heap.objects[starting_object.into_index()].context != request_context {
            return;
        }
        let ty = agent.heap.objects[starting_object.into_index()].ty;
        records::store(agent, cache, CacheEntry::Missing { ty });
        agent.caches.register(key, cache);
        return;
    }
    // The value must have come straight out of an own slot.
    if info.instance != Some(object_with_property) {
        return;
    }
    let Some(index) = info.index else {
        return;
    };
    if agent.heap.objects[object_with_property.into_index()].context != request_context {
        return;
    }
    debug_assert!(!info.attributes.is_accessor());
    let owner_ty = agent.heap.objects[object_with_property.into_index()].ty;
    let slot = agent.heap.types[owner_ty.into_index()]
        .handler
        .slot_location(index);
    if object_with_property == starting_object {
        records::store(agent, cache, CacheEntry::Local { ty: owner_ty, slot });
    } else {
        if info.prototype_cache_disabled {
            return;
        }
        if agent.heap.objects[starting_object.into_index()].context != request_context {
            return;
        }
        let receiver_ty = agent.heap.objects[starting_object.into_index()].ty;
        records::store(
            agent,
            cache,
            CacheEntry::Proto {
                ty: receiver_ty,
                owner: object_with_property,
                slot,
            },
        );
        agent.caches.register(key, cache);
    }
}

/// Decides what a call site may remember about a finished write.
///
/// `type_without_property` is the receiver's type before the operation;
/// when it differs from the type after, the write added a property and the
/// whole transition may be cached, provided the new type is shared, both
/// handlers are path handlers and the receiver is not a prototype. The
/// required auxiliary capacity is baked into the entry so the fast path can
/// grow storage without consulting the handler.
pub(crate) fn cache_property_write(
    agent: &mut Agent,
    policy: CachePolicy,
    object: ObjectIndex,
    type_without_property: TypeIndex,
    key: PropertyKey,
    info: &PropertyValueInfo,
    request_context: ScriptContextId,
) {
    if !policy.enabled || info.no_cache {
        return;
    }
    let Some(cache) = info.cache else {
        return;
    };
    let Some(instance) = info.instance else {
        return;
    };
    if !info.is_setter && instance != object {
        return;
    }
    let Some(index) = info.index else {
        return;
    };
    if agent.heap.objects[instance.into_index()].context != request_context {
        return;
    }
    let instance_ty = agent.heap.objects[instance.into_index()].ty;
    let slot = agent.heap.types[instance_ty.into_index()]
        .handler
        .slot_location(index);

    if info.is_setter {
        if instance != object {
            if info.prototype_cache_disabled {
                return;
            }
            if agent.heap.objects[object.into_index()].context != request_context {
                return;
            }
            let receiver_ty = agent.heap.objects[object.into_index()].ty;
            records::store(
                agent,
                cache,
                CacheEntry::Setter {
                    ty: receiver_ty,
                    owner: instance,
                    slot,
                },
            );
            agent.caches.register(key, cache);
        } else {
            records::store(
                agent,
                cache,
                CacheEntry::Setter {
                    ty: instance_ty,
                    owner: instance,
                    slot,
                },
            );
        }
        return;
    }

    debug_assert!(info.attributes.is_writable());
    let new_ty = instance_ty;
    if new_ty != type_without_property {
        let old_record = &agent.heap.types[type_without_property.into_index()];
        let new_record = &agent.heap.types[new_ty.into_index()];
        let cacheable_transition = new_record.shared
            && new_record.handler.is_path()
            && old_record.handler.is_path()
            && !agent.heap.objects[object.into_index()].is_prototype;
        if cacheable_transition {
            let old_capacity = old_record.handler.slot_capacity();
            let new_capacity = new_record.handler.slot_capacity();
            let required_aux_slot_capacity = if !slot.is_inline && old_capacity < new_capacity {
                new_capacity - new_record.handler.inline_slot_capacity()
            } else {
                0
            };
            records::store(
                agent,
                cache,
                CacheEntry::Transition {
                    old_ty: type_without_property,
                    new_ty,
                    slot,
                    required_aux_slot_capacity,
                },
            );
        } else {
            // The transition itself is not safe to replay, but a write to
            // an object already carrying the property is.
            records::store(agent, cache, CacheEntry::StoreField { ty: new_ty, slot });
        }
    } else {
        records::store(agent, cache, CacheEntry::StoreField { ty: new_ty, slot });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn setup() -> (Agent, ScriptContextId, CacheRef) {
        let mut agent = Agent::new();
        let context = agent.create_script_context();
        let cache = CacheRef::Mono(agent.create_inline_cache());
        (agent, context, cache)
    }

    #[test]
    fn read_of_local_data_property_caches_local_entry() {
        let (mut agent, context, cache) = setup();
        let object = agent.create_object(context, None, 4);
        let key = agent.intern_key("x");
        crate::ops::set_property(
            &mut agent,
            CachePolicy::enabled(),
            object,
            key,
            Value::Integer(1),
            false,
            None,
            context,
        )
        .unwrap();

        let mut info = PropertyValueInfo::new(Some(cache));
        info.set_field(object, 0, SlotAttributes::DEFAULT);
        cache_property_read(
            &mut agent,
            CachePolicy::enabled(),
            object,
            object,
            key,
            false,
            &info,
            context,
        );
        let ty = agent.object_type(object);
        let CacheRef::Mono(id) = cache else {
            unreachable!()
        };
        assert!(matches!(
            agent.inline_cache_entry(id),
            Some(CacheEntry::Local { ty: cached, .. }) if cached == ty
        ));
    }

    #[test]
    fn disabled_policy_caches_nothing() {
        let (mut agent, context, cache) = setup();
        let object = agent.create_object(context, None, 4);
        let key = agent.intern_key("x");
        let mut info = PropertyValueInfo::new(Some(cache));
        info.set_field(object, 0, SlotAttributes::DEFAULT);
        cache_property_read(
            &mut agent,
            CachePolicy::disabled(),
            object,
            object,
            key,
            false,
            &info,
            context,
        );
        let CacheRef::Mono(id) = cache else {
            unreachable!()
        };
        assert_eq!(agent.inline_cache_entry(id), None);
    }

    #[test]
    fn no_cache_plans_are_skipped() {
        let (mut agent, context, cache) = setup();
        let object = agent.create_object(context, None, 4);
        let key = agent.intern_key("x");
        let mut info = PropertyValueInfo::new(Some(cache));
        info.set_no_cache(object);
        cache_property_read(
            &mut agent,
            CachePolicy::enabled(),
            object,
            object,
            key,
            false,
            &info,
            context,
        );
        let CacheRef::Mono(id) = cache else {
            unreachable!()
        };
        assert_eq!(agent.inline_cache_entry(id), None);
    }

    #[test]
    fn cross_context_reads_are_not_cached() {
        let (mut agent, context, cache) = setup();
        let other_context = agent.create_script_context();
        let object = agent.create_object(context, None, 4);
        let key = agent.intern_key("x");
        let mut info = PropertyValueInfo::new(Some(cache));
        info.set_field(object, 0, SlotAttributes::DEFAULT);
        cache_property_read(
            &mut agent,
            CachePolicy::enabled(),
            object,
            object,
            key,
            false,
            &info,
            other_context,
        );
        let CacheRef::Mono(id) = cache else {
            unreachable!()
        };
        assert_eq!(agent.inline_cache_entry(id), None);
    }
}
