// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use vela_types::{
    Agent, CacheEntry, CachePolicy, CacheRef, ObjectIndex, PropertyAttributes, PropertyError,
    PropertyKey, ReadOutcome, ScriptContextId, Value, WriteOutcome, ops,
};

fn set_cached(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    value: Value,
    cache: Option<CacheRef>,
    context: ScriptContextId,
) -> WriteOutcome {
    ops::set_property(
        agent,
        CachePolicy::enabled(),
        object,
        key,
        value,
        false,
        cache,
        context,
    )
    .unwrap()
}

fn get_cached(
    agent: &mut Agent,
    object: ObjectIndex,
    key: PropertyKey,
    cache: Option<CacheRef>,
    context: ScriptContextId,
) -> ReadOutcome {
    ops::get_property(agent, CachePolicy::enabled(), object, key, cache, context)
}

#[test]
fn local_read_populates_and_hits() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let object = agent.create_object(context, None, 4);
    set_cached(&mut agent, object, a, Value::Integer(1), None, context);

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    let entry = agent.inline_cache_entry(cache).expect("populated");
    assert!(matches!(
        entry,
        CacheEntry::Local { ty, .. } if ty == agent.object_type(object)
    ));

    // A later write through the slot is visible through the cached read.
    set_cached(&mut agent, object, a, Value::Integer(2), None, context);
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(2))
    );
}

#[test]
fn transition_cache_grows_aux_storage_to_the_recorded_capacity() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let b = agent.intern_key("b");

    // One inline slot: the second property spills into auxiliary storage.
    let first = agent.create_object(context, None, 1);
    set_cached(&mut agent, first, a, Value::Integer(1), None, context);
    set_cached(&mut agent, first, b, Value::Integer(2), None, context);

    // The second object shares the now-populated transition edges; caching
    // its add records the transition.
    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    let second = agent.create_object(context, None, 1);
    set_cached(&mut agent, second, a, Value::Integer(10), None, context);
    set_cached(&mut agent, second, b, Value::Integer(20), cache_ref, context);

    let entry = agent.inline_cache_entry(cache).expect("populated");
    let CacheEntry::Transition {
        old_ty,
        new_ty,
        slot,
        required_aux_slot_capacity,
    } = entry
    else {
        panic!("expected a transition entry, got {entry:?}");
    };
    assert!(!slot.is_inline);
    // Auxiliary capacity grows in chunks of four past the single inline slot.
    assert_eq!(required_aux_slot_capacity, 4);
    assert_eq!(new_ty, agent.object_type(first));
    assert_eq!(new_ty, agent.object_type(second));

    // A third object takes the fast path: type swap plus exact aux growth,
    // without re-entering the transition machinery.
    let third = agent.create_object(context, None, 1);
    set_cached(&mut agent, third, a, Value::Integer(100), None, context);
    assert_eq!(agent.object_type(third), old_ty);
    assert_eq!(
        set_cached(&mut agent, third, b, Value::Integer(200), cache_ref, context),
        WriteOutcome::Written
    );
    assert_eq!(agent.object_type(third), new_ty);
    assert_eq!(agent.aux_slot_count(third), 4);
    assert_eq!(
        get_cached(&mut agent, third, b, None, context),
        ReadOutcome::Value(Value::Integer(200))
    );
    assert_eq!(
        get_cached(&mut agent, third, a, None, context),
        ReadOutcome::Value(Value::Integer(100))
    );
}

#[test]
fn prototype_add_through_warmed_transition_site_clears_missing_entries() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let x = agent.intern_key("x");

    // Warm a transition entry for adding "x" to the shared root type.
    let store_site = agent.create_inline_cache();
    let store_ref = Some(CacheRef::Mono(store_site));
    let first = agent.create_object(context, None, 4);
    set_cached(&mut agent, first, x, Value::Integer(1), None, context);
    let second = agent.create_object(context, None, 4);
    set_cached(&mut agent, second, x, Value::Integer(2), store_ref, context);
    assert!(matches!(
        agent.inline_cache_entry(store_site),
        Some(CacheEntry::Transition { .. })
    ));

    // A prototype object sits on the same warmed old type; its child caches
    // the key as missing.
    let proto = agent.create_object(context, None, 4);
    let child = agent.create_object(context, Some(proto), 4);
    let read_site = agent.create_inline_cache();
    let read_ref = Some(CacheRef::Mono(read_site));
    assert_eq!(
        get_cached(&mut agent, child, x, read_ref, context),
        ReadOutcome::Missing
    );
    assert!(matches!(
        agent.inline_cache_entry(read_site),
        Some(CacheEntry::Missing { .. })
    ));

    // Adding "x" to the prototype hits the warmed transition fast path. The
    // child's own type never changes, so the chain-dependent entry must be
    // cleared by the add itself.
    set_cached(&mut agent, proto, x, Value::Integer(7), store_ref, context);
    assert_eq!(agent.inline_cache_entry(read_site), None);
    assert_eq!(
        get_cached(&mut agent, child, x, read_ref, context),
        ReadOutcome::Value(Value::Integer(7))
    );
}

#[test]
fn warmed_read_entry_is_ignored_by_writes() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let object = agent.create_object(context, None, 4);
    ops::define_property(
        &mut agent,
        object,
        a,
        Value::Integer(1),
        PropertyAttributes {
            writable: false,
            ..PropertyAttributes::default()
        },
    )
    .unwrap();

    // Reads cache non-writable slots freely.
    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert!(matches!(
        agent.inline_cache_entry(cache),
        Some(CacheEntry::Local { .. })
    ));

    // A write through the same call site must not answer from the read
    // entry; the slow path sees the read-only attributes.
    assert_eq!(
        set_cached(&mut agent, object, a, Value::Integer(2), cache_ref, context),
        WriteOutcome::Ignored
    );
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(
        ops::set_property(
            &mut agent,
            CachePolicy::enabled(),
            object,
            a,
            Value::Integer(2),
            true,
            cache_ref,
            context,
        ),
        Err(PropertyError::NotWritable)
    );
}

#[test]
fn warmed_read_entry_does_not_bypass_fixed_field_guards() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let f = agent.intern_key("f");
    let object = agent.create_object(context, None, 4);
    set_cached(&mut agent, object, f, Value::Function(7), None, context);
    let ty = agent.object_type(object);
    let (_, guard) =
        ops::try_use_fixed_property(&mut agent, ty, f, context).expect("fixed use");

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, object, f, cache_ref, context),
        ReadOutcome::Value(Value::Function(7))
    );
    assert!(matches!(
        agent.inline_cache_entry(cache),
        Some(CacheEntry::Local { .. })
    ));

    // Overwriting the speculated slot through the warmed site must take the
    // slow path and drop the guard.
    assert_eq!(
        set_cached(&mut agent, object, f, Value::Function(9), cache_ref, context),
        WriteOutcome::Written
    );
    assert!(!agent.guard_is_valid(guard));
    assert_eq!(
        get_cached(&mut agent, object, f, cache_ref, context),
        ReadOutcome::Value(Value::Function(9))
    );
}

#[test]
fn attribute_flip_defeats_a_warmed_call_site() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let object = agent.create_object(context, None, 4);
    set_cached(&mut agent, object, a, Value::Integer(1), None, context);

    // Warm the site with both a read and a write of the slot.
    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(
        set_cached(&mut agent, object, a, Value::Integer(2), cache_ref, context),
        WriteOutcome::Written
    );
    assert!(matches!(
        agent.inline_cache_entry(cache),
        Some(CacheEntry::StoreField { .. })
    ));
    let warmed_ty = agent.object_type(object);

    // The attribute flip moves the object to a new type, so the warmed
    // entry fails its guard and the write falls back to the slow path.
    ops::define_property(
        &mut agent,
        object,
        a,
        Value::Integer(2),
        PropertyAttributes {
            writable: false,
            ..PropertyAttributes::default()
        },
    )
    .unwrap();
    assert_ne!(agent.object_type(object), warmed_ty);
    assert_eq!(
        set_cached(&mut agent, object, a, Value::Integer(3), cache_ref, context),
        WriteOutcome::Ignored
    );
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(2))
    );
    assert_eq!(
        ops::set_property(
            &mut agent,
            CachePolicy::enabled(),
            object,
            a,
            Value::Integer(3),
            true,
            cache_ref,
            context,
        ),
        Err(PropertyError::NotWritable)
    );
}

#[test]
fn stale_local_cache_misses_after_delete() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let b = agent.intern_key("b");
    let object = agent.create_object(context, None, 4);
    set_cached(&mut agent, object, a, Value::Integer(1), None, context);
    set_cached(&mut agent, object, b, Value::Integer(2), None, context);

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    let cached_ty = agent.object_type(object);

    // Deletion re-types the instance; the stale entry fails its type check
    // and the slow path answers from the dictionary form.
    ops::delete_property(&mut agent, object, b, false).unwrap();
    assert_ne!(agent.object_type(object), cached_ty);
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(
        get_cached(&mut agent, object, b, cache_ref, context),
        ReadOutcome::Missing
    );
}

#[test]
fn proto_cache_reads_live_values_from_the_owner() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let p = agent.intern_key("p");
    let proto = agent.create_object(context, None, 4);
    set_cached(&mut agent, proto, p, Value::Integer(1), None, context);
    let receiver = agent.create_object(context, Some(proto), 4);

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, receiver, p, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    let entry = agent.inline_cache_entry(cache).expect("populated");
    assert!(matches!(
        entry,
        CacheEntry::Proto { ty, owner, .. }
            if ty == agent.object_type(receiver) && owner == proto
    ));

    // Overwriting the prototype's slot changes no shape; the cached probe
    // must still see the new value because it reads the owner's slot live.
    set_cached(&mut agent, proto, p, Value::Integer(2), None, context);
    assert_eq!(
        get_cached(&mut agent, receiver, p, cache_ref, context),
        ReadOutcome::Value(Value::Integer(2))
    );
}

#[test]
fn missing_cache_clears_when_the_prototype_gains_the_key() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let m = agent.intern_key("m");
    let proto = agent.create_object(context, None, 4);
    let receiver = agent.create_object(context, Some(proto), 4);

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, receiver, m, cache_ref, context),
        ReadOutcome::Missing
    );
    assert!(matches!(
        agent.inline_cache_entry(cache),
        Some(CacheEntry::Missing { .. })
    ));

    // Adding the key to the prototype clears the chain-dependent entry; the
    // receiver's own type never changed, so only invalidation saves us.
    set_cached(&mut agent, proto, m, Value::Integer(7), None, context);
    assert_eq!(agent.inline_cache_entry(cache), None);
    assert_eq!(
        get_cached(&mut agent, receiver, m, cache_ref, context),
        ReadOutcome::Value(Value::Integer(7))
    );
}

#[test]
fn setter_write_populates_and_hits() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let p = agent.intern_key("p");
    let object = agent.create_object(context, None, 4);
    ops::set_accessors(
        &mut agent,
        object,
        p,
        Value::Function(1),
        Value::Function(2),
    )
    .unwrap();

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    let expected = WriteOutcome::Setter {
        setter: Value::Function(2),
        owner: object,
    };
    assert_eq!(
        set_cached(&mut agent, object, p, Value::Integer(9), cache_ref, context),
        expected
    );
    assert!(matches!(
        agent.inline_cache_entry(cache),
        Some(CacheEntry::Setter { owner, .. }) if owner == object
    ));
    // Second write is answered straight from the cache.
    assert_eq!(
        set_cached(&mut agent, object, p, Value::Integer(9), cache_ref, context),
        expected
    );
}

#[test]
fn poly_cache_holds_both_shapes() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let b = agent.intern_key("b");

    let first = agent.create_object(context, None, 4);
    set_cached(&mut agent, first, a, Value::Integer(1), None, context);

    let second = agent.create_object(context, None, 4);
    set_cached(&mut agent, second, b, Value::Integer(2), None, context);
    set_cached(&mut agent, second, a, Value::Integer(3), None, context);

    assert_ne!(agent.object_type(first), agent.object_type(second));

    let cache = agent.create_poly_cache();
    let cache_ref = Some(CacheRef::Poly(cache));
    assert_eq!(
        get_cached(&mut agent, first, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(
        get_cached(&mut agent, second, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(3))
    );
    assert_eq!(agent.poly_cache_entries(cache).len(), 2);

    // Both shapes now hit without repopulation.
    assert_eq!(
        get_cached(&mut agent, first, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(
        get_cached(&mut agent, second, a, cache_ref, context),
        ReadOutcome::Value(Value::Integer(3))
    );
    assert_eq!(agent.poly_cache_entries(cache).len(), 2);
}

#[test]
fn cross_context_requests_never_populate() {
    let mut agent = Agent::new();
    let home = agent.create_script_context();
    let foreign = agent.create_script_context();
    let a = agent.intern_key("a");
    let object = agent.create_object(home, None, 4);
    set_cached(&mut agent, object, a, Value::Integer(1), None, home);

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    assert_eq!(
        get_cached(&mut agent, object, a, cache_ref, foreign),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(agent.inline_cache_entry(cache), None);
}

#[test]
fn disabled_policy_still_computes_correct_results() {
    let mut agent = Agent::new();
    let context = agent.create_script_context();
    let a = agent.intern_key("a");
    let object = agent.create_object(context, None, 4);

    let cache = agent.create_inline_cache();
    let cache_ref = Some(CacheRef::Mono(cache));
    let outcome = ops::set_property(
        &mut agent,
        CachePolicy::disabled(),
        object,
        a,
        Value::Integer(1),
        false,
        cache_ref,
        context,
    )
    .unwrap();
    assert_eq!(outcome, WriteOutcome::Written);
    assert_eq!(
        ops::get_property(
            &mut agent,
            CachePolicy::disabled(),
            object,
            a,
            cache_ref,
            context
        ),
        ReadOutcome::Value(Value::Integer(1))
    );
    assert_eq!(agent.inline_cache_entry(cache), None);
}
