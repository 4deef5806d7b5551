// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ahash::AHashMap;

use crate::cache::records::{CacheRegistry, InlineCacheRecord, PolyCacheRecord};
use crate::heap::Heap;
use crate::heap::indexes::{InlineCacheId, ObjectIndex, PolyCacheId, ScriptContextId, TypeIndex};
use crate::object::ObjectRecord;
use crate::types::{PropertyKey, PropertyName, path_handler};

/// Global switch handed to every cacheable operation. Disabling it turns
/// the whole caching layer off with no semantic change.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub enabled: bool,
}

impl CachePolicy {
    pub const fn enabled() -> Self {
        Self { enabled: true }
    }

    pub const fn disabled() -> Self {
        Self { enabled: false }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::enabled()
    }
}

/// One script context. Types and objects belong to the context they were
/// created in; caches never mix contexts.
///
/// Root types are interned here so that objects born alike share a type.
#[derive(Debug, Default)]
pub struct ScriptContextRecord {
    root_types: AHashMap<(Option<ObjectIndex>, u16), TypeIndex>,
}

impl ScriptContextRecord {
    pub(crate) fn root_type(
        &self,
        prototype: Option<ObjectIndex>,
        inline_slot_capacity: u16,
    ) -> Option<TypeIndex> {
        self.root_types
            .get(&(prototype, inline_slot_capacity))
            .copied()
    }

    pub(crate) fn insert_root_type(
        &mut self,
        prototype: Option<ObjectIndex>,
        inline_slot_capacity: u16,
        ty: TypeIndex,
    ) {
        self.root_types
            .insert((prototype, inline_slot_capacity), ty);
    }
}

/// A property guard handed out with a fixed-field use. The guard stays
/// valid until the speculated slot is written, shared or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyGuard(u32);

/// Registry of outstanding property guards, keyed by property for bulk
/// invalidation. Stands in for the compiler's code invalidation hooks.
#[derive(Debug, Default)]
pub(crate) struct GuardRegistry {
    valid: Vec<bool>,
    by_key: AHashMap<PropertyKey, Vec<u32>>,
}

impl GuardRegistry {
    pub(crate) fn register(&mut self, key: PropertyKey) -> PropertyGuard {
        let index = self.valid.len() as u32;
        self.valid.push(true);
        self.by_key.entry(key).or_default().push(index);
        PropertyGuard(index)
    }

    pub(crate) fn invalidate_for(&mut self, key: PropertyKey) {
        if let Some(guards) = self.by_key.remove(&key) {
            for index in guards {
                self.valid[index as usize] = false;
            }
        }
    }

    pub(crate) fn is_valid(&self, guard: PropertyGuard) -> bool {
        self.valid[guard.0 as usize]
    }
}

#[derive(Debug, Default)]
struct PropertyKeyInterner {
    names: Vec<Box<str>>,
    by_name: AHashMap<Box<str>, PropertyName>,
}

impl PropertyKeyInterner {
    fn intern(&mut self, name: &str) -> PropertyKey {
        if let Some(index) = parse_array_index(name) {
            return PropertyKey::Index(index);
        }
        if let Some(interned) = self.by_name.get(name) {
            return PropertyKey::String(*interned);
        }
        let interned = PropertyName::from_u32_index(self.names.len() as u32);
        self.names.push(name.into());
        self.by_name.insert(name.into(), interned);
        PropertyKey::String(interned)
    }

    fn name(&self, name: PropertyName) -> &str {
        &self.names[name.into_u32_index() as usize]
    }
}

/// A canonical array index: digits only, no leading zero, below u32::MAX.
fn parse_array_index(name: &str) -> Option<u32> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    name.parse::<u32>().ok().filter(|index| *index != u32::MAX)
}

/// The engine agent: single owner of every arena and registry. All
/// operations thread `&mut Agent`; there is no interior mutability and no
/// locking anywhere in the crate.
#[derive(Debug, Default)]
pub struct Agent {
    pub(crate) heap: Heap,
    pub(crate) guards: GuardRegistry,
    pub(crate) caches: CacheRegistry,
    interner: PropertyKeyInterner,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_script_context(&mut self) -> ScriptContextId {
        self.heap.contexts.push(ScriptContextRecord::default());
        ScriptContextId::last(&self.heap.contexts)
    }

    /// Interns a property name. Canonical numeric strings become index keys.
    pub fn intern_key(&mut self, name: &str) -> PropertyKey {
        self.interner.intern(name)
    }

    pub fn key_name(&self, name: PropertyName) -> &str {
        self.interner.name(name)
    }

    /// Creates an object in `context` with the given prototype and inline
    /// slot capacity. The prototype object, if any, is marked as such from
    /// here on.
    pub fn create_object(
        &mut self,
        context: ScriptContextId,
        prototype: Option<ObjectIndex>,
        inline_slot_capacity: u16,
    ) -> ObjectIndex {
        let ty = path_handler::get_or_create_root_type(
            self,
            context,
            prototype,
            inline_slot_capacity,
        );
        if let Some(prototype) = prototype {
            self.heap.objects[prototype.into_index()].is_prototype = true;
        }
        self.heap
            .objects
            .push(ObjectRecord::new(context, ty, inline_slot_capacity));
        ObjectIndex::last(&self.heap.objects)
    }

    pub fn create_inline_cache(&mut self) -> InlineCacheId {
        self.heap.inline_caches.push(InlineCacheRecord::default());
        InlineCacheId::last(&self.heap.inline_caches)
    }

    pub fn create_poly_cache(&mut self) -> PolyCacheId {
        self.heap.poly_caches.push(PolyCacheRecord::default());
        PolyCacheId::last(&self.heap.poly_caches)
    }

    /// The object's current type. Type identity is the sole cache guard, so
    /// tests and embedders may compare the returned indices directly.
    pub fn object_type(&self, object: ObjectIndex) -> TypeIndex {
        self.heap.objects[object.into_index()].ty
    }

    /// Whether the object's current type still uses the path
    /// representation. Escape conversions are one-way, so once this turns
    /// false it stays false.
    pub fn object_uses_path_type(&self, object: ObjectIndex) -> bool {
        let ty = self.heap.objects[object.into_index()].ty;
        self.heap.types[ty.into_index()].handler.is_path()
    }

    /// Current length of the object's auxiliary slot array.
    pub fn aux_slot_count(&self, object: ObjectIndex) -> usize {
        self.heap.objects[object.into_index()].aux_slots.len()
    }

    pub fn guard_is_valid(&self, guard: PropertyGuard) -> bool {
        self.guards.is_valid(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_intern_as_indices() {
        let mut agent = Agent::new();
        assert_eq!(agent.intern_key("0"), PropertyKey::Index(0));
        assert_eq!(agent.intern_key("42"), PropertyKey::Index(42));
        // Non-canonical forms stay string keys.
        assert!(matches!(agent.intern_key("042"), PropertyKey::String(_)));
        assert!(matches!(agent.intern_key("-1"), PropertyKey::String(_)));
        assert!(matches!(agent.intern_key(""), PropertyKey::String(_)));
    }

    #[test]
    fn interning_is_stable() {
        let mut agent = Agent::new();
        let a = agent.intern_key("length");
        let b = agent.intern_key("length");
        assert_eq!(a, b);
        let PropertyKey::String(name) = a else {
            panic!("expected a string key");
        };
        assert_eq!(agent.key_name(name), "length");
    }

    #[test]
    fn guards_invalidate_by_key() {
        let mut agent = Agent::new();
        let key = agent.intern_key("x");
        let other = agent.intern_key("y");
        let guard = agent.guards.register(key);
        assert!(agent.guard_is_valid(guard));
        agent.guards.invalidate_for(other);
        assert!(agent.guard_is_valid(guard));
        agent.guards.invalidate_for(key);
        assert!(!agent.guard_is_valid(guard));
    }
}
