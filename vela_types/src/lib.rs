// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adaptive object-shape type system and inline-cache population core of
//! the Vela engine.
//!
//! Objects start on *path types*: nodes of a transition tree whose property
//! layout is a prefix of a shared, append-only key path. Adding a property
//! moves an object along an edge of the tree; two objects that gained the
//! same properties in the same order share the same type, and type identity
//! is the sole guard every inline cache relies on. Histories the tree cannot
//! express (deletion, overlong paths, attributed index properties, awkward
//! accessor shapes) escape one-way to dictionary-backed types.
//!
//! The cache layer is purely an optimization: every operation in [`ops`]
//! first probes its call-site cache, falls back to the full prototype-chain
//! walk, and then lets [`cache::operators`] decide what the call site may
//! remember. Disabling the [`execution::CachePolicy`] changes no semantics.

pub mod cache;
pub mod execution;
pub mod heap;
pub mod object;
pub mod ops;
pub mod types;

pub use cache::{CacheEntry, CacheRef};
pub use execution::{Agent, CachePolicy, PropertyGuard};
pub use heap::indexes::{
    InlineCacheId, ObjectIndex, PolyCacheId, ScriptContextId, TypeIndex, TypePathIndex,
};
pub use ops::{ReadOutcome, WriteOutcome};
pub use types::{PropertyAttributes, PropertyError, PropertyKey, PropertyName, SlotLocation, Value};
