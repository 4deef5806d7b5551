// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod indexes;

use crate::cache::records::{InlineCacheRecord, PolyCacheRecord};
use crate::execution::ScriptContextRecord;
use crate::object::ObjectRecord;
use crate::types::{TypePathRecord, TypeRecord};

use indexes::{TypeIndex, TypePathIndex};

/// All arenas of the agent. Indices handed out for arena rows stay valid
/// for the life of the heap; rows are never removed or moved.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    pub(crate) type_paths: Vec<TypePathRecord>,
    pub(crate) types: Vec<TypeRecord>,
    pub(crate) objects: Vec<ObjectRecord>,
    pub(crate) contexts: Vec<ScriptContextRecord>,
    pub(crate) inline_caches: Vec<InlineCacheRecord>,
    pub(crate) poly_caches: Vec<PolyCacheRecord>,
}

impl Heap {
    pub(crate) fn create_type_path(&mut self, record: TypePathRecord) -> TypePathIndex {
        self.type_paths.push(record);
        TypePathIndex::last(&self.type_paths)
    }

    pub(crate) fn create_type(&mut self, record: TypeRecord) -> TypeIndex {
        self.types.push(record);
        TypeIndex::last(&self.types)
    }
}
