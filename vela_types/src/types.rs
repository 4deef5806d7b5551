// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod attributes;
pub(crate) mod dictionary;
pub(crate) mod handler;
pub(crate) mod path_handler;
pub(crate) mod successors;
pub(crate) mod type_path;

use std::num::NonZeroU32;

pub use attributes::PropertyAttributes;
pub use handler::SlotLocation;
// The record types are nameable so the arena index aliases stay public;
// their contents are not.
pub use handler::TypeRecord;
pub use type_path::TypePathRecord;
pub(crate) use handler::{OwnLookup, TypeHandler, lookup_own};

use thiserror::Error;

/// An interned property name. Names are interned once per [`Agent`] and
/// compared by identity everywhere after that.
///
/// [`Agent`]: crate::execution::Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyName(NonZeroU32);

const _NAME_SIZE_IS_U32: () =
    assert!(size_of::<Option<PropertyName>>() == size_of::<u32>());

impl PropertyName {
    pub(crate) const fn from_u32_index(value: u32) -> Self {
        assert!(value != u32::MAX);
        // SAFETY: Number is not max value and will not overflow to zero.
        Self(unsafe { NonZeroU32::new_unchecked(value + 1) })
    }

    pub(crate) const fn into_u32_index(self) -> u32 {
        self.0.get() - 1
    }
}

/// A property key: an interned name, or a canonical array index.
///
/// Interning turns numeric strings into their index form, so `"0"` and index
/// 0 are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(PropertyName),
    Index(u32),
}

/// An engine value. Values are opaque payloads to the type system; only
/// function-ness matters, for fixed-field speculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    /// Handle to an engine function; the payload identifies it.
    Function(u32),
}

/// Strict-mode property operation failures. Everything cache-related is
/// infallible; ineligibility is always a silent skip.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("cannot write to read-only property")]
    NotWritable,
    #[error("cannot delete non-configurable property")]
    NotConfigurable,
}
