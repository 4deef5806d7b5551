// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Property attributes as seen by engine consumers.
///
/// The accessor and bookkeeping bits of [`SlotAttributes`] are not part of
/// this view; they belong to the slot layout, not to the property descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }
}

/// Packed per-slot attribute bits stored in type handlers.
///
/// A slot is either a data slot, a getter slot (ACCESSOR set, the paired
/// setter lives in a separate unmapped slot), or a setter slot (SETTER set;
/// such slots are invisible to key lookup). DELETED only appears in
/// dictionary descriptor tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotAttributes(u8);

impl SlotAttributes {
    const WRITABLE: u8 = 0b0000_0001;
    const ENUMERABLE: u8 = 0b0000_0010;
    const CONFIGURABLE: u8 = 0b0000_0100;
    const ACCESSOR: u8 = 0b0000_1000;
    const SETTER: u8 = 0b0001_0000;
    const DELETED: u8 = 0b0010_0000;

    /// Writable, enumerable and configurable; what a plain assignment adds.
    pub(crate) const DEFAULT: Self =
        Self(Self::WRITABLE | Self::ENUMERABLE | Self::CONFIGURABLE);
    /// The unmapped slot holding the setter half of an accessor pair.
    pub(crate) const SETTER_ENTRY: Self = Self(Self::SETTER);
    /// Tombstone for dictionary descriptor tables.
    pub(crate) const DELETED_ENTRY: Self = Self(Self::DELETED);

    pub(crate) fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE != 0
    }

    pub(crate) fn is_enumerable(self) -> bool {
        self.0 & Self::ENUMERABLE != 0
    }

    pub(crate) fn is_configurable(self) -> bool {
        self.0 & Self::CONFIGURABLE != 0
    }

    pub(crate) fn is_accessor(self) -> bool {
        self.0 & Self::ACCESSOR != 0
    }

    pub(crate) fn is_setter_entry(self) -> bool {
        self.0 & Self::SETTER != 0
    }

    pub(crate) fn is_deleted(self) -> bool {
        self.0 & Self::DELETED != 0
    }

    pub(crate) fn with_accessor(self) -> Self {
        Self(self.0 | Self::ACCESSOR)
    }
}

impl core::fmt::Debug for SlotAttributes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SlotAttributes(")?;
        for (bit, name) in [
            (Self::WRITABLE, "w"),
            (Self::ENUMERABLE, "e"),
            (Self::CONFIGURABLE, "c"),
            (Self::ACCESSOR, "a"),
            (Self::SETTER, "s"),
            (Self::DELETED, "d"),
        ] {
            f.write_str(if self.0 & bit != 0 { name } else { "-" })?;
        }
        f.write_str(")")
    }
}

impl From<PropertyAttributes> for SlotAttributes {
    fn from(value: PropertyAttributes) -> Self {
        let mut bits = 0;
        if value.writable {
            bits |= Self::WRITABLE;
        }
        if value.enumerable {
            bits |= Self::ENUMERABLE;
        }
        if value.configurable {
            bits |= Self::CONFIGURABLE;
        }
        Self(bits)
    }
}

impl From<SlotAttributes> for PropertyAttributes {
    fn from(value: SlotAttributes) -> Self {
        Self {
            writable: value.is_writable(),
            enumerable: value.is_enumerable(),
            configurable: value.is_configurable(),
        }
    }
}
