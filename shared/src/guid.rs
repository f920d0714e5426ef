//! 64-bit entity identifiers as they travel on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// High type tag stored in the top 16 bits of a group identity.
pub const HIGHGUID_GROUP: u64 = 0x1F50;

/// Opaque entity identifier.
///
/// The protocol never sends the value as a plain `u64` inside bit-packed
/// messages; it sends the eight bytes individually, each guarded by a
/// presence bit, in a per-message order. `byte`/`set_byte` give the layout
/// engine access to those bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjectGuid(pub u64);

impl ObjectGuid {
    pub const EMPTY: ObjectGuid = ObjectGuid(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Builds the identity of a group from its low counter.
    pub fn group(low: u32) -> Self {
        Self((HIGHGUID_GROUP << 48) | u64::from(low))
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Byte `index` (0 = least significant).
    pub fn byte(self, index: u8) -> u8 {
        debug_assert!(index < 8);
        (self.0 >> (u64::from(index) * 8)) as u8
    }

    pub fn set_byte(&mut self, index: u8, value: u8) {
        debug_assert!(index < 8);
        let shift = u64::from(index) * 8;
        self.0 = (self.0 & !(0xFFu64 << shift)) | (u64::from(value) << shift);
    }

    /// Presence mask used by the packed form: bit `i` set when byte `i` is non-zero.
    pub fn pack_mask(self) -> u8 {
        (0..8u8).fold(0, |mask, i| if self.byte(i) != 0 { mask | (1 << i) } else { mask })
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for ObjectGuid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
