//! Declarative field-order tables for bit-packed messages.
//!
//! Every group message scatters the bytes of its GUIDs across the payload in
//! a fixed, message-specific order: first a presence bit per byte (in one
//! order), later the present bytes themselves (in another order), with the
//! message's other fields interleaved. Instead of hand-writing that order
//! for every message, each message declares a [`Layout`] and the single
//! [`write`]/[`read`] pair walks it against a [`Record`].

use crate::buffer::{PacketReader, PacketWriter};
use crate::error::CodecError;
use crate::guid::ObjectGuid;

/// GUID slots of a record. What each slot means is message-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First = 0,
    Second = 1,
    Third = 2,
}

const SLOT_COUNT: usize = 3;

/// Scalar fields a layout can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Operation,
    Result,
    Value,
    Accept,
    NameLen,
    RealmLen,
    ReasonLen,
    Role,
    OldRole,
    Method,
    Threshold,
    ItemSlot,
    RollType,
    X,
    Y,
    Minimum,
    Maximum,
    Roll,
    Icon,
    IconRequest,
    ToRaid,
    SubGroup,
    Apply,
    Assignment,
    Ready,
    Duration,
    InGroup,
    MarkerSlot,
    MarkerMask,
    Count,
    Counter,
    Status,
    GroupType,
    MemberFlags,
    PartyIndex,
}

const FIELD_COUNT: usize = Field::PartyIndex as usize + 1;

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Operation => "operation",
            Field::Result => "result",
            Field::Value => "value",
            Field::Accept => "accept",
            Field::NameLen => "name length",
            Field::RealmLen => "realm length",
            Field::ReasonLen => "reason length",
            Field::Role => "role",
            Field::OldRole => "old role",
            Field::Method => "loot method",
            Field::Threshold => "loot threshold",
            Field::ItemSlot => "item slot",
            Field::RollType => "roll type",
            Field::X => "x",
            Field::Y => "y",
            Field::Minimum => "minimum",
            Field::Maximum => "maximum",
            Field::Roll => "roll",
            Field::Icon => "icon",
            Field::IconRequest => "icon request",
            Field::ToRaid => "to raid",
            Field::SubGroup => "sub-group",
            Field::Apply => "apply",
            Field::Assignment => "assignment",
            Field::Ready => "ready",
            Field::Duration => "duration",
            Field::InGroup => "in group",
            Field::MarkerSlot => "marker slot",
            Field::MarkerMask => "marker mask",
            Field::Count => "count",
            Field::Counter => "counter",
            Field::Status => "status",
            Field::GroupType => "group type",
            Field::MemberFlags => "member flags",
            Field::PartyIndex => "party index",
        }
    }
}

/// String fields a layout can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    Name = 0,
    Realm = 1,
    Reason = 2,
}

const TEXT_COUNT: usize = 3;

/// Width of a constant zero written for fields the server does not use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U32,
    U64,
}

/// One element of a message layout, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Presence bits of a GUID slot, one per listed byte index.
    Mask(Slot, &'static [u8]),
    /// Present bytes of a GUID slot in the listed order, XOR 1.
    Bytes(Slot, &'static [u8]),
    Bit(Field),
    /// A boolean transmitted negated.
    InvertedBit(Field),
    Bits(Field, u8),
    /// Constant bits: zero on write, ignored on read.
    ZeroBits(u8),
    /// Constant set bit, ignored on read.
    OneBit,
    Flush,
    U8(Field),
    U16(Field),
    U32(Field),
    U64(Field),
    F32(Field),
    /// A GUID sent as a plain little-endian `u64`.
    RawGuid(Slot),
    Zero(Width),
    /// Raw bytes whose length was sent earlier in the given field.
    Str(Text, Field),
    CStr(Text),
}

pub type Layout = &'static [Step];

/// Values of one message instance, addressed by slot/field/text.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    guids: [ObjectGuid; SLOT_COUNT],
    values: [u64; FIELD_COUNT],
    texts: [String; TEXT_COUNT],
}

impl Default for Record {
    fn default() -> Self {
        Self {
            guids: std::array::from_fn(|_| Default::default()),
            values: [0; FIELD_COUNT],
            texts: std::array::from_fn(|_| String::new()),
        }
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guid(&self, slot: Slot) -> ObjectGuid {
        self.guids[slot as usize]
    }

    pub fn set_guid(&mut self, slot: Slot, guid: ObjectGuid) -> &mut Self {
        self.guids[slot as usize] = guid;
        self
    }

    pub fn get(&self, field: Field) -> u64 {
        self.values[field as usize]
    }

    pub fn set(&mut self, field: Field, value: impl Into<u64>) -> &mut Self {
        self.values[field as usize] = value.into();
        self
    }

    pub fn flag(&self, field: Field) -> bool {
        self.get(field) != 0
    }

    pub fn f32(&self, field: Field) -> f32 {
        f32::from_bits(self.get(field) as u32)
    }

    pub fn set_f32(&mut self, field: Field, value: f32) -> &mut Self {
        self.set(field, value.to_bits())
    }

    pub fn text(&self, text: Text) -> &str {
        &self.texts[text as usize]
    }

    pub fn take_text(&mut self, text: Text) -> String {
        std::mem::take(&mut self.texts[text as usize])
    }

    pub fn set_text(&mut self, text: Text, value: impl Into<String>) -> &mut Self {
        self.texts[text as usize] = value.into();
        self
    }

    /// Sets a string together with the length field announcing it.
    pub fn set_sized_text(&mut self, text: Text, len_field: Field, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        self.set(len_field, value.len() as u64);
        self.set_text(text, value)
    }

    /// Narrows a field to the given type or reports it as invalid.
    pub fn narrow<T: TryFrom<u64>>(&self, field: Field) -> Result<T, CodecError> {
        let value = self.get(field);
        T::try_from(value).map_err(|_| CodecError::InvalidValue {
            field: field.name(),
            value,
        })
    }
}

fn checked(record: &Record, field: Field, bits: u8) -> Result<u64, CodecError> {
    let value = record.get(field);
    if bits < 64 && value >> bits != 0 {
        return Err(CodecError::FieldOverflow {
            field: field.name(),
            value,
            bits,
        });
    }
    Ok(value)
}

/// Appends `record` to `out` following `layout`.
pub fn write(layout: &[Step], record: &Record, out: &mut PacketWriter) -> Result<(), CodecError> {
    for step in layout {
        match *step {
            Step::Mask(slot, order) => {
                let guid = record.guid(slot);
                for &index in order {
                    out.write_bit(guid.byte(index) != 0);
                }
            }
            Step::Bytes(slot, order) => {
                let guid = record.guid(slot);
                for &index in order {
                    out.write_guid_byte(guid, index);
                }
            }
            Step::Bit(field) => out.write_bit(record.flag(field)),
            Step::InvertedBit(field) => out.write_bit(!record.flag(field)),
            Step::Bits(field, count) => out.write_bits(checked(record, field, count)?, count),
            Step::ZeroBits(count) => out.write_bits(0, count),
            Step::OneBit => out.write_bit(true),
            Step::Flush => out.flush_bits(),
            Step::U8(field) => out.write_u8(checked(record, field, 8)? as u8),
            Step::U16(field) => out.write_u16(checked(record, field, 16)? as u16),
            Step::U32(field) => out.write_u32(checked(record, field, 32)? as u32),
            Step::U64(field) => out.write_u64(record.get(field)),
            Step::F32(field) => out.write_f32(record.f32(field)),
            Step::RawGuid(slot) => out.write_u64(record.guid(slot).raw()),
            Step::Zero(Width::U8) => out.write_u8(0),
            Step::Zero(Width::U32) => out.write_u32(0),
            Step::Zero(Width::U64) => out.write_u64(0),
            Step::Str(text, len_field) => {
                let value = record.text(text);
                if value.len() as u64 != record.get(len_field) {
                    return Err(CodecError::InvalidValue {
                        field: len_field.name(),
                        value: record.get(len_field),
                    });
                }
                out.write_bytes(value.as_bytes());
            }
            Step::CStr(text) => out.write_cstring(record.text(text)),
        }
    }
    Ok(())
}

/// Fills `record` from `input` following `layout`.
pub fn read(layout: &[Step], input: &mut PacketReader<'_>, record: &mut Record) -> Result<(), CodecError> {
    for step in layout {
        match *step {
            Step::Mask(slot, order) => {
                let mut guid = record.guid(slot);
                for &index in order {
                    guid.set_byte(index, u8::from(input.read_bit()?));
                }
                record.set_guid(slot, guid);
            }
            Step::Bytes(slot, order) => {
                let mut guid = record.guid(slot);
                for &index in order {
                    input.read_guid_byte(&mut guid, index)?;
                }
                record.set_guid(slot, guid);
            }
            Step::Bit(field) => {
                let bit = input.read_bit()?;
                record.set(field, bit);
            }
            Step::InvertedBit(field) => {
                let bit = input.read_bit()?;
                record.set(field, !bit);
            }
            Step::Bits(field, count) => {
                let value = input.read_bits(count)?;
                record.set(field, value);
            }
            Step::ZeroBits(count) => {
                input.read_bits(count)?;
            }
            Step::OneBit => {
                input.read_bit()?;
            }
            Step::Flush => input.reset_bits(),
            Step::U8(field) => {
                let value = input.read_u8()?;
                record.set(field, value);
            }
            Step::U16(field) => {
                let value = input.read_u16()?;
                record.set(field, value);
            }
            Step::U32(field) => {
                let value = input.read_u32()?;
                record.set(field, value);
            }
            Step::U64(field) => {
                let value = input.read_u64()?;
                record.set(field, value);
            }
            Step::F32(field) => {
                let value = input.read_f32()?;
                record.set_f32(field, value);
            }
            Step::RawGuid(slot) => {
                let value = input.read_u64()?;
                record.set_guid(slot, ObjectGuid(value));
            }
            Step::Zero(Width::U8) => {
                input.read_u8()?;
            }
            Step::Zero(Width::U32) => {
                input.read_u32()?;
            }
            Step::Zero(Width::U64) => {
                input.read_u64()?;
            }
            Step::Str(text, len_field) => {
                let len = record.get(len_field) as usize;
                let value = input.read_string(len)?;
                record.set_text(text, value);
            }
            Step::CStr(text) => {
                let value = input.read_cstring()?;
                record.set_text(text, value);
            }
        }
    }
    Ok(())
}
