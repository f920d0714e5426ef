//! Member stats: the full snapshot (`SMSG_PARTY_MEMBER_STATS_FULL`) and the
//! partial update pushed when a member changes (`SMSG_PARTY_MEMBER_STATS`).
//!
//! Unlike the other group messages these are byte-aligned and their sections
//! depend on the update mask, so they are written directly against the buffer.

use serde::{Deserialize, Serialize};

use crate::buffer::{PacketReader, PacketWriter};
use crate::error::CodecError;
use crate::guid::ObjectGuid;
use crate::types::{GroupUpdateFlags, MemberStatus, MAX_AURAS};

/// Aura flag announcing per-effect amounts after the aura.
pub const AURA_EFFECT_AMOUNTS: u16 = 0x20;
pub const MAX_SPELL_EFFECTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuraSlot {
    pub slot: u8,
    pub spell_id: u32,
    pub flags: u16,
    pub amounts: [i32; MAX_SPELL_EFFECTS],
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PetStats {
    pub guid: ObjectGuid,
    pub name: String,
    pub model_id: u16,
    pub health: u32,
    pub max_health: u32,
    pub power_type: u8,
    pub power: u16,
    pub max_power: u16,
    pub auras: Vec<AuraSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberStats {
    pub guid: ObjectGuid,
    /// Empty for a member that is not online.
    pub status: MemberStatus,
    pub health: u32,
    pub max_health: u32,
    /// Zero is mana, which the mask leaves implicit.
    pub power_type: u8,
    pub power: u16,
    pub max_power: u16,
    pub level: u16,
    pub zone: u16,
    pub position: [u16; 3],
    pub auras: Vec<AuraSlot>,
    pub pet: Option<PetStats>,
    pub vehicle_seat: Option<u32>,
    pub phases: Vec<u16>,
}

impl MemberStats {
    /// The short form sent for a member that cannot be found online.
    pub fn offline(guid: ObjectGuid) -> Self {
        Self {
            guid,
            ..Self::default()
        }
    }

    pub fn is_online(&self) -> bool {
        self.status.contains(MemberStatus::ONLINE)
    }

    pub fn update_flags(&self) -> GroupUpdateFlags {
        if !self.is_online() {
            return GroupUpdateFlags::STATUS;
        }

        let mut flags = GroupUpdateFlags::STATUS
            | GroupUpdateFlags::CUR_HP
            | GroupUpdateFlags::MAX_HP
            | GroupUpdateFlags::CUR_POWER
            | GroupUpdateFlags::MAX_POWER
            | GroupUpdateFlags::LEVEL
            | GroupUpdateFlags::ZONE
            | GroupUpdateFlags::POSITION
            | GroupUpdateFlags::AURAS
            | GroupUpdateFlags::PET_NAME
            | GroupUpdateFlags::PET_MODEL_ID
            | GroupUpdateFlags::PET_AURAS;
        if self.power_type != 0 {
            flags |= GroupUpdateFlags::POWER_TYPE;
        }
        if self.pet.is_some() {
            flags |= GroupUpdateFlags::PET_GUID
                | GroupUpdateFlags::PET_CUR_HP
                | GroupUpdateFlags::PET_MAX_HP
                | GroupUpdateFlags::PET_POWER_TYPE
                | GroupUpdateFlags::PET_CUR_POWER
                | GroupUpdateFlags::PET_MAX_POWER;
        }
        if self.vehicle_seat.is_some() {
            flags |= GroupUpdateFlags::VEHICLE_SEAT;
        }
        if !self.phases.is_empty() {
            flags |= GroupUpdateFlags::PHASE;
        }
        flags
    }

    pub fn write(&self, out: &mut PacketWriter) -> Result<(), CodecError> {
        let flags = self.update_flags();
        out.write_u8(0);
        out.write_packed_guid(self.guid);
        out.write_u32(flags.bits());
        self.write_fields(flags, out)
    }

    pub fn read(input: &mut PacketReader<'_>) -> Result<MemberStats, CodecError> {
        input.read_u8()?;
        let guid = input.read_packed_guid()?;
        let flags = read_flags(input)?;
        let (mut stats, pet) = read_fields(guid, flags, input)?;
        stats.pet = flags.contains(GroupUpdateFlags::PET_GUID).then_some(pet);
        Ok(stats)
    }

    /// Writes the sections named by `flags`, in wire order. A missing pet
    /// is written as zeros.
    fn write_fields(&self, flags: GroupUpdateFlags, out: &mut PacketWriter) -> Result<(), CodecError> {
        if flags.contains(GroupUpdateFlags::STATUS) {
            out.write_u16(self.status.bits());
        }
        if flags.contains(GroupUpdateFlags::CUR_HP) {
            out.write_u32(self.health);
        }
        if flags.contains(GroupUpdateFlags::MAX_HP) {
            out.write_u32(self.max_health);
        }
        if flags.contains(GroupUpdateFlags::POWER_TYPE) {
            out.write_u8(self.power_type);
        }
        if flags.contains(GroupUpdateFlags::CUR_POWER) {
            out.write_u16(self.power);
        }
        if flags.contains(GroupUpdateFlags::MAX_POWER) {
            out.write_u16(self.max_power);
        }
        if flags.contains(GroupUpdateFlags::LEVEL) {
            out.write_u16(self.level);
        }
        if flags.contains(GroupUpdateFlags::ZONE) {
            out.write_u16(self.zone);
        }
        if flags.contains(GroupUpdateFlags::POSITION) {
            for axis in self.position {
                out.write_u16(axis);
            }
        }
        if flags.contains(GroupUpdateFlags::AURAS) {
            write_auras(&self.auras, out)?;
        }

        let pet = self.pet.as_ref();
        if flags.contains(GroupUpdateFlags::PET_GUID) {
            out.write_u64(pet.map(|p| p.guid.raw()).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_NAME) {
            out.write_cstring(pet.map(|p| p.name.as_str()).unwrap_or(""));
        }
        if flags.contains(GroupUpdateFlags::PET_MODEL_ID) {
            out.write_u16(pet.map(|p| p.model_id).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_CUR_HP) {
            out.write_u32(pet.map(|p| p.health).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_MAX_HP) {
            out.write_u32(pet.map(|p| p.max_health).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_POWER_TYPE) {
            out.write_u8(pet.map(|p| p.power_type).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_CUR_POWER) {
            out.write_u16(pet.map(|p| p.power).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_MAX_POWER) {
            out.write_u16(pet.map(|p| p.max_power).unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PET_AURAS) {
            write_auras(pet.map(|p| p.auras.as_slice()).unwrap_or(&[]), out)?;
        }

        if flags.contains(GroupUpdateFlags::VEHICLE_SEAT) {
            out.write_u32(self.vehicle_seat.unwrap_or(0));
        }
        if flags.contains(GroupUpdateFlags::PHASE) {
            out.write_u32(0);
            out.write_u32(self.phases.len() as u32);
            for phase in &self.phases {
                out.write_u16(*phase);
            }
        }
        Ok(())
    }
}

/// The sections of one member's stats that changed, pushed to the rest of
/// the group (`SMSG_PARTY_MEMBER_STATS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatsUpdate {
    pub mask: GroupUpdateFlags,
    /// Only the sections named by `mask` are meaningful; the rest hold
    /// defaults.
    pub stats: MemberStats,
}

impl MemberStatsUpdate {
    /// Keeps the sections of `stats` named by `mask`. A new power type
    /// always travels with the current and maximum power.
    pub fn new(stats: &MemberStats, mask: GroupUpdateFlags) -> Self {
        let mut mask = mask;
        if mask.contains(GroupUpdateFlags::POWER_TYPE) {
            mask |= GroupUpdateFlags::CUR_POWER | GroupUpdateFlags::MAX_POWER;
        }
        if mask.contains(GroupUpdateFlags::PET_POWER_TYPE) {
            mask |= GroupUpdateFlags::PET_CUR_POWER | GroupUpdateFlags::PET_MAX_POWER;
        }

        let has = |flag| mask.contains(flag);
        let mut kept = MemberStats::offline(stats.guid);
        if has(GroupUpdateFlags::STATUS) {
            kept.status = stats.status;
        }
        if has(GroupUpdateFlags::CUR_HP) {
            kept.health = stats.health;
        }
        if has(GroupUpdateFlags::MAX_HP) {
            kept.max_health = stats.max_health;
        }
        if has(GroupUpdateFlags::POWER_TYPE) {
            kept.power_type = stats.power_type;
        }
        if has(GroupUpdateFlags::CUR_POWER) {
            kept.power = stats.power;
        }
        if has(GroupUpdateFlags::MAX_POWER) {
            kept.max_power = stats.max_power;
        }
        if has(GroupUpdateFlags::LEVEL) {
            kept.level = stats.level;
        }
        if has(GroupUpdateFlags::ZONE) {
            kept.zone = stats.zone;
        }
        if has(GroupUpdateFlags::POSITION) {
            kept.position = stats.position;
        }
        if has(GroupUpdateFlags::AURAS) {
            kept.auras = sorted_auras(&stats.auras);
        }
        if mask.intersects(GroupUpdateFlags::PET) {
            let source = stats.pet.clone().unwrap_or_default();
            let mut pet = PetStats::default();
            if has(GroupUpdateFlags::PET_GUID) {
                pet.guid = source.guid;
            }
            if has(GroupUpdateFlags::PET_NAME) {
                pet.name = source.name;
            }
            if has(GroupUpdateFlags::PET_MODEL_ID) {
                pet.model_id = source.model_id;
            }
            if has(GroupUpdateFlags::PET_CUR_HP) {
                pet.health = source.health;
            }
            if has(GroupUpdateFlags::PET_MAX_HP) {
                pet.max_health = source.max_health;
            }
            if has(GroupUpdateFlags::PET_POWER_TYPE) {
                pet.power_type = source.power_type;
            }
            if has(GroupUpdateFlags::PET_CUR_POWER) {
                pet.power = source.power;
            }
            if has(GroupUpdateFlags::PET_MAX_POWER) {
                pet.max_power = source.max_power;
            }
            if has(GroupUpdateFlags::PET_AURAS) {
                pet.auras = sorted_auras(&source.auras);
            }
            kept.pet = Some(pet);
        }
        if has(GroupUpdateFlags::VEHICLE_SEAT) {
            kept.vehicle_seat = Some(stats.vehicle_seat.unwrap_or(0));
        }
        if has(GroupUpdateFlags::PHASE) {
            kept.phases = stats.phases.clone();
        }
        Self { mask, stats: kept }
    }

    pub fn write(&self, out: &mut PacketWriter) -> Result<(), CodecError> {
        out.write_packed_guid(self.stats.guid);
        out.write_u32(self.mask.bits());
        self.stats.write_fields(self.mask, out)
    }

    pub fn read(input: &mut PacketReader<'_>) -> Result<MemberStatsUpdate, CodecError> {
        let guid = input.read_packed_guid()?;
        let mask = read_flags(input)?;
        let (mut stats, pet) = read_fields(guid, mask, input)?;
        stats.pet = mask.intersects(GroupUpdateFlags::PET).then_some(pet);
        Ok(MemberStatsUpdate { mask, stats })
    }
}

fn read_flags(input: &mut PacketReader<'_>) -> Result<GroupUpdateFlags, CodecError> {
    let raw = input.read_u32()?;
    GroupUpdateFlags::from_bits(raw).ok_or(CodecError::InvalidValue {
        field: "update flags",
        value: u64::from(raw),
    })
}

/// Reads the sections named by `flags`. Pet sections land in the returned
/// `PetStats`; the caller decides whether the member has a pet.
fn read_fields(
    guid: ObjectGuid,
    flags: GroupUpdateFlags,
    input: &mut PacketReader<'_>,
) -> Result<(MemberStats, PetStats), CodecError> {
    let mut stats = MemberStats::offline(guid);
    if flags.contains(GroupUpdateFlags::STATUS) {
        stats.status = MemberStatus::from_bits_retain(input.read_u16()?);
    }
    if flags.contains(GroupUpdateFlags::CUR_HP) {
        stats.health = input.read_u32()?;
    }
    if flags.contains(GroupUpdateFlags::MAX_HP) {
        stats.max_health = input.read_u32()?;
    }
    if flags.contains(GroupUpdateFlags::POWER_TYPE) {
        stats.power_type = input.read_u8()?;
    }
    if flags.contains(GroupUpdateFlags::CUR_POWER) {
        stats.power = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::MAX_POWER) {
        stats.max_power = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::LEVEL) {
        stats.level = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::ZONE) {
        stats.zone = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::POSITION) {
        for axis in stats.position.iter_mut() {
            *axis = input.read_u16()?;
        }
    }
    if flags.contains(GroupUpdateFlags::AURAS) {
        stats.auras = read_auras(input)?;
    }

    let mut pet = PetStats::default();
    if flags.contains(GroupUpdateFlags::PET_GUID) {
        pet.guid = ObjectGuid(input.read_u64()?);
    }
    if flags.contains(GroupUpdateFlags::PET_NAME) {
        pet.name = input.read_cstring()?;
    }
    if flags.contains(GroupUpdateFlags::PET_MODEL_ID) {
        pet.model_id = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::PET_CUR_HP) {
        pet.health = input.read_u32()?;
    }
    if flags.contains(GroupUpdateFlags::PET_MAX_HP) {
        pet.max_health = input.read_u32()?;
    }
    if flags.contains(GroupUpdateFlags::PET_POWER_TYPE) {
        pet.power_type = input.read_u8()?;
    }
    if flags.contains(GroupUpdateFlags::PET_CUR_POWER) {
        pet.power = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::PET_MAX_POWER) {
        pet.max_power = input.read_u16()?;
    }
    if flags.contains(GroupUpdateFlags::PET_AURAS) {
        pet.auras = read_auras(input)?;
    }

    if flags.contains(GroupUpdateFlags::VEHICLE_SEAT) {
        stats.vehicle_seat = Some(input.read_u32()?);
    }
    if flags.contains(GroupUpdateFlags::PHASE) {
        input.read_u32()?;
        let count = input.read_u32()?;
        for _ in 0..count {
            stats.phases.push(input.read_u16()?);
        }
    }
    Ok((stats, pet))
}

fn sorted_auras(auras: &[AuraSlot]) -> Vec<AuraSlot> {
    let mut sorted = auras.to_vec();
    sorted.sort_by_key(|aura| aura.slot);
    sorted
}

fn write_auras(auras: &[AuraSlot], out: &mut PacketWriter) -> Result<(), CodecError> {
    let mut sorted: Vec<&AuraSlot> = auras.iter().collect();
    sorted.sort_by_key(|aura| aura.slot);

    let mut mask = 0u64;
    for aura in &sorted {
        if aura.slot as usize >= MAX_AURAS || mask & (1 << aura.slot) != 0 {
            return Err(CodecError::InvalidValue {
                field: "aura slot",
                value: u64::from(aura.slot),
            });
        }
        mask |= 1 << aura.slot;
    }

    out.write_u8(1);
    out.write_u64(mask);
    out.write_u32(MAX_AURAS as u32);
    for aura in sorted {
        out.write_u32(aura.spell_id);
        out.write_u16(aura.flags);
        if aura.flags & AURA_EFFECT_AMOUNTS != 0 {
            for amount in aura.amounts {
                out.write_i32(amount);
            }
        }
    }
    Ok(())
}

fn read_auras(input: &mut PacketReader<'_>) -> Result<Vec<AuraSlot>, CodecError> {
    input.read_u8()?;
    let mask = input.read_u64()?;
    input.read_u32()?;

    let mut auras = Vec::new();
    for slot in 0..MAX_AURAS as u8 {
        if mask & (1 << slot) == 0 {
            continue;
        }
        let spell_id = input.read_u32()?;
        let flags = input.read_u16()?;
        let mut amounts = [0; MAX_SPELL_EFFECTS];
        if flags & AURA_EFFECT_AMOUNTS != 0 {
            for amount in amounts.iter_mut() {
                *amount = input.read_i32()?;
            }
        }
        auras.push(AuraSlot {
            slot,
            spell_id,
            flags,
            amounts,
        });
    }
    Ok(auras)
}
