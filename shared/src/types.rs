//! Enumerations, flag sets and limits shared by client and server.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

pub const MAX_PARTY_SIZE: usize = 5;
pub const MAX_RAID_SIZE: usize = 40;
pub const MAX_RAID_SUBGROUPS: u8 = 8;
pub const MAX_SUBGROUP_SIZE: usize = 5;
pub const TARGET_ICON_COUNT: usize = 8;
pub const WORLD_MARKER_COUNT: usize = 5;
pub const READY_CHECK_DURATION_MS: u32 = 35_000;
pub const MAX_RANDOM_ROLL: u32 = 10_000;
pub const MAX_PLAYER_NAME: usize = 12;
pub const MAX_AURAS: usize = 64;

/// Icon value that asks for the whole icon list instead of setting one.
pub const TARGET_ICON_LIST_REQUEST: u8 = 0xFF;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident($repr:ident, $label:literal) { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr($repr)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn to_wire(self) -> $repr {
                self as $repr
            }
        }

        impl TryFrom<u64> for $name {
            type Error = CodecError;

            fn try_from(value: u64) -> Result<Self, CodecError> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(CodecError::InvalidValue { field: $label, value }),
                }
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> u64 {
                value as u64
            }
        }
    };
}

wire_enum! {
    /// Which command a `PartyCommandResult` answers.
    PartyOperation(u32, "party operation") {
        Invite = 0,
        Uninvite = 1,
        Leave = 2,
        Swap = 4,
    }
}

wire_enum! {
    /// Result codes shown to the player verbatim.
    PartyResult(u32, "party result") {
        Ok = 0,
        BadTargetName = 1,
        TargetNotInGroup = 2,
        TargetNotInInstance = 3,
        GroupFull = 4,
        AlreadyGrouped = 5,
        NotInGroup = 6,
        NotLeader = 7,
        WrongFaction = 8,
        TargetIgnoringYou = 9,
        InviteRestricted = 13,
        LfgCooldown = 21,
    }
}

wire_enum! {
    LootMethod(u8, "loot method") {
        FreeForAll = 0,
        RoundRobin = 1,
        MasterLoot = 2,
        GroupLoot = 3,
        NeedBeforeGreed = 4,
    }
}

wire_enum! {
    ItemQuality(u8, "item quality") {
        Poor = 0,
        Common = 1,
        Uncommon = 2,
        Rare = 3,
        Epic = 4,
        Legendary = 5,
        Artifact = 6,
        Heirloom = 7,
    }
}

wire_enum! {
    RollVote(u8, "roll vote") {
        Pass = 0,
        Need = 1,
        Greed = 2,
    }
}

wire_enum! {
    GroupKind(u8, "group type") {
        Party = 0,
        Raid = 2,
    }
}

wire_enum! {
    /// Single-holder raid assignments.
    Assignment(u8, "assignment") {
        MainTank = 0,
        MainAssist = 1,
    }
}

impl GroupKind {
    pub fn capacity(self) -> usize {
        match self {
            GroupKind::Party => MAX_PARTY_SIZE,
            GroupKind::Raid => MAX_RAID_SIZE,
        }
    }

    pub fn is_raid(self) -> bool {
        self == GroupKind::Raid
    }
}

impl Default for LootMethod {
    fn default() -> Self {
        LootMethod::GroupLoot
    }
}

impl Default for ItemQuality {
    fn default() -> Self {
        ItemQuality::Uncommon
    }
}

impl Assignment {
    pub fn flag(self) -> MemberFlags {
        match self {
            Assignment::MainTank => MemberFlags::MAIN_TANK,
            Assignment::MainAssist => MemberFlags::MAIN_ASSIST,
        }
    }
}

bitflags! {
    /// Per-member raid flags as sent in the roster.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MemberFlags: u8 {
        const ASSISTANT = 0x01;
        const MAIN_TANK = 0x02;
        const MAIN_ASSIST = 0x04;
    }
}

bitflags! {
    /// Group-finder role mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Roles: u32 {
        const TANK = 0x02;
        const HEALER = 0x04;
        const DAMAGE = 0x08;
    }
}

bitflags! {
    /// Online/combat status of a member. Empty means offline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MemberStatus: u16 {
        const ONLINE = 0x0001;
        const PVP = 0x0002;
        const DEAD = 0x0004;
        const GHOST = 0x0008;
        const PVP_FFA = 0x0010;
        const AFK = 0x0040;
        const DND = 0x0080;
    }
}

bitflags! {
    /// Which sections a member stats message carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GroupUpdateFlags: u32 {
        const STATUS = 0x0000_0001;
        const CUR_HP = 0x0000_0002;
        const MAX_HP = 0x0000_0004;
        const POWER_TYPE = 0x0000_0008;
        const CUR_POWER = 0x0000_0010;
        const MAX_POWER = 0x0000_0020;
        const LEVEL = 0x0000_0040;
        const ZONE = 0x0000_0080;
        const POSITION = 0x0000_0200;
        const AURAS = 0x0000_0400;
        const PET_GUID = 0x0000_0800;
        const PET_NAME = 0x0000_1000;
        const PET_MODEL_ID = 0x0000_2000;
        const PET_CUR_HP = 0x0000_4000;
        const PET_MAX_HP = 0x0000_8000;
        const PET_POWER_TYPE = 0x0001_0000;
        const PET_CUR_POWER = 0x0002_0000;
        const PET_MAX_POWER = 0x0004_0000;
        const PET_AURAS = 0x0008_0000;
        const VEHICLE_SEAT = 0x0010_0000;
        const PHASE = 0x0020_0000;

        const PET = Self::PET_GUID.bits()
            | Self::PET_NAME.bits()
            | Self::PET_MODEL_ID.bits()
            | Self::PET_CUR_HP.bits()
            | Self::PET_MAX_HP.bits()
            | Self::PET_POWER_TYPE.bits()
            | Self::PET_CUR_POWER.bits()
            | Self::PET_MAX_POWER.bits()
            | Self::PET_AURAS.bits();
        const FULL = Self::STATUS.bits()
            | Self::CUR_HP.bits()
            | Self::MAX_HP.bits()
            | Self::POWER_TYPE.bits()
            | Self::CUR_POWER.bits()
            | Self::MAX_POWER.bits()
            | Self::LEVEL.bits()
            | Self::ZONE.bits()
            | Self::POSITION.bits()
            | Self::AURAS.bits()
            | Self::PET.bits()
            | Self::VEHICLE_SEAT.bits()
            | Self::PHASE.bits();
    }
}

/// Faction of a player; members of opposite teams cannot group by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Alliance,
    Horde,
}
