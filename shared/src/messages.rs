//! Typed group commands and events, and the field-order table of each.
//!
//! Decoding a client command and encoding a server event both go through
//! [`layout`]; this module only maps typed values onto a [`Record`] and picks
//! the table for the opcode. Messages with a repeated section (roster, icon
//! list) are split into header, per-entry bits, per-entry bytes and footer.

use serde::{Deserialize, Serialize};

use crate::buffer::{PacketReader, PacketWriter};
use crate::error::CodecError;
use crate::guid::ObjectGuid;
use crate::layout::{self, Field, Layout, Record, Slot, Step, Text, Width};
use Slot::{First, Second, Third};
use crate::opcodes::{Direction, Opcode};
use crate::stats::{MemberStats, MemberStatsUpdate};
use crate::types::{
    Assignment, GroupKind, ItemQuality, LootMethod, MemberFlags, PartyOperation, PartyResult, Roles, RollVote,
    MAX_RAID_SIZE, TARGET_ICON_COUNT, TARGET_ICON_LIST_REQUEST,
};

/// An opcode and its encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldPacket {
    pub opcode: u16,
    pub payload: Vec<u8>,
}

impl WorldPacket {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode: opcode.value(),
            payload,
        }
    }
}

// Client commands. `First` is always the GUID the command is about.

const GROUP_INVITE: Layout = &[
    Step::Zero(Width::U32),
    Step::Zero(Width::U8),
    Step::Zero(Width::U32),
    Step::Mask(First, &[7]),
    Step::Bits(Field::RealmLen, 9),
    Step::Mask(First, &[3]),
    Step::Bits(Field::NameLen, 9),
    Step::Mask(First, &[2, 5, 4, 0, 1, 6]),
    Step::Bytes(First, &[7, 6, 0, 4]),
    Step::Str(Text::Realm, Field::RealmLen),
    Step::Bytes(First, &[1, 2, 3]),
    Step::Str(Text::Name, Field::NameLen),
    Step::Bytes(First, &[5]),
];

const INVITE_RESPONSE: Layout = &[Step::Zero(Width::U8), Step::ZeroBits(1), Step::Bit(Field::Accept)];

const UNINVITE_GUID: Layout = &[
    Step::Zero(Width::U8),
    Step::Mask(First, &[6, 4, 3, 2, 0, 1, 7, 5]),
    Step::Bits(Field::ReasonLen, 8),
    Step::Str(Text::Reason, Field::ReasonLen),
    Step::Bytes(First, &[5, 6, 1, 4, 3, 2, 7, 0]),
];

const SET_LEADER: Layout = &[
    Step::Zero(Width::U8),
    Step::Mask(First, &[1, 7, 0, 2, 5, 3, 4, 6]),
    Step::Bytes(First, &[1, 5, 7, 6, 0, 2, 4, 3]),
];

const SET_ROLES: Layout = &[
    Step::Zero(Width::U8),
    Step::U32(Field::Role),
    Step::Mask(First, &[2, 0, 7, 4, 1, 3, 6, 5]),
    Step::Bytes(First, &[1, 5, 2, 6, 7, 0, 4, 3]),
];

const LOOT_METHOD: Layout = &[
    Step::U8(Field::Threshold),
    Step::U8(Field::Method),
    Step::Zero(Width::U32),
    Step::Mask(First, &[7, 1, 2, 0, 4, 5, 6, 3]),
    Step::Bytes(First, &[7, 1, 3, 4, 6, 5, 0, 2]),
];

const LOOT_ROLL: Layout = &[Step::RawGuid(First), Step::U32(Field::ItemSlot), Step::U8(Field::RollType)];

const MINIMAP_PING_REQUEST: Layout = &[Step::F32(Field::Y), Step::F32(Field::X), Step::Zero(Width::U8)];

const RANDOM_ROLL_REQUEST: Layout = &[
    Step::U32(Field::Maximum),
    Step::U32(Field::Minimum),
    Step::Zero(Width::U8),
];

const TARGET_ICON_HEADER: Layout = &[Step::U8(Field::IconRequest), Step::U8(Field::Icon)];

const TARGET_ICON_TARGET: Layout = &[
    Step::Mask(First, &[3, 2, 1, 5, 0, 6, 7, 4]),
    Step::Flush,
    Step::Bytes(First, &[2, 3, 0, 7, 5, 1, 6, 4]),
];

const RAID_CONVERT: Layout = &[Step::Bit(Field::ToRaid)];

const CHANGE_SUB_GROUP: Layout = &[Step::CStr(Text::Name), Step::U8(Field::SubGroup)];

const ASSISTANT_LEADER: Layout = &[
    Step::U8(Field::Apply),
    Step::Mask(First, &[2, 0, 6, 3, 1, 4, 5, 7]),
    Step::Flush,
    Step::Bytes(First, &[5, 1, 0, 7, 3, 6, 2, 4]),
];

const PARTY_ASSIGNMENT: Layout = &[Step::U8(Field::Assignment), Step::U8(Field::Apply), Step::RawGuid(First)];

const READY_CHECK_CONFIRM_REQUEST: Layout = &[
    Step::Zero(Width::U8),
    Step::Mask(First, &[2, 1, 0, 3, 6]),
    Step::Bit(Field::Ready),
    Step::Mask(First, &[7, 4, 5]),
    Step::Bytes(First, &[1, 0, 3, 2, 4, 5, 7, 6]),
];

const REQUEST_MEMBER_STATS: Layout = &[
    Step::ZeroBits(1),
    Step::Mask(First, &[7, 4, 0, 1, 3, 6, 2, 5]),
    Step::Bytes(First, &[3, 6, 5, 2, 1, 4, 0, 7]),
];

const OPT_OUT_OF_LOOT: Layout = &[Step::U8(Field::Apply)];

const CLEAR_WORLD_MARKER: Layout = &[Step::U8(Field::MarkerSlot)];

const SET_EVERYONE_ASSISTANT: Layout = &[Step::Bit(Field::Apply)];

const EMPTY: Layout = &[];

// Server events.

const PARTY_COMMAND_RESULT: Layout = &[
    Step::U32(Field::Operation),
    Step::CStr(Text::Name),
    Step::U32(Field::Result),
    Step::U32(Field::Value),
    Step::Zero(Width::U64),
];

/// `First` is the invited player.
const GROUP_INVITE_NOTIFY: Layout = &[
    Step::ZeroBits(8),
    Step::ZeroBits(8),
    Step::Mask(First, &[2]),
    Step::ZeroBits(1),
    Step::Bits(Field::NameLen, 6),
    Step::Mask(First, &[7, 5]),
    Step::InvertedBit(Field::InGroup),
    Step::ZeroBits(1),
    Step::Mask(First, &[1]),
    Step::ZeroBits(1),
    Step::ZeroBits(1),
    Step::ZeroBits(22),
    Step::Mask(First, &[3, 0, 4, 6]),
    Step::Flush,
    Step::Bytes(First, &[6, 7, 2, 0]),
    Step::Zero(Width::U64),
    Step::Zero(Width::U32),
    Step::Zero(Width::U32),
    Step::Bytes(First, &[1, 5, 4]),
    Step::Zero(Width::U32),
    Step::Str(Text::Name, Field::NameLen),
    Step::Bytes(First, &[3]),
    Step::Zero(Width::U32),
];

const GROUP_DECLINE: Layout = &[Step::CStr(Text::Name)];

/// `First` is the target, `Second` the assigner.
const GROUP_SET_ROLE: Layout = &[
    Step::Mask(Second, &[1]),
    Step::Mask(First, &[7, 6, 4, 1, 0]),
    Step::Mask(Second, &[0, 7]),
    Step::Mask(First, &[3]),
    Step::Mask(Second, &[6]),
    Step::Mask(First, &[2]),
    Step::Mask(Second, &[4, 5, 2]),
    Step::Mask(First, &[5]),
    Step::Mask(Second, &[3]),
    Step::Bytes(Second, &[1, 6, 2]),
    Step::Bytes(First, &[3]),
    Step::U32(Field::OldRole),
    Step::Bytes(Second, &[7]),
    Step::Bytes(First, &[5]),
    Step::Bytes(Second, &[3]),
    Step::Bytes(First, &[4, 7]),
    Step::Bytes(Second, &[5]),
    Step::Bytes(First, &[6, 2, 1, 0]),
    Step::Bytes(Second, &[4]),
    Step::Zero(Width::U8),
    Step::Bytes(Second, &[0]),
    Step::U32(Field::Role),
];

/// `First` is the group, `Second` the initiator.
const READY_CHECK_STARTED: Layout = &[
    Step::Mask(First, &[4, 2]),
    Step::Mask(Second, &[4]),
    Step::Mask(First, &[3, 7, 1, 0]),
    Step::Mask(Second, &[6, 5]),
    Step::Mask(First, &[6, 5]),
    Step::Mask(Second, &[0, 1, 2, 7, 3]),
    Step::U32(Field::Duration),
    Step::Bytes(First, &[2, 7, 3]),
    Step::Bytes(Second, &[4]),
    Step::Bytes(First, &[1, 0]),
    Step::Bytes(Second, &[1, 2, 6, 5]),
    Step::Bytes(First, &[6]),
    Step::Bytes(Second, &[0]),
    Step::Zero(Width::U8),
    Step::Bytes(Second, &[7]),
    Step::Bytes(First, &[4]),
    Step::Bytes(Second, &[3]),
    Step::Bytes(First, &[5]),
];

/// `First` is the group, `Second` the responding member.
const READY_CHECK_CONFIRMED: Layout = &[
    Step::Mask(First, &[4]),
    Step::Mask(Second, &[5, 3]),
    Step::Bit(Field::Ready),
    Step::Mask(First, &[2]),
    Step::Mask(Second, &[6]),
    Step::Mask(First, &[3]),
    Step::Mask(Second, &[0, 1]),
    Step::Mask(First, &[1, 5]),
    Step::Mask(Second, &[7, 4]),
    Step::Mask(First, &[6]),
    Step::Mask(Second, &[2]),
    Step::Mask(First, &[0, 7]),
    Step::Flush,
    Step::Bytes(Second, &[4, 2, 1]),
    Step::Bytes(First, &[4, 2]),
    Step::Bytes(Second, &[0]),
    Step::Bytes(First, &[5, 3]),
    Step::Bytes(Second, &[7]),
    Step::Bytes(First, &[6, 1]),
    Step::Bytes(Second, &[6, 3, 5]),
    Step::Bytes(First, &[0, 7]),
];

const READY_CHECK_COMPLETED: Layout = &[
    Step::Mask(First, &[4, 2, 5, 7, 1, 0, 3, 6]),
    Step::Bytes(First, &[6, 0, 3, 1, 5]),
    Step::Zero(Width::U8),
    Step::Bytes(First, &[7, 2, 4]),
];

/// `First` set the icon on `Second`.
const TARGET_ICON_SET: Layout = &[Step::RawGuid(First), Step::U8(Field::Icon), Step::RawGuid(Second)];

const MARKERS_CHANGED: Layout = &[Step::U32(Field::MarkerMask)];

const MINIMAP_PING: Layout = &[
    Step::F32(Field::Y),
    Step::F32(Field::X),
    Step::Mask(First, &[0, 5, 2, 7, 1, 3, 6, 4]),
    Step::Bytes(First, &[6, 5, 7, 2, 0, 3, 1, 4]),
];

const RANDOM_ROLL: Layout = &[
    Step::U32(Field::Roll),
    Step::U32(Field::Minimum),
    Step::U32(Field::Maximum),
    Step::Mask(First, &[0, 6, 7, 1, 4, 5, 2, 3]),
    Step::Bytes(First, &[5, 4, 2, 0, 3, 1, 6, 7]),
];

/// A message with one repeated section.
struct Repeated {
    header: Layout,
    entry_bits: Layout,
    entry_bytes: Layout,
    footer: Layout,
    max_entries: usize,
}

/// Header/footer: `First` group, `Second` leader, `Third` master looter.
const ROSTER: Repeated = Repeated {
    header: &[
        Step::Mask(First, &[3, 0, 6, 1, 4, 7, 2, 5]),
        Step::Mask(Second, &[5, 1, 7, 0, 2, 6, 4, 3]),
        Step::Bits(Field::Count, 6),
    ],
    entry_bits: &[Step::Mask(First, &[1, 6, 0, 4, 7, 2, 5, 3]), Step::Bits(Field::NameLen, 6)],
    entry_bytes: &[
        Step::Bytes(First, &[0, 6, 4, 3, 2, 1, 7, 5]),
        Step::Str(Text::Name, Field::NameLen),
        Step::U8(Field::Status),
        Step::U8(Field::SubGroup),
        Step::U8(Field::MemberFlags),
        Step::U32(Field::Role),
    ],
    footer: &[
        Step::Bytes(First, &[1, 6, 2, 7, 3, 0, 5, 4]),
        Step::Bytes(Second, &[3, 2, 0, 6, 1, 5, 7, 4]),
        Step::U8(Field::GroupType),
        Step::U8(Field::PartyIndex),
        Step::U8(Field::MemberFlags),
        Step::U32(Field::Counter),
        Step::U8(Field::Method),
        Step::RawGuid(Third),
        Step::U8(Field::Threshold),
    ],
    max_entries: MAX_RAID_SIZE,
};

const TARGET_ICON_LIST: Repeated = Repeated {
    header: &[Step::U8(Field::Count)],
    entry_bits: EMPTY,
    entry_bytes: &[Step::U8(Field::Icon), Step::RawGuid(First)],
    footer: EMPTY,
    max_entries: TARGET_ICON_COUNT,
};

impl Repeated {
    fn write(&self, head: &mut Record, entries: &[Record], out: &mut PacketWriter) -> Result<(), CodecError> {
        head.set(Field::Count, entries.len() as u64);
        layout::write(self.header, head, out)?;
        for entry in entries {
            layout::write(self.entry_bits, entry, out)?;
        }
        out.flush_bits();
        for entry in entries {
            layout::write(self.entry_bytes, entry, out)?;
        }
        layout::write(self.footer, head, out)
    }

    fn read(&self, input: &mut PacketReader<'_>) -> Result<(Record, Vec<Record>), CodecError> {
        let mut head = Record::new();
        layout::read(self.header, input, &mut head)?;
        let count = head.get(Field::Count);
        if count as usize > self.max_entries {
            return Err(CodecError::InvalidValue {
                field: Field::Count.name(),
                value: count,
            });
        }
        let mut entries = vec![Record::new(); count as usize];
        for entry in entries.iter_mut() {
            layout::read(self.entry_bits, input, entry)?;
        }
        input.reset_bits();
        for entry in entries.iter_mut() {
            layout::read(self.entry_bytes, input, entry)?;
        }
        layout::read(self.footer, input, &mut head)?;
        Ok((head, entries))
    }
}

/// What the client asks for with `CMSG_RAID_TARGET_UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIconRequest {
    List,
    Set { icon: u8, target: ObjectGuid },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Invite {
        name: String,
        realm: String,
        cross_realm: ObjectGuid,
    },
    InviteResponse {
        accept: bool,
    },
    Uninvite {
        target: ObjectGuid,
        reason: String,
    },
    SetLeader {
        target: ObjectGuid,
    },
    SetRoles {
        target: ObjectGuid,
        roles: Roles,
    },
    Disband,
    SetLootMethod {
        method: LootMethod,
        master: ObjectGuid,
        threshold: ItemQuality,
    },
    LootRoll {
        item: ObjectGuid,
        slot: u32,
        vote: RollVote,
    },
    MinimapPing {
        x: f32,
        y: f32,
    },
    RandomRoll {
        min: u32,
        max: u32,
    },
    TargetIcon(TargetIconRequest),
    RaidConvert {
        to_raid: bool,
    },
    ChangeSubGroup {
        name: String,
        sub_group: u8,
    },
    SetAssistant {
        target: ObjectGuid,
        apply: bool,
    },
    SetAssignment {
        assignment: Assignment,
        target: ObjectGuid,
        apply: bool,
    },
    StartReadyCheck,
    ConfirmReadyCheck {
        group: ObjectGuid,
        ready: bool,
    },
    RequestMemberStats {
        target: ObjectGuid,
    },
    OptOutOfLoot {
        always_pass: bool,
    },
    ClearWorldMarker {
        slot: u8,
    },
    SetEveryoneAssistant {
        apply: bool,
    },
}

impl ClientCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            ClientCommand::Invite { .. } => Opcode::CmsgGroupInvite,
            ClientCommand::InviteResponse { .. } => Opcode::CmsgGroupInviteResponse,
            ClientCommand::Uninvite { .. } => Opcode::CmsgGroupUninviteGuid,
            ClientCommand::SetLeader { .. } => Opcode::CmsgGroupSetLeader,
            ClientCommand::SetRoles { .. } => Opcode::CmsgGroupSetRoles,
            ClientCommand::Disband => Opcode::CmsgGroupDisband,
            ClientCommand::SetLootMethod { .. } => Opcode::CmsgLootMethod,
            ClientCommand::LootRoll { .. } => Opcode::CmsgLootRoll,
            ClientCommand::MinimapPing { .. } => Opcode::CmsgMinimapPing,
            ClientCommand::RandomRoll { .. } => Opcode::CmsgRandomRoll,
            ClientCommand::TargetIcon(_) => Opcode::CmsgRaidTargetUpdate,
            ClientCommand::RaidConvert { .. } => Opcode::CmsgGroupRaidConvert,
            ClientCommand::ChangeSubGroup { .. } => Opcode::CmsgGroupChangeSubGroup,
            ClientCommand::SetAssistant { .. } => Opcode::CmsgGroupAssistantLeader,
            ClientCommand::SetAssignment { .. } => Opcode::CmsgPartyAssignment,
            ClientCommand::StartReadyCheck => Opcode::CmsgRaidReadyCheck,
            ClientCommand::ConfirmReadyCheck { .. } => Opcode::CmsgRaidReadyCheckConfirm,
            ClientCommand::RequestMemberStats { .. } => Opcode::CmsgRequestPartyMemberStats,
            ClientCommand::OptOutOfLoot { .. } => Opcode::CmsgOptOutOfLoot,
            ClientCommand::ClearWorldMarker { .. } => Opcode::CmsgClearWorldMarker,
            ClientCommand::SetEveryoneAssistant { .. } => Opcode::CmsgSetEveryoneIsAssistant,
        }
    }

    pub fn encode(&self) -> Result<WorldPacket, CodecError> {
        let mut record = Record::new();
        let mut out = PacketWriter::new();
        let table = match self {
            ClientCommand::Invite {
                name,
                realm,
                cross_realm,
            } => {
                record
                    .set_guid(First, *cross_realm)
                    .set_sized_text(Text::Name, Field::NameLen, name.as_str())
                    .set_sized_text(Text::Realm, Field::RealmLen, realm.as_str());
                GROUP_INVITE
            }
            ClientCommand::InviteResponse { accept } => {
                record.set(Field::Accept, *accept);
                INVITE_RESPONSE
            }
            ClientCommand::Uninvite { target, reason } => {
                record
                    .set_guid(First, *target)
                    .set_sized_text(Text::Reason, Field::ReasonLen, reason.as_str());
                UNINVITE_GUID
            }
            ClientCommand::SetLeader { target } => {
                record.set_guid(First, *target);
                SET_LEADER
            }
            ClientCommand::SetRoles { target, roles } => {
                record.set_guid(First, *target).set(Field::Role, roles.bits());
                SET_ROLES
            }
            ClientCommand::Disband | ClientCommand::StartReadyCheck => EMPTY,
            ClientCommand::SetLootMethod {
                method,
                master,
                threshold,
            } => {
                record
                    .set_guid(First, *master)
                    .set(Field::Method, *method)
                    .set(Field::Threshold, *threshold);
                LOOT_METHOD
            }
            ClientCommand::LootRoll { item, slot, vote } => {
                record
                    .set_guid(First, *item)
                    .set(Field::ItemSlot, *slot)
                    .set(Field::RollType, *vote);
                LOOT_ROLL
            }
            ClientCommand::MinimapPing { x, y } => {
                record.set_f32(Field::X, *x).set_f32(Field::Y, *y);
                MINIMAP_PING_REQUEST
            }
            ClientCommand::RandomRoll { min, max } => {
                record.set(Field::Minimum, *min).set(Field::Maximum, *max);
                RANDOM_ROLL_REQUEST
            }
            ClientCommand::TargetIcon(TargetIconRequest::List) => {
                record.set(Field::IconRequest, TARGET_ICON_LIST_REQUEST);
                TARGET_ICON_HEADER
            }
            ClientCommand::TargetIcon(TargetIconRequest::Set { icon, target }) => {
                record.set(Field::Icon, *icon).set_guid(First, *target);
                layout::write(TARGET_ICON_HEADER, &record, &mut out)?;
                TARGET_ICON_TARGET
            }
            ClientCommand::RaidConvert { to_raid } => {
                record.set(Field::ToRaid, *to_raid);
                RAID_CONVERT
            }
            ClientCommand::ChangeSubGroup { name, sub_group } => {
                record
                    .set_text(Text::Name, name.as_str())
                    .set(Field::SubGroup, *sub_group);
                CHANGE_SUB_GROUP
            }
            ClientCommand::SetAssistant { target, apply } => {
                record.set_guid(First, *target).set(Field::Apply, *apply);
                ASSISTANT_LEADER
            }
            ClientCommand::SetAssignment {
                assignment,
                target,
                apply,
            } => {
                record
                    .set_guid(First, *target)
                    .set(Field::Assignment, *assignment)
                    .set(Field::Apply, *apply);
                PARTY_ASSIGNMENT
            }
            ClientCommand::ConfirmReadyCheck { group, ready } => {
                record.set_guid(First, *group).set(Field::Ready, *ready);
                READY_CHECK_CONFIRM_REQUEST
            }
            ClientCommand::RequestMemberStats { target } => {
                record.set_guid(First, *target);
                REQUEST_MEMBER_STATS
            }
            ClientCommand::OptOutOfLoot { always_pass } => {
                record.set(Field::Apply, *always_pass);
                OPT_OUT_OF_LOOT
            }
            ClientCommand::ClearWorldMarker { slot } => {
                record.set(Field::MarkerSlot, *slot);
                CLEAR_WORLD_MARKER
            }
            ClientCommand::SetEveryoneAssistant { apply } => {
                record.set(Field::Apply, *apply);
                SET_EVERYONE_ASSISTANT
            }
        };
        layout::write(table, &record, &mut out)?;
        Ok(WorldPacket::new(self.opcode(), out.into_bytes()))
    }

    pub fn decode(packet: &WorldPacket) -> Result<ClientCommand, CodecError> {
        let opcode = Opcode::expect(packet.opcode, Direction::ClientToServer)?;
        let mut input = PacketReader::new(&packet.payload);
        let mut r = Record::new();

        let command = match opcode {
            Opcode::CmsgGroupInvite => {
                layout::read(GROUP_INVITE, &mut input, &mut r)?;
                ClientCommand::Invite {
                    name: r.take_text(Text::Name),
                    realm: r.take_text(Text::Realm),
                    cross_realm: r.guid(First),
                }
            }
            Opcode::CmsgGroupInviteResponse => {
                layout::read(INVITE_RESPONSE, &mut input, &mut r)?;
                ClientCommand::InviteResponse {
                    accept: r.flag(Field::Accept),
                }
            }
            Opcode::CmsgGroupUninviteGuid => {
                layout::read(UNINVITE_GUID, &mut input, &mut r)?;
                ClientCommand::Uninvite {
                    target: r.guid(First),
                    reason: r.take_text(Text::Reason),
                }
            }
            Opcode::CmsgGroupSetLeader => {
                layout::read(SET_LEADER, &mut input, &mut r)?;
                ClientCommand::SetLeader { target: r.guid(First) }
            }
            Opcode::CmsgGroupSetRoles => {
                layout::read(SET_ROLES, &mut input, &mut r)?;
                ClientCommand::SetRoles {
                    target: r.guid(First),
                    roles: Roles::from_bits_retain(r.narrow(Field::Role)?),
                }
            }
            Opcode::CmsgGroupDisband => ClientCommand::Disband,
            Opcode::CmsgLootMethod => {
                layout::read(LOOT_METHOD, &mut input, &mut r)?;
                ClientCommand::SetLootMethod {
                    method: LootMethod::try_from(r.get(Field::Method))?,
                    master: r.guid(First),
                    threshold: ItemQuality::try_from(r.get(Field::Threshold))?,
                }
            }
            Opcode::CmsgLootRoll => {
                layout::read(LOOT_ROLL, &mut input, &mut r)?;
                ClientCommand::LootRoll {
                    item: r.guid(First),
                    slot: r.narrow(Field::ItemSlot)?,
                    vote: RollVote::try_from(r.get(Field::RollType))?,
                }
            }
            Opcode::CmsgMinimapPing => {
                layout::read(MINIMAP_PING_REQUEST, &mut input, &mut r)?;
                ClientCommand::MinimapPing {
                    x: r.f32(Field::X),
                    y: r.f32(Field::Y),
                }
            }
            Opcode::CmsgRandomRoll => {
                layout::read(RANDOM_ROLL_REQUEST, &mut input, &mut r)?;
                ClientCommand::RandomRoll {
                    min: r.narrow(Field::Minimum)?,
                    max: r.narrow(Field::Maximum)?,
                }
            }
            Opcode::CmsgRaidTargetUpdate => {
                layout::read(TARGET_ICON_HEADER, &mut input, &mut r)?;
                if r.get(Field::IconRequest) == u64::from(TARGET_ICON_LIST_REQUEST) {
                    ClientCommand::TargetIcon(TargetIconRequest::List)
                } else {
                    layout::read(TARGET_ICON_TARGET, &mut input, &mut r)?;
                    ClientCommand::TargetIcon(TargetIconRequest::Set {
                        icon: r.narrow(Field::Icon)?,
                        target: r.guid(First),
                    })
                }
            }
            Opcode::CmsgGroupRaidConvert => {
                layout::read(RAID_CONVERT, &mut input, &mut r)?;
                ClientCommand::RaidConvert {
                    to_raid: r.flag(Field::ToRaid),
                }
            }
            Opcode::CmsgGroupChangeSubGroup => {
                layout::read(CHANGE_SUB_GROUP, &mut input, &mut r)?;
                ClientCommand::ChangeSubGroup {
                    name: r.take_text(Text::Name),
                    sub_group: r.narrow(Field::SubGroup)?,
                }
            }
            Opcode::CmsgGroupAssistantLeader => {
                layout::read(ASSISTANT_LEADER, &mut input, &mut r)?;
                ClientCommand::SetAssistant {
                    target: r.guid(First),
                    apply: r.flag(Field::Apply),
                }
            }
            Opcode::CmsgPartyAssignment => {
                layout::read(PARTY_ASSIGNMENT, &mut input, &mut r)?;
                ClientCommand::SetAssignment {
                    assignment: Assignment::try_from(r.get(Field::Assignment))?,
                    target: r.guid(First),
                    apply: r.flag(Field::Apply),
                }
            }
            Opcode::CmsgRaidReadyCheck => ClientCommand::StartReadyCheck,
            Opcode::CmsgRaidReadyCheckConfirm => {
                layout::read(READY_CHECK_CONFIRM_REQUEST, &mut input, &mut r)?;
                ClientCommand::ConfirmReadyCheck {
                    group: r.guid(First),
                    ready: r.flag(Field::Ready),
                }
            }
            Opcode::CmsgRequestPartyMemberStats => {
                layout::read(REQUEST_MEMBER_STATS, &mut input, &mut r)?;
                ClientCommand::RequestMemberStats { target: r.guid(First) }
            }
            Opcode::CmsgOptOutOfLoot => {
                layout::read(OPT_OUT_OF_LOOT, &mut input, &mut r)?;
                ClientCommand::OptOutOfLoot {
                    always_pass: r.flag(Field::Apply),
                }
            }
            Opcode::CmsgClearWorldMarker => {
                layout::read(CLEAR_WORLD_MARKER, &mut input, &mut r)?;
                ClientCommand::ClearWorldMarker {
                    slot: r.narrow(Field::MarkerSlot)?,
                }
            }
            Opcode::CmsgSetEveryoneIsAssistant => {
                layout::read(SET_EVERYONE_ASSISTANT, &mut input, &mut r)?;
                ClientCommand::SetEveryoneAssistant {
                    apply: r.flag(Field::Apply),
                }
            }
            _ => return Err(CodecError::WrongDirection(packet.opcode)),
        };

        input.finish()?;
        Ok(command)
    }
}

/// One member line of a roster update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub guid: ObjectGuid,
    pub name: String,
    pub online: bool,
    pub sub_group: u8,
    pub flags: MemberFlags,
    pub roles: Roles,
}

/// The group as one recipient sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterUpdate {
    pub group: ObjectGuid,
    pub leader: ObjectGuid,
    pub kind: GroupKind,
    pub own_sub_group: u8,
    pub own_flags: MemberFlags,
    pub counter: u32,
    pub loot_method: LootMethod,
    pub looter: ObjectGuid,
    pub loot_threshold: ItemQuality,
    pub members: Vec<RosterEntry>,
}

impl RosterUpdate {
    /// Sent to a player who no longer belongs to any group.
    pub fn empty() -> Self {
        Self {
            group: ObjectGuid::EMPTY,
            leader: ObjectGuid::EMPTY,
            kind: GroupKind::Party,
            own_sub_group: 0,
            own_flags: MemberFlags::empty(),
            counter: 0,
            loot_method: LootMethod::FreeForAll,
            looter: ObjectGuid::EMPTY,
            loot_threshold: ItemQuality::Poor,
            members: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    OperationResult {
        operation: PartyOperation,
        name: String,
        result: PartyResult,
        value: u32,
    },
    InviteNotification {
        invited: ObjectGuid,
        inviter: String,
        in_group: bool,
    },
    GroupDecline {
        name: String,
    },
    GroupUninvite,
    GroupDestroyed,
    Roster(RosterUpdate),
    RoleChanged {
        assigner: ObjectGuid,
        target: ObjectGuid,
        old_roles: Roles,
        new_roles: Roles,
    },
    ReadyCheckStarted {
        group: ObjectGuid,
        initiator: ObjectGuid,
        duration_ms: u32,
    },
    ReadyCheckConfirmed {
        group: ObjectGuid,
        member: ObjectGuid,
        ready: bool,
    },
    ReadyCheckCompleted {
        group: ObjectGuid,
    },
    MemberStats(MemberStats),
    MemberStatsChanged(MemberStatsUpdate),
    TargetIconSet {
        setter: ObjectGuid,
        icon: u8,
        target: ObjectGuid,
    },
    TargetIconList {
        icons: Vec<(u8, ObjectGuid)>,
    },
    MarkersChanged {
        mask: u32,
    },
    MinimapPing {
        sender: ObjectGuid,
        x: f32,
        y: f32,
    },
    RandomRoll {
        roller: ObjectGuid,
        min: u32,
        max: u32,
        roll: u32,
    },
}

impl ServerEvent {
    pub fn opcode(&self) -> Opcode {
        match self {
            ServerEvent::OperationResult { .. } => Opcode::SmsgPartyCommandResult,
            ServerEvent::InviteNotification { .. } => Opcode::SmsgGroupInvite,
            ServerEvent::GroupDecline { .. } => Opcode::SmsgGroupDecline,
            ServerEvent::GroupUninvite => Opcode::SmsgGroupUninvite,
            ServerEvent::GroupDestroyed => Opcode::SmsgGroupDestroyed,
            ServerEvent::Roster(_) => Opcode::SmsgPartyUpdate,
            ServerEvent::RoleChanged { .. } => Opcode::SmsgGroupSetRole,
            ServerEvent::ReadyCheckStarted { .. } => Opcode::SmsgRaidReadyCheck,
            ServerEvent::ReadyCheckConfirmed { .. } => Opcode::SmsgRaidReadyCheckConfirm,
            ServerEvent::ReadyCheckCompleted { .. } => Opcode::SmsgRaidReadyCheckCompleted,
            ServerEvent::MemberStats(_) => Opcode::SmsgPartyMemberStatsFull,
            ServerEvent::MemberStatsChanged(_) => Opcode::SmsgPartyMemberStats,
            ServerEvent::TargetIconSet { .. } => Opcode::SmsgRaidTargetUpdateSingle,
            ServerEvent::TargetIconList { .. } => Opcode::SmsgRaidTargetUpdateAll,
            ServerEvent::MarkersChanged { .. } => Opcode::SmsgRaidMarkersChanged,
            ServerEvent::MinimapPing { .. } => Opcode::SmsgMinimapPing,
            ServerEvent::RandomRoll { .. } => Opcode::SmsgRandomRoll,
        }
    }

    pub fn encode(&self) -> Result<WorldPacket, CodecError> {
        let mut r = Record::new();
        let mut out = PacketWriter::new();
        let table = match self {
            ServerEvent::OperationResult {
                operation,
                name,
                result,
                value,
            } => {
                r.set(Field::Operation, *operation)
                    .set_text(Text::Name, name.as_str())
                    .set(Field::Result, *result)
                    .set(Field::Value, *value);
                PARTY_COMMAND_RESULT
            }
            ServerEvent::InviteNotification {
                invited,
                inviter,
                in_group,
            } => {
                r.set_guid(First, *invited)
                    .set_sized_text(Text::Name, Field::NameLen, inviter.as_str())
                    .set(Field::InGroup, *in_group);
                GROUP_INVITE_NOTIFY
            }
            ServerEvent::GroupDecline { name } => {
                r.set_text(Text::Name, name.as_str());
                GROUP_DECLINE
            }
            ServerEvent::GroupUninvite | ServerEvent::GroupDestroyed => EMPTY,
            ServerEvent::Roster(update) => {
                let (mut head, entries) = roster_records(update);
                ROSTER.write(&mut head, &entries, &mut out)?;
                EMPTY
            }
            ServerEvent::RoleChanged {
                assigner,
                target,
                old_roles,
                new_roles,
            } => {
                r.set_guid(First, *target)
                    .set_guid(Second, *assigner)
                    .set(Field::OldRole, old_roles.bits())
                    .set(Field::Role, new_roles.bits());
                GROUP_SET_ROLE
            }
            ServerEvent::ReadyCheckStarted {
                group,
                initiator,
                duration_ms,
            } => {
                r.set_guid(First, *group)
                    .set_guid(Second, *initiator)
                    .set(Field::Duration, *duration_ms);
                READY_CHECK_STARTED
            }
            ServerEvent::ReadyCheckConfirmed { group, member, ready } => {
                r.set_guid(First, *group)
                    .set_guid(Second, *member)
                    .set(Field::Ready, *ready);
                READY_CHECK_CONFIRMED
            }
            ServerEvent::ReadyCheckCompleted { group } => {
                r.set_guid(First, *group);
                READY_CHECK_COMPLETED
            }
            ServerEvent::MemberStats(stats) => {
                stats.write(&mut out)?;
                EMPTY
            }
            ServerEvent::MemberStatsChanged(update) => {
                update.write(&mut out)?;
                EMPTY
            }
            ServerEvent::TargetIconSet { setter, icon, target } => {
                r.set_guid(First, *setter)
                    .set(Field::Icon, *icon)
                    .set_guid(Second, *target);
                TARGET_ICON_SET
            }
            ServerEvent::TargetIconList { icons } => {
                let entries: Vec<Record> = icons
                    .iter()
                    .map(|(icon, target)| {
                        let mut entry = Record::new();
                        entry.set(Field::Icon, *icon).set_guid(First, *target);
                        entry
                    })
                    .collect();
                TARGET_ICON_LIST.write(&mut r, &entries, &mut out)?;
                EMPTY
            }
            ServerEvent::MarkersChanged { mask } => {
                r.set(Field::MarkerMask, *mask);
                MARKERS_CHANGED
            }
            ServerEvent::MinimapPing { sender, x, y } => {
                r.set_guid(First, *sender).set_f32(Field::X, *x).set_f32(Field::Y, *y);
                MINIMAP_PING
            }
            ServerEvent::RandomRoll { roller, min, max, roll } => {
                r.set_guid(First, *roller)
                    .set(Field::Minimum, *min)
                    .set(Field::Maximum, *max)
                    .set(Field::Roll, *roll);
                RANDOM_ROLL
            }
        };
        layout::write(table, &r, &mut out)?;
        Ok(WorldPacket::new(self.opcode(), out.into_bytes()))
    }

    pub fn decode(packet: &WorldPacket) -> Result<ServerEvent, CodecError> {
        let opcode = Opcode::expect(packet.opcode, Direction::ServerToClient)?;
        let mut input = PacketReader::new(&packet.payload);
        let mut r = Record::new();

        let event = match opcode {
            Opcode::SmsgPartyCommandResult => {
                layout::read(PARTY_COMMAND_RESULT, &mut input, &mut r)?;
                ServerEvent::OperationResult {
                    operation: PartyOperation::try_from(r.get(Field::Operation))?,
                    name: r.take_text(Text::Name),
                    result: PartyResult::try_from(r.get(Field::Result))?,
                    value: r.narrow(Field::Value)?,
                }
            }
            Opcode::SmsgGroupInvite => {
                layout::read(GROUP_INVITE_NOTIFY, &mut input, &mut r)?;
                ServerEvent::InviteNotification {
                    invited: r.guid(First),
                    inviter: r.take_text(Text::Name),
                    in_group: r.flag(Field::InGroup),
                }
            }
            Opcode::SmsgGroupDecline => {
                layout::read(GROUP_DECLINE, &mut input, &mut r)?;
                ServerEvent::GroupDecline {
                    name: r.take_text(Text::Name),
                }
            }
            Opcode::SmsgGroupUninvite => ServerEvent::GroupUninvite,
            Opcode::SmsgGroupDestroyed => ServerEvent::GroupDestroyed,
            Opcode::SmsgPartyUpdate => {
                let (head, entries) = ROSTER.read(&mut input)?;
                ServerEvent::Roster(roster_from_records(&head, entries)?)
            }
            Opcode::SmsgGroupSetRole => {
                layout::read(GROUP_SET_ROLE, &mut input, &mut r)?;
                ServerEvent::RoleChanged {
                    assigner: r.guid(Second),
                    target: r.guid(First),
                    old_roles: Roles::from_bits_retain(r.narrow(Field::OldRole)?),
                    new_roles: Roles::from_bits_retain(r.narrow(Field::Role)?),
                }
            }
            Opcode::SmsgRaidReadyCheck => {
                layout::read(READY_CHECK_STARTED, &mut input, &mut r)?;
                ServerEvent::ReadyCheckStarted {
                    group: r.guid(First),
                    initiator: r.guid(Second),
                    duration_ms: r.narrow(Field::Duration)?,
                }
            }
            Opcode::SmsgRaidReadyCheckConfirm => {
                layout::read(READY_CHECK_CONFIRMED, &mut input, &mut r)?;
                ServerEvent::ReadyCheckConfirmed {
                    group: r.guid(First),
                    member: r.guid(Second),
                    ready: r.flag(Field::Ready),
                }
            }
            Opcode::SmsgRaidReadyCheckCompleted => {
                layout::read(READY_CHECK_COMPLETED, &mut input, &mut r)?;
                ServerEvent::ReadyCheckCompleted { group: r.guid(First) }
            }
            Opcode::SmsgPartyMemberStatsFull => ServerEvent::MemberStats(MemberStats::read(&mut input)?),
            Opcode::SmsgPartyMemberStats => ServerEvent::MemberStatsChanged(MemberStatsUpdate::read(&mut input)?),
            Opcode::SmsgRaidTargetUpdateSingle => {
                layout::read(TARGET_ICON_SET, &mut input, &mut r)?;
                ServerEvent::TargetIconSet {
                    setter: r.guid(First),
                    icon: r.narrow(Field::Icon)?,
                    target: r.guid(Second),
                }
            }
            Opcode::SmsgRaidTargetUpdateAll => {
                let (_, entries) = TARGET_ICON_LIST.read(&mut input)?;
                let icons = entries
                    .iter()
                    .map(|entry| -> Result<(u8, ObjectGuid), CodecError> {
                        Ok((entry.narrow(Field::Icon)?, entry.guid(First)))
                    })
                    .collect::<Result<Vec<_>, CodecError>>()?;
                ServerEvent::TargetIconList { icons }
            }
            Opcode::SmsgRaidMarkersChanged => {
                layout::read(MARKERS_CHANGED, &mut input, &mut r)?;
                ServerEvent::MarkersChanged {
                    mask: r.narrow(Field::MarkerMask)?,
                }
            }
            Opcode::SmsgMinimapPing => {
                layout::read(MINIMAP_PING, &mut input, &mut r)?;
                ServerEvent::MinimapPing {
                    sender: r.guid(First),
                    x: r.f32(Field::X),
                    y: r.f32(Field::Y),
                }
            }
            Opcode::SmsgRandomRoll => {
                layout::read(RANDOM_ROLL, &mut input, &mut r)?;
                ServerEvent::RandomRoll {
                    roller: r.guid(First),
                    min: r.narrow(Field::Minimum)?,
                    max: r.narrow(Field::Maximum)?,
                    roll: r.narrow(Field::Roll)?,
                }
            }
            _ => return Err(CodecError::WrongDirection(packet.opcode)),
        };

        input.finish()?;
        Ok(event)
    }
}

fn roster_records(update: &RosterUpdate) -> (Record, Vec<Record>) {
    let mut head = Record::new();
    head.set_guid(First, update.group)
        .set_guid(Second, update.leader)
        .set_guid(Third, update.looter)
        .set(Field::GroupType, update.kind)
        .set(Field::PartyIndex, update.own_sub_group)
        .set(Field::MemberFlags, update.own_flags.bits())
        .set(Field::Counter, update.counter)
        .set(Field::Method, update.loot_method)
        .set(Field::Threshold, update.loot_threshold);

    let entries = update
        .members
        .iter()
        .map(|member| {
            let mut entry = Record::new();
            entry
                .set_guid(First, member.guid)
                .set_sized_text(Text::Name, Field::NameLen, member.name.as_str())
                .set(Field::Status, member.online)
                .set(Field::SubGroup, member.sub_group)
                .set(Field::MemberFlags, member.flags.bits())
                .set(Field::Role, member.roles.bits());
            entry
        })
        .collect();
    (head, entries)
}

fn roster_from_records(head: &Record, entries: Vec<Record>) -> Result<RosterUpdate, CodecError> {
    let members = entries
        .into_iter()
        .map(|mut entry| -> Result<RosterEntry, CodecError> {
            Ok(RosterEntry {
                guid: entry.guid(First),
                name: entry.take_text(Text::Name),
                online: entry.flag(Field::Status),
                sub_group: entry.narrow(Field::SubGroup)?,
                flags: MemberFlags::from_bits_retain(entry.narrow(Field::MemberFlags)?),
                roles: Roles::from_bits_retain(entry.narrow(Field::Role)?),
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    Ok(RosterUpdate {
        group: head.guid(First),
        leader: head.guid(Second),
        kind: GroupKind::try_from(head.get(Field::GroupType))?,
        own_sub_group: head.narrow(Field::PartyIndex)?,
        own_flags: MemberFlags::from_bits_retain(head.narrow(Field::MemberFlags)?),
        counter: head.narrow(Field::Counter)?,
        loot_method: LootMethod::try_from(head.get(Field::Method))?,
        looter: head.guid(Third),
        loot_threshold: ItemQuality::try_from(head.get(Field::Threshold))?,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupUpdateFlags;
    use assert_approx_eq::assert_approx_eq;

    const LEADER: ObjectGuid = ObjectGuid(0x0000_0000_0001_2A07);
    const MEMBER: ObjectGuid = ObjectGuid(0x0600_0000_00C3_0001);
    const GROUP: ObjectGuid = ObjectGuid(0x1F50_0000_0000_0042);

    fn command_round_trip(command: ClientCommand) -> ClientCommand {
        let packet = command.encode().unwrap();
        assert_eq!(packet.opcode, command.opcode().value());
        ClientCommand::decode(&packet).unwrap()
    }

    fn event_round_trip(event: ServerEvent) -> ServerEvent {
        let packet = event.encode().unwrap();
        assert_eq!(packet.opcode, event.opcode().value());
        ServerEvent::decode(&packet).unwrap()
    }

    #[test]
    fn test_operation_result_round_trip() {
        let event = ServerEvent::OperationResult {
            operation: PartyOperation::Invite,
            name: "Thrall".to_string(),
            result: PartyResult::GroupFull,
            value: 17,
        };
        assert_eq!(event_round_trip(event.clone()), event);
    }

    #[test]
    fn test_operation_result_bytes() {
        let event = ServerEvent::OperationResult {
            operation: PartyOperation::Uninvite,
            name: "Al".to_string(),
            result: PartyResult::NotLeader,
            value: 0,
        };
        let packet = event.encode().unwrap();
        let mut expected = vec![1, 0, 0, 0, b'A', b'l', 0, 7, 0, 0, 0, 0, 0, 0, 0];
        expected.extend_from_slice(&[0; 8]);
        assert_eq!(packet.payload, expected);
    }

    #[test]
    fn test_invite_round_trip() {
        let command = ClientCommand::Invite {
            name: "Jaina".to_string(),
            realm: "Stormrage".to_string(),
            cross_realm: MEMBER,
        };
        assert_eq!(command_round_trip(command.clone()), command);
    }

    #[test]
    fn test_invite_bit_section() {
        let command = ClientCommand::Invite {
            name: "Abc".to_string(),
            realm: String::new(),
            cross_realm: ObjectGuid::EMPTY,
        };
        let packet = command.encode().unwrap();
        // 9 skipped header bytes, then g7, realm len (9 bits), g3, name len
        // (9 bits), six more mask bits: 26 bits in 4 bytes, then the name.
        assert_eq!(packet.payload.len(), 9 + 4 + 3);
        assert_eq!(&packet.payload[13..], b"Abc");
        // Name length 3 occupies bits 11..20, so its two set bits land on 18 and 19.
        assert_eq!(packet.payload[9], 0);
        assert_eq!(packet.payload[10], 0);
        assert_eq!(packet.payload[11], 0b0011_0000);
        assert_eq!(packet.payload[12], 0);
    }

    #[test]
    fn test_uninvite_round_trip() {
        let command = ClientCommand::Uninvite {
            target: MEMBER,
            reason: "afk".to_string(),
        };
        assert_eq!(command_round_trip(command.clone()), command);
    }

    #[test]
    fn test_commands_round_trip() {
        let commands = vec![
            ClientCommand::InviteResponse { accept: true },
            ClientCommand::SetLeader { target: MEMBER },
            ClientCommand::SetRoles {
                target: LEADER,
                roles: Roles::TANK | Roles::HEALER,
            },
            ClientCommand::Disband,
            ClientCommand::SetLootMethod {
                method: LootMethod::MasterLoot,
                master: LEADER,
                threshold: ItemQuality::Epic,
            },
            ClientCommand::LootRoll {
                item: ObjectGuid(0x4000_0000_0000_0999),
                slot: 3,
                vote: RollVote::Greed,
            },
            ClientCommand::RandomRoll { min: 1, max: 100 },
            ClientCommand::TargetIcon(TargetIconRequest::List),
            ClientCommand::TargetIcon(TargetIconRequest::Set {
                icon: 7,
                target: MEMBER,
            }),
            ClientCommand::RaidConvert { to_raid: true },
            ClientCommand::ChangeSubGroup {
                name: "Jaina".to_string(),
                sub_group: 6,
            },
            ClientCommand::SetAssistant {
                target: MEMBER,
                apply: true,
            },
            ClientCommand::SetAssignment {
                assignment: Assignment::MainAssist,
                target: MEMBER,
                apply: false,
            },
            ClientCommand::StartReadyCheck,
            ClientCommand::ConfirmReadyCheck {
                group: GROUP,
                ready: true,
            },
            ClientCommand::RequestMemberStats { target: LEADER },
            ClientCommand::OptOutOfLoot { always_pass: true },
            ClientCommand::ClearWorldMarker { slot: 5 },
            ClientCommand::SetEveryoneAssistant { apply: true },
        ];
        for command in commands {
            assert_eq!(command_round_trip(command.clone()), command);
        }
    }

    #[test]
    fn test_minimap_ping_floats() {
        let command = ClientCommand::MinimapPing { x: 0.25, y: -13.5 };
        match command_round_trip(command) {
            ClientCommand::MinimapPing { x, y } => {
                assert_approx_eq!(x, 0.25);
                assert_approx_eq!(y, -13.5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_roll_type() {
        let mut packet = ClientCommand::LootRoll {
            item: MEMBER,
            slot: 0,
            vote: RollVote::Need,
        }
        .encode()
        .unwrap();
        *packet.payload.last_mut().unwrap() = 9;
        assert!(matches!(
            ClientCommand::decode(&packet),
            Err(CodecError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_and_trailing() {
        let packet = ClientCommand::SetLeader { target: MEMBER }.encode().unwrap();

        let mut short = packet.clone();
        short.payload.pop();
        assert!(matches!(
            ClientCommand::decode(&short),
            Err(CodecError::Truncated { .. })
        ));

        let mut long = packet;
        long.payload.push(0);
        assert_eq!(ClientCommand::decode(&long), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_decode_rejects_server_opcode() {
        let packet = ServerEvent::GroupDestroyed.encode().unwrap();
        assert_eq!(
            ClientCommand::decode(&packet),
            Err(CodecError::WrongDirection(Opcode::SmsgGroupDestroyed.value()))
        );
    }

    #[test]
    fn test_events_round_trip() {
        let events = vec![
            ServerEvent::InviteNotification {
                invited: MEMBER,
                inviter: "Arthas".to_string(),
                in_group: true,
            },
            ServerEvent::GroupDecline {
                name: "Jaina".to_string(),
            },
            ServerEvent::GroupUninvite,
            ServerEvent::GroupDestroyed,
            ServerEvent::RoleChanged {
                assigner: LEADER,
                target: MEMBER,
                old_roles: Roles::DAMAGE,
                new_roles: Roles::TANK,
            },
            ServerEvent::ReadyCheckStarted {
                group: GROUP,
                initiator: LEADER,
                duration_ms: 35_000,
            },
            ServerEvent::ReadyCheckConfirmed {
                group: GROUP,
                member: MEMBER,
                ready: false,
            },
            ServerEvent::ReadyCheckCompleted { group: GROUP },
            ServerEvent::TargetIconSet {
                setter: LEADER,
                icon: 2,
                target: MEMBER,
            },
            ServerEvent::TargetIconList {
                icons: vec![(0, MEMBER), (7, LEADER)],
            },
            ServerEvent::MarkersChanged { mask: 0b10101 },
            ServerEvent::RandomRoll {
                roller: MEMBER,
                min: 1,
                max: 100,
                roll: 42,
            },
        ];
        for event in events {
            assert_eq!(event_round_trip(event.clone()), event);
        }
    }

    #[test]
    fn test_roster_round_trip() {
        let update = RosterUpdate {
            group: GROUP,
            leader: LEADER,
            kind: GroupKind::Raid,
            own_sub_group: 1,
            own_flags: MemberFlags::ASSISTANT,
            counter: 9,
            loot_method: LootMethod::MasterLoot,
            looter: LEADER,
            loot_threshold: ItemQuality::Rare,
            members: vec![
                RosterEntry {
                    guid: LEADER,
                    name: "Arthas".to_string(),
                    online: true,
                    sub_group: 0,
                    flags: MemberFlags::MAIN_TANK,
                    roles: Roles::TANK,
                },
                RosterEntry {
                    guid: MEMBER,
                    name: "Jaina".to_string(),
                    online: false,
                    sub_group: 1,
                    flags: MemberFlags::ASSISTANT,
                    roles: Roles::HEALER,
                },
            ],
        };
        assert_eq!(
            event_round_trip(ServerEvent::Roster(update.clone())),
            ServerEvent::Roster(update)
        );
    }

    #[test]
    fn test_empty_roster_round_trip() {
        let decoded = event_round_trip(ServerEvent::Roster(RosterUpdate::empty()));
        match decoded {
            ServerEvent::Roster(update) => assert!(update.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_role_changed_byte_order() {
        let event = ServerEvent::RoleChanged {
            assigner: ObjectGuid(0x02 << 8),
            target: ObjectGuid(0x05 << 24),
            old_roles: Roles::empty(),
            new_roles: Roles::DAMAGE,
        };
        let payload = event.encode().unwrap().payload;
        // Assigner byte 1 is the first mask bit, target byte 3 the ninth.
        assert_eq!(payload[0], 0b1000_0000);
        assert_eq!(payload[1], 0b1000_0000);
        // Assigner byte 1 comes first, then target byte 3.
        assert_eq!(&payload[2..4], &[0x03, 0x04]);
        assert_eq!(payload.len(), 2 + 2 + 4 + 1 + 4);
    }

    #[test]
    fn test_minimap_ping_event() {
        let event = ServerEvent::MinimapPing {
            sender: MEMBER,
            x: 1.5,
            y: 2.5,
        };
        match event_round_trip(event) {
            ServerEvent::MinimapPing { sender, x, y } => {
                assert_eq!(sender, MEMBER);
                assert_approx_eq!(x, 1.5);
                assert_approx_eq!(y, 2.5);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_stats_changed_event() {
        let stats = MemberStats {
            guid: MEMBER,
            level: 12,
            zone: 12,
            ..MemberStats::default()
        };
        let event = ServerEvent::MemberStatsChanged(MemberStatsUpdate::new(&stats, GroupUpdateFlags::LEVEL));
        assert_eq!(event.opcode(), Opcode::SmsgPartyMemberStats);
        match event_round_trip(event) {
            ServerEvent::MemberStatsChanged(update) => {
                assert_eq!(update.mask, GroupUpdateFlags::LEVEL);
                assert_eq!(update.stats.level, 12);
                assert_eq!(update.stats.zone, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_long_inviter_name() {
        let event = ServerEvent::InviteNotification {
            invited: MEMBER,
            inviter: "x".repeat(64),
            in_group: false,
        };
        assert!(matches!(event.encode(), Err(CodecError::FieldOverflow { .. })));
    }
}
