use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Opcodes of every group message. Client opcodes live in `0x01xx`, server
/// opcodes in `0x02xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    CmsgGroupInvite = 0x0101,
    CmsgGroupInviteResponse = 0x0102,
    CmsgGroupUninviteGuid = 0x0103,
    CmsgGroupSetLeader = 0x0104,
    CmsgGroupSetRoles = 0x0105,
    CmsgGroupDisband = 0x0106,
    CmsgLootMethod = 0x0107,
    CmsgLootRoll = 0x0108,
    CmsgMinimapPing = 0x0109,
    CmsgRandomRoll = 0x010A,
    CmsgRaidTargetUpdate = 0x010B,
    CmsgGroupRaidConvert = 0x010C,
    CmsgGroupChangeSubGroup = 0x010D,
    CmsgGroupAssistantLeader = 0x010E,
    CmsgPartyAssignment = 0x010F,
    CmsgRaidReadyCheck = 0x0110,
    CmsgRaidReadyCheckConfirm = 0x0111,
    CmsgRequestPartyMemberStats = 0x0112,
    CmsgOptOutOfLoot = 0x0113,
    CmsgClearWorldMarker = 0x0114,
    CmsgSetEveryoneIsAssistant = 0x0115,

    SmsgPartyCommandResult = 0x0201,
    SmsgGroupInvite = 0x0202,
    SmsgGroupDecline = 0x0203,
    SmsgGroupUninvite = 0x0204,
    SmsgGroupDestroyed = 0x0205,
    SmsgPartyUpdate = 0x0206,
    SmsgGroupSetRole = 0x0207,
    SmsgRaidReadyCheck = 0x0208,
    SmsgRaidReadyCheckConfirm = 0x0209,
    SmsgRaidReadyCheckCompleted = 0x020A,
    SmsgPartyMemberStatsFull = 0x020B,
    SmsgRaidTargetUpdateSingle = 0x020C,
    SmsgRaidTargetUpdateAll = 0x020D,
    SmsgRaidMarkersChanged = 0x020E,
    SmsgMinimapPing = 0x020F,
    SmsgRandomRoll = 0x0210,
    SmsgPartyMemberStats = 0x0211,
}

const ALL: [Opcode; 38] = [
    Opcode::CmsgGroupInvite,
    Opcode::CmsgGroupInviteResponse,
    Opcode::CmsgGroupUninviteGuid,
    Opcode::CmsgGroupSetLeader,
    Opcode::CmsgGroupSetRoles,
    Opcode::CmsgGroupDisband,
    Opcode::CmsgLootMethod,
    Opcode::CmsgLootRoll,
    Opcode::CmsgMinimapPing,
    Opcode::CmsgRandomRoll,
    Opcode::CmsgRaidTargetUpdate,
    Opcode::CmsgGroupRaidConvert,
    Opcode::CmsgGroupChangeSubGroup,
    Opcode::CmsgGroupAssistantLeader,
    Opcode::CmsgPartyAssignment,
    Opcode::CmsgRaidReadyCheck,
    Opcode::CmsgRaidReadyCheckConfirm,
    Opcode::CmsgRequestPartyMemberStats,
    Opcode::CmsgOptOutOfLoot,
    Opcode::CmsgClearWorldMarker,
    Opcode::CmsgSetEveryoneIsAssistant,
    Opcode::SmsgPartyCommandResult,
    Opcode::SmsgGroupInvite,
    Opcode::SmsgGroupDecline,
    Opcode::SmsgGroupUninvite,
    Opcode::SmsgGroupDestroyed,
    Opcode::SmsgPartyUpdate,
    Opcode::SmsgGroupSetRole,
    Opcode::SmsgRaidReadyCheck,
    Opcode::SmsgRaidReadyCheckConfirm,
    Opcode::SmsgRaidReadyCheckCompleted,
    Opcode::SmsgPartyMemberStatsFull,
    Opcode::SmsgRaidTargetUpdateSingle,
    Opcode::SmsgRaidTargetUpdateAll,
    Opcode::SmsgRaidMarkersChanged,
    Opcode::SmsgMinimapPing,
    Opcode::SmsgRandomRoll,
    Opcode::SmsgPartyMemberStats,
];

impl Opcode {
    pub fn value(self) -> u16 {
        self as u16
    }

    pub fn direction(self) -> Direction {
        if self.value() & 0xFF00 == 0x0100 {
            Direction::ClientToServer
        } else {
            Direction::ServerToClient
        }
    }

    /// Resolves a raw opcode that must travel in `direction`.
    pub fn expect(raw: u16, direction: Direction) -> Result<Opcode, CodecError> {
        let opcode = Opcode::try_from(raw)?;
        if opcode.direction() != direction {
            return Err(CodecError::WrongDirection(raw));
        }
        Ok(opcode)
    }
}

impl TryFrom<u16> for Opcode {
    type Error = CodecError;

    fn try_from(raw: u16) -> Result<Self, CodecError> {
        ALL.iter()
            .copied()
            .find(|opcode| opcode.value() == raw)
            .ok_or(CodecError::UnknownOpcode(raw))
    }
}
