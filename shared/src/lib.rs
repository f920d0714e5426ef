pub mod buffer;
pub mod error;
pub mod guid;
pub mod layout;
pub mod messages;
pub mod opcodes;
pub mod stats;
pub mod types;

use serde::{Deserialize, Serialize};

pub use buffer::{PacketReader, PacketWriter};
pub use error::CodecError;
pub use guid::ObjectGuid;
pub use messages::{ClientCommand, RosterEntry, RosterUpdate, ServerEvent, TargetIconRequest, WorldPacket};
pub use opcodes::{Direction, Opcode};
pub use stats::{AuraSlot, MemberStats, MemberStatsUpdate, PetStats};
pub use types::*;

pub const PROTOCOL_VERSION: u32 = 1;

/// Session envelope exchanged over UDP.
///
/// Group traffic rides inside `World` as bit-packed payloads; the envelope
/// itself is bincode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Login {
        client_version: u32,
        profile: PlayerProfile,
    },
    Heartbeat,
    World(WorldPacket),
    Logout,

    LoggedIn {
        guid: ObjectGuid,
    },
    Disconnected {
        reason: String,
    },
}

/// What the world knows about a player that group validation needs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub name: String,
    pub team: Team,
    pub game_master: bool,
    pub level: u16,
    pub zone: u16,
    pub map_id: u32,
    /// Zero when the player is not inside an instance.
    pub instance_id: u32,
    pub dungeon_difficulty: u8,
    pub in_battleground: bool,
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>, team: Team) -> Self {
        Self {
            name: name.into(),
            team,
            game_master: false,
            level: 1,
            zone: 0,
            map_id: 0,
            instance_id: 0,
            dungeon_difficulty: 0,
            in_battleground: false,
        }
    }
}

/// Normalises a typed player name: first letter upper case, the rest lower.
///
/// Returns `None` for names that cannot belong to a player.
pub fn normalize_player_name(name: &str) -> Option<String> {
    let count = name.chars().count();
    if count == 0 || count > MAX_PLAYER_NAME || !name.chars().all(char::is_alphabetic) {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_serialization_login() {
        let packet = Packet::Login {
            client_version: PROTOCOL_VERSION,
            profile: PlayerProfile::new("Arthas", Team::Alliance),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Login { client_version, profile } => {
                assert_eq!(client_version, 1);
                assert_eq!(profile.name, "Arthas");
                assert_eq!(profile.team, Team::Alliance);
                assert_eq!(profile.instance_id, 0);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_world() {
        let world = ClientCommand::SetLeader {
            target: ObjectGuid(0x0102_0304),
        }
        .encode()
        .unwrap();
        let packet = Packet::World(world.clone());

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::World(inner) => {
                assert_eq!(inner, world);
                assert_eq!(
                    ClientCommand::decode(&inner).unwrap(),
                    ClientCommand::SetLeader {
                        target: ObjectGuid(0x0102_0304)
                    }
                );
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_logged_in() {
        let packet = Packet::LoggedIn {
            guid: ObjectGuid(42),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_normalize_player_name() {
        assert_eq!(normalize_player_name("tHRALL").as_deref(), Some("Thrall"));
        assert_eq!(normalize_player_name("jaina").as_deref(), Some("Jaina"));
        assert_eq!(normalize_player_name(""), None);
        assert_eq!(normalize_player_name("Bad Name"), None);
        assert_eq!(normalize_player_name("Abcdefghijklm"), None);
        assert_eq!(normalize_player_name("Abcdefghijkl").as_deref(), Some("Abcdefghijkl"));
    }
}
