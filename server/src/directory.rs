//! Player lookups the group code needs from the rest of the world.

use dashmap::{DashMap, DashSet};
use log::info;
use shared::{normalize_player_name, MemberStats, MemberStatus, ObjectGuid, PlayerProfile};
use std::sync::atomic::{AtomicU64, Ordering};

/// First GUID handed out to players registered at runtime.
const FIRST_PLAYER_GUID: u64 = 0x0000_0000_0000_0100;

/// Read-only view of players, injected into the command pipeline.
pub trait PlayerDirectory: Send + Sync {
    /// Online player with this (normalised) name.
    fn find_by_name(&self, name: &str) -> Option<ObjectGuid>;
    /// Any known player with this name, online or not.
    fn guid_by_name(&self, name: &str) -> Option<ObjectGuid>;
    fn profile(&self, guid: ObjectGuid) -> Option<PlayerProfile>;
    fn is_online(&self, guid: ObjectGuid) -> bool;
    /// Whether `target` has `source` on their ignore list.
    fn is_ignoring(&self, target: ObjectGuid, source: ObjectGuid) -> bool;
    fn member_stats(&self, guid: ObjectGuid) -> Option<MemberStats>;

    fn name_of(&self, guid: ObjectGuid) -> Option<String> {
        self.profile(guid).map(|profile| profile.name)
    }
}

#[derive(Debug, Clone)]
struct PlayerEntry {
    profile: PlayerProfile,
    online: bool,
    stats: Option<MemberStats>,
}

/// Directory backed by concurrent maps, fed by the session layer.
#[derive(Debug)]
pub struct InMemoryDirectory {
    players: DashMap<ObjectGuid, PlayerEntry>,
    names: DashMap<String, ObjectGuid>,
    ignores: DashSet<(ObjectGuid, ObjectGuid)>,
    next_guid: AtomicU64,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
            names: DashMap::new(),
            ignores: DashSet::new(),
            next_guid: AtomicU64::new(FIRST_PLAYER_GUID),
        }
    }

    /// Registers a player, or refreshes the profile of a known name, and
    /// marks them online. Returns `None` for names no player can have.
    pub fn login(&self, mut profile: PlayerProfile) -> Option<ObjectGuid> {
        let name = normalize_player_name(&profile.name)?;
        profile.name = name.clone();

        let guid = *self
            .names
            .entry(name.clone())
            .or_insert_with(|| ObjectGuid(self.next_guid.fetch_add(1, Ordering::Relaxed)));

        self.players
            .entry(guid)
            .and_modify(|entry| {
                entry.profile = profile.clone();
                entry.online = true;
            })
            .or_insert_with(|| PlayerEntry {
                profile: profile.clone(),
                online: true,
                stats: None,
            });
        info!("Player {} ({}) is online", name, guid);
        Some(guid)
    }

    pub fn logout(&self, guid: ObjectGuid) {
        if let Some(mut entry) = self.players.get_mut(&guid) {
            entry.online = false;
        }
    }

    pub fn set_stats(&self, guid: ObjectGuid, stats: MemberStats) {
        if let Some(mut entry) = self.players.get_mut(&guid) {
            entry.stats = Some(stats);
        }
    }

    pub fn ignore(&self, target: ObjectGuid, source: ObjectGuid) {
        self.ignores.insert((target, source));
    }

    pub fn unignore(&self, target: ObjectGuid, source: ObjectGuid) {
        self.ignores.remove(&(target, source));
    }

    pub fn update_profile(&self, guid: ObjectGuid, update: impl FnOnce(&mut PlayerProfile)) {
        if let Some(mut entry) = self.players.get_mut(&guid) {
            update(&mut entry.profile);
        }
    }
}

impl PlayerDirectory for InMemoryDirectory {
    fn find_by_name(&self, name: &str) -> Option<ObjectGuid> {
        self.guid_by_name(name).filter(|guid| self.is_online(*guid))
    }

    fn guid_by_name(&self, name: &str) -> Option<ObjectGuid> {
        let name = normalize_player_name(name)?;
        self.names.get(&name).map(|guid| *guid)
    }

    fn profile(&self, guid: ObjectGuid) -> Option<PlayerProfile> {
        self.players.get(&guid).map(|entry| entry.profile.clone())
    }

    fn is_online(&self, guid: ObjectGuid) -> bool {
        self.players.get(&guid).map(|entry| entry.online).unwrap_or(false)
    }

    fn is_ignoring(&self, target: ObjectGuid, source: ObjectGuid) -> bool {
        self.ignores.contains(&(target, source))
    }

    fn member_stats(&self, guid: ObjectGuid) -> Option<MemberStats> {
        let entry = self.players.get(&guid)?;
        if !entry.online {
            return None;
        }
        let stats = entry.stats.clone().unwrap_or_else(|| MemberStats {
            guid,
            status: MemberStatus::ONLINE,
            level: entry.profile.level,
            zone: entry.profile.zone,
            ..MemberStats::default()
        });
        Some(stats)
    }
}
