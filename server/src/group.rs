//! The group aggregate: members, invites, leadership and per-group state.
//!
//! A `Group` only ever changes under its registry write lock. Methods here
//! validate before they mutate, so an `Err` leaves the group untouched.

use crate::error::GroupError;
use crate::loot::{CompletedRoll, LootRolls, LootSettings, VoteOutcome};
use crate::ready_check::{Progress, ReadyCheck};
use shared::{
    Assignment, GroupKind, MemberFlags, ObjectGuid, Roles, RollVote, RosterEntry, RosterUpdate,
    MAX_PARTY_SIZE, MAX_RAID_SUBGROUPS, MAX_SUBGROUP_SIZE, TARGET_ICON_COUNT, WORLD_MARKER_COUNT,
};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

pub type GroupId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Invites are out, nobody has accepted yet.
    Forming,
    Created,
    Disbanded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSlot {
    pub guid: ObjectGuid,
    pub name: String,
    pub sub_group: u8,
    pub assistant: bool,
    pub roles: Roles,
    pub online: bool,
}

impl MemberSlot {
    pub fn new(guid: ObjectGuid, name: impl Into<String>, sub_group: u8) -> Self {
        Self {
            guid,
            name: name.into(),
            sub_group,
            assistant: false,
            roles: Roles::empty(),
            online: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldMarker {
    pub map_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Result of a successful accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    pub sub_group: u8,
    /// True when this accept moved the group out of `Forming`.
    pub created: bool,
}

/// A member taken out of the group, with whatever their leaving settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub slot: MemberSlot,
    pub ready_check_completed: bool,
    pub completed_rolls: Vec<CompletedRoll>,
}

/// Everyone still attached to a group at the moment it was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dissolution {
    pub members: Vec<ObjectGuid>,
    pub invitees: Vec<ObjectGuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCheckStart {
    pub progress: Progress,
    /// Members that were offline when the check began.
    pub offline: Vec<ObjectGuid>,
}

#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    guid: ObjectGuid,
    leader: ObjectGuid,
    leader_name: String,
    members: Vec<MemberSlot>,
    invitees: BTreeSet<ObjectGuid>,
    kind: GroupKind,
    state: GroupState,
    loot: LootSettings,
    main_tank: Option<ObjectGuid>,
    main_assist: Option<ObjectGuid>,
    target_icons: [ObjectGuid; TARGET_ICON_COUNT],
    world_markers: [Option<WorldMarker>; WORLD_MARKER_COUNT],
    ready_check: ReadyCheck,
    rolls: LootRolls,
    update_counter: u32,
}

impl Group {
    /// A group that exists only as the leader's first outstanding invite.
    pub fn forming(id: GroupId, leader: ObjectGuid, leader_name: impl Into<String>) -> Self {
        Self {
            id,
            guid: ObjectGuid::group(id),
            leader,
            leader_name: leader_name.into(),
            members: Vec::new(),
            invitees: BTreeSet::new(),
            kind: GroupKind::Party,
            state: GroupState::Forming,
            loot: LootSettings::new(leader),
            main_tank: None,
            main_assist: None,
            target_icons: [ObjectGuid::EMPTY; TARGET_ICON_COUNT],
            world_markers: [None; WORLD_MARKER_COUNT],
            ready_check: ReadyCheck::default(),
            rolls: LootRolls::default(),
            update_counter: 0,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn guid(&self) -> ObjectGuid {
        self.guid
    }

    pub fn leader(&self) -> ObjectGuid {
        self.leader
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn is_raid(&self) -> bool {
        self.kind.is_raid()
    }

    pub fn loot(&self) -> LootSettings {
        self.loot
    }

    pub fn members(&self) -> &[MemberSlot] {
        &self.members
    }

    pub fn member(&self, guid: ObjectGuid) -> Option<&MemberSlot> {
        self.members.iter().find(|slot| slot.guid == guid)
    }

    fn member_mut(&mut self, guid: ObjectGuid) -> Option<&mut MemberSlot> {
        self.members.iter_mut().find(|slot| slot.guid == guid)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&MemberSlot> {
        self.members.iter().find(|slot| slot.name == name)
    }

    pub fn is_member(&self, guid: ObjectGuid) -> bool {
        self.member(guid).is_some()
    }

    pub fn member_guids(&self) -> Vec<ObjectGuid> {
        self.members.iter().map(|slot| slot.guid).collect()
    }

    pub fn online_members(&self) -> Vec<ObjectGuid> {
        self.members
            .iter()
            .filter(|slot| slot.online)
            .map(|slot| slot.guid)
            .collect()
    }

    pub fn invitees(&self) -> impl Iterator<Item = ObjectGuid> + '_ {
        self.invitees.iter().copied()
    }

    pub fn is_invited(&self, guid: ObjectGuid) -> bool {
        self.invitees.contains(&guid)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn capacity(&self) -> usize {
        self.kind.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity()
    }

    pub fn is_leader(&self, guid: ObjectGuid) -> bool {
        self.leader == guid
    }

    pub fn is_assistant(&self, guid: ObjectGuid) -> bool {
        self.member(guid).map(|slot| slot.assistant).unwrap_or(false)
    }

    /// Leader or assistant.
    pub fn has_authority(&self, guid: ObjectGuid) -> bool {
        self.is_leader(guid) || self.is_assistant(guid)
    }

    pub fn holder(&self, assignment: Assignment) -> Option<ObjectGuid> {
        match assignment {
            Assignment::MainTank => self.main_tank,
            Assignment::MainAssist => self.main_assist,
        }
    }

    pub fn member_flags(&self, guid: ObjectGuid) -> MemberFlags {
        let mut flags = MemberFlags::empty();
        if self.is_assistant(guid) {
            flags |= MemberFlags::ASSISTANT;
        }
        if self.main_tank == Some(guid) {
            flags |= MemberFlags::MAIN_TANK;
        }
        if self.main_assist == Some(guid) {
            flags |= MemberFlags::MAIN_ASSIST;
        }
        flags
    }

    pub fn ready_check(&self) -> &ReadyCheck {
        &self.ready_check
    }

    pub fn rolls(&self) -> &LootRolls {
        &self.rolls
    }

    pub fn update_counter(&self) -> u32 {
        self.update_counter
    }

    fn sub_group_limit(&self) -> u8 {
        if self.is_raid() {
            MAX_RAID_SUBGROUPS
        } else {
            1
        }
    }

    pub fn sub_group_size(&self, sub_group: u8) -> usize {
        self.members
            .iter()
            .filter(|slot| slot.sub_group == sub_group)
            .count()
    }

    /// Lowest sub-group with room left.
    pub fn free_sub_group(&self) -> Option<u8> {
        (0..self.sub_group_limit()).find(|sub_group| self.sub_group_size(*sub_group) < MAX_SUBGROUP_SIZE)
    }

    /// Bumps the roster version carried by the next update.
    pub(crate) fn touch(&mut self) {
        self.update_counter = self.update_counter.wrapping_add(1);
    }

    pub(crate) fn add_invite(&mut self, guid: ObjectGuid) {
        self.invitees.insert(guid);
    }

    pub(crate) fn remove_invite(&mut self, guid: ObjectGuid) -> bool {
        self.invitees.remove(&guid)
    }

    /// Turns an invite into membership. The first accept also seats the
    /// leader and moves the group to `Created`.
    pub(crate) fn accept(&mut self, guid: ObjectGuid, name: &str) -> Result<Joined, GroupError> {
        if !self.is_invited(guid) {
            return Err(GroupError::NoPendingInvite);
        }
        let created = self.state == GroupState::Forming;
        let seats_needed = if created { 2 } else { 1 };
        if self.members.len() + seats_needed > self.capacity() {
            return Err(GroupError::Full);
        }

        let sub_group = if created {
            0
        } else {
            self.free_sub_group().ok_or(GroupError::Full)?
        };

        if created {
            let leader = MemberSlot::new(self.leader, self.leader_name.clone(), 0);
            self.members.push(leader);
            self.state = GroupState::Created;
        }
        self.invitees.remove(&guid);
        self.members.push(MemberSlot::new(guid, name, sub_group));
        self.touch();
        Ok(Joined { sub_group, created })
    }

    pub(crate) fn remove_member(&mut self, guid: ObjectGuid) -> Option<Departure> {
        let index = self.members.iter().position(|slot| slot.guid == guid)?;
        let slot = self.members.remove(index);

        if self.main_tank == Some(guid) {
            self.main_tank = None;
        }
        if self.main_assist == Some(guid) {
            self.main_assist = None;
        }
        let ready_check_completed = self.ready_check.forget(guid) == Some(Progress::Completed);
        let completed_rolls = self.rolls.forget(guid);
        self.touch();

        Some(Departure {
            slot,
            ready_check_completed,
            completed_rolls,
        })
    }

    /// A created party down to one member, or any created group with none,
    /// no longer exists.
    pub fn is_depleted(&self) -> bool {
        self.state == GroupState::Created
            && (self.members.is_empty() || (!self.is_raid() && self.members.len() <= 1))
    }

    /// Marks the group disbanded and hands back everyone still attached.
    pub(crate) fn dissolve(&mut self) -> Dissolution {
        let forming = self.state == GroupState::Forming;
        self.state = GroupState::Disbanded;
        self.ready_check = ReadyCheck::default();
        self.rolls = LootRolls::default();
        let mut members: Vec<ObjectGuid> = self.members.drain(..).map(|slot| slot.guid).collect();
        if forming {
            // A forming group's leader is attached without a slot.
            members.push(self.leader);
        }
        Dissolution {
            members,
            invitees: std::mem::take(&mut self.invitees).into_iter().collect(),
        }
    }

    pub(crate) fn set_leader(&mut self, guid: ObjectGuid) -> Result<(), GroupError> {
        let slot = self.member(guid).ok_or(GroupError::NotMember)?;
        self.leader_name = slot.name.clone();
        self.leader = guid;
        self.touch();
        Ok(())
    }

    /// Switches party/raid. Returns false when a raid is too large to
    /// become a party.
    pub(crate) fn convert(&mut self, kind: GroupKind) -> bool {
        if kind == self.kind {
            return true;
        }
        if kind == GroupKind::Party && self.members.len() > MAX_PARTY_SIZE {
            return false;
        }
        self.kind = kind;
        if kind == GroupKind::Party {
            for slot in &mut self.members {
                slot.sub_group = 0;
            }
        }
        self.touch();
        true
    }

    /// Returns whether the member actually moved.
    pub(crate) fn move_to_sub_group(&mut self, guid: ObjectGuid, sub_group: u8) -> Result<bool, GroupError> {
        if sub_group >= self.sub_group_limit() {
            return Err(GroupError::InvalidSubGroup);
        }
        let current = self.member(guid).ok_or(GroupError::NotMember)?.sub_group;
        if current == sub_group {
            return Ok(false);
        }
        if self.sub_group_size(sub_group) >= MAX_SUBGROUP_SIZE {
            return Err(GroupError::NoFreeSlot);
        }
        if let Some(slot) = self.member_mut(guid) {
            slot.sub_group = sub_group;
        }
        self.touch();
        Ok(true)
    }

    pub(crate) fn set_assistant(&mut self, guid: ObjectGuid, apply: bool) -> Result<(), GroupError> {
        let slot = self.member_mut(guid).ok_or(GroupError::NotMember)?;
        slot.assistant = apply;
        self.touch();
        Ok(())
    }

    pub(crate) fn set_everyone_assistant(&mut self, apply: bool) {
        for slot in &mut self.members {
            slot.assistant = apply;
        }
        self.touch();
    }

    /// Grants or withdraws a single-holder assignment. The current holder
    /// always loses it first, so withdrawing works whoever is named.
    /// Returns whether the holder changed.
    pub(crate) fn assign(&mut self, assignment: Assignment, guid: ObjectGuid, apply: bool) -> Result<bool, GroupError> {
        if !self.is_member(guid) {
            return Err(GroupError::NotMember);
        }
        let holder = match assignment {
            Assignment::MainTank => &mut self.main_tank,
            Assignment::MainAssist => &mut self.main_assist,
        };
        let previous = holder.take();
        if apply {
            *holder = Some(guid);
        }
        let changed = *holder != previous;
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    /// Returns the previous roles.
    pub(crate) fn set_roles(&mut self, guid: ObjectGuid, roles: Roles) -> Result<Roles, GroupError> {
        let slot = self.member_mut(guid).ok_or(GroupError::NotMember)?;
        let old = std::mem::replace(&mut slot.roles, roles);
        self.touch();
        Ok(old)
    }

    /// Returns whether the flag changed.
    pub(crate) fn set_online(&mut self, guid: ObjectGuid, online: bool) -> bool {
        match self.member_mut(guid) {
            Some(slot) if slot.online != online => {
                slot.online = online;
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_loot(&mut self, loot: LootSettings) {
        self.loot = loot;
        self.touch();
    }

    /// Puts `icon` on `target`, taking it off whatever it marked before.
    /// A target carries at most one icon, so any other icon on it is
    /// cleared first. Returns every (icon, target) pair that changed.
    pub(crate) fn set_target_icon(&mut self, icon: u8, target: ObjectGuid) -> Result<Vec<(u8, ObjectGuid)>, GroupError> {
        let index = usize::from(icon);
        if index >= TARGET_ICON_COUNT {
            return Err(GroupError::InvalidSlot);
        }

        let mut changes = Vec::new();
        if !target.is_empty() {
            for (other, marked) in self.target_icons.iter_mut().enumerate() {
                if other != index && *marked == target {
                    *marked = ObjectGuid::EMPTY;
                    changes.push((other as u8, ObjectGuid::EMPTY));
                }
            }
        }
        self.target_icons[index] = target;
        changes.push((icon, target));
        Ok(changes)
    }

    /// Icons currently in use.
    pub fn target_icon_list(&self) -> Vec<(u8, ObjectGuid)> {
        self.target_icons
            .iter()
            .enumerate()
            .filter(|(_, target)| !target.is_empty())
            .map(|(icon, target)| (icon as u8, *target))
            .collect()
    }

    pub fn world_marker(&self, slot: u8) -> Option<WorldMarker> {
        self.world_markers.get(usize::from(slot)).copied().flatten()
    }

    /// Bit `i` set while marker `i` is placed.
    pub fn markers_mask(&self) -> u32 {
        self.world_markers
            .iter()
            .enumerate()
            .filter(|(_, marker)| marker.is_some())
            .fold(0, |mask, (slot, _)| mask | (1 << slot))
    }

    pub(crate) fn place_marker(&mut self, slot: u8, marker: WorldMarker) -> Result<u32, GroupError> {
        let entry = self
            .world_markers
            .get_mut(usize::from(slot))
            .ok_or(GroupError::InvalidSlot)?;
        *entry = Some(marker);
        Ok(self.markers_mask())
    }

    /// Clears one marker, or all of them for any slot past the last.
    pub(crate) fn clear_marker(&mut self, slot: u8) -> u32 {
        match self.world_markers.get_mut(usize::from(slot)) {
            Some(entry) => *entry = None,
            None => self.world_markers = [None; WORLD_MARKER_COUNT],
        }
        self.markers_mask()
    }

    pub(crate) fn start_ready_check(
        &mut self,
        initiator: ObjectGuid,
        now: Instant,
        duration: Duration,
    ) -> Result<ReadyCheckStart, GroupError> {
        if !self.has_authority(initiator) {
            return Err(GroupError::NotAuthorized);
        }
        let progress = self
            .ready_check
            .start(initiator, self.online_members(), now, duration)?;
        let offline = self
            .members
            .iter()
            .filter(|slot| !slot.online)
            .map(|slot| slot.guid)
            .collect();
        Ok(ReadyCheckStart { progress, offline })
    }

    pub(crate) fn confirm_ready(&mut self, member: ObjectGuid, ready: bool) -> Option<Progress> {
        self.ready_check.respond(member, ready)
    }

    /// Stops waiting on a member who went offline. True if that completed the check.
    pub(crate) fn release_from_ready_check(&mut self, member: ObjectGuid) -> bool {
        self.ready_check.forget(member) == Some(Progress::Completed)
    }

    pub(crate) fn expire_ready_check(&mut self, initiator: ObjectGuid, now: Instant) -> bool {
        self.ready_check.expire(initiator, now)
    }

    /// Opens a roll among the online members.
    pub(crate) fn start_roll(
        &mut self,
        item: ObjectGuid,
        auto_pass: impl Fn(ObjectGuid) -> bool,
    ) -> Result<Option<CompletedRoll>, GroupError> {
        let eligible = self.online_members();
        self.rolls.start(item, eligible, auto_pass)
    }

    pub(crate) fn cast_vote(&mut self, item: ObjectGuid, voter: ObjectGuid, vote: RollVote) -> VoteOutcome {
        self.rolls.cast(item, voter, vote)
    }

    /// The group as `recipient` sees it: everyone but themselves, plus
    /// their own sub-group and flags.
    pub fn roster_for(&self, recipient: ObjectGuid) -> RosterUpdate {
        let own = self.member(recipient);
        let members = self
            .members
            .iter()
            .filter(|slot| slot.guid != recipient)
            .map(|slot| RosterEntry {
                guid: slot.guid,
                name: slot.name.clone(),
                online: slot.online,
                sub_group: slot.sub_group,
                flags: self.member_flags(slot.guid),
                roles: slot.roles,
            })
            .collect();

        RosterUpdate {
            group: self.guid,
            leader: self.leader,
            kind: self.kind,
            own_sub_group: own.map(|slot| slot.sub_group).unwrap_or(0),
            own_flags: self.member_flags(recipient),
            counter: self.update_counter,
            loot_method: self.loot.method,
            looter: self.loot.looter,
            loot_threshold: self.loot.threshold,
            members,
        }
    }
}
