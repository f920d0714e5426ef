//! Membership store: owns every group and the index of who belongs where.
//!
//! Each group sits behind its own `tokio::sync::RwLock`, so unrelated groups
//! never wait on each other. The affiliation index maps a player to the one
//! group they are a member of or invited to. It is only changed while the
//! affected group's write lock is held, and new invites reserve the invitee
//! through the map's entry API, so two leaders racing for the same player
//! cannot both win.
//!
//! Lookups go index first, lock second. Because the index can move while a
//! task waits for a lock, every operation re-checks the affiliation after
//! locking and retries if it changed underneath.

use crate::error::GroupError;
use crate::group::{
    Departure, Dissolution, Group, GroupId, GroupState, Joined, ReadyCheckStart, WorldMarker,
};
use crate::loot::{CompletedRoll, LootSettings, VoteOutcome};
use crate::persistence::GroupPersistence;
use crate::ready_check::Progress;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use shared::{Assignment, GroupKind, LootMethod, ObjectGuid, Roles, RollVote};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

/// Retries after which a player still moving between groups is reported.
const LOCK_RETRY_WARNING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffiliationKind {
    Member,
    /// Holds an invite, or is the pending leader of a forming group.
    Invited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affiliation {
    pub group: GroupId,
    pub kind: AffiliationKind,
}

pub type GroupHandle = Arc<RwLock<Group>>;
type GroupGuard = OwnedRwLockWriteGuard<Group>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invited {
    pub group: GroupId,
    /// The invite started a new forming group.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct Accepted {
    pub joined: Joined,
    pub group: Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declined {
    pub group: ObjectGuid,
    pub leader: ObjectGuid,
    /// The decline left a forming group with nobody to invite.
    pub destroyed: bool,
}

/// What happened to a pending invite when its holder went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Withdrawal {
    Invite(Declined),
    /// The pending leader left and took the forming group with them.
    Forming {
        group: ObjectGuid,
        dissolution: Dissolution,
    },
}

#[derive(Debug, Clone)]
pub struct Removed {
    pub departure: Departure,
    /// The group right after the removal.
    pub group: Group,
    /// Set when the removal ended the group.
    pub dissolution: Option<Dissolution>,
}

#[derive(Debug, Clone)]
pub enum Expelled {
    Member(Removed),
    Invitee { group: ObjectGuid },
}

#[derive(Debug, Clone)]
pub struct Disbanded {
    /// The group as it was just before it was torn down.
    pub group: Group,
    pub dissolution: Dissolution,
}

#[derive(Debug, Clone)]
pub struct Presence {
    pub group: Group,
    pub changed: bool,
    pub ready_check_completed: bool,
}

pub struct GroupRegistry {
    groups: DashMap<GroupId, GroupHandle>,
    affiliations: DashMap<ObjectGuid, Affiliation>,
    next_id: AtomicU32,
    persistence: Arc<dyn GroupPersistence>,
}

impl GroupRegistry {
    pub fn new(persistence: Arc<dyn GroupPersistence>) -> Self {
        Self {
            groups: DashMap::new(),
            affiliations: DashMap::new(),
            next_id: AtomicU32::new(1),
            persistence,
        }
    }

    pub fn affiliation(&self, guid: ObjectGuid) -> Option<Affiliation> {
        self.affiliations.get(&guid).map(|entry| *entry)
    }

    pub fn is_affiliated(&self, guid: ObjectGuid) -> bool {
        self.affiliations.contains_key(&guid)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.iter().map(|entry| *entry.key()).collect()
    }

    fn handle(&self, id: GroupId) -> Option<GroupHandle> {
        self.groups.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Consistent copy of a group, taken under its read lock.
    pub async fn snapshot(&self, id: GroupId) -> Option<Group> {
        let handle = self.handle(id)?;
        let group = handle.read().await;
        (group.state() != GroupState::Disbanded).then(|| group.clone())
    }

    /// Snapshot of the group `guid` is a member of.
    pub async fn group_of(&self, guid: ObjectGuid) -> Option<Group> {
        let affiliation = self.affiliation(guid)?;
        if affiliation.kind != AffiliationKind::Member {
            return None;
        }
        let handle = self.handle(affiliation.group)?;
        let group = handle.read().await;
        (group.state() != GroupState::Disbanded && group.is_member(guid)).then(|| group.clone())
    }

    /// Write-locks the group `guid` is affiliated with. Retries for as long
    /// as the affiliation moves while the lock is being taken; every retry
    /// means another operation on that player completed.
    async fn lock(&self, guid: ObjectGuid) -> Option<(Affiliation, GroupGuard)> {
        let mut retries = 0;
        loop {
            let affiliation = self.affiliation(guid)?;
            if let Some(handle) = self.handle(affiliation.group) {
                let group = handle.write_owned().await;
                if self.affiliation(guid) == Some(affiliation) {
                    return (group.state() != GroupState::Disbanded).then_some((affiliation, group));
                }
            } else {
                tokio::task::yield_now().await;
            }
            retries += 1;
            if retries % LOCK_RETRY_WARNING == 0 {
                warn!("{} still moving between groups after {} lock retries", guid, retries);
            }
        }
    }

    async fn lock_member(&self, guid: ObjectGuid) -> Result<GroupGuard, GroupError> {
        match self.lock(guid).await {
            Some((affiliation, group)) if affiliation.kind == AffiliationKind::Member => Ok(group),
            _ => Err(GroupError::NotInGroup),
        }
    }

    async fn lock_id(&self, id: GroupId) -> Result<GroupGuard, GroupError> {
        let handle = self.handle(id).ok_or(GroupError::NotInGroup)?;
        let group = handle.write_owned().await;
        if group.state() == GroupState::Disbanded {
            return Err(GroupError::NotInGroup);
        }
        Ok(group)
    }

    /// Runs `f` against the group `guid` is a member of, under its write lock.
    pub async fn with_member_group<T>(
        &self,
        guid: ObjectGuid,
        f: impl FnOnce(&mut Group) -> Result<T, GroupError>,
    ) -> Result<T, GroupError> {
        let mut group = self.lock_member(guid).await?;
        f(&mut *group)
    }

    fn reserve(&self, guid: ObjectGuid, group: GroupId) -> Result<(), GroupError> {
        match self.affiliations.entry(guid) {
            Entry::Occupied(_) => Err(GroupError::AlreadyGrouped),
            Entry::Vacant(slot) => {
                slot.insert(Affiliation {
                    group,
                    kind: AffiliationKind::Invited,
                });
                Ok(())
            }
        }
    }

    fn release(&self, guid: ObjectGuid, group: GroupId) {
        self.affiliations.remove_if(&guid, |_, affiliation| affiliation.group == group);
    }

    fn dissolve(&self, group: &mut Group) -> Dissolution {
        let was_created = group.state() == GroupState::Created;
        let id = group.id();
        let dissolution = group.dissolve();
        for guid in dissolution.members.iter().chain(&dissolution.invitees) {
            self.release(*guid, id);
        }
        self.groups.remove(&id);

        if was_created {
            self.persistence.group_deleted(group.guid());
            info!("Group {} disbanded", group.guid());
        } else {
            debug!("Forming group {} dropped", group.guid());
        }
        dissolution
    }

    /// Invites `invitee` into the inviter's group, creating a forming group
    /// when the inviter has none.
    pub async fn create_invite(
        &self,
        inviter: ObjectGuid,
        inviter_name: &str,
        invitee: ObjectGuid,
    ) -> Result<Invited, GroupError> {
        if inviter == invitee {
            return Err(GroupError::SelfTarget);
        }

        let mut retries = 0;
        loop {
            if retries > 0 && retries % LOCK_RETRY_WARNING == 0 {
                warn!("Invite by {} still racing other invites after {} retries", inviter, retries);
            }
            retries += 1;
            match self.lock(inviter).await {
                Some((affiliation, mut group)) => {
                    let leads_forming = group.state() == GroupState::Forming && group.is_leader(inviter);
                    if affiliation.kind == AffiliationKind::Invited && !leads_forming {
                        // Starting a group of their own drops the invite they hold.
                        self.withdraw_locked(&mut group, inviter);
                        continue;
                    }
                    self.invite_into(&mut group, inviter, invitee)?;
                    return Ok(Invited {
                        group: group.id(),
                        created: false,
                    });
                }
                None => {
                    if let Some(invited) = self.invite_into_new(inviter, inviter_name, invitee).await? {
                        return Ok(invited);
                    }
                }
            }
        }
    }

    fn invite_into(&self, group: &mut Group, inviter: ObjectGuid, invitee: ObjectGuid) -> Result<(), GroupError> {
        if !group.has_authority(inviter) {
            return Err(GroupError::NotAuthorized);
        }
        if group.is_full() {
            return Err(GroupError::Full);
        }
        self.reserve(invitee, group.id())?;
        group.add_invite(invitee);
        debug!("{} invited {} to {}", inviter, invitee, group.guid());
        Ok(())
    }

    /// `Ok(None)` when someone invited the inviter in the meantime; the
    /// caller retries through the existing-group path.
    async fn invite_into_new(
        &self,
        inviter: ObjectGuid,
        inviter_name: &str,
        invitee: ObjectGuid,
    ) -> Result<Option<Invited>, GroupError> {
        if self.is_affiliated(invitee) {
            return Err(GroupError::AlreadyGrouped);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(RwLock::new(Group::forming(id, inviter, inviter_name)));
        let mut group = Arc::clone(&handle).write_owned().await;
        self.groups.insert(id, handle);

        if self.reserve(inviter, id).is_err() {
            self.dissolve(&mut group);
            return Ok(None);
        }
        if let Err(err) = self.reserve(invitee, id) {
            self.dissolve(&mut group);
            return Err(err);
        }
        group.add_invite(invitee);
        debug!("{} invited {} to new group {}", inviter, invitee, group.guid());
        Ok(Some(Invited { group: id, created: true }))
    }

    /// Turns `member`'s pending invite into membership.
    ///
    /// A forming group needs its leader to still be around; if they are
    /// not, every invite of that group is cleared and the call fails with
    /// `LeaderUnavailable`.
    pub async fn accept_invite(
        &self,
        member: ObjectGuid,
        name: &str,
        is_reachable: impl Fn(ObjectGuid) -> bool,
    ) -> Result<Accepted, GroupError> {
        let Some((affiliation, mut group)) = self.lock(member).await else {
            return Err(GroupError::NoPendingInvite);
        };
        if affiliation.kind != AffiliationKind::Invited || !group.is_invited(member) {
            return Err(GroupError::NoPendingInvite);
        }
        if group.state() == GroupState::Forming && !is_reachable(group.leader()) {
            self.dissolve(&mut group);
            return Err(GroupError::LeaderUnavailable);
        }

        let joined = group.accept(member, name)?;
        let id = group.id();
        let guid = group.guid();
        if joined.created {
            let leader = group.leader();
            self.affiliations.insert(
                leader,
                Affiliation {
                    group: id,
                    kind: AffiliationKind::Member,
                },
            );
            self.persistence.group_created(guid, leader);
            self.persistence.member_added(guid, leader, 0);
            info!("Group {} created by {}", guid, leader);
        }
        self.affiliations.insert(
            member,
            Affiliation {
                group: id,
                kind: AffiliationKind::Member,
            },
        );
        self.persistence.member_added(guid, member, joined.sub_group);
        debug!("{} joined {} in sub-group {}", member, guid, joined.sub_group);

        Ok(Accepted {
            joined,
            group: group.clone(),
        })
    }

    pub async fn decline_invite(&self, member: ObjectGuid) -> Result<Declined, GroupError> {
        let Some((affiliation, mut group)) = self.lock(member).await else {
            return Err(GroupError::NoPendingInvite);
        };
        if affiliation.kind != AffiliationKind::Invited || !group.is_invited(member) {
            return Err(GroupError::NoPendingInvite);
        }
        match self.withdraw_locked(&mut group, member) {
            Withdrawal::Invite(declined) => Ok(declined),
            Withdrawal::Forming { .. } => Err(GroupError::NoPendingInvite),
        }
    }

    /// Drops whatever pending invite `guid` holds, if any.
    pub async fn withdraw(&self, guid: ObjectGuid) -> Option<Withdrawal> {
        let (affiliation, mut group) = self.lock(guid).await?;
        if affiliation.kind != AffiliationKind::Invited {
            return None;
        }
        Some(self.withdraw_locked(&mut group, guid))
    }

    fn withdraw_locked(&self, group: &mut Group, guid: ObjectGuid) -> Withdrawal {
        if group.state() == GroupState::Forming && group.is_leader(guid) {
            let group_guid = group.guid();
            return Withdrawal::Forming {
                group: group_guid,
                dissolution: self.dissolve(group),
            };
        }

        group.remove_invite(guid);
        self.release(guid, group.id());
        let destroyed = group.member_count() == 0 && group.invitees().next().is_none();
        if destroyed {
            self.dissolve(group);
        }
        Withdrawal::Invite(Declined {
            group: group.guid(),
            leader: group.leader(),
            destroyed,
        })
    }

    fn remove_locked(&self, group: &mut Group, target: ObjectGuid) -> Option<Removed> {
        let departure = group.remove_member(target)?;
        self.release(target, group.id());
        self.persistence.member_removed(group.guid(), target);
        debug!("{} removed from {}", target, group.guid());

        let snapshot = group.clone();
        let dissolution = group.is_depleted().then(|| self.dissolve(group));
        Some(Removed {
            departure,
            group: snapshot,
            dissolution,
        })
    }

    /// Kicks a member or revokes an invite on behalf of a leader or assistant.
    /// The leader cannot be kicked this way.
    pub async fn remove_member(&self, by: ObjectGuid, target: ObjectGuid) -> Result<Expelled, GroupError> {
        let mut group = self.lock_member(by).await?;
        if !group.has_authority(by) {
            return Err(GroupError::NotAuthorized);
        }
        if target == by {
            return Err(GroupError::SelfTarget);
        }
        if group.is_leader(target) {
            return Err(GroupError::NotLeader);
        }

        if group.is_member(target) {
            return self
                .remove_locked(&mut group, target)
                .map(Expelled::Member)
                .ok_or(GroupError::TargetNotInGroup);
        }
        if group.remove_invite(target) {
            self.release(target, group.id());
            return Ok(Expelled::Invitee { group: group.guid() });
        }
        Err(GroupError::TargetNotInGroup)
    }

    /// A member walks out. When the leader walks out of a group that
    /// survives, leadership passes to the first online member, or the first
    /// member when nobody is online.
    pub async fn leave(&self, member: ObjectGuid) -> Result<Removed, GroupError> {
        let mut group = self.lock_member(member).await?;
        let leader_left = group.is_leader(member);
        let mut removed = self
            .remove_locked(&mut group, member)
            .ok_or(GroupError::NotInGroup)?;
        if !leader_left || removed.dissolution.is_some() {
            return Ok(removed);
        }

        let heir = group
            .members()
            .iter()
            .find(|slot| slot.online)
            .or_else(|| group.members().first())
            .map(|slot| slot.guid)
            .ok_or(GroupError::NotInGroup)?;
        group.set_leader(heir)?;
        self.persistence.leader_changed(group.guid(), heir);
        info!("{} inherits {} from {}", heir, group.guid(), member);
        removed.group = group.clone();
        Ok(removed)
    }

    pub async fn disband(&self, leader: ObjectGuid) -> Result<Disbanded, GroupError> {
        let mut group = self.lock_member(leader).await?;
        if !group.is_leader(leader) {
            return Err(GroupError::NotLeader);
        }
        let snapshot = group.clone();
        let dissolution = self.dissolve(&mut group);
        Ok(Disbanded {
            group: snapshot,
            dissolution,
        })
    }

    pub async fn change_leader(&self, current: ObjectGuid, new_leader: ObjectGuid) -> Result<Group, GroupError> {
        self.with_member_group(current, |group| {
            if !group.is_leader(current) {
                return Err(GroupError::NotLeader);
            }
            group.set_leader(new_leader)?;
            self.persistence.leader_changed(group.guid(), new_leader);
            info!("{} now leads {}", new_leader, group.guid());
            Ok(group.clone())
        })
        .await
    }

    /// `Ok(None)` when the target already sits in that sub-group.
    pub async fn change_sub_group(
        &self,
        mover: ObjectGuid,
        target: ObjectGuid,
        sub_group: u8,
    ) -> Result<Option<Group>, GroupError> {
        self.with_member_group(mover, |group| {
            if !group.has_authority(mover) {
                return Err(GroupError::NotAuthorized);
            }
            if !group.move_to_sub_group(target, sub_group)? {
                return Ok(None);
            }
            self.persistence.subgroup_changed(group.guid(), target, sub_group);
            Ok(Some(group.clone()))
        })
        .await
    }

    pub async fn set_assistant(&self, by: ObjectGuid, target: ObjectGuid, apply: bool) -> Result<Group, GroupError> {
        self.with_member_group(by, |group| {
            if !group.is_leader(by) {
                return Err(GroupError::NotLeader);
            }
            group.set_assistant(target, apply)?;
            Ok(group.clone())
        })
        .await
    }

    /// Main tank / main assist. The previous holder always loses the
    /// assignment. `None` when the holder stayed the same.
    pub async fn assign_unique(
        &self,
        by: ObjectGuid,
        assignment: Assignment,
        target: ObjectGuid,
        apply: bool,
    ) -> Result<Option<Group>, GroupError> {
        self.with_member_group(by, |group| {
            if !group.has_authority(by) {
                return Err(GroupError::NotAuthorized);
            }
            let changed = group.assign(assignment, target, apply)?;
            Ok(changed.then(|| group.clone()))
        })
        .await
    }

    pub async fn set_everyone_assistant(&self, by: ObjectGuid, apply: bool) -> Result<Group, GroupError> {
        self.with_member_group(by, |group| {
            if !group.is_leader(by) {
                return Err(GroupError::NotLeader);
            }
            if !group.is_raid() {
                return Err(GroupError::NotRaid);
            }
            group.set_everyone_assistant(apply);
            Ok(group.clone())
        })
        .await
    }

    /// `Ok(None)` when nothing changed: already that kind, or a raid too
    /// large to become a party.
    pub async fn convert(&self, by: ObjectGuid, kind: GroupKind) -> Result<Option<Group>, GroupError> {
        self.with_member_group(by, |group| {
            if !group.is_leader(by) {
                return Err(GroupError::NotLeader);
            }
            if group.member_count() < 2 {
                return Err(GroupError::TooSmall);
            }
            if group.kind() == kind || !group.convert(kind) {
                return Ok(None);
            }
            info!("Group {} is now a {:?}", group.guid(), kind);
            Ok(Some(group.clone()))
        })
        .await
    }

    /// Returns the roles the target had before.
    pub async fn set_roles(&self, by: ObjectGuid, target: ObjectGuid, roles: Roles) -> Result<(Roles, Group), GroupError> {
        self.with_member_group(by, |group| {
            let old = group.set_roles(target, roles)?;
            Ok((old, group.clone()))
        })
        .await
    }

    pub async fn set_loot(&self, by: ObjectGuid, loot: LootSettings) -> Result<Group, GroupError> {
        self.with_member_group(by, |group| {
            if !group.is_leader(by) {
                return Err(GroupError::NotLeader);
            }
            if loot.method == LootMethod::MasterLoot && !group.is_member(loot.looter) {
                return Err(GroupError::NotMember);
            }
            group.set_loot(loot);
            Ok(group.clone())
        })
        .await
    }

    /// Flags a member online or offline. Going offline also stops any ready
    /// check from waiting on them.
    pub async fn set_online(&self, guid: ObjectGuid, online: bool) -> Option<Presence> {
        let mut group = self.lock_member(guid).await.ok()?;
        let changed = group.set_online(guid, online);
        let ready_check_completed = !online && group.release_from_ready_check(guid);
        Some(Presence {
            group: group.clone(),
            changed,
            ready_check_completed,
        })
    }

    /// Returns every (icon, target) pair that changed.
    pub async fn set_target_icon(
        &self,
        by: ObjectGuid,
        icon: u8,
        target: ObjectGuid,
    ) -> Result<(Group, Vec<(u8, ObjectGuid)>), GroupError> {
        self.with_member_group(by, |group| {
            if !group.has_authority(by) {
                return Err(GroupError::NotAuthorized);
            }
            let changes = group.set_target_icon(icon, target)?;
            Ok((group.clone(), changes))
        })
        .await
    }

    /// Returns the new marker mask.
    pub async fn clear_marker(&self, by: ObjectGuid, slot: u8) -> Result<(Group, u32), GroupError> {
        self.with_member_group(by, |group| {
            if group.is_raid() && !group.has_authority(by) {
                return Err(GroupError::NotAuthorized);
            }
            let mask = group.clear_marker(slot);
            Ok((group.clone(), mask))
        })
        .await
    }

    pub async fn place_marker(&self, by: ObjectGuid, slot: u8, marker: WorldMarker) -> Result<(Group, u32), GroupError> {
        self.with_member_group(by, |group| {
            let mask = group.place_marker(slot, marker)?;
            Ok((group.clone(), mask))
        })
        .await
    }

    pub async fn start_ready_check(
        &self,
        by: ObjectGuid,
        now: Instant,
        duration: Duration,
    ) -> Result<(Group, ReadyCheckStart), GroupError> {
        self.with_member_group(by, |group| {
            let start = group.start_ready_check(by, now, duration)?;
            Ok((group.clone(), start))
        })
        .await
    }

    /// Records a ready-check answer for the check running in `group_guid`.
    pub async fn confirm_ready(
        &self,
        member: ObjectGuid,
        group_guid: ObjectGuid,
        ready: bool,
    ) -> Result<(Group, Progress), GroupError> {
        self.with_member_group(member, |group| {
            if group.guid() != group_guid {
                return Err(GroupError::NoReadyCheck);
            }
            let progress = group.confirm_ready(member, ready).ok_or(GroupError::NoReadyCheck)?;
            Ok((group.clone(), progress))
        })
        .await
    }

    /// Ends the check `initiator` started in group `id` once it is overdue.
    pub async fn expire_ready_check(&self, id: GroupId, initiator: ObjectGuid, now: Instant) -> Option<Group> {
        let mut group = self.lock_id(id).await.ok()?;
        group.expire_ready_check(initiator, now).then(|| group.clone())
    }

    pub async fn start_roll(
        &self,
        id: GroupId,
        item: ObjectGuid,
        auto_pass: impl Fn(ObjectGuid) -> bool,
    ) -> Result<(Group, Option<CompletedRoll>), GroupError> {
        let mut group = self.lock_id(id).await?;
        let completed = group.start_roll(item, auto_pass)?;
        Ok((group.clone(), completed))
    }

    /// Returns the voter's group identity along with the outcome.
    pub async fn cast_vote(
        &self,
        voter: ObjectGuid,
        item: ObjectGuid,
        vote: RollVote,
    ) -> Result<(ObjectGuid, VoteOutcome), GroupError> {
        self.with_member_group(voter, |group| Ok((group.guid(), group.cast_vote(item, voter, vote))))
            .await
    }
}
