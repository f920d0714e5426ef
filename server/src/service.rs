//! Command pipeline: decode, validate, mutate through the registry, then
//! fan the resulting events out through the dispatcher.
//!
//! Validation failures that the client has a result code for are answered
//! with `OperationResult`; everything else is dropped with a debug line.
//! Malformed packets are dropped with a warning and never answered.

use crate::config::GroupConfig;
use crate::directory::PlayerDirectory;
use crate::dispatcher::Dispatcher;
use crate::error::GroupError;
use crate::group::{Dissolution, Group, GroupId, WorldMarker};
use crate::loot::{LootResolver, LootSettings, VoteOutcome};
use crate::ready_check::Progress;
use crate::registry::{AffiliationKind, Expelled, GroupRegistry, Removed, Withdrawal};
use dashmap::{DashMap, DashSet};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    normalize_player_name, Assignment, ClientCommand, GroupKind, GroupUpdateFlags, ItemQuality, LootMethod,
    MemberStats, MemberStatsUpdate, ObjectGuid, PartyOperation, PartyResult, Roles, RollVote, RosterUpdate, ServerEvent,
    TargetIconRequest, WorldPacket, MAX_RANDOM_ROLL, MAX_RAID_SUBGROUPS,
};
use std::sync::Arc;
use std::time::Instant;

/// A running ready-check timer, owned by the member who started the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub group: GroupId,
    pub deadline: Instant,
}

pub struct GroupService {
    registry: Arc<GroupRegistry>,
    directory: Arc<dyn PlayerDirectory>,
    dispatcher: Dispatcher,
    resolver: Arc<dyn LootResolver>,
    config: GroupConfig,
    countdowns: DashMap<ObjectGuid, Countdown>,
    loot_opt_out: DashSet<ObjectGuid>,
}

impl GroupService {
    pub fn new(
        registry: Arc<GroupRegistry>,
        directory: Arc<dyn PlayerDirectory>,
        dispatcher: Dispatcher,
        resolver: Arc<dyn LootResolver>,
        config: GroupConfig,
    ) -> Self {
        Self {
            registry,
            directory,
            dispatcher,
            resolver,
            config,
            countdowns: DashMap::new(),
            loot_opt_out: DashSet::new(),
        }
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    pub fn countdown(&self, initiator: ObjectGuid) -> Option<Countdown> {
        self.countdowns.get(&initiator).map(|entry| *entry)
    }

    pub fn is_opted_out(&self, guid: ObjectGuid) -> bool {
        self.loot_opt_out.contains(&guid)
    }

    /// Entry point for one inbound world packet.
    pub async fn handle(&self, sender: ObjectGuid, packet: &WorldPacket) {
        match ClientCommand::decode(packet) {
            Ok(command) => {
                debug!("{} sent {:?}", sender, command);
                self.execute(sender, command).await;
            }
            Err(e) => {
                warn!("Dropping malformed packet 0x{:04X} from {}: {}", packet.opcode, sender, e);
            }
        }
    }

    pub async fn execute(&self, sender: ObjectGuid, command: ClientCommand) {
        match command {
            ClientCommand::Invite { name, .. } => self.invite(sender, &name).await,
            ClientCommand::InviteResponse { accept: true } => self.accept(sender).await,
            ClientCommand::InviteResponse { accept: false } => self.decline(sender).await,
            ClientCommand::Uninvite { target, reason } => self.uninvite(sender, target, &reason).await,
            ClientCommand::SetLeader { target } => self.set_leader(sender, target).await,
            ClientCommand::SetRoles { target, roles } => self.set_roles(sender, target, roles).await,
            ClientCommand::Disband => self.disband(sender).await,
            ClientCommand::SetLootMethod {
                method,
                master,
                threshold,
            } => self.set_loot_method(sender, method, master, threshold).await,
            ClientCommand::LootRoll { item, slot, vote } => self.loot_roll(sender, item, slot, vote).await,
            ClientCommand::MinimapPing { x, y } => self.minimap_ping(sender, x, y).await,
            ClientCommand::RandomRoll { min, max } => self.random_roll(sender, min, max).await,
            ClientCommand::TargetIcon(request) => self.target_icon(sender, request).await,
            ClientCommand::RaidConvert { to_raid } => self.raid_convert(sender, to_raid).await,
            ClientCommand::ChangeSubGroup { name, sub_group } => {
                self.change_sub_group(sender, &name, sub_group).await
            }
            ClientCommand::SetAssistant { target, apply } => self.set_assistant(sender, target, apply).await,
            ClientCommand::SetAssignment {
                assignment,
                target,
                apply,
            } => self.set_assignment(sender, assignment, target, apply).await,
            ClientCommand::StartReadyCheck => self.start_ready_check(sender).await,
            ClientCommand::ConfirmReadyCheck { group, ready } => {
                self.confirm_ready_check(sender, group, ready).await
            }
            ClientCommand::RequestMemberStats { target } => self.request_member_stats(sender, target),
            ClientCommand::OptOutOfLoot { always_pass } => self.opt_out_of_loot(sender, always_pass),
            ClientCommand::ClearWorldMarker { slot } => self.clear_world_marker(sender, slot).await,
            ClientCommand::SetEveryoneAssistant { apply } => self.set_everyone_assistant(sender, apply).await,
        }
    }

    fn reply(&self, to: ObjectGuid, operation: PartyOperation, name: &str, result: PartyResult) {
        self.dispatcher.send(
            to,
            &ServerEvent::OperationResult {
                operation,
                name: name.to_string(),
                result,
                value: 0,
            },
        );
    }

    /// Answers with the error's result code, or drops it quietly.
    fn reject(&self, to: ObjectGuid, operation: PartyOperation, name: &str, error: GroupError) {
        match error.party_result() {
            Some(result) => self.reply(to, operation, name, result),
            None => debug!("{:?} from {} dropped: {}", operation, to, error),
        }
    }

    fn name_of(&self, guid: ObjectGuid) -> String {
        self.directory.name_of(guid).unwrap_or_default()
    }

    fn send_rosters(&self, group: &Group) {
        self.dispatcher
            .send_each(group.online_members(), |recipient| ServerEvent::Roster(group.roster_for(recipient)));
    }

    fn broadcast(&self, group: &Group, event: &ServerEvent) {
        self.dispatcher.broadcast(group.online_members(), event, None);
    }

    fn cancel_countdowns(&self, group: GroupId) {
        self.countdowns.retain(|_, countdown| countdown.group != group);
    }

    fn announce_dissolution(&self, group: GroupId, dissolution: &Dissolution) {
        self.cancel_countdowns(group);
        for member in &dissolution.members {
            self.dispatcher.send(*member, &ServerEvent::GroupDestroyed);
            self.dispatcher.send(*member, &ServerEvent::Roster(RosterUpdate::empty()));
        }
    }

    fn complete_ready_check(&self, group: &Group) {
        self.cancel_countdowns(group.id());
        self.broadcast(group, &ServerEvent::ReadyCheckCompleted { group: group.guid() });
    }

    /// Tells the removed member and the rest of the group what happened.
    fn after_removal(&self, removed: Removed, kicked: bool) {
        let who = removed.departure.slot.guid;
        if kicked {
            self.dispatcher.send(who, &ServerEvent::GroupUninvite);
        }
        self.dispatcher.send(who, &ServerEvent::Roster(RosterUpdate::empty()));

        for roll in removed.departure.completed_rolls {
            self.resolver.resolve(removed.group.guid(), roll);
        }
        match removed.dissolution {
            Some(dissolution) => self.announce_dissolution(removed.group.id(), &dissolution),
            None => {
                if removed.departure.ready_check_completed {
                    self.complete_ready_check(&removed.group);
                }
                self.send_rosters(&removed.group);
            }
        }
    }

    async fn invite(&self, sender: ObjectGuid, raw_name: &str) {
        let op = PartyOperation::Invite;
        let Some(name) = normalize_player_name(raw_name) else {
            return self.reply(sender, op, raw_name, PartyResult::BadTargetName);
        };
        let Some(target) = self.directory.find_by_name(&name) else {
            return self.reply(sender, op, &name, PartyResult::BadTargetName);
        };
        if target == sender {
            debug!("{} tried to invite themselves", sender);
            return;
        }
        let (Some(me), Some(them)) = (self.directory.profile(sender), self.directory.profile(target)) else {
            return self.reply(sender, op, &name, PartyResult::BadTargetName);
        };

        if !self.config.allow_gm_group && !me.game_master && them.game_master {
            return self.reply(sender, op, &name, PartyResult::BadTargetName);
        }
        if !me.game_master && !self.config.allow_cross_faction && me.team != them.team {
            return self.reply(sender, op, &name, PartyResult::WrongFaction);
        }
        if me.instance_id != 0
            && them.instance_id != 0
            && me.instance_id != them.instance_id
            && me.map_id == them.map_id
        {
            return self.reply(sender, op, &name, PartyResult::TargetNotInInstance);
        }
        if them.instance_id != 0 && them.dungeon_difficulty != me.dungeon_difficulty {
            return self.reply(sender, op, &name, PartyResult::TargetIgnoringYou);
        }
        if self.directory.is_ignoring(target, sender) {
            return self.reply(sender, op, &name, PartyResult::TargetIgnoringYou);
        }
        if let Some(affiliation) = self.registry.affiliation(target) {
            if affiliation.kind == AffiliationKind::Member {
                self.dispatcher.send(
                    target,
                    &ServerEvent::InviteNotification {
                        invited: target,
                        inviter: me.name.clone(),
                        in_group: true,
                    },
                );
            }
            return self.reply(sender, op, &name, PartyResult::AlreadyGrouped);
        }

        match self.registry.create_invite(sender, &me.name, target).await {
            Ok(_) => {
                self.dispatcher.send(
                    target,
                    &ServerEvent::InviteNotification {
                        invited: target,
                        inviter: me.name,
                        in_group: false,
                    },
                );
                self.reply(sender, op, &name, PartyResult::Ok);
            }
            Err(e) => {
                // Failures of the inviter's own group name nobody.
                let shown = match e.party_result() {
                    Some(PartyResult::NotLeader | PartyResult::GroupFull) => "",
                    _ => name.as_str(),
                };
                self.reject(sender, op, shown, e)
            }
        }
    }

    async fn accept(&self, sender: ObjectGuid) {
        let name = self.name_of(sender);
        let directory = Arc::clone(&self.directory);
        let result = self
            .registry
            .accept_invite(sender, &name, move |guid| directory.is_online(guid))
            .await;
        match result {
            Ok(accepted) => self.send_rosters(&accepted.group),
            Err(GroupError::Full) => self.reply(sender, PartyOperation::Invite, "", PartyResult::GroupFull),
            Err(e) => debug!("Accept from {} dropped: {}", sender, e),
        }
    }

    async fn decline(&self, sender: ObjectGuid) {
        match self.registry.decline_invite(sender).await {
            Ok(declined) => {
                if self.directory.is_online(declined.leader) {
                    let name = self.name_of(sender);
                    self.dispatcher
                        .send(declined.leader, &ServerEvent::GroupDecline { name });
                }
            }
            Err(e) => debug!("Decline from {} dropped: {}", sender, e),
        }
    }

    async fn uninvite(&self, sender: ObjectGuid, target: ObjectGuid, reason: &str) {
        if target == sender {
            debug!("{} tried to uninvite themselves", sender);
            return;
        }
        match self.registry.remove_member(sender, target).await {
            Ok(Expelled::Member(removed)) => {
                info!("{} removed {} from {} ({})", sender, target, removed.group.guid(), reason);
                self.after_removal(removed, true);
            }
            Ok(Expelled::Invitee { .. }) => self.dispatcher.send(target, &ServerEvent::GroupUninvite),
            Err(e) => self.reject(sender, PartyOperation::Uninvite, "", e),
        }
    }

    async fn set_leader(&self, sender: ObjectGuid, target: ObjectGuid) {
        if !self.directory.is_online(target) {
            return;
        }
        match self.registry.change_leader(sender, target).await {
            Ok(group) => self.send_rosters(&group),
            Err(e) => debug!("Leader change by {} dropped: {}", sender, e),
        }
    }

    async fn set_roles(&self, sender: ObjectGuid, target: ObjectGuid, roles: Roles) {
        match self.registry.set_roles(sender, target, roles).await {
            Ok((old_roles, group)) => {
                self.broadcast(
                    &group,
                    &ServerEvent::RoleChanged {
                        assigner: sender,
                        target,
                        old_roles,
                        new_roles: roles,
                    },
                );
                self.send_rosters(&group);
            }
            Err(e) => debug!("Role change by {} dropped: {}", sender, e),
        }
    }

    async fn disband(&self, sender: ObjectGuid) {
        if self.registry.group_of(sender).await.is_none() {
            return;
        }
        let Some(profile) = self.directory.profile(sender) else {
            return;
        };
        if profile.in_battleground {
            return self.reply(sender, PartyOperation::Invite, "", PartyResult::InviteRestricted);
        }
        self.reply(sender, PartyOperation::Leave, &profile.name, PartyResult::Ok);

        match self.registry.disband(sender).await {
            Ok(disbanded) => self.announce_dissolution(disbanded.group.id(), &disbanded.dissolution),
            Err(GroupError::NotLeader) => match self.registry.leave(sender).await {
                Ok(removed) => self.after_removal(removed, false),
                Err(e) => debug!("Leave by {} dropped: {}", sender, e),
            },
            Err(e) => debug!("Disband by {} dropped: {}", sender, e),
        }
    }

    async fn set_loot_method(&self, sender: ObjectGuid, method: LootMethod, master: ObjectGuid, threshold: ItemQuality) {
        let quality = threshold.to_wire();
        if quality < ItemQuality::Uncommon.to_wire() || quality > ItemQuality::Artifact.to_wire() {
            debug!("Loot threshold {:?} from {} out of range", threshold, sender);
            return;
        }
        let loot = LootSettings {
            method,
            looter: master,
            threshold,
        };
        match self.registry.set_loot(sender, loot).await {
            Ok(group) => self.send_rosters(&group),
            Err(e) => debug!("Loot change by {} dropped: {}", sender, e),
        }
    }

    async fn loot_roll(&self, sender: ObjectGuid, item: ObjectGuid, slot: u32, vote: RollVote) {
        let (group, outcome) = match self.registry.cast_vote(sender, item, vote).await {
            Ok(result) => result,
            Err(e) => return debug!("Roll vote by {} dropped: {}", sender, e),
        };
        let counted = matches!(outcome, VoteOutcome::Recorded | VoteOutcome::Completed(_));
        if counted && vote != RollVote::Pass {
            self.resolver.on_vote(group, item, sender, vote);
        }
        match outcome {
            VoteOutcome::Completed(roll) => self.resolver.resolve(group, roll),
            VoteOutcome::Recorded => {}
            other => debug!("Vote {:?} by {} on {} slot {} ignored: {:?}", vote, sender, item, slot, other),
        }
    }

    /// Opens a roll on `item` among the online members of `group`.
    pub async fn start_loot_roll(&self, group: GroupId, item: ObjectGuid) -> Result<(), GroupError> {
        let opted_out = &self.loot_opt_out;
        let (group, completed) = self
            .registry
            .start_roll(group, item, |guid| opted_out.contains(&guid))
            .await?;
        if let Some(roll) = completed {
            self.resolver.resolve(group.guid(), roll);
        }
        Ok(())
    }

    fn opt_out_of_loot(&self, sender: ObjectGuid, always_pass: bool) {
        if always_pass {
            self.loot_opt_out.insert(sender);
        } else {
            self.loot_opt_out.remove(&sender);
        }
    }

    async fn minimap_ping(&self, sender: ObjectGuid, x: f32, y: f32) {
        if let Some(group) = self.registry.group_of(sender).await {
            self.dispatcher.broadcast(
                group.online_members(),
                &ServerEvent::MinimapPing { sender, x, y },
                Some(sender),
            );
        }
    }

    async fn random_roll(&self, sender: ObjectGuid, min: u32, max: u32) {
        if min > max || max > MAX_RANDOM_ROLL {
            return;
        }
        let roll = rand::thread_rng().gen_range(min..=max);
        let event = ServerEvent::RandomRoll {
            roller: sender,
            min,
            max,
            roll,
        };
        match self.registry.group_of(sender).await {
            Some(group) => self.broadcast(&group, &event),
            None => self.dispatcher.send(sender, &event),
        }
    }

    async fn target_icon(&self, sender: ObjectGuid, request: TargetIconRequest) {
        match request {
            TargetIconRequest::List => {
                if let Some(group) = self.registry.group_of(sender).await {
                    let icons = group.target_icon_list();
                    self.dispatcher.send(sender, &ServerEvent::TargetIconList { icons });
                }
            }
            TargetIconRequest::Set { icon, target } => {
                match self.registry.set_target_icon(sender, icon, target).await {
                    Ok((group, changes)) => {
                        for (icon, target) in changes {
                            self.broadcast(
                                &group,
                                &ServerEvent::TargetIconSet {
                                    setter: sender,
                                    icon,
                                    target,
                                },
                            );
                        }
                    }
                    Err(e) => debug!("Target icon by {} dropped: {}", sender, e),
                }
            }
        }
    }

    async fn raid_convert(&self, sender: ObjectGuid, to_raid: bool) {
        if self
            .directory
            .profile(sender)
            .map(|profile| profile.in_battleground)
            .unwrap_or(true)
        {
            return;
        }
        let kind = if to_raid { GroupKind::Raid } else { GroupKind::Party };
        match self.registry.convert(sender, kind).await {
            Ok(changed) => {
                self.reply(sender, PartyOperation::Invite, "", PartyResult::Ok);
                if let Some(group) = changed {
                    self.send_rosters(&group);
                }
            }
            Err(e) => debug!("Convert by {} dropped: {}", sender, e),
        }
    }

    async fn change_sub_group(&self, sender: ObjectGuid, name: &str, sub_group: u8) {
        if sub_group >= MAX_RAID_SUBGROUPS {
            return;
        }
        let Some(target) = self.directory.guid_by_name(name) else {
            return debug!("Sub-group move by {} names unknown player {:?}", sender, name);
        };
        match self.registry.change_sub_group(sender, target, sub_group).await {
            Ok(Some(group)) => self.send_rosters(&group),
            Ok(None) => {}
            Err(e) => debug!("Sub-group move by {} dropped: {}", sender, e),
        }
    }

    async fn set_assistant(&self, sender: ObjectGuid, target: ObjectGuid, apply: bool) {
        match self.registry.set_assistant(sender, target, apply).await {
            Ok(group) => self.send_rosters(&group),
            Err(e) => debug!("Assistant change by {} dropped: {}", sender, e),
        }
    }

    async fn set_assignment(&self, sender: ObjectGuid, assignment: Assignment, target: ObjectGuid, apply: bool) {
        match self.registry.assign_unique(sender, assignment, target, apply).await {
            Ok(Some(group)) => self.send_rosters(&group),
            Ok(None) => {}
            Err(e) => debug!("{:?} change by {} dropped: {}", assignment, sender, e),
        }
    }

    async fn set_everyone_assistant(&self, sender: ObjectGuid, apply: bool) {
        match self.registry.set_everyone_assistant(sender, apply).await {
            Ok(group) => self.send_rosters(&group),
            Err(e) => debug!("Everyone-assistant by {} dropped: {}", sender, e),
        }
    }

    async fn start_ready_check(&self, sender: ObjectGuid) {
        let now = Instant::now();
        let duration = self.config.ready_check_duration;
        let (group, start) = match self.registry.start_ready_check(sender, now, duration).await {
            Ok(result) => result,
            Err(e) => return debug!("Ready check by {} dropped: {}", sender, e),
        };

        self.broadcast(
            &group,
            &ServerEvent::ReadyCheckStarted {
                group: group.guid(),
                initiator: sender,
                duration_ms: self.config.ready_check_millis(),
            },
        );
        for member in start.offline {
            self.broadcast(
                &group,
                &ServerEvent::ReadyCheckConfirmed {
                    group: group.guid(),
                    member,
                    ready: false,
                },
            );
        }
        match start.progress {
            Progress::Pending => {
                self.countdowns.insert(
                    sender,
                    Countdown {
                        group: group.id(),
                        deadline: now + duration,
                    },
                );
            }
            Progress::Completed => self.complete_ready_check(&group),
        }
    }

    async fn confirm_ready_check(&self, sender: ObjectGuid, group: ObjectGuid, ready: bool) {
        match self.registry.confirm_ready(sender, group, ready).await {
            Ok((group, progress)) => {
                self.broadcast(
                    &group,
                    &ServerEvent::ReadyCheckConfirmed {
                        group: group.guid(),
                        member: sender,
                        ready,
                    },
                );
                if progress == Progress::Completed {
                    self.complete_ready_check(&group);
                }
            }
            Err(e) => debug!("Ready answer from {} dropped: {}", sender, e),
        }
    }

    /// Completes every ready check whose countdown ran out by `now`.
    pub async fn expire_ready_checks(&self, now: Instant) {
        let due: Vec<(ObjectGuid, Countdown)> = self
            .countdowns
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        for (initiator, countdown) in due {
            self.countdowns
                .remove_if(&initiator, |_, current| *current == countdown);
            if let Some(group) = self
                .registry
                .expire_ready_check(countdown.group, initiator, now)
                .await
            {
                debug!("Ready check in {} timed out", group.guid());
                self.complete_ready_check(&group);
            }
        }
    }

    fn request_member_stats(&self, sender: ObjectGuid, target: ObjectGuid) {
        let stats = self
            .directory
            .member_stats(target)
            .unwrap_or_else(|| MemberStats::offline(target));
        self.dispatcher.send(sender, &ServerEvent::MemberStats(stats));
    }

    /// Pushes the sections of a member's stats named by `mask` to the rest
    /// of their group, on behalf of the world simulation.
    pub async fn member_stats_changed(&self, member: ObjectGuid, mask: GroupUpdateFlags) {
        if mask.is_empty() {
            return;
        }
        let Some(group) = self.registry.group_of(member).await else {
            return;
        };
        let stats = self
            .directory
            .member_stats(member)
            .unwrap_or_else(|| MemberStats::offline(member));
        let update = MemberStatsUpdate::new(&stats, mask);
        self.dispatcher
            .broadcast(group.online_members(), &ServerEvent::MemberStatsChanged(update), Some(member));
    }

    async fn clear_world_marker(&self, sender: ObjectGuid, slot: u8) {
        match self.registry.clear_marker(sender, slot).await {
            Ok((group, mask)) => self.broadcast(&group, &ServerEvent::MarkersChanged { mask }),
            Err(e) => debug!("Marker clear by {} dropped: {}", sender, e),
        }
    }

    /// Places a world marker on behalf of the world simulation.
    pub async fn place_world_marker(&self, member: ObjectGuid, slot: u8, marker: WorldMarker) -> Result<(), GroupError> {
        let (group, mask) = self.registry.place_marker(member, slot, marker).await?;
        self.broadcast(&group, &ServerEvent::MarkersChanged { mask });
        Ok(())
    }

    /// A player's session came up; a grouped player is back online.
    pub async fn session_opened(&self, guid: ObjectGuid) {
        if let Some(presence) = self.registry.set_online(guid, true).await {
            self.send_rosters(&presence.group);
        }
    }

    /// A player's session went away: pending invites are dropped and a
    /// member is shown offline.
    pub async fn session_closed(&self, guid: ObjectGuid) {
        match self.registry.withdraw(guid).await {
            Some(Withdrawal::Invite(declined)) => {
                debug!("Invite of {} to {} withdrawn", guid, declined.group)
            }
            Some(Withdrawal::Forming { group, .. }) => {
                debug!("Forming group {} dropped with its leader {}", group, guid)
            }
            None => {}
        }

        if let Some(presence) = self.registry.set_online(guid, false).await {
            if presence.ready_check_completed {
                self.complete_ready_check(&presence.group);
            }
            if presence.changed {
                self.send_rosters(&presence.group);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::dispatcher::Outbound;
    use crate::loot::RecordingResolver;
    use crate::persistence::RecordingPersistence;
    use shared::{MemberStatus, PlayerProfile, Team};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        service: GroupService,
        directory: Arc<InMemoryDirectory>,
        resolver: Arc<RecordingResolver>,
        rx: UnboundedReceiver<Outbound>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(GroupConfig::default())
        }

        fn with_config(config: GroupConfig) -> Self {
            let directory = Arc::new(InMemoryDirectory::new());
            let resolver = Arc::new(RecordingResolver::new());
            let registry = Arc::new(GroupRegistry::new(Arc::new(RecordingPersistence::new())));
            let (dispatcher, rx) = Dispatcher::new();
            let service = GroupService::new(registry, directory.clone(), dispatcher, resolver.clone(), config);
            Self {
                service,
                directory,
                resolver,
                rx,
            }
        }

        fn login(&self, name: &str) -> ObjectGuid {
            self.directory.login(PlayerProfile::new(name, Team::Horde)).unwrap()
        }

        async fn send(&self, sender: ObjectGuid, command: ClientCommand) {
            let packet = command.encode().unwrap();
            self.service.handle(sender, &packet).await;
        }

        fn drain(&mut self) -> Vec<(ObjectGuid, ServerEvent)> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                out.push((item.recipient, ServerEvent::decode(&item.packet).unwrap()));
            }
            out
        }

        fn events_for(events: &[(ObjectGuid, ServerEvent)], who: ObjectGuid) -> Vec<ServerEvent> {
            events
                .iter()
                .filter(|(recipient, _)| *recipient == who)
                .map(|(_, event)| event.clone())
                .collect()
        }

        async fn invite(&self, from: ObjectGuid, name: &str) {
            self.send(
                from,
                ClientCommand::Invite {
                    name: name.to_string(),
                    realm: String::new(),
                    cross_realm: ObjectGuid::EMPTY,
                },
            )
            .await;
        }

        async fn group_up(&mut self, leader: ObjectGuid, names: &[&str]) -> Vec<ObjectGuid> {
            let mut members = Vec::new();
            for name in names {
                let guid = self.login(name);
                self.invite(leader, name).await;
                self.send(guid, ClientCommand::InviteResponse { accept: true }).await;
                members.push(guid);
            }
            self.drain();
            members
        }
    }

    fn result(operation: PartyOperation, name: &str, result: PartyResult) -> ServerEvent {
        ServerEvent::OperationResult {
            operation,
            name: name.to_string(),
            result,
            value: 0,
        }
    }

    #[tokio::test]
    async fn test_invite_success_notifies_both_sides() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let target = h.login("Target");

        h.invite(leader, "tARGET").await;
        let events = h.drain();
        assert_eq!(
            Harness::events_for(&events, target),
            vec![ServerEvent::InviteNotification {
                invited: target,
                inviter: "Leader".to_string(),
                in_group: false
            }]
        );
        assert_eq!(
            Harness::events_for(&events, leader),
            vec![result(PartyOperation::Invite, "Target", PartyResult::Ok)]
        );
    }

    #[tokio::test]
    async fn test_invite_validation_order() {
        let mut h = Harness::new();
        let leader = h.login("Leader");

        h.invite(leader, "bad name").await;
        h.invite(leader, "Nobody").await;

        let gm = h.login("Gamemaster");
        h.directory.update_profile(gm, |p| p.game_master = true);
        h.invite(leader, "Gamemaster").await;

        h.directory
            .login(PlayerProfile::new("Alliance", Team::Alliance))
            .unwrap();
        h.invite(leader, "Alliance").await;

        let dungeon = h.login("Dungeon");
        h.directory.update_profile(leader, |p| {
            p.map_id = 33;
            p.instance_id = 1;
        });
        h.directory.update_profile(dungeon, |p| {
            p.map_id = 33;
            p.instance_id = 2;
        });
        h.invite(leader, "Dungeon").await;

        let heroic = h.login("Heroic");
        h.directory.update_profile(heroic, |p| {
            p.map_id = 34;
            p.instance_id = 9;
            p.dungeon_difficulty = 1;
        });
        h.invite(leader, "Heroic").await;

        let grumpy = h.login("Grumpy");
        h.directory.ignore(grumpy, leader);
        h.invite(leader, "Grumpy").await;

        let events = Harness::events_for(&h.drain(), leader);
        assert_eq!(
            events,
            vec![
                result(PartyOperation::Invite, "bad name", PartyResult::BadTargetName),
                result(PartyOperation::Invite, "Nobody", PartyResult::BadTargetName),
                result(PartyOperation::Invite, "Gamemaster", PartyResult::BadTargetName),
                result(PartyOperation::Invite, "Alliance", PartyResult::WrongFaction),
                result(PartyOperation::Invite, "Dungeon", PartyResult::TargetNotInInstance),
                result(PartyOperation::Invite, "Heroic", PartyResult::TargetIgnoringYou),
                result(PartyOperation::Invite, "Grumpy", PartyResult::TargetIgnoringYou),
            ]
        );
        assert!(!h.service.registry().is_affiliated(leader));
    }

    #[tokio::test]
    async fn test_cross_faction_allowed_by_config() {
        let config = GroupConfig {
            allow_cross_faction: true,
            ..GroupConfig::default()
        };
        let mut h = Harness::with_config(config);
        let leader = h.login("Leader");
        h.directory
            .login(PlayerProfile::new("Alliance", Team::Alliance))
            .unwrap();
        h.invite(leader, "Alliance").await;

        let events = Harness::events_for(&h.drain(), leader);
        assert_eq!(events, vec![result(PartyOperation::Invite, "Alliance", PartyResult::Ok)]);
    }

    #[tokio::test]
    async fn test_invite_grouped_target_tells_them() {
        let mut h = Harness::new();
        let other_leader = h.login("Other");
        let members = h.group_up(other_leader, &["Busy"]).await;
        let leader = h.login("Leader");

        h.invite(leader, "Busy").await;
        let events = h.drain();
        assert_eq!(
            Harness::events_for(&events, members[0]),
            vec![ServerEvent::InviteNotification {
                invited: members[0],
                inviter: "Leader".to_string(),
                in_group: true
            }]
        );
        assert_eq!(
            Harness::events_for(&events, leader),
            vec![result(PartyOperation::Invite, "Busy", PartyResult::AlreadyGrouped)]
        );
    }

    #[tokio::test]
    async fn test_invite_from_plain_member_and_full_group() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two", "Three", "Four"]).await;
        h.login("Sixth");

        h.invite(members[0], "Sixth").await;
        h.invite(leader, "Sixth").await;
        let events = h.drain();
        assert_eq!(
            Harness::events_for(&events, members[0]),
            vec![result(PartyOperation::Invite, "", PartyResult::NotLeader)]
        );
        assert_eq!(
            Harness::events_for(&events, leader),
            vec![result(PartyOperation::Invite, "", PartyResult::GroupFull)]
        );
    }

    #[tokio::test]
    async fn test_accept_sends_rosters() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let member = h.login("Member");
        h.invite(leader, "Member").await;
        h.drain();

        h.send(member, ClientCommand::InviteResponse { accept: true }).await;
        let events = h.drain();
        let rosters: Vec<_> = events
            .iter()
            .filter_map(|(to, event)| match event {
                ServerEvent::Roster(roster) => Some((*to, roster.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(rosters.len(), 2);
        for (to, roster) in rosters {
            assert_eq!(roster.leader, leader);
            assert_eq!(roster.members.len(), 1);
            assert_ne!(roster.members[0].guid, to);
        }
    }

    #[tokio::test]
    async fn test_decline_reaches_leader() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let member = h.login("Member");
        h.invite(leader, "Member").await;
        h.drain();

        h.send(member, ClientCommand::InviteResponse { accept: false }).await;
        let events = h.drain();
        assert_eq!(
            Harness::events_for(&events, leader),
            vec![ServerEvent::GroupDecline {
                name: "Member".to_string()
            }]
        );
        assert!(!h.service.registry().is_affiliated(leader));
    }

    #[tokio::test]
    async fn test_uninvite_paths() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;
        let pending = h.login("Pending");
        h.invite(leader, "Pending").await;
        let stranger = h.login("Stranger");
        h.drain();

        let uninvite = |target| ClientCommand::Uninvite {
            target,
            reason: "afk".to_string(),
        };

        h.send(members[0], uninvite(members[0])).await;
        h.send(stranger, uninvite(members[0])).await;
        h.send(members[0], uninvite(members[1])).await;
        h.send(leader, uninvite(stranger)).await;
        let events = h.drain();
        assert!(Harness::events_for(&events, members[0])
            .contains(&result(PartyOperation::Uninvite, "", PartyResult::NotLeader)));
        assert_eq!(
            Harness::events_for(&events, stranger),
            vec![result(PartyOperation::Uninvite, "", PartyResult::NotInGroup)]
        );
        assert_eq!(
            Harness::events_for(&events, leader),
            vec![result(PartyOperation::Uninvite, "", PartyResult::TargetNotInGroup)]
        );

        h.send(leader, uninvite(pending)).await;
        let events = h.drain();
        assert_eq!(Harness::events_for(&events, pending), vec![ServerEvent::GroupUninvite]);

        h.send(leader, uninvite(members[1])).await;
        let events = h.drain();
        assert_eq!(
            Harness::events_for(&events, members[1]),
            vec![ServerEvent::GroupUninvite, ServerEvent::Roster(RosterUpdate::empty())]
        );
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert_eq!(group.member_guids(), vec![leader, members[0]]);
    }

    #[tokio::test]
    async fn test_disband_by_leader_and_member() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;

        h.send(members[1], ClientCommand::Disband).await;
        let events = h.drain();
        assert_eq!(
            Harness::events_for(&events, members[1]),
            vec![
                result(PartyOperation::Leave, "Two", PartyResult::Ok),
                ServerEvent::Roster(RosterUpdate::empty())
            ]
        );
        assert!(h.service.registry().group_of(leader).await.is_some());

        h.send(leader, ClientCommand::Disband).await;
        let events = h.drain();
        for who in [leader, members[0]] {
            let received = Harness::events_for(&events, who);
            assert!(received.contains(&ServerEvent::GroupDestroyed));
        }
        assert_eq!(h.service.registry().group_count(), 0);
    }

    #[tokio::test]
    async fn test_disband_in_battleground_restricted() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        h.group_up(leader, &["One"]).await;
        h.directory.update_profile(leader, |p| p.in_battleground = true);

        h.send(leader, ClientCommand::Disband).await;
        assert_eq!(
            Harness::events_for(&h.drain(), leader),
            vec![result(PartyOperation::Invite, "", PartyResult::InviteRestricted)]
        );
        assert!(h.service.registry().group_of(leader).await.is_some());
    }

    #[tokio::test]
    async fn test_set_leader_requires_online_member() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;

        h.directory.logout(members[1]);
        h.send(leader, ClientCommand::SetLeader { target: members[1] }).await;
        h.send(members[0], ClientCommand::SetLeader { target: members[0] }).await;
        assert_eq!(h.service.registry().group_of(leader).await.unwrap().leader(), leader);

        h.send(leader, ClientCommand::SetLeader { target: members[0] }).await;
        assert_eq!(h.service.registry().group_of(leader).await.unwrap().leader(), members[0]);
        assert!(h.drain().iter().any(|(_, e)| matches!(e, ServerEvent::Roster(r) if r.leader == members[0])));
    }

    #[tokio::test]
    async fn test_roles_broadcast() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One"]).await;

        h.send(
            members[0],
            ClientCommand::SetRoles {
                target: members[0],
                roles: Roles::TANK,
            },
        )
        .await;
        let events = h.drain();
        assert!(Harness::events_for(&events, leader).contains(&ServerEvent::RoleChanged {
            assigner: members[0],
            target: members[0],
            old_roles: Roles::empty(),
            new_roles: Roles::TANK,
        }));
    }

    #[tokio::test]
    async fn test_loot_method_leader_only() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One"]).await;
        let set = |method| ClientCommand::SetLootMethod {
            method,
            master: leader,
            threshold: ItemQuality::Rare,
        };

        h.send(members[0], set(LootMethod::FreeForAll)).await;
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert_eq!(group.loot().method, LootMethod::GroupLoot);
        assert!(h.drain().is_empty());

        h.send(leader, set(LootMethod::MasterLoot)).await;
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert_eq!(group.loot().method, LootMethod::MasterLoot);
        assert_eq!(group.loot().threshold, ItemQuality::Rare);
    }

    #[tokio::test]
    async fn test_loot_votes_reach_resolver() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;
        let id = h.service.registry().affiliation(leader).unwrap().group;
        let item = ObjectGuid(0xF110_0000_0000_0077);

        h.send(members[1], ClientCommand::OptOutOfLoot { always_pass: true }).await;
        h.service.start_loot_roll(id, item).await.unwrap();

        let vote = |vote| ClientCommand::LootRoll { item, slot: 0, vote };
        h.send(leader, vote(RollVote::Need)).await;
        h.send(leader, vote(RollVote::Greed)).await;
        assert!(h.resolver.resolved().is_empty());
        h.send(members[0], vote(RollVote::Greed)).await;

        assert_eq!(
            h.resolver.votes(),
            vec![(item, leader, RollVote::Need), (item, members[0], RollVote::Greed)]
        );
        let resolved = h.resolver.resolved();
        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved[0].votes,
            vec![
                (leader, RollVote::Need),
                (members[0], RollVote::Greed),
                (members[1], RollVote::Pass)
            ]
        );
        h.drain();
    }

    #[tokio::test]
    async fn test_ready_check_flow() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two", "Three"]).await;
        h.directory.logout(members[2]);
        h.service.session_closed(members[2]).await;
        let group_guid = h.service.registry().group_of(leader).await.unwrap().guid();
        h.drain();

        h.send(members[0], ClientCommand::StartReadyCheck).await;
        assert!(h.drain().is_empty());

        h.send(leader, ClientCommand::StartReadyCheck).await;
        let events = Harness::events_for(&h.drain(), members[0]);
        assert_eq!(
            events,
            vec![
                ServerEvent::ReadyCheckStarted {
                    group: group_guid,
                    initiator: leader,
                    duration_ms: 35_000
                },
                ServerEvent::ReadyCheckConfirmed {
                    group: group_guid,
                    member: members[2],
                    ready: false
                },
            ]
        );
        assert!(h.service.countdown(leader).is_some());

        let confirm = |ready| ClientCommand::ConfirmReadyCheck {
            group: group_guid,
            ready,
        };
        h.send(members[0], confirm(true)).await;
        h.send(members[0], confirm(false)).await;
        let events = h.drain();
        assert_eq!(events.iter().filter(|(_, e)| matches!(e, ServerEvent::ReadyCheckConfirmed { .. })).count(), 3);
        assert!(!events.iter().any(|(_, e)| matches!(e, ServerEvent::ReadyCheckCompleted { .. })));

        h.send(members[1], confirm(false)).await;
        let events = h.drain();
        assert!(events.contains(&(leader, ServerEvent::ReadyCheckCompleted { group: group_guid })));
        assert!(h.service.countdown(leader).is_none());
    }

    #[tokio::test]
    async fn test_ready_check_timeout() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        h.group_up(leader, &["One"]).await;
        let group_guid = h.service.registry().group_of(leader).await.unwrap().guid();

        h.send(leader, ClientCommand::StartReadyCheck).await;
        let deadline = h.service.countdown(leader).unwrap().deadline;
        h.drain();

        h.service.expire_ready_checks(deadline - Duration::from_secs(1)).await;
        assert!(h.drain().is_empty());
        h.service.expire_ready_checks(deadline).await;
        let events = h.drain();
        assert!(events.contains(&(leader, ServerEvent::ReadyCheckCompleted { group: group_guid })));
        assert!(h.service.countdown(leader).is_none());
    }

    #[tokio::test]
    async fn test_member_stats_online_and_offline() {
        let mut h = Harness::new();
        let asker = h.login("Asker");
        let online = h.login("Online");
        let offline = h.login("Offline");
        h.directory.logout(offline);

        h.send(asker, ClientCommand::RequestMemberStats { target: online }).await;
        h.send(asker, ClientCommand::RequestMemberStats { target: offline }).await;
        let events = Harness::events_for(&h.drain(), asker);
        match &events[..] {
            [ServerEvent::MemberStats(first), ServerEvent::MemberStats(second)] => {
                assert!(first.is_online());
                assert_eq!(first.guid, online);
                assert_eq!(second, &MemberStats::offline(offline));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_changed_stats_reach_rest_of_group() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;
        let outsider = h.login("Outsider");
        h.directory.set_stats(
            members[0],
            MemberStats {
                guid: members[0],
                status: MemberStatus::ONLINE,
                health: 900,
                max_health: 1000,
                level: 20,
                ..MemberStats::default()
            },
        );

        h.service.member_stats_changed(members[0], GroupUpdateFlags::CUR_HP).await;
        let events = h.drain();
        let expected = ServerEvent::MemberStatsChanged(MemberStatsUpdate {
            mask: GroupUpdateFlags::CUR_HP,
            stats: MemberStats {
                health: 900,
                ..MemberStats::offline(members[0])
            },
        });
        assert_eq!(Harness::events_for(&events, leader), vec![expected.clone()]);
        assert_eq!(Harness::events_for(&events, members[1]), vec![expected]);
        assert!(Harness::events_for(&events, members[0]).is_empty());

        h.service.member_stats_changed(outsider, GroupUpdateFlags::CUR_HP).await;
        h.service.member_stats_changed(members[0], GroupUpdateFlags::empty()).await;
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_target_icons_and_list() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One"]).await;
        let mob = ObjectGuid(0xF130_0000_0000_1234);

        let set = |icon| ClientCommand::TargetIcon(TargetIconRequest::Set { icon, target: mob });
        h.send(leader, set(1)).await;
        h.send(leader, set(4)).await;
        let events = Harness::events_for(&h.drain(), members[0]);
        assert_eq!(
            events,
            vec![
                ServerEvent::TargetIconSet {
                    setter: leader,
                    icon: 1,
                    target: mob
                },
                ServerEvent::TargetIconSet {
                    setter: leader,
                    icon: 1,
                    target: ObjectGuid::EMPTY
                },
                ServerEvent::TargetIconSet {
                    setter: leader,
                    icon: 4,
                    target: mob
                },
            ]
        );

        h.send(members[0], ClientCommand::TargetIcon(TargetIconRequest::List)).await;
        assert_eq!(
            Harness::events_for(&h.drain(), members[0]),
            vec![ServerEvent::TargetIconList { icons: vec![(4, mob)] }]
        );
    }

    #[tokio::test]
    async fn test_plain_party_member_cannot_set_target_icon() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;
        let mob = ObjectGuid(0xF130_0000_0000_0042);

        h.send(members[0], ClientCommand::TargetIcon(TargetIconRequest::Set { icon: 4, target: mob }))
            .await;
        assert!(h.drain().is_empty());

        h.send(leader, ClientCommand::SetAssistant { target: members[0], apply: true })
            .await;
        h.drain();
        h.send(members[0], ClientCommand::TargetIcon(TargetIconRequest::Set { icon: 4, target: mob }))
            .await;
        let events = Harness::events_for(&h.drain(), members[1]);
        assert_eq!(
            events,
            vec![ServerEvent::TargetIconSet {
                setter: members[0],
                icon: 4,
                target: mob
            }]
        );
    }

    #[tokio::test]
    async fn test_raid_only_commands() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;

        h.send(leader, ClientCommand::SetEveryoneAssistant { apply: true }).await;
        assert!(h.drain().is_empty());

        h.send(leader, ClientCommand::RaidConvert { to_raid: true }).await;
        let events = Harness::events_for(&h.drain(), leader);
        assert_eq!(events[0], result(PartyOperation::Invite, "", PartyResult::Ok));
        assert!(h.service.registry().group_of(leader).await.unwrap().is_raid());

        h.send(
            leader,
            ClientCommand::ChangeSubGroup {
                name: "two".to_string(),
                sub_group: 3,
            },
        )
        .await;
        h.send(leader, ClientCommand::SetEveryoneAssistant { apply: true }).await;
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert_eq!(group.member(members[1]).unwrap().sub_group, 3);
        assert!(group.is_assistant(members[0]));

        h.send(
            members[0],
            ClientCommand::SetAssignment {
                assignment: Assignment::MainTank,
                target: members[1],
                apply: true,
            },
        )
        .await;
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert_eq!(group.holder(Assignment::MainTank), Some(members[1]));
    }

    #[tokio::test]
    async fn test_withdrawing_assignment_clears_current_holder() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;
        let assign = |target, apply| ClientCommand::SetAssignment {
            assignment: Assignment::MainAssist,
            target,
            apply,
        };

        h.send(leader, assign(members[1], true)).await;
        h.drain();

        h.send(leader, assign(members[0], false)).await;
        assert!(!h.drain().is_empty());
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert_eq!(group.holder(Assignment::MainAssist), None);

        h.send(leader, assign(members[0], false)).await;
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn test_world_markers() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One"]).await;
        let marker = WorldMarker {
            map_id: 0,
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };

        h.service.place_world_marker(leader, 2, marker).await.unwrap();
        h.service.place_world_marker(leader, 4, marker).await.unwrap();
        h.send(members[0], ClientCommand::ClearWorldMarker { slot: 2 }).await;
        h.send(members[0], ClientCommand::ClearWorldMarker { slot: 5 }).await;

        let masks: Vec<u32> = Harness::events_for(&h.drain(), members[0])
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::MarkersChanged { mask } => Some(mask),
                _ => None,
            })
            .collect();
        assert_eq!(masks, vec![0b00100, 0b10100, 0b10000, 0]);
    }

    #[tokio::test]
    async fn test_ping_and_roll() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One"]).await;
        let solo = h.login("Solo");

        h.send(leader, ClientCommand::MinimapPing { x: 10.5, y: -3.0 }).await;
        let events = h.drain();
        assert!(Harness::events_for(&events, leader).is_empty());
        match &Harness::events_for(&events, members[0])[..] {
            [ServerEvent::MinimapPing { sender, x, y }] => {
                assert_eq!(*sender, leader);
                assert_approx_eq::assert_approx_eq!(*x, 10.5);
                assert_approx_eq::assert_approx_eq!(*y, -3.0);
            }
            other => panic!("unexpected events {:?}", other),
        }

        h.send(solo, ClientCommand::RandomRoll { min: 1, max: 100 }).await;
        h.send(solo, ClientCommand::RandomRoll { min: 5, max: 1 }).await;
        h.send(solo, ClientCommand::RandomRoll { min: 1, max: 10_001 }).await;
        match &Harness::events_for(&h.drain(), solo)[..] {
            [ServerEvent::RandomRoll { roller, min, max, roll }] => {
                assert_eq!((*roller, *min, *max), (solo, 1, 100));
                assert!((1..=100).contains(roll));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_close_cleans_up() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let members = h.group_up(leader, &["One", "Two"]).await;
        let pending = h.login("Pending");
        h.invite(leader, "Pending").await;

        h.service.session_closed(pending).await;
        assert!(!h.service.registry().is_affiliated(pending));

        h.service.session_closed(members[0]).await;
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert!(!group.member(members[0]).unwrap().online);
        h.drain();

        h.service.session_opened(members[0]).await;
        let events = h.drain();
        assert!(events.iter().any(|(to, _)| *to == members[0]));
        let group = h.service.registry().group_of(leader).await.unwrap();
        assert!(group.member(members[0]).unwrap().online);

        let lonely = h.login("Lonely");
        let invitee = h.login("Invitee");
        h.invite(lonely, "Invitee").await;
        h.service.session_closed(lonely).await;
        assert!(!h.service.registry().is_affiliated(invitee));
    }

    #[tokio::test]
    async fn test_malformed_packet_dropped() {
        let mut h = Harness::new();
        let leader = h.login("Leader");
        let mut packet = ClientCommand::SetLeader { target: leader }.encode().unwrap();
        packet.payload.push(0xAA);
        h.service.handle(leader, &packet).await;

        let unknown = WorldPacket {
            opcode: 0x7FFF,
            payload: Vec::new(),
        };
        h.service.handle(leader, &unknown).await;
        assert!(h.drain().is_empty());
    }
}
