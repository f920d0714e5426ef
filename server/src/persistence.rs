//! Durable-storage hooks fired as side effects of membership changes.

use log::debug;
use shared::ObjectGuid;
use std::sync::Mutex;

pub trait GroupPersistence: Send + Sync {
    fn group_created(&self, group: ObjectGuid, leader: ObjectGuid);
    fn member_added(&self, group: ObjectGuid, member: ObjectGuid, sub_group: u8);
    fn member_removed(&self, group: ObjectGuid, member: ObjectGuid);
    fn leader_changed(&self, group: ObjectGuid, leader: ObjectGuid);
    fn subgroup_changed(&self, group: ObjectGuid, member: ObjectGuid, sub_group: u8);
    fn group_deleted(&self, group: ObjectGuid);
}

/// Writes every hook to the debug log and stores nothing.
#[derive(Debug, Default)]
pub struct LogPersistence;

impl GroupPersistence for LogPersistence {
    fn group_created(&self, group: ObjectGuid, leader: ObjectGuid) {
        debug!("persist: group {} created, leader {}", group, leader);
    }

    fn member_added(&self, group: ObjectGuid, member: ObjectGuid, sub_group: u8) {
        debug!("persist: {} joined {} in sub-group {}", member, group, sub_group);
    }

    fn member_removed(&self, group: ObjectGuid, member: ObjectGuid) {
        debug!("persist: {} left {}", member, group);
    }

    fn leader_changed(&self, group: ObjectGuid, leader: ObjectGuid) {
        debug!("persist: {} now led by {}", group, leader);
    }

    fn subgroup_changed(&self, group: ObjectGuid, member: ObjectGuid, sub_group: u8) {
        debug!("persist: {} moved to sub-group {} in {}", member, sub_group, group);
    }

    fn group_deleted(&self, group: ObjectGuid) {
        debug!("persist: group {} deleted", group);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceEvent {
    GroupCreated { group: ObjectGuid, leader: ObjectGuid },
    MemberAdded { group: ObjectGuid, member: ObjectGuid, sub_group: u8 },
    MemberRemoved { group: ObjectGuid, member: ObjectGuid },
    LeaderChanged { group: ObjectGuid, leader: ObjectGuid },
    SubgroupChanged { group: ObjectGuid, member: ObjectGuid, sub_group: u8 },
    GroupDeleted { group: ObjectGuid },
}

/// Keeps every hook in order so tests can assert on them.
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    events: Mutex<Vec<PersistenceEvent>>,
}

impl RecordingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PersistenceEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn record(&self, event: PersistenceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl GroupPersistence for RecordingPersistence {
    fn group_created(&self, group: ObjectGuid, leader: ObjectGuid) {
        self.record(PersistenceEvent::GroupCreated { group, leader });
    }

    fn member_added(&self, group: ObjectGuid, member: ObjectGuid, sub_group: u8) {
        self.record(PersistenceEvent::MemberAdded {
            group,
            member,
            sub_group,
        });
    }

    fn member_removed(&self, group: ObjectGuid, member: ObjectGuid) {
        self.record(PersistenceEvent::MemberRemoved { group, member });
    }

    fn leader_changed(&self, group: ObjectGuid, leader: ObjectGuid) {
        self.record(PersistenceEvent::LeaderChanged { group, leader });
    }

    fn subgroup_changed(&self, group: ObjectGuid, member: ObjectGuid, sub_group: u8) {
        self.record(PersistenceEvent::SubgroupChanged {
            group,
            member,
            sub_group,
        });
    }

    fn group_deleted(&self, group: ObjectGuid) {
        self.record(PersistenceEvent::GroupDeleted { group });
    }
}
