//! Ready-check state of a single group.

use crate::error::GroupError;
use shared::ObjectGuid;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Whether a check is still waiting on anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCheckSession {
    initiator: ObjectGuid,
    started: Instant,
    duration: Duration,
    outstanding: BTreeSet<ObjectGuid>,
    responses: BTreeMap<ObjectGuid, bool>,
}

impl ReadyCheckSession {
    pub fn initiator(&self) -> ObjectGuid {
        self.initiator
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.duration
    }

    pub fn is_outstanding(&self, member: ObjectGuid) -> bool {
        self.outstanding.contains(&member)
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    pub fn response(&self, member: ObjectGuid) -> Option<bool> {
        self.responses.get(&member).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ReadyCheck {
    #[default]
    Idle,
    InProgress(ReadyCheckSession),
}

impl ReadyCheck {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, ReadyCheck::InProgress(_))
    }

    pub fn session(&self) -> Option<&ReadyCheckSession> {
        match self {
            ReadyCheck::InProgress(session) => Some(session),
            ReadyCheck::Idle => None,
        }
    }

    /// Opens a check over the members online right now. The initiator counts
    /// as having answered ready; everyone else online must respond.
    pub fn start(
        &mut self,
        initiator: ObjectGuid,
        online: impl IntoIterator<Item = ObjectGuid>,
        now: Instant,
        duration: Duration,
    ) -> Result<Progress, GroupError> {
        if self.is_in_progress() {
            return Err(GroupError::ReadyCheckInProgress);
        }

        let outstanding: BTreeSet<ObjectGuid> =
            online.into_iter().filter(|guid| *guid != initiator).collect();
        if outstanding.is_empty() {
            return Ok(Progress::Completed);
        }

        let mut responses = BTreeMap::new();
        responses.insert(initiator, true);
        *self = ReadyCheck::InProgress(ReadyCheckSession {
            initiator,
            started: now,
            duration,
            outstanding,
            responses,
        });
        Ok(Progress::Pending)
    }

    /// Records an answer. `None` when the answer does not count: no check
    /// running, member not polled, or member already answered.
    pub fn respond(&mut self, member: ObjectGuid, ready: bool) -> Option<Progress> {
        let ReadyCheck::InProgress(session) = self else {
            return None;
        };
        if !session.outstanding.remove(&member) {
            return None;
        }
        session.responses.insert(member, ready);
        Some(self.settle())
    }

    /// Drops a member who left the group from the outstanding set.
    pub fn forget(&mut self, member: ObjectGuid) -> Option<Progress> {
        let ReadyCheck::InProgress(session) = self else {
            return None;
        };
        if !session.outstanding.remove(&member) {
            return None;
        }
        Some(self.settle())
    }

    /// Ends the check started by `initiator` if its deadline has passed.
    pub fn expire(&mut self, initiator: ObjectGuid, now: Instant) -> bool {
        let expired = matches!(
            self,
            ReadyCheck::InProgress(session)
                if session.initiator == initiator && now >= session.deadline()
        );
        if expired {
            *self = ReadyCheck::Idle;
        }
        expired
    }

    fn settle(&mut self) -> Progress {
        let done = match self {
            ReadyCheck::InProgress(session) => session.outstanding.is_empty(),
            ReadyCheck::Idle => true,
        };
        if done {
            *self = ReadyCheck::Idle;
            Progress::Completed
        } else {
            Progress::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEADER: ObjectGuid = ObjectGuid(1);
    const A: ObjectGuid = ObjectGuid(2);
    const B: ObjectGuid = ObjectGuid(3);
    const C: ObjectGuid = ObjectGuid(4);

    fn started(now: Instant) -> ReadyCheck {
        let mut check = ReadyCheck::default();
        let progress = check
            .start(LEADER, [LEADER, A, B, C], now, Duration::from_secs(35))
            .unwrap();
        assert_eq!(progress, Progress::Pending);
        check
    }

    #[test]
    fn test_initiator_counts_as_ready() {
        let check = started(Instant::now());
        let session = check.session().unwrap();
        assert_eq!(session.response(LEADER), Some(true));
        assert!(!session.is_outstanding(LEADER));
        assert_eq!(session.outstanding_count(), 3);
    }

    #[test]
    fn test_completes_on_last_distinct_response() {
        let mut check = started(Instant::now());

        assert_eq!(check.respond(A, true), Some(Progress::Pending));
        assert_eq!(check.respond(A, false), None);
        assert_eq!(check.respond(B, false), Some(Progress::Pending));
        assert!(check.is_in_progress());
        assert_eq!(check.respond(C, true), Some(Progress::Completed));
        assert!(!check.is_in_progress());
    }

    #[test]
    fn test_second_start_rejected_without_reset() {
        let now = Instant::now();
        let mut check = started(now);
        check.respond(A, true);

        let later = now + Duration::from_secs(10);
        assert_eq!(
            check.start(B, [LEADER, A, B, C], later, Duration::from_secs(35)),
            Err(GroupError::ReadyCheckInProgress)
        );

        let session = check.session().unwrap();
        assert_eq!(session.initiator(), LEADER);
        assert_eq!(session.response(A), Some(true));
        assert_eq!(session.deadline(), now + Duration::from_secs(35));
    }

    #[test]
    fn test_solo_check_completes_immediately() {
        let mut check = ReadyCheck::default();
        let progress = check
            .start(LEADER, [LEADER], Instant::now(), Duration::from_secs(35))
            .unwrap();
        assert_eq!(progress, Progress::Completed);
        assert!(!check.is_in_progress());
    }

    #[test]
    fn test_unpolled_member_ignored() {
        let mut check = started(Instant::now());
        assert_eq!(check.respond(ObjectGuid(99), true), None);
        assert_eq!(check.respond(LEADER, false), None);
    }

    #[test]
    fn test_leaving_member_unblocks_completion() {
        let mut check = started(Instant::now());
        check.respond(A, true);
        check.respond(B, true);
        assert_eq!(check.forget(C), Some(Progress::Completed));
        assert!(!check.is_in_progress());
    }

    #[test]
    fn test_expire_after_deadline() {
        let now = Instant::now();
        let mut check = started(now);

        assert!(!check.expire(LEADER, now + Duration::from_secs(34)));
        assert!(!check.expire(A, now + Duration::from_secs(36)));
        assert!(check.expire(LEADER, now + Duration::from_secs(35)));
        assert!(!check.is_in_progress());
    }
}
