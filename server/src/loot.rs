//! Loot settings and per-item vote collection.
//!
//! Who wins an item is decided elsewhere; this module only guarantees one
//! attributable vote per eligible member per item and hands the complete
//! vote set to a [`LootResolver`].

use crate::error::GroupError;
use log::info;
use shared::{ItemQuality, LootMethod, ObjectGuid, RollVote};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LootSettings {
    pub method: LootMethod,
    pub looter: ObjectGuid,
    pub threshold: ItemQuality,
}

impl LootSettings {
    pub fn new(looter: ObjectGuid) -> Self {
        Self {
            method: LootMethod::default(),
            looter,
            threshold: ItemQuality::default(),
        }
    }
}

/// Every vote cast on one item, in voter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRoll {
    pub item: ObjectGuid,
    pub votes: Vec<(ObjectGuid, RollVote)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No roll open for the item, or the voter is not eligible.
    NotEligible,
    /// The voter already voted; the first vote stands.
    AlreadyVoted,
    Recorded,
    Completed(CompletedRoll),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RollSession {
    votes: BTreeMap<ObjectGuid, Option<RollVote>>,
}

impl RollSession {
    fn is_complete(&self) -> bool {
        self.votes.values().all(Option::is_some)
    }

    fn finish(self, item: ObjectGuid) -> CompletedRoll {
        let votes = self
            .votes
            .into_iter()
            .filter_map(|(voter, vote)| vote.map(|vote| (voter, vote)))
            .collect();
        CompletedRoll { item, votes }
    }
}

/// Open rolls of one group, keyed by item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LootRolls {
    sessions: HashMap<ObjectGuid, RollSession>,
}

impl LootRolls {
    pub fn is_open(&self, item: ObjectGuid) -> bool {
        self.sessions.contains_key(&item)
    }

    pub fn open_count(&self) -> usize {
        self.sessions.len()
    }

    /// `None` when the voter is not eligible; `Some(None)` while undecided.
    pub fn vote_of(&self, item: ObjectGuid, voter: ObjectGuid) -> Option<Option<RollVote>> {
        self.sessions.get(&item)?.votes.get(&voter).copied()
    }

    /// Opens a roll. Members for whom `auto_pass` holds are recorded as
    /// passing straight away, which can complete the roll on the spot.
    pub fn start(
        &mut self,
        item: ObjectGuid,
        eligible: impl IntoIterator<Item = ObjectGuid>,
        auto_pass: impl Fn(ObjectGuid) -> bool,
    ) -> Result<Option<CompletedRoll>, GroupError> {
        if self.is_open(item) {
            return Err(GroupError::RollInProgress);
        }

        let votes = eligible
            .into_iter()
            .map(|voter| (voter, auto_pass(voter).then_some(RollVote::Pass)))
            .collect();
        let session = RollSession { votes };

        if session.is_complete() {
            return Ok(Some(session.finish(item)));
        }
        self.sessions.insert(item, session);
        Ok(None)
    }

    pub fn cast(&mut self, item: ObjectGuid, voter: ObjectGuid, vote: RollVote) -> VoteOutcome {
        let complete = {
            let Some(session) = self.sessions.get_mut(&item) else {
                return VoteOutcome::NotEligible;
            };
            match session.votes.get_mut(&voter) {
                None => return VoteOutcome::NotEligible,
                Some(Some(_)) => return VoteOutcome::AlreadyVoted,
                Some(slot) => *slot = Some(vote),
            }
            session.is_complete()
        };
        if !complete {
            return VoteOutcome::Recorded;
        }
        match self.sessions.remove(&item) {
            Some(session) => VoteOutcome::Completed(session.finish(item)),
            None => VoteOutcome::Recorded,
        }
    }

    /// Removes a departed member from every open roll and returns the rolls
    /// that were only waiting on them.
    pub fn forget(&mut self, voter: ObjectGuid) -> Vec<CompletedRoll> {
        let mut finished = Vec::new();
        for session in self.sessions.values_mut() {
            session.votes.remove(&voter);
        }
        let done: Vec<ObjectGuid> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_complete())
            .map(|(item, _)| *item)
            .collect();
        for item in done {
            if let Some(session) = self.sessions.remove(&item) {
                finished.push(session.finish(item));
            }
        }
        finished
    }
}

/// Receives votes for auditing and the complete vote set for resolution.
pub trait LootResolver: Send + Sync {
    fn on_vote(&self, group: ObjectGuid, item: ObjectGuid, voter: ObjectGuid, vote: RollVote);
    fn resolve(&self, group: ObjectGuid, roll: CompletedRoll);
}

#[derive(Debug, Default)]
pub struct LogResolver;

impl LootResolver for LogResolver {
    fn on_vote(&self, group: ObjectGuid, item: ObjectGuid, voter: ObjectGuid, vote: RollVote) {
        info!("{} voted {:?} on {} in {}", voter, vote, item, group);
    }

    fn resolve(&self, group: ObjectGuid, roll: CompletedRoll) {
        info!("Roll on {} in {} closed with {} votes", roll.item, group, roll.votes.len());
    }
}

/// Keeps everything it is told, for tests.
#[derive(Debug, Default)]
pub struct RecordingResolver {
    votes: Mutex<Vec<(ObjectGuid, ObjectGuid, RollVote)>>,
    resolved: Mutex<Vec<CompletedRoll>>,
}

impl RecordingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// (item, voter, vote) in arrival order.
    pub fn votes(&self) -> Vec<(ObjectGuid, ObjectGuid, RollVote)> {
        self.votes.lock().map(|votes| votes.clone()).unwrap_or_default()
    }

    pub fn resolved(&self) -> Vec<CompletedRoll> {
        self.resolved.lock().map(|rolls| rolls.clone()).unwrap_or_default()
    }
}

impl LootResolver for RecordingResolver {
    fn on_vote(&self, _group: ObjectGuid, item: ObjectGuid, voter: ObjectGuid, vote: RollVote) {
        if let Ok(mut votes) = self.votes.lock() {
            votes.push((item, voter, vote));
        }
    }

    fn resolve(&self, _group: ObjectGuid, roll: CompletedRoll) {
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.push(roll);
        }
    }
}
