use shared::PartyResult;
use thiserror::Error;

/// Validation failures of group operations.
///
/// Every operation checks its preconditions before touching state, so an
/// error always means nothing changed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GroupError {
    #[error("player already belongs to or is invited to a group")]
    AlreadyGrouped,
    #[error("group is full")]
    Full,
    #[error("player is neither leader nor assistant")]
    NotAuthorized,
    #[error("group leader is no longer reachable")]
    LeaderUnavailable,
    #[error("player is not the group leader")]
    NotLeader,
    #[error("target is not a member of the group")]
    NotMember,
    #[error("sub-group has no free slot")]
    NoFreeSlot,
    #[error("sub-group index out of range")]
    InvalidSubGroup,
    #[error("player has no pending invite")]
    NoPendingInvite,
    #[error("player is not in a group")]
    NotInGroup,
    #[error("target is neither a member nor an invitee of the group")]
    TargetNotInGroup,
    #[error("player cannot target themselves")]
    SelfTarget,
    #[error("a ready check is already in progress")]
    ReadyCheckInProgress,
    #[error("no ready check is in progress")]
    NoReadyCheck,
    #[error("invalid target icon or marker slot")]
    InvalidSlot,
    #[error("a roll for this item is already open")]
    RollInProgress,
    #[error("no roll is open for this item")]
    NoRoll,
    #[error("group is not a raid")]
    NotRaid,
    #[error("group has too few members")]
    TooSmall,
}

impl GroupError {
    /// Result code reported to the requester, if the error is user-visible.
    pub fn party_result(self) -> Option<PartyResult> {
        match self {
            GroupError::AlreadyGrouped => Some(PartyResult::AlreadyGrouped),
            GroupError::Full => Some(PartyResult::GroupFull),
            GroupError::NotAuthorized | GroupError::NotLeader => Some(PartyResult::NotLeader),
            GroupError::NotInGroup => Some(PartyResult::NotInGroup),
            GroupError::TargetNotInGroup => Some(PartyResult::TargetNotInGroup),
            _ => None,
        }
    }
}
