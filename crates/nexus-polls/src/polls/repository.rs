use std::collections::BTreeMap;

use crate::auth::UserId;

use super::domain::{Choice, ChoiceId, NewChoice, NewPoll, NewVote, Poll, PollId, Vote};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Implementations own timestamps (`pub_date`, `voted_at`) and identifier
/// allocation, cascade deletes from polls to choices to votes, and must reject
/// a second vote for the same (user, poll) pair with [`RepositoryError::Conflict`]
/// atomically with the insert.
pub trait PollRepository: Send + Sync {
    fn insert_poll(&self, poll: NewPoll) -> Result<(Poll, Vec<Choice>), RepositoryError>;
    /// Replace `question` and `end_date`; `pub_date` is preserved.
    fn update_poll(&self, poll: Poll) -> Result<Poll, RepositoryError>;
    fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError>;
    fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError>;
    /// Newest first.
    fn list_polls(&self) -> Result<Vec<Poll>, RepositoryError>;

    fn insert_choice(&self, choice: NewChoice) -> Result<Choice, RepositoryError>;
    /// Replace `choice_text`; the owning poll is preserved.
    fn update_choice(&self, choice: Choice) -> Result<Choice, RepositoryError>;
    fn delete_choice(&self, id: ChoiceId) -> Result<(), RepositoryError>;
    fn fetch_choice(&self, id: ChoiceId) -> Result<Option<Choice>, RepositoryError>;
    /// Ordered by id, optionally restricted to one poll.
    fn list_choices(&self, poll: Option<PollId>) -> Result<Vec<Choice>, RepositoryError>;

    fn find_vote(&self, user: UserId, poll: PollId) -> Result<Option<Vote>, RepositoryError>;
    fn insert_vote(&self, vote: NewVote) -> Result<Vote, RepositoryError>;
    /// Vote totals per choice of `poll`. Choices without votes may be absent.
    fn vote_counts(&self, poll: PollId) -> Result<BTreeMap<ChoiceId, u64>, RepositoryError>;
    /// Every choice of `poll` in id order with its vote total, read as one snapshot.
    fn choice_tallies(&self, poll: PollId) -> Result<Vec<(Choice, u64)>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
