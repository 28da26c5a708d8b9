//! Decides whether a user may record a vote on a poll.
//!
//! The lookup here is an early-rejection path that produces a clean domain
//! error. The repository's (user, poll) uniqueness constraint remains the
//! authority when two admissions for the same pair race.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::UserId;

use super::domain::{Choice, ChoiceId, NewVote, PollId, Vote};
use super::repository::{PollRepository, RepositoryError};

/// Rejections produced while admitting a vote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Not found.")]
    PollNotFound(PollId),
    #[error("Invalid choice ID")]
    InvalidChoice,
    #[error("This poll is closed.")]
    PollClosed(PollId),
    #[error("You have already voted in this poll.")]
    AlreadyVoted,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Vote-admission check bound to a repository.
pub struct VoteAdmission<'a, R: ?Sized> {
    repository: &'a R,
}

impl<'a, R> VoteAdmission<'a, R>
where
    R: PollRepository + ?Sized,
{
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    /// Validate `choice_id` against `poll_id` and record the vote for `voter`.
    pub fn admit(
        &self,
        voter: UserId,
        poll_id: PollId,
        choice_id: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<Vote, AdmissionError> {
        let poll = self
            .repository
            .fetch_poll(poll_id)?
            .ok_or(AdmissionError::PollNotFound(poll_id))?;

        let choice = self.resolve_choice(poll.id, choice_id)?;

        if !poll.is_open_at(now) {
            debug!(poll_id = %poll.id, "vote rejected after poll end date");
            return Err(AdmissionError::PollClosed(poll.id));
        }

        if self.repository.find_vote(voter, poll.id)?.is_some() {
            return Err(AdmissionError::AlreadyVoted);
        }

        let ballot = NewVote {
            user: voter,
            choice: choice.id,
            poll: poll.id,
        };
        match self.repository.insert_vote(ballot) {
            Ok(vote) => Ok(vote),
            Err(RepositoryError::Conflict) => {
                warn!(poll_id = %poll.id, user_id = %voter, "concurrent duplicate vote rejected by store");
                Err(AdmissionError::AlreadyVoted)
            }
            Err(RepositoryError::NotFound) | Err(RepositoryError::Integrity(_)) => {
                Err(AdmissionError::InvalidChoice)
            }
            Err(other) => Err(other.into()),
        }
    }

    fn resolve_choice(
        &self,
        poll_id: PollId,
        raw: Option<&Value>,
    ) -> Result<Choice, AdmissionError> {
        let Some(choice_id) = raw.and_then(parse_choice_id) else {
            return Err(AdmissionError::InvalidChoice);
        };

        match self.repository.fetch_choice(choice_id)? {
            Some(choice) if choice.poll == poll_id => Ok(choice),
            _ => Err(AdmissionError::InvalidChoice),
        }
    }
}

/// Accept a JSON integer or a string holding one, as HTML forms submit ids as text.
pub fn parse_choice_id(raw: &Value) -> Option<ChoiceId> {
    match raw {
        Value::Number(number) => number.as_u64().map(ChoiceId),
        Value::String(text) => text.trim().parse::<u64>().ok().map(ChoiceId),
        _ => None,
    }
}
