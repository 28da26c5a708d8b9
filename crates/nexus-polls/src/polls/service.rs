use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::auth::UserId;
use crate::validation::ValidationFailure;

use super::admission::{AdmissionError, VoteAdmission};
use super::domain::{
    Choice, ChoiceId, ChoiceSubmission, ChoiceUpdate, ChoiceView, NewChoice, NewPoll, PollId,
    PollPatch, PollSubmission, PollUpdate, Vote, VoteRequest,
};
use super::repository::{PollRepository, RepositoryError};
use super::results::{tally, PollResults};

/// Service composing poll/choice CRUD, vote admission, and result aggregation.
pub struct PollService<R> {
    repository: Arc<R>,
}

impl<R> PollService<R>
where
    R: PollRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// All polls, newest first, with their current tallies.
    pub fn list_polls(&self) -> Result<Vec<PollResults>, PollServiceError> {
        self.repository
            .list_polls()?
            .into_iter()
            .map(|poll| tally(self.repository.as_ref(), poll).map_err(PollServiceError::from))
            .collect()
    }

    /// Create a poll together with any nested choices.
    pub fn create_poll(
        &self,
        submission: PollSubmission,
    ) -> Result<PollResults, PollServiceError> {
        let submission = PollSubmission {
            question: submission.question.trim().to_string(),
            end_date: submission.end_date,
            choices: submission
                .choices
                .into_iter()
                .map(|mut choice| {
                    choice.choice_text = choice.choice_text.trim().to_string();
                    choice
                })
                .collect(),
        };

        let mut failure = match submission.validate() {
            Ok(()) => ValidationFailure::default(),
            Err(errors) => ValidationFailure::from(errors),
        };
        for (index, choice) in submission.choices.iter().enumerate() {
            if let Err(errors) = choice.validate() {
                failure.merge_nested(&format!("choices[{index}]"), errors);
            }
        }
        failure.into_result()?;

        let (poll, _) = self.repository.insert_poll(NewPoll {
            question: submission.question,
            end_date: submission.end_date,
            choices: submission
                .choices
                .into_iter()
                .map(|choice| choice.choice_text)
                .collect(),
        })?;

        Ok(tally(self.repository.as_ref(), poll)?)
    }

    /// Poll detail; identical in shape to [`PollService::results`].
    pub fn poll(&self, id: PollId) -> Result<PollResults, PollServiceError> {
        let poll = self
            .repository
            .fetch_poll(id)?
            .ok_or(PollServiceError::PollNotFound(id))?;
        Ok(tally(self.repository.as_ref(), poll)?)
    }

    /// Per-choice vote counts for a poll, read at call time.
    pub fn results(&self, id: PollId) -> Result<PollResults, PollServiceError> {
        self.poll(id)
    }

    pub fn replace_poll(
        &self,
        id: PollId,
        update: PollUpdate,
    ) -> Result<PollResults, PollServiceError> {
        let update = PollUpdate {
            question: update.question.trim().to_string(),
            end_date: update.end_date,
        };
        update.validate().map_err(ValidationFailure::from)?;

        let mut poll = self
            .repository
            .fetch_poll(id)?
            .ok_or(PollServiceError::PollNotFound(id))?;
        poll.question = update.question;
        poll.end_date = update.end_date;

        let poll = self.repository.update_poll(poll)?;
        Ok(tally(self.repository.as_ref(), poll)?)
    }

    pub fn patch_poll(
        &self,
        id: PollId,
        patch: PollPatch,
    ) -> Result<PollResults, PollServiceError> {
        let patch = PollPatch {
            question: present_text("question", patch.question)?.map(Some),
            end_date: patch.end_date,
        };
        patch.validate().map_err(ValidationFailure::from)?;

        let mut poll = self
            .repository
            .fetch_poll(id)?
            .ok_or(PollServiceError::PollNotFound(id))?;
        if let Some(Some(question)) = patch.question {
            poll.question = question;
        }
        if let Some(end_date) = patch.end_date {
            poll.end_date = end_date;
        }

        let poll = self.repository.update_poll(poll)?;
        Ok(tally(self.repository.as_ref(), poll)?)
    }

    /// Remove a poll with its choices and votes.
    pub fn delete_poll(&self, id: PollId) -> Result<(), PollServiceError> {
        match self.repository.delete_poll(id) {
            Err(RepositoryError::NotFound) => Err(PollServiceError::PollNotFound(id)),
            other => Ok(other?),
        }
    }

    /// Record `voter`'s ballot on `poll` if the admission check allows it.
    pub fn cast_vote(
        &self,
        voter: UserId,
        poll: PollId,
        request: &VoteRequest,
    ) -> Result<Vote, PollServiceError> {
        self.cast_vote_at(voter, poll, request, Utc::now())
    }

    pub fn cast_vote_at(
        &self,
        voter: UserId,
        poll: PollId,
        request: &VoteRequest,
        now: DateTime<Utc>,
    ) -> Result<Vote, PollServiceError> {
        let admission = VoteAdmission::new(self.repository.as_ref());
        Ok(admission.admit(voter, poll, request.choice_id.as_ref(), now)?)
    }

    pub fn list_choices(&self, poll: Option<PollId>) -> Result<Vec<ChoiceView>, PollServiceError> {
        self.repository
            .list_choices(poll)?
            .into_iter()
            .map(|choice| self.choice_view(choice))
            .collect()
    }

    pub fn create_choice(
        &self,
        submission: ChoiceSubmission,
    ) -> Result<ChoiceView, PollServiceError> {
        let submission = ChoiceSubmission {
            poll: submission.poll,
            choice_text: submission.choice_text.trim().to_string(),
        };
        submission.validate().map_err(ValidationFailure::from)?;

        if self.repository.fetch_poll(submission.poll)?.is_none() {
            return Err(missing_poll(submission.poll).into());
        }

        // The poll may be deleted between the lookup and the insert.
        let choice = match self.repository.insert_choice(NewChoice {
            poll: submission.poll,
            choice_text: submission.choice_text,
        }) {
            Err(RepositoryError::Integrity(_)) => {
                return Err(missing_poll(submission.poll).into())
            }
            other => other?,
        };
        self.choice_view(choice)
    }

    pub fn choice(&self, id: ChoiceId) -> Result<ChoiceView, PollServiceError> {
        let choice = self
            .repository
            .fetch_choice(id)?
            .ok_or(PollServiceError::ChoiceNotFound(id))?;
        self.choice_view(choice)
    }

    /// Rename a choice. `require_text` distinguishes `PUT` from `PATCH`.
    pub fn update_choice(
        &self,
        id: ChoiceId,
        update: ChoiceUpdate,
        require_text: bool,
    ) -> Result<ChoiceView, PollServiceError> {
        let choice_text = present_text("choice_text", update.choice_text)?;
        if require_text && choice_text.is_none() {
            return Err(ValidationFailure::field("choice_text", "This field is required.").into());
        }
        let update = ChoiceUpdate {
            choice_text: choice_text.map(Some),
        };
        update.validate().map_err(ValidationFailure::from)?;

        let mut choice = self
            .repository
            .fetch_choice(id)?
            .ok_or(PollServiceError::ChoiceNotFound(id))?;
        if let Some(Some(text)) = update.choice_text {
            choice.choice_text = text;
        }

        let choice = self.repository.update_choice(choice)?;
        self.choice_view(choice)
    }

    /// Remove a choice and the votes cast for it.
    pub fn delete_choice(&self, id: ChoiceId) -> Result<(), PollServiceError> {
        match self.repository.delete_choice(id) {
            Err(RepositoryError::NotFound) => Err(PollServiceError::ChoiceNotFound(id)),
            other => Ok(other?),
        }
    }

    fn choice_view(&self, choice: Choice) -> Result<ChoiceView, PollServiceError> {
        let votes_count = self
            .repository
            .vote_counts(choice.poll)?
            .get(&choice.id)
            .copied()
            .unwrap_or(0);
        Ok(ChoiceView {
            id: choice.id,
            poll: choice.poll,
            choice_text: choice.choice_text,
            votes_count,
        })
    }
}

/// Trimmed text of an optional field; an explicit `null` is a field error.
fn present_text(
    field: &str,
    value: Option<Option<String>>,
) -> Result<Option<String>, ValidationFailure> {
    match value {
        None => Ok(None),
        Some(None) => Err(ValidationFailure::field(field, "This field may not be null.")),
        Some(Some(text)) => Ok(Some(text.trim().to_string())),
    }
}

fn missing_poll(poll: PollId) -> ValidationFailure {
    ValidationFailure::field(
        "poll",
        format!("Invalid pk \"{poll}\" - object does not exist."),
    )
}

/// Error raised by the poll service.
#[derive(Debug, thiserror::Error)]
pub enum PollServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("Not found.")]
    PollNotFound(PollId),
    #[error("Not found.")]
    ChoiceNotFound(ChoiceId),
    /// A path segment that is not a record id.
    #[error("Not found.")]
    UnknownId,
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
