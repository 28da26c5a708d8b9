use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Choice, ChoiceId, Poll, PollId};
use super::repository::{PollRepository, RepositoryError};

/// Vote count for one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTally {
    pub id: ChoiceId,
    pub choice_text: String,
    pub votes_count: u64,
}

/// Poll fields with per-choice vote counts. Also the detail/list representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    pub id: PollId,
    pub question: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub choices: Vec<ChoiceTally>,
}

impl PollResults {
    pub fn total_votes(&self) -> u64 {
        self.choices.iter().map(|choice| choice.votes_count).sum()
    }

    pub fn count_for(&self, choice_text: &str) -> Option<u64> {
        self.choices
            .iter()
            .find(|choice| choice.choice_text == choice_text)
            .map(|choice| choice.votes_count)
    }
}

/// Read the poll's choices and vote counts as they stand right now.
pub fn tally<R>(repository: &R, poll: Poll) -> Result<PollResults, RepositoryError>
where
    R: PollRepository + ?Sized,
{
    let choices = repository
        .choice_tallies(poll.id)?
        .into_iter()
        .map(|(Choice { id, choice_text, .. }, votes_count)| ChoiceTally {
            id,
            choice_text,
            votes_count,
        })
        .collect();

    Ok(PollResults {
        id: poll.id,
        question: poll.question,
        pub_date: poll.pub_date,
        end_date: poll.end_date,
        choices,
    })
}
