use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::auth::UserId;

use super::domain::{
    Choice, ChoiceId, NewChoice, NewPoll, NewVote, Poll, PollId, Vote, VoteId,
};
use super::repository::{PollRepository, RepositoryError};

/// In-process persistence for polls, choices, and votes.
///
/// All tables live behind one mutex so the (user, poll) ballot index is
/// checked and written in the same critical section as the vote row.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPollStore {
    state: Arc<Mutex<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    polls: BTreeMap<PollId, Poll>,
    choices: BTreeMap<ChoiceId, Choice>,
    votes: BTreeMap<VoteId, Vote>,
    ballots: HashMap<(UserId, PollId), VoteId>,
    sequences: Sequences,
}

#[derive(Debug, Default)]
struct Sequences {
    poll: u64,
    choice: u64,
    vote: u64,
}

fn next(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

impl StoreState {
    fn remove_votes_where(&mut self, predicate: impl Fn(&Vote) -> bool) {
        let doomed: Vec<VoteId> = self
            .votes
            .values()
            .filter(|vote| predicate(vote))
            .map(|vote| vote.id)
            .collect();
        for id in doomed {
            if let Some(vote) = self.votes.remove(&id) {
                self.ballots.remove(&(vote.user, vote.poll));
            }
        }
    }
}

impl InMemoryPollStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("poll store mutex poisoned".to_string()))
    }

    /// Number of stored votes across all polls.
    pub fn vote_total(&self) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.votes.len())
    }
}

impl PollRepository for InMemoryPollStore {
    fn insert_poll(&self, poll: NewPoll) -> Result<(Poll, Vec<Choice>), RepositoryError> {
        let mut state = self.lock()?;
        let id = PollId(next(&mut state.sequences.poll));
        let record = Poll {
            id,
            question: poll.question,
            pub_date: Utc::now(),
            end_date: poll.end_date,
        };
        state.polls.insert(id, record.clone());

        let mut choices = Vec::with_capacity(poll.choices.len());
        for choice_text in poll.choices {
            let choice = Choice {
                id: ChoiceId(next(&mut state.sequences.choice)),
                poll: id,
                choice_text,
            };
            state.choices.insert(choice.id, choice.clone());
            choices.push(choice);
        }

        Ok((record, choices))
    }

    fn update_poll(&self, poll: Poll) -> Result<Poll, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state
            .polls
            .get_mut(&poll.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.question = poll.question;
        stored.end_date = poll.end_date;
        Ok(stored.clone())
    }

    fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.polls.remove(&id).ok_or(RepositoryError::NotFound)?;
        state.choices.retain(|_, choice| choice.poll != id);
        state.remove_votes_where(|vote| vote.poll == id);
        Ok(())
    }

    fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError> {
        Ok(self.lock()?.polls.get(&id).cloned())
    }

    fn list_polls(&self) -> Result<Vec<Poll>, RepositoryError> {
        let state = self.lock()?;
        let mut polls: Vec<Poll> = state.polls.values().cloned().collect();
        polls.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        Ok(polls)
    }

    fn insert_choice(&self, choice: NewChoice) -> Result<Choice, RepositoryError> {
        let mut state = self.lock()?;
        if !state.polls.contains_key(&choice.poll) {
            return Err(RepositoryError::Integrity(format!(
                "poll {} does not exist",
                choice.poll
            )));
        }
        let record = Choice {
            id: ChoiceId(next(&mut state.sequences.choice)),
            poll: choice.poll,
            choice_text: choice.choice_text,
        };
        state.choices.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_choice(&self, choice: Choice) -> Result<Choice, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state
            .choices
            .get_mut(&choice.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.choice_text = choice.choice_text;
        Ok(stored.clone())
    }

    fn delete_choice(&self, id: ChoiceId) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        state.choices.remove(&id).ok_or(RepositoryError::NotFound)?;
        state.remove_votes_where(|vote| vote.choice == id);
        Ok(())
    }

    fn fetch_choice(&self, id: ChoiceId) -> Result<Option<Choice>, RepositoryError> {
        Ok(self.lock()?.choices.get(&id).cloned())
    }

    fn list_choices(&self, poll: Option<PollId>) -> Result<Vec<Choice>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .choices
            .values()
            .filter(|choice| poll.map_or(true, |poll| choice.poll == poll))
            .cloned()
            .collect())
    }

    fn find_vote(&self, user: UserId, poll: PollId) -> Result<Option<Vote>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .ballots
            .get(&(user, poll))
            .and_then(|id| state.votes.get(id))
            .cloned())
    }

    fn insert_vote(&self, vote: NewVote) -> Result<Vote, RepositoryError> {
        let mut state = self.lock()?;
        let choice = state
            .choices
            .get(&vote.choice)
            .ok_or(RepositoryError::NotFound)?;
        if choice.poll != vote.poll {
            return Err(RepositoryError::Integrity(format!(
                "choice {} does not belong to poll {}",
                vote.choice, vote.poll
            )));
        }
        if state.ballots.contains_key(&(vote.user, vote.poll)) {
            return Err(RepositoryError::Conflict);
        }

        let record = Vote {
            id: VoteId(next(&mut state.sequences.vote)),
            user: vote.user,
            choice: vote.choice,
            poll: vote.poll,
            voted_at: Utc::now(),
        };
        state.ballots.insert((record.user, record.poll), record.id);
        state.votes.insert(record.id, record.clone());
        Ok(record)
    }

    fn vote_counts(&self, poll: PollId) -> Result<BTreeMap<ChoiceId, u64>, RepositoryError> {
        let state = self.lock()?;
        let mut counts = BTreeMap::new();
        for vote in state.votes.values().filter(|vote| vote.poll == poll) {
            *counts.entry(vote.choice).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn choice_tallies(&self, poll: PollId) -> Result<Vec<(Choice, u64)>, RepositoryError> {
        let state = self.lock()?;
        let mut counts: BTreeMap<ChoiceId, u64> = BTreeMap::new();
        for vote in state.votes.values().filter(|vote| vote.poll == poll) {
            *counts.entry(vote.choice).or_insert(0) += 1;
        }
        Ok(state
            .choices
            .values()
            .filter(|choice| choice.poll == poll)
            .map(|choice| {
                let count = counts.get(&choice.id).copied().unwrap_or(0);
                (choice.clone(), count)
            })
            .collect())
    }
}
