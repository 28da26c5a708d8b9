//! Polls, their choices, one-vote-per-user admission, and live result tallies.

pub mod admission;
pub mod domain;
pub mod repository;
pub mod results;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use admission::{parse_choice_id, AdmissionError, VoteAdmission};
pub use domain::{
    Choice, ChoiceDraft, ChoiceId, ChoiceSubmission, ChoiceUpdate, ChoiceView, NewChoice, NewPoll,
    NewVote, Poll, PollId, PollPatch, PollSubmission, PollUpdate, Vote, VoteId, VoteReceipt,
    VoteRequest,
};
pub use repository::{PollRepository, RepositoryError};
pub use results::{tally, ChoiceTally, PollResults};
pub use router::{poll_router, PollApi};
pub use service::{PollService, PollServiceError};
pub use store::InMemoryPollStore;
