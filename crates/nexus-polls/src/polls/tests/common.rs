use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::auth::{TokenIssuer, TokenKind, UserId};
use crate::config::AuthConfig;
use crate::polls::domain::{
    Choice, ChoiceDraft, ChoiceId, NewChoice, NewPoll, NewVote, Poll, PollId, PollSubmission, Vote,
};
use crate::polls::repository::{PollRepository, RepositoryError};
use crate::polls::{poll_router, InMemoryPollStore, PollResults, PollService};

pub(super) fn store_and_service() -> (InMemoryPollStore, Arc<PollService<InMemoryPollStore>>) {
    let store = InMemoryPollStore::default();
    let service = Arc::new(PollService::new(Arc::new(store.clone())));
    (store, service)
}

pub(super) fn submission(question: &str, choices: &[&str]) -> PollSubmission {
    PollSubmission {
        question: question.to_string(),
        end_date: None,
        choices: choices
            .iter()
            .map(|text| ChoiceDraft {
                choice_text: text.to_string(),
            })
            .collect(),
    }
}

pub(super) fn seed_poll<R>(
    service: &PollService<R>,
    question: &str,
    choices: &[&str],
) -> PollResults
where
    R: PollRepository + 'static,
{
    service
        .create_poll(submission(question, choices))
        .expect("poll created")
}

pub(super) fn seed_poll_ending<R>(
    service: &PollService<R>,
    question: &str,
    choices: &[&str],
    end_date: DateTime<Utc>,
) -> PollResults
where
    R: PollRepository + 'static,
{
    let mut submission = submission(question, choices);
    submission.end_date = Some(end_date);
    service.create_poll(submission).expect("poll created")
}

pub(super) fn choice_id(poll: &PollResults, text: &str) -> ChoiceId {
    poll.choices
        .iter()
        .find(|choice| choice.choice_text == text)
        .map(|choice| choice.id)
        .expect("choice exists")
}

pub(super) fn token_issuer() -> Arc<TokenIssuer> {
    Arc::new(TokenIssuer::new(&AuthConfig {
        jwt_secret: "poll-tests-secret".to_string(),
        access_token_ttl_secs: 300,
        refresh_token_ttl_secs: 3600,
    }))
}

pub(super) fn bearer(tokens: &TokenIssuer, user: u64) -> String {
    let token = tokens
        .issue(UserId(user), &format!("voter-{user}"), TokenKind::Access)
        .expect("token issued");
    format!("Bearer {token}")
}

pub(super) fn router_with_service<R>(service: Arc<PollService<R>>) -> (Router, Arc<TokenIssuer>)
where
    R: PollRepository + 'static,
{
    let tokens = token_issuer();
    (poll_router(service, tokens.clone()), tokens)
}

pub(super) fn json_request(
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Delegates to an in-memory store while counting every repository call.
#[derive(Default)]
pub(super) struct CountingRepository {
    pub(super) inner: InMemoryPollStore,
    calls: AtomicUsize,
}

impl CountingRepository {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) -> &InMemoryPollStore {
        self.calls.fetch_add(1, Ordering::SeqCst);
        &self.inner
    }
}

impl PollRepository for CountingRepository {
    fn insert_poll(&self, poll: NewPoll) -> Result<(Poll, Vec<Choice>), RepositoryError> {
        self.touch().insert_poll(poll)
    }

    fn update_poll(&self, poll: Poll) -> Result<Poll, RepositoryError> {
        self.touch().update_poll(poll)
    }

    fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError> {
        self.touch().delete_poll(id)
    }

    fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError> {
        self.touch().fetch_poll(id)
    }

    fn list_polls(&self) -> Result<Vec<Poll>, RepositoryError> {
        self.touch().list_polls()
    }

    fn insert_choice(&self, choice: NewChoice) -> Result<Choice, RepositoryError> {
        self.touch().insert_choice(choice)
    }

    fn update_choice(&self, choice: Choice) -> Result<Choice, RepositoryError> {
        self.touch().update_choice(choice)
    }

    fn delete_choice(&self, id: ChoiceId) -> Result<(), RepositoryError> {
        self.touch().delete_choice(id)
    }

    fn fetch_choice(&self, id: ChoiceId) -> Result<Option<Choice>, RepositoryError> {
        self.touch().fetch_choice(id)
    }

    fn list_choices(&self, poll: Option<PollId>) -> Result<Vec<Choice>, RepositoryError> {
        self.touch().list_choices(poll)
    }

    fn find_vote(&self, user: UserId, poll: PollId) -> Result<Option<Vote>, RepositoryError> {
        self.touch().find_vote(user, poll)
    }

    fn insert_vote(&self, vote: NewVote) -> Result<Vote, RepositoryError> {
        self.touch().insert_vote(vote)
    }

    fn vote_counts(&self, poll: PollId) -> Result<BTreeMap<ChoiceId, u64>, RepositoryError> {
        self.touch().vote_counts(poll)
    }

    fn choice_tallies(&self, poll: PollId) -> Result<Vec<(Choice, u64)>, RepositoryError> {
        self.touch().choice_tallies(poll)
    }
}

/// Reads as if a concurrent request won every race between a lookup and the
/// following write: no ballot is ever visible, and deleted polls still appear.
#[derive(Default)]
pub(super) struct RacingRepository {
    pub(super) inner: InMemoryPollStore,
}

impl PollRepository for RacingRepository {
    fn insert_poll(&self, poll: NewPoll) -> Result<(Poll, Vec<Choice>), RepositoryError> {
        self.inner.insert_poll(poll)
    }

    fn update_poll(&self, poll: Poll) -> Result<Poll, RepositoryError> {
        self.inner.update_poll(poll)
    }

    fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError> {
        self.inner.delete_poll(id)
    }

    fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError> {
        Ok(Some(self.inner.fetch_poll(id)?.unwrap_or(Poll {
            id,
            question: "Deleted?".to_string(),
            pub_date: Utc::now(),
            end_date: None,
        })))
    }

    fn list_polls(&self) -> Result<Vec<Poll>, RepositoryError> {
        self.inner.list_polls()
    }

    fn insert_choice(&self, choice: NewChoice) -> Result<Choice, RepositoryError> {
        self.inner.insert_choice(choice)
    }

    fn update_choice(&self, choice: Choice) -> Result<Choice, RepositoryError> {
        self.inner.update_choice(choice)
    }

    fn delete_choice(&self, id: ChoiceId) -> Result<(), RepositoryError> {
        self.inner.delete_choice(id)
    }

    fn fetch_choice(&self, id: ChoiceId) -> Result<Option<Choice>, RepositoryError> {
        self.inner.fetch_choice(id)
    }

    fn list_choices(&self, poll: Option<PollId>) -> Result<Vec<Choice>, RepositoryError> {
        self.inner.list_choices(poll)
    }

    fn find_vote(&self, _user: UserId, _poll: PollId) -> Result<Option<Vote>, RepositoryError> {
        Ok(None)
    }

    fn insert_vote(&self, vote: NewVote) -> Result<Vote, RepositoryError> {
        self.inner.insert_vote(vote)
    }

    fn vote_counts(&self, poll: PollId) -> Result<BTreeMap<ChoiceId, u64>, RepositoryError> {
        self.inner.vote_counts(poll)
    }

    fn choice_tallies(&self, poll: PollId) -> Result<Vec<(Choice, u64)>, RepositoryError> {
        self.inner.choice_tallies(poll)
    }
}

pub(super) struct UnavailableRepository;

fn unavailable<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl PollRepository for UnavailableRepository {
    fn insert_poll(&self, _poll: NewPoll) -> Result<(Poll, Vec<Choice>), RepositoryError> {
        unavailable()
    }

    fn update_poll(&self, _poll: Poll) -> Result<Poll, RepositoryError> {
        unavailable()
    }

    fn delete_poll(&self, _id: PollId) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn fetch_poll(&self, _id: PollId) -> Result<Option<Poll>, RepositoryError> {
        unavailable()
    }

    fn list_polls(&self) -> Result<Vec<Poll>, RepositoryError> {
        unavailable()
    }

    fn insert_choice(&self, _choice: NewChoice) -> Result<Choice, RepositoryError> {
        unavailable()
    }

    fn update_choice(&self, _choice: Choice) -> Result<Choice, RepositoryError> {
        unavailable()
    }

    fn delete_choice(&self, _id: ChoiceId) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn fetch_choice(&self, _id: ChoiceId) -> Result<Option<Choice>, RepositoryError> {
        unavailable()
    }

    fn list_choices(&self, _poll: Option<PollId>) -> Result<Vec<Choice>, RepositoryError> {
        unavailable()
    }

    fn find_vote(&self, _user: UserId, _poll: PollId) -> Result<Option<Vote>, RepositoryError> {
        unavailable()
    }

    fn insert_vote(&self, _vote: NewVote) -> Result<Vote, RepositoryError> {
        unavailable()
    }

    fn vote_counts(&self, _poll: PollId) -> Result<BTreeMap<ChoiceId, u64>, RepositoryError> {
        unavailable()
    }

    fn choice_tallies(&self, _poll: PollId) -> Result<Vec<(Choice, u64)>, RepositoryError> {
        unavailable()
    }
}
