use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRef, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthenticatedUser, TokenIssuer};
use crate::validation::ValidationFailure;

use super::admission::AdmissionError;
use super::domain::{
    ChoiceId, ChoiceSubmission, ChoiceUpdate, ChoiceView, PollId, PollPatch, PollSubmission,
    PollUpdate, VoteReceipt, VoteRequest,
};
use super::repository::{PollRepository, RepositoryError};
use super::results::PollResults;
use super::service::{PollService, PollServiceError};

/// Shared state for the poll and choice handlers.
pub struct PollApi<R> {
    pub service: Arc<PollService<R>>,
    pub tokens: Arc<TokenIssuer>,
}

impl<R> Clone for PollApi<R> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

impl<R> FromRef<PollApi<R>> for Arc<TokenIssuer> {
    fn from_ref(api: &PollApi<R>) -> Self {
        api.tokens.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChoiceFilter {
    poll: Option<u64>,
}

/// Router builder exposing poll CRUD, voting, results, and choice CRUD.
pub fn poll_router<R>(service: Arc<PollService<R>>, tokens: Arc<TokenIssuer>) -> Router
where
    R: PollRepository + 'static,
{
    let router = Router::new();
    let router = with_trailing_slash(
        router,
        "/api/polls",
        get(list_polls_handler::<R>).post(create_poll_handler::<R>),
    );
    let router = with_trailing_slash(
        router,
        "/api/polls/:poll_id",
        get(poll_detail_handler::<R>)
            .put(replace_poll_handler::<R>)
            .patch(patch_poll_handler::<R>)
            .delete(delete_poll_handler::<R>),
    );
    let router = with_trailing_slash(
        router,
        "/api/polls/:poll_id/vote",
        post(cast_vote_handler::<R>),
    );
    let router = with_trailing_slash(
        router,
        "/api/polls/:poll_id/results",
        get(results_handler::<R>),
    );
    let router = with_trailing_slash(
        router,
        "/api/choices",
        get(list_choices_handler::<R>).post(create_choice_handler::<R>),
    );
    let router = with_trailing_slash(
        router,
        "/api/choices/:choice_id",
        get(choice_detail_handler::<R>)
            .put(replace_choice_handler::<R>)
            .patch(patch_choice_handler::<R>)
            .delete(delete_choice_handler::<R>),
    );

    router.with_state(PollApi { service, tokens })
}

/// Path ids that do not parse as `u64` name no record.
fn path_id(path: Result<Path<u64>, PathRejection>) -> Result<u64, PollServiceError> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "path id rejected");
            Err(PollServiceError::UnknownId)
        }
    }
}

/// Register `path` both with and without a trailing slash.
pub(crate) fn with_trailing_slash<S>(
    router: Router<S>,
    path: &str,
    method_router: MethodRouter<S>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route(path, method_router.clone())
        .route(&format!("{path}/"), method_router)
}

pub(crate) async fn list_polls_handler<R>(
    State(api): State<PollApi<R>>,
) -> Result<Json<Vec<PollResults>>, PollServiceError>
where
    R: PollRepository + 'static,
{
    Ok(Json(api.service.list_polls()?))
}

pub(crate) async fn create_poll_handler<R>(
    State(api): State<PollApi<R>>,
    user: AuthenticatedUser,
    payload: Result<Json<PollSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<PollResults>), PollServiceError>
where
    R: PollRepository + 'static,
{
    let Json(submission) = payload.map_err(ValidationFailure::from)?;
    let poll = api.service.create_poll(submission)?;
    info!(poll_id = %poll.id, author = %user.id, choices = poll.choices.len(), "poll created");
    Ok((StatusCode::CREATED, Json(poll)))
}

pub(crate) async fn poll_detail_handler<R>(
    State(api): State<PollApi<R>>,
    poll_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<PollResults>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let poll_id = path_id(poll_id)?;
    Ok(Json(api.service.poll(PollId(poll_id))?))
}

pub(crate) async fn replace_poll_handler<R>(
    State(api): State<PollApi<R>>,
    _user: AuthenticatedUser,
    poll_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<PollUpdate>, JsonRejection>,
) -> Result<Json<PollResults>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let poll_id = path_id(poll_id)?;
    let Json(update) = payload.map_err(ValidationFailure::from)?;
    Ok(Json(api.service.replace_poll(PollId(poll_id), update)?))
}

pub(crate) async fn patch_poll_handler<R>(
    State(api): State<PollApi<R>>,
    _user: AuthenticatedUser,
    poll_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<PollPatch>, JsonRejection>,
) -> Result<Json<PollResults>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let poll_id = path_id(poll_id)?;
    let Json(patch) = payload.map_err(ValidationFailure::from)?;
    Ok(Json(api.service.patch_poll(PollId(poll_id), patch)?))
}

pub(crate) async fn delete_poll_handler<R>(
    State(api): State<PollApi<R>>,
    user: AuthenticatedUser,
    poll_id: Result<Path<u64>, PathRejection>,
) -> Result<StatusCode, PollServiceError>
where
    R: PollRepository + 'static,
{
    let poll_id = path_id(poll_id)?;
    api.service.delete_poll(PollId(poll_id))?;
    info!(poll_id, user_id = %user.id, "poll deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/polls/:poll_id/vote/`. Authentication is extracted before the
/// path or body so anonymous callers never reach the admission check.
pub(crate) async fn cast_vote_handler<R>(
    State(api): State<PollApi<R>>,
    user: AuthenticatedUser,
    poll_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VoteReceipt>), PollServiceError>
where
    R: PollRepository + 'static,
{
    let poll_id = path_id(poll_id)?;
    let Json(request) = payload.map_err(ValidationFailure::from)?;
    let vote = api.service.cast_vote(user.id, PollId(poll_id), &request)?;
    info!(poll_id, choice_id = %vote.choice, user_id = %user.id, "vote recorded");
    Ok((StatusCode::CREATED, Json(VoteReceipt::from(&vote))))
}

pub(crate) async fn results_handler<R>(
    State(api): State<PollApi<R>>,
    poll_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<PollResults>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let poll_id = path_id(poll_id)?;
    Ok(Json(api.service.results(PollId(poll_id))?))
}

pub(crate) async fn list_choices_handler<R>(
    State(api): State<PollApi<R>>,
    filter: Result<Query<ChoiceFilter>, QueryRejection>,
) -> Result<Json<Vec<ChoiceView>>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let Query(filter) = filter.map_err(|_| {
        ValidationFailure::field("poll", "A valid integer is required.")
    })?;
    Ok(Json(api.service.list_choices(filter.poll.map(PollId))?))
}

pub(crate) async fn create_choice_handler<R>(
    State(api): State<PollApi<R>>,
    _user: AuthenticatedUser,
    payload: Result<Json<ChoiceSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<ChoiceView>), PollServiceError>
where
    R: PollRepository + 'static,
{
    let Json(submission) = payload.map_err(ValidationFailure::from)?;
    let choice = api.service.create_choice(submission)?;
    Ok((StatusCode::CREATED, Json(choice)))
}

pub(crate) async fn choice_detail_handler<R>(
    State(api): State<PollApi<R>>,
    choice_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ChoiceView>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let choice_id = path_id(choice_id)?;
    Ok(Json(api.service.choice(ChoiceId(choice_id))?))
}

pub(crate) async fn replace_choice_handler<R>(
    State(api): State<PollApi<R>>,
    _user: AuthenticatedUser,
    choice_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ChoiceUpdate>, JsonRejection>,
) -> Result<Json<ChoiceView>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let choice_id = path_id(choice_id)?;
    let Json(update) = payload.map_err(ValidationFailure::from)?;
    Ok(Json(api.service.update_choice(
        ChoiceId(choice_id),
        update,
        true,
    )?))
}

pub(crate) async fn patch_choice_handler<R>(
    State(api): State<PollApi<R>>,
    _user: AuthenticatedUser,
    choice_id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<ChoiceUpdate>, JsonRejection>,
) -> Result<Json<ChoiceView>, PollServiceError>
where
    R: PollRepository + 'static,
{
    let choice_id = path_id(choice_id)?;
    let Json(update) = payload.map_err(ValidationFailure::from)?;
    Ok(Json(api.service.update_choice(
        ChoiceId(choice_id),
        update,
        false,
    )?))
}

pub(crate) async fn delete_choice_handler<R>(
    State(api): State<PollApi<R>>,
    _user: AuthenticatedUser,
    choice_id: Result<Path<u64>, PathRejection>,
) -> Result<StatusCode, PollServiceError>
where
    R: PollRepository + 'static,
{
    let choice_id = path_id(choice_id)?;
    api.service.delete_choice(ChoiceId(choice_id))?;
    Ok(StatusCode::NO_CONTENT)
}

impl PollServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PollServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            PollServiceError::PollNotFound(_)
            | PollServiceError::ChoiceNotFound(_)
            | PollServiceError::UnknownId => StatusCode::NOT_FOUND,
            PollServiceError::Admission(AdmissionError::PollNotFound(_)) => StatusCode::NOT_FOUND,
            PollServiceError::Admission(AdmissionError::InvalidChoice)
            | PollServiceError::Admission(AdmissionError::AlreadyVoted) => StatusCode::BAD_REQUEST,
            PollServiceError::Admission(AdmissionError::PollClosed(_)) => StatusCode::FORBIDDEN,
            PollServiceError::Admission(AdmissionError::Repository(err))
            | PollServiceError::Repository(err) => match err {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Conflict => StatusCode::CONFLICT,
                RepositoryError::Integrity(_) | RepositoryError::Unavailable(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for PollServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "poll request failed");
        } else if matches!(self, PollServiceError::Admission(_)) {
            warn!(error = %self, "vote rejected");
        }

        let payload = match &self {
            PollServiceError::Validation(failure) => json!({
                "error": self.to_string(),
                "fields": failure.fields,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(payload)).into_response()
    }
}
