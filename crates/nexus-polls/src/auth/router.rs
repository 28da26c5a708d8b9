use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::polls::router::with_trailing_slash;
use crate::validation::ValidationFailure;

use super::tokens::{AccessToken, TokenIssuer, TokenKind, TokenPair};
use super::users::{Registration, UserDirectory, UserView};
use super::AuthError;

/// Shared state for the account and token handlers.
pub struct AuthApi<U> {
    pub users: Arc<U>,
    pub tokens: Arc<TokenIssuer>,
}

impl<U> Clone for AuthApi<U> {
    fn clone(&self) -> Self {
        Self {
            users: self.users.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshRequest {
    refresh: String,
}

/// Router builder for registration, login, and access-token refresh.
pub fn auth_router<U>(users: Arc<U>, tokens: Arc<TokenIssuer>) -> Router
where
    U: UserDirectory + 'static,
{
    let router = Router::new();
    let router = with_trailing_slash(router, "/api/users", post(register_handler::<U>));
    let router = with_trailing_slash(router, "/api/token", post(obtain_token_handler::<U>));
    let router = with_trailing_slash(
        router,
        "/api/token/refresh",
        post(refresh_token_handler::<U>),
    );
    router.with_state(AuthApi { users, tokens })
}

pub(crate) async fn register_handler<U>(
    State(api): State<AuthApi<U>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), AuthError>
where
    U: UserDirectory + 'static,
{
    let Json(registration) = payload.map_err(ValidationFailure::from)?;
    let user = api.users.register(registration)?;
    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.view())))
}

pub(crate) async fn obtain_token_handler<U>(
    State(api): State<AuthApi<U>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenPair>, AuthError>
where
    U: UserDirectory + 'static,
{
    let Json(credentials) = payload.map_err(ValidationFailure::from)?;
    let user = api
        .users
        .authenticate(&credentials.username, &credentials.password)
        .map_err(|err| {
            if matches!(err, AuthError::InvalidCredentials) {
                warn!(username = %credentials.username, "login rejected");
            }
            err
        })?;
    Ok(Json(api.tokens.issue_pair(user.id, &user.username)?))
}

pub(crate) async fn refresh_token_handler<U>(
    State(api): State<AuthApi<U>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessToken>, AuthError>
where
    U: UserDirectory + 'static,
{
    let Json(request) = payload.map_err(ValidationFailure::from)?;
    let claims = api
        .tokens
        .verify(&request.refresh, TokenKind::Refresh)
        .map_err(|_| AuthError::InvalidToken)?;
    let user_id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;
    let user = api.users.fetch(user_id)?.ok_or(AuthError::InvalidToken)?;

    Ok(Json(AccessToken {
        access: api.tokens.issue(user.id, &user.username, TokenKind::Access)?,
    }))
}
