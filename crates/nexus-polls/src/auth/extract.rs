use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

use super::tokens::{TokenIssuer, TokenKind};
use super::users::UserId;
use super::AuthError;

/// Caller identified by a valid `Authorization: Bearer <access token>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenIssuer>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = bearer_token(header).ok_or(AuthError::MissingCredentials)?;

        let issuer = Arc::<TokenIssuer>::from_ref(state);
        let claims = issuer.verify(token, TokenKind::Access).map_err(|err| {
            debug!(error = %err, "bearer token rejected");
            AuthError::InvalidToken
        })?;

        Ok(Self {
            id: claims.user_id().map_err(|_| AuthError::InvalidToken)?,
            username: claims.username,
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}
