//! Users, bearer tokens, and the request extractor guarding write endpoints.

pub mod extract;
pub mod router;
pub mod tokens;
pub mod users;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::validation::ValidationFailure;

pub use extract::AuthenticatedUser;
pub use router::{auth_router, AuthApi};
pub use tokens::{AccessToken, Claims, TokenError, TokenIssuer, TokenKind, TokenPair};
pub use users::{InMemoryUserDirectory, Registration, User, UserDirectory, UserId, UserView};

/// Error raised by registration, login, and bearer-token checks.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication credentials were not provided.")]
    MissingCredentials,
    #[error("Given token not valid for any token type")]
    InvalidToken,
    #[error("No active account found with the given credentials")]
    InvalidCredentials,
    #[error("A user with that username already exists.")]
    UsernameTaken,
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidToken
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::UsernameTaken | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Hashing(_) | AuthError::Token(_) | AuthError::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "authentication backend failure");
        }

        let payload = match &self {
            AuthError::Validation(failure) => json!({
                "error": self.to_string(),
                "fields": failure.fields,
            }),
            AuthError::UsernameTaken => json!({
                "error": self.to_string(),
                "fields": { "username": [self.to_string()] },
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(payload)).into_response()
    }
}
