use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::AuthError;
use crate::validation::ValidationFailure;

/// Identifier of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stored account. `password_hash` is an argon2 PHC string.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl User {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Public representation of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
}

/// Body of `POST /api/users/`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has between 1 and 150 characters."),
        custom = "validate_username"
    )]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "Ensure this field has between 8 and 128 characters."))]
    pub password: String,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Ok(());
    }
    let mut error = ValidationError::new("username_charset");
    error.message = Some(
        "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
            .into(),
    );
    Err(error)
}

/// Account storage and credential checks.
pub trait UserDirectory: Send + Sync {
    fn register(&self, registration: Registration) -> Result<User, AuthError>;
    fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError>;
    fn fetch(&self, id: UserId) -> Result<Option<User>, AuthError>;
}

/// Process-local directory hashing passwords with argon2.
pub struct InMemoryUserDirectory {
    state: Mutex<DirectoryState>,
    hasher: Argon2<'static>,
}

#[derive(Default)]
struct DirectoryState {
    users: BTreeMap<UserId, User>,
    by_username: HashMap<String, UserId>,
    next_id: u64,
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::with_hasher(Argon2::default())
    }
}

impl InMemoryUserDirectory {
    /// Use explicit argon2 parameters, e.g. cheap ones in tests.
    pub fn with_hasher(hasher: Argon2<'static>) -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
            hasher,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DirectoryState>, AuthError> {
        self.state
            .lock()
            .map_err(|_| AuthError::Unavailable("user directory mutex poisoned".to_string()))
    }

    pub fn len(&self) -> Result<usize, AuthError> {
        Ok(self.lock()?.users.len())
    }

    pub fn is_empty(&self) -> Result<bool, AuthError> {
        Ok(self.len()? == 0)
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn register(&self, registration: Registration) -> Result<User, AuthError> {
        let registration = Registration {
            username: registration.username.trim().to_string(),
            password: registration.password,
        };
        registration
            .validate()
            .map_err(ValidationFailure::from)?;

        if self.lock()?.by_username.contains_key(&registration.username) {
            return Err(AuthError::UsernameTaken);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher
            .hash_password(registration.password.as_bytes(), &salt)
            .map_err(|err| AuthError::Hashing(err.to_string()))?
            .to_string();

        let mut state = self.lock()?;
        // Re-check under the lock; hashing ran unlocked.
        if state.by_username.contains_key(&registration.username) {
            return Err(AuthError::UsernameTaken);
        }
        state.next_id += 1;
        let user = User {
            id: UserId(state.next_id),
            username: registration.username,
            password_hash,
        };
        state.by_username.insert(user.username.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = {
            let state = self.lock()?;
            state
                .by_username
                .get(username.trim())
                .and_then(|id| state.users.get(id))
                .cloned()
                .ok_or(AuthError::InvalidCredentials)?
        };

        let parsed = PasswordHash::new(&user.password_hash)
            .map_err(|err| AuthError::Hashing(err.to_string()))?;
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)?;
        Ok(user)
    }

    fn fetch(&self, id: UserId) -> Result<Option<User>, AuthError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }
}

#[cfg(test)]
pub(crate) fn fast_hasher() -> Argon2<'static> {
    use argon2::{Algorithm, Params, Version};
    let params = Params::new(8, 1, 1, None).expect("valid argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}
