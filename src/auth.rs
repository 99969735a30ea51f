use std::{collections::HashMap, sync::Arc};

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{AppState, cache::now_sec, error::AppError};

/// Salted digest in `salt$hex` form. The salt is fresh per user, so equal
/// passwords never share a stored hash.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Clone, Copy, Debug)]
struct TokenEntry {
    user_id: i32,
    expires_at: i64,
}

#[derive(Clone, Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// In-process issuer of opaque access/refresh tokens. Handlers only ever see
/// the user id a token resolves to, never the token internals.
pub struct TokenStore {
    access: RwLock<HashMap<String, TokenEntry>>,
    refresh: RwLock<HashMap<String, TokenEntry>>,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenStore {
    pub fn new(access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            access: RwLock::new(HashMap::new()),
            refresh: RwLock::new(HashMap::new()),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn issue(&self, user_id: i32) -> IssuedTokens {
        let now = now_sec();
        let access_token = new_token();
        let refresh_token = new_token();

        self.access.write().insert(
            access_token.clone(),
            TokenEntry { user_id, expires_at: now + self.access_ttl_seconds },
        );
        self.refresh.write().insert(
            refresh_token.clone(),
            TokenEntry { user_id, expires_at: now + self.refresh_ttl_seconds },
        );

        IssuedTokens { access_token, refresh_token }
    }

    /// Resolves an access token to its user id, rejecting unknown or
    /// expired tokens.
    pub fn authenticate(&self, token: &str) -> Result<i32, AppError> {
        let access = self.access.read();
        let entry = access.get(token).ok_or(AppError::Unauthorized)?;
        if now_sec() >= entry.expires_at {
            return Err(AppError::Unauthorized);
        }
        Ok(entry.user_id)
    }

    /// Trades a live refresh token for a fresh token pair. The old refresh
    /// token is retired in the exchange.
    pub fn refresh(&self, token: &str) -> Result<IssuedTokens, AppError> {
        let entry = {
            let mut refresh = self.refresh.write();
            let entry = refresh.get(token).copied().ok_or(AppError::Unauthorized)?;
            if now_sec() >= entry.expires_at {
                refresh.remove(token);
                return Err(AppError::Unauthorized);
            }
            refresh.remove(token);
            entry
        };
        Ok(self.issue(entry.user_id))
    }
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Extractor for endpoints that require a valid `Authorization: Bearer`
/// access token.
pub struct AuthUser {
    pub user_id: i32,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        let user_id = state.tokens.authenticate(bearer.token())?;
        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_and_rejects_wrong_password() {
        let stored = hash_password("hunter2hunter2");
        assert!(verify_password(&stored, "hunter2hunter2"));
        assert!(!verify_password(&stored, "hunter3hunter3"));
        assert!(!verify_password("garbage-without-salt", "hunter2hunter2"));
    }

    #[test]
    fn equal_passwords_get_distinct_hashes() {
        let a = hash_password("same-password");
        let b = hash_password("same-password");
        assert_ne!(a, b);
        assert!(verify_password(&a, "same-password"));
        assert!(verify_password(&b, "same-password"));
    }

    #[test]
    fn issued_access_token_authenticates() {
        let store = TokenStore::new(3_600, 86_400);
        let tokens = store.issue(42);

        assert_eq!(store.authenticate(&tokens.access_token).unwrap(), 42);
        assert!(store.authenticate("not-a-token").is_err());
        // A refresh token is not an access token.
        assert!(store.authenticate(&tokens.refresh_token).is_err());
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let store = TokenStore::new(0, 0);
        let tokens = store.issue(7);
        assert!(store.authenticate(&tokens.access_token).is_err());
    }

    #[test]
    fn refresh_rotates_the_pair() {
        let store = TokenStore::new(3_600, 86_400);
        let first = store.issue(9);

        let second = store.refresh(&first.refresh_token).unwrap();
        assert_eq!(store.authenticate(&second.access_token).unwrap(), 9);

        // The spent refresh token cannot be replayed.
        assert!(store.refresh(&first.refresh_token).is_err());
    }
}
