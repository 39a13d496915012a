//! Credentials: Argon2 password hashing and HS256 bearer tokens.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::domain::aggregates::{Role, User};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication token was not provided")]
    MissingToken,
    #[error("invalid authentication token")]
    InvalidToken,
    #[error("authentication token has expired")]
    Expired,
    #[error("user for this token no longer exists")]
    UnknownUser,
    #[error(transparent)]
    Signing(jsonwebtoken::errors::Error),
    #[error("{0}")]
    Hashing(String),
}

/// Claim set carried by every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    inner: Arc<KeysInner>,
}

struct KeysInner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            inner: Arc::new(KeysInner {
                encoding: EncodingKey::from_secret(config.secret.as_bytes()),
                decoding: DecodingKey::from_secret(config.secret.as_bytes()),
                ttl: config.ttl,
            }),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.id,
            email: user.email.to_string(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.inner.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.inner.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.inner.encoding).map_err(AuthError::Signing)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// False for a wrong password and for an unparseable stored hash alike.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Email;

    fn keys(secret: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig { secret: secret.into(), ttl: chrono::Duration::days(7) })
    }

    fn user(role: Role) -> User {
        User::register(Email::parse("buyer@shop.test").unwrap(), "Buyer", String::new(), role, None)
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = keys("k1");
        let user = user(Role::Admin);
        let claims = keys.verify(&keys.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let token = keys("k1").issue(&user(Role::Customer)).unwrap();
        assert!(matches!(keys("k2").verify(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(keys("k1").verify("not-a-token"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token() {
        let keys = keys("k1");
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: Uuid::new_v4(), email: "x@y.z".into(), role: Role::Customer,
            iat: now - 7200, exp: now - 3600,
        };
        let token = keys.sign(&claims).unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "garbage"));
    }
}
