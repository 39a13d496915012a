//! Storefront API
//!
//! REST backend for a small clothing storefront.
//!
//! ## Features
//! - Product catalog management (admin)
//! - Per-user shopping cart with price snapshots
//! - Checkout with payment verification against the PortOne gateway
//! - Order history and admin status management
//! - JWT authentication with customer/admin roles

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod messaging;
pub mod payment;
pub mod repository;
pub mod services;
pub mod state;

use thiserror::Error;

pub use config::AppConfig;
pub use state::AppState;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    /// Missing or malformed input. `errors` carries per-field messages when known.
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error("{0}")]
    NotFound(String),

    /// Duplicate order submission (order id or transaction id already recorded).
    #[error("{0}")]
    Conflict(String),

    /// Duplicate unique key on catalog/user data; reported as a client error.
    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Verification(#[from] payment::VerificationError),

    #[error(transparent)]
    Storage(#[from] repository::RepoError),

    #[error("{0}")]
    Internal(String),
}

impl ShopError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), errors: Vec::new() }
    }
}

impl From<validator::ValidationErrors> for ShopError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(m) => format!("{field}: {m}"),
                    None => format!("{field}: invalid value ({})", e.code),
                })
            })
            .collect();
        messages.sort();
        Self::Validation { message: "validation failed".to_string(), errors: messages }
    }
}

impl From<auth::AuthError> for ShopError {
    fn from(err: auth::AuthError) -> Self {
        match err {
            auth::AuthError::Signing(e) => Self::Internal(format!("token signing failed: {e}")),
            auth::AuthError::Hashing(e) => Self::Internal(format!("password hashing failed: {e}")),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
