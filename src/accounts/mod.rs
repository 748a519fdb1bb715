//! Customer Accounts
//!
//! Registration, email verification and login. Verification is a real gate:
//! accounts are created unverified and login refuses them until the token
//! from the verification message is redeemed. Admin/session auth is a
//! separate concern and deliberately absent.

pub mod service;

pub use service::{AccountService, AuthResponse, Claims, LoginInput, RegisterInput};

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(ulid::Ulid);

impl AccountId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email already registered")]
    EmailTaken,

    /// One message for unknown email and wrong password; login must not
    /// reveal which half failed.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is not verified")]
    Unverified,

    /// Unknown or already spent verification token.
    #[error("Unknown verification token")]
    UnknownToken,

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Token handling failed: {0}")]
    Token(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AccountError {
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::InvalidInput(_) => "INVALID_INPUT",
            AccountError::EmailTaken => "EMAIL_TAKEN",
            AccountError::InvalidCredentials => "INVALID_CREDENTIALS",
            AccountError::Unverified => "UNVERIFIED",
            AccountError::UnknownToken => "UNKNOWN_TOKEN",
            AccountError::Hash(_) => "HASH_ERROR",
            AccountError::Token(_) => "TOKEN_ERROR",
            AccountError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            AccountError::InvalidInput(_) => 400,
            AccountError::EmailTaken => 409,
            AccountError::InvalidCredentials => 401,
            AccountError::Unverified => 403,
            AccountError::UnknownToken => 404,
            AccountError::Hash(_) | AccountError::Token(_) | AccountError::Store(_) => 500,
        }
    }
}

/// A registered customer.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: AccountId,
    pub name: String,
    /// Unique, matched case-insensitively
    pub email: String,
    /// Normalized international form
    pub phone: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Present until verification; cleared when spent
    pub verification_token: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl AccountRecord {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        password_hash: impl Into<String>,
        verification_token: Option<String>,
    ) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            password_hash: password_hash.into(),
            verification_token,
            verified: false,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}
