//! Account Service
//!
//! Argon2 password storage and HS256 login tokens. The verification token is
//! random, single-use and delivered out of band; until it comes back, the
//! account exists but cannot log in.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accounts::{AccountError, AccountRecord};
use crate::config::AuthConfig;
use crate::notify::TicketNotifier;
use crate::phone::PhoneNormalizer;
use crate::store::TicketStore;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Account email
    pub sub: String,
    /// Expiration, UTC timestamp
    pub exp: usize,
    /// Issued at
    pub iat: usize,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub name: String,
    pub email: String,
}

pub struct AccountService {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn TicketNotifier>,
    normalizer: PhoneNormalizer,
    auth: AuthConfig,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn TicketNotifier>,
        normalizer: PhoneNormalizer,
        auth: AuthConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            normalizer,
            auth,
        }
    }

    /// Create an unverified account and dispatch the verification token.
    pub async fn register(&self, input: RegisterInput) -> Result<AccountRecord, AccountError> {
        if input.name.trim().is_empty() {
            return Err(AccountError::InvalidInput("name is required".to_string()));
        }
        let email = input.email.trim().to_string();
        if !email.contains('@') {
            return Err(AccountError::InvalidInput(format!(
                "not an email address: {email}"
            )));
        }
        if input.password.len() < MIN_PASSWORD_LEN {
            return Err(AccountError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(input.password.as_bytes(), &salt)
            .map_err(|e| AccountError::Hash(e.to_string()))?
            .to_string();

        let token_bytes: [u8; 32] = rand::random();
        let token = hex::encode(token_bytes);

        let account = AccountRecord::new(
            input.name.trim(),
            email.clone(),
            self.normalizer.normalize(&input.phone),
            password_hash,
            Some(token.clone()),
        );
        let snapshot = account.clone();

        self.store
            .insert_account(account)
            .await
            .map_err(|err| match err {
                crate::store::StoreError::DuplicateEmail(_) => AccountError::EmailTaken,
                other => AccountError::Store(other),
            })?;

        info!(email = %email, account_id = %snapshot.id, "Account registered, verification pending");

        // Delivery is detached; registration stands whether or not the
        // message lands (the token can be re-requested operationally).
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.send_verification(&email, &token).await {
                warn!(email = %email, error = %err, "Verification message delivery failed");
            }
        });

        Ok(snapshot)
    }

    /// Redeem a verification token. Single-use: a second call with the same
    /// token fails even on a verified account.
    pub async fn verify(&self, token: &str) -> Result<(), AccountError> {
        if self.store.verify_account(token).await? {
            info!("Account verified");
            Ok(())
        } else {
            Err(AccountError::UnknownToken)
        }
    }

    /// Password login. Unknown email and wrong password return the same
    /// error; unverified accounts are refused after the password check so
    /// the response never leaks which emails exist.
    pub async fn login(&self, input: LoginInput) -> Result<AuthResponse, AccountError> {
        let account = self
            .store
            .account_by_email(input.email.trim())
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&account.password_hash)
            .map_err(|e| AccountError::Hash(e.to_string()))?;
        Argon2::default()
            .verify_password(input.password.as_bytes(), &parsed_hash)
            .map_err(|_| AccountError::InvalidCredentials)?;

        if !account.verified {
            return Err(AccountError::Unverified);
        }

        let token = self.issue_token(&account.email)?;
        self.store.touch_login(&account.email, Utc::now()).await?;

        info!(email = %account.email, "Login");
        Ok(AuthResponse {
            token,
            name: account.name,
            email: account.email,
        })
    }

    fn issue_token(&self, email: &str) -> Result<String, AccountError> {
        let now = Utc::now();
        let expiration = now + Duration::hours(self.auth.token_ttl_hours);

        let claims = Claims {
            sub: email.to_string(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.auth.jwt_secret.as_bytes()),
        )
        .map_err(|e| AccountError::Token(e.to_string()))
    }

    /// Decode and validate a login token.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AccountError> {
        let decoding_key = DecodingKey::from_secret(self.auth.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AccountError::Token(e.to_string()))
    }
}
