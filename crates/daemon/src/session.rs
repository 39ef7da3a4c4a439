//! Session gate for fetchd
//!
//! Verifies the shared password and issues signed, time-limited session
//! tokens. Every verification attempt lasts at least a fixed minimum delay,
//! on the success path as well as the failure path, so the outcome cannot be
//! inferred from timing and online guessing is rate-bound. No lockout counter
//! is kept; the delay is the only defense.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Error type for authentication operations
#[derive(Debug, Error)]
pub enum AuthError {
    /// Supplied password does not match the configured secret
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token could not be signed
    #[error("failed to sign session token: {0}")]
    TokenCreation(#[from] jsonwebtoken::errors::Error),
}

/// JWT claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Shared-password gate issuing signed session tokens.
///
/// Stateless beyond the signing key: restarting the process with no
/// configured secret generates a fresh random key and invalidates every
/// previously issued token.
pub struct SessionGate {
    password: String,
    min_delay: Duration,
    session_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionGate {
    /// Create a gate.
    ///
    /// # Arguments
    /// * `password` - the shared credential
    /// * `secret` - signing secret; `None` generates a random 32-byte key
    /// * `session_ttl` - lifetime of issued tokens
    /// * `min_delay` - minimum wall-clock duration of every `authenticate` call
    pub fn new(
        password: String,
        secret: Option<&str>,
        session_ttl: Duration,
        min_delay: Duration,
    ) -> Self {
        let secret_bytes: Vec<u8> = match secret {
            Some(s) => s.as_bytes().to_vec(),
            None => {
                let mut key = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key.to_vec()
            }
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 60; // clock skew

        Self {
            password,
            min_delay,
            session_ttl,
            encoding_key: EncodingKey::from_secret(&secret_bytes),
            decoding_key: DecodingKey::from_secret(&secret_bytes),
            validation,
        }
    }

    /// Verify the shared password and issue a session token.
    ///
    /// Does not return before `min_delay` has elapsed since call entry,
    /// regardless of outcome. The outcome (token signing included) is
    /// computed before the residual sleep so success and failure spend the
    /// same dominant time in the same place.
    pub async fn authenticate(&self, password: &str) -> Result<String, AuthError> {
        let started = Instant::now();

        let matches: bool = password
            .as_bytes()
            .ct_eq(self.password.as_bytes())
            .into();
        let outcome = if matches {
            self.issue_token()
        } else {
            Err(AuthError::InvalidCredentials)
        };

        let elapsed = started.elapsed();
        if elapsed < self.min_delay {
            tokio::time::sleep(self.min_delay - elapsed).await;
        }

        outcome
    }

    /// Check signature and expiry of a session token.
    pub fn validate(&self, token: &str) -> bool {
        decode::<Claims>(token, &self.decoding_key, &self.validation).is_ok()
    }

    /// Lifetime of issued tokens.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    fn issue_token(&self) -> Result<String, AuthError> {
        let now = unix_now_secs();
        let claims = Claims {
            iat: now,
            exp: now + self.session_ttl.as_secs(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }
}
