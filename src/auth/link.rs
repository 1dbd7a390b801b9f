use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::Result;

/// Post-login links go stale after this many seconds.
pub const LINK_EXPIRY_WINDOW_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkClaims {
    pub sub: String,  // Username
    pub iat: i64,     // Issued at
    pub exp: i64,     // Informational; the window check decides
    pub jti: String,  // Link id
}

/// A freshly issued post-login link.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLink {
    pub username: String,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// `true` once more than `window` has passed between `issued_at` and `now`.
pub fn is_expired_at(issued_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - issued_at > window
}

/// Checks against the default 300 second window.
pub fn is_link_expired(issued_at: DateTime<Utc>) -> bool {
    is_expired_at(issued_at, Utc::now(), Duration::seconds(LINK_EXPIRY_WINDOW_SECS))
}

pub struct LinkIssuer {
    secret: String,
    window: Duration,
}

impl LinkIssuer {
    pub fn new(secret: String, window_seconds: i64) -> Self {
        Self {
            secret,
            window: Duration::seconds(window_seconds),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn issue(&self, username: &str) -> Result<SessionLink> {
        self.issue_at(username, Utc::now())
    }

    pub fn issue_at(&self, username: &str, issued_at: DateTime<Utc>) -> Result<SessionLink> {
        let expires_at = issued_at + self.window;
        let claims = LinkClaims {
            sub: username.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::InternalError(format!("Failed to sign link: {}", e)))?;

        Ok(SessionLink {
            username: username.to_string(),
            token,
            issued_at,
            expires_at,
        })
    }

    /// Checks the signature only. Staleness is up to the caller.
    pub fn decode(&self, token: &str) -> Result<LinkClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<LinkClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;

        Ok(data.claims)
    }

    pub fn is_link_expired(&self, issued_at: DateTime<Utc>) -> bool {
        is_expired_at(issued_at, Utc::now(), self.window)
    }

    pub fn issued_at(claims: &LinkClaims) -> Result<DateTime<Utc>> {
        Utc.timestamp_opt(claims.iat, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidLink.into())
    }
}
