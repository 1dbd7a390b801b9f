//! Login page state machine.
//!
//! `AwaitingInput -> Verifying -> LinkValid | LinkExpired`, with failures
//! going back to `AwaitingInput` carrying the error. Every state except
//! `Verifying` accepts a new submission.

use chrono::{DateTime, Duration, Utc};

use crate::auth::link::{is_expired_at, SessionLink};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub enum LoginState {
    AwaitingInput { error: Option<String> },
    Verifying { username: String },
    LinkValid { link: SessionLink },
    LinkExpired { username: String },
}

impl Default for LoginState {
    fn default() -> Self {
        LoginState::AwaitingInput { error: None }
    }
}

impl LoginState {
    pub fn submit(self, username: &str) -> Self {
        match self {
            LoginState::Verifying { .. } => self,
            _ => LoginState::Verifying {
                username: username.to_string(),
            },
        }
    }

    /// Applies the verification result. Ignored unless `Verifying`.
    pub fn complete(
        self,
        outcome: Result<SessionLink, AppError>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        if !matches!(self, LoginState::Verifying { .. }) {
            return self;
        }

        match outcome {
            Ok(link) => LoginState::LinkValid { link }.follow(now, window),
            Err(e) => LoginState::AwaitingInput {
                error: Some(e.to_string()),
            },
        }
    }

    /// Re-checks a valid link against the window.
    pub fn follow(self, now: DateTime<Utc>, window: Duration) -> Self {
        match self {
            LoginState::LinkValid { link } if is_expired_at(link.issued_at, now, window) => {
                LoginState::LinkExpired {
                    username: link.username,
                }
            }
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::LinkValid { .. } | LoginState::LinkExpired { .. })
    }
}
