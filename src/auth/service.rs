use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::hasher::CredentialHasher;
use crate::auth::link::{LinkIssuer, SessionLink};
use crate::config::FailurePolicy;
use crate::db::models::{NewUser, User};
use crate::db::operations::UserRepository;
use crate::error::{AppError, AuthError};
use crate::Result;

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn CredentialHasher>,
    links: LinkIssuer,
    failure_policy: FailurePolicy,
    // Verified against when the username is unknown, so both paths cost one hash
    dummy_digest: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn CredentialHasher>,
        links: LinkIssuer,
        failure_policy: FailurePolicy,
    ) -> Result<Self> {
        let dummy_digest = hasher.hash(&Uuid::new_v4().to_string())?;

        Ok(Self {
            users,
            hasher,
            links,
            failure_policy,
            dummy_digest,
        })
    }

    pub fn links(&self) -> &LinkIssuer {
        &self.links
    }

    pub async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<User> {
        validate_signup(username, email, password)?;

        let password_hash = self.hash(password).await?;
        let user = self
            .users
            .create_user(NewUser::new(username.to_string(), email.to_string(), password_hash))
            .await?;

        info!("Account created for {} (id {})", user.username, user.id);
        Ok(user)
    }

    /// `false` for an unknown user or a wrong password; errors only when the
    /// store or the hasher fails.
    pub async fn verify_user(&self, username: &str, password: &str) -> Result<bool> {
        match self.authenticate_inner(username, password).await? {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// Returns the user on success. Failure reasons follow the configured policy.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        match self.authenticate_inner(username, password).await? {
            Ok(user) => Ok(user),
            Err(reason) => {
                warn!("Login failed for {}: {}", username, reason);
                Err(match self.failure_policy {
                    FailurePolicy::Uniform => AuthError::InvalidCredentials,
                    FailurePolicy::Distinct => reason,
                }
                .into())
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<SessionLink> {
        let user = self.authenticate(username, password).await?;
        let link = self.links.issue(&user.username)?;
        info!("Login successful for {}", user.username);
        Ok(link)
    }

    pub fn is_link_expired(&self, issued_at: DateTime<Utc>) -> bool {
        self.links.is_link_expired(issued_at)
    }

    // Outer error: infrastructure. Inner error: the credentials didn't match.
    async fn authenticate_inner(
        &self,
        username: &str,
        password: &str,
    ) -> Result<std::result::Result<User, AuthError>> {
        let user = match self.users.find_by_username(username).await? {
            Some(user) => user,
            None => {
                self.verify(password, &self.dummy_digest).await?;
                return Ok(Err(AuthError::UnknownUser));
            }
        };

        if self.verify(password, &user.password_hash).await? {
            Ok(Ok(user))
        } else {
            Ok(Err(AuthError::WrongPassword))
        }
    }

    async fn hash(&self, password: &str) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?
    }

    async fn verify(&self, password: &str, digest: &str) -> Result<bool> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let digest = digest.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?
    }
}

fn validate_signup(username: &str, email: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AppError::ValidationError("Username must not be empty".into()));
    }
    if password.is_empty() {
        return Err(AppError::ValidationError("Password must not be empty".into()));
    }
    if !email.contains('@') {
        return Err(AppError::ValidationError("Email address is not valid".into()));
    }
    Ok(())
}
