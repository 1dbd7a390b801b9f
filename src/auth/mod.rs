//! Authentication module
//!
//! Account creation, credential verification, and the time-boxed link
//! handed out after a successful login.

pub mod flow;
pub mod handlers;
pub mod hasher;
pub mod link;
mod service;

pub use flow::LoginState;
pub use hasher::{CredentialHasher, Pbkdf2Hasher};
pub use link::{is_link_expired, LinkClaims, LinkIssuer, SessionLink, LINK_EXPIRY_WINDOW_SECS};
pub use service::AuthService;
