//! Credential store
//!
//! A single `users` table in a local SQLite database. The pool is opened
//! once by the caller and handed around explicitly.

pub mod models;
pub mod operations;

pub use models::{NewUser, User};
pub use operations::{DbOperations, UserRepository};
