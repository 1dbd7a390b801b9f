use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;

use crate::auth::hasher::DEFAULT_ROUNDS;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// How a failed login is reported back to the caller.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Unknown user and wrong password look the same.
    Uniform,
    /// The caller learns which of the two happened.
    Distinct,
}

/// What a successful login hands back.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostLoginAction {
    Link,
    Redirect,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub link_secret: String,
    pub link_expiry_seconds: i64,
    pub failure_policy: FailurePolicy,
    pub pbkdf2_rounds: u32,
    pub post_login: PostLoginAction,
    pub dashboard_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", "development")?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("database.url", "sqlite://users.db")?
        .set_default("database.max_connections", 1)?
        .set_default("auth.link_secret", "development_secret")?
        .set_default("auth.link_expiry_seconds", 300)?
        .set_default("auth.failure_policy", "uniform")?
        .set_default("auth.pbkdf2_rounds", DEFAULT_ROUNDS as i64)?
        .set_default("auth.post_login", "link")?
        .set_default("auth.dashboard_path", "/dashboard")?
        .set_default("cors.enabled", true)?
        .set_default("cors.allow_any_origin", false)?
        .set_default("cors.max_age", 3600)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_env_prefix("app")
    }

    /// Loads defaults, then `config/default` and `config/{RUN_MODE}` files,
    /// then `<PREFIX>_`-prefixed environment variables.
    pub fn with_env_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_AUTH__FAILURE_POLICY=distinct` sets `Settings.auth.failure_policy`
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }

    /// Isolated settings backed by an in-memory database and a cheap hash cost.
    /// Ignores config files and the environment.
    pub fn in_memory() -> Result<Self, ConfigError> {
        with_defaults()?
            .set_override("environment", "test")?
            .set_override("database.url", "sqlite::memory:")?
            .set_override("database.max_connections", 1)?
            .set_override("auth.link_secret", "test_secret")?
            .set_override("auth.pbkdf2_rounds", 1000)?
            .set_override("server.workers", 1)?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const PREFIX: &str = "gatetest";

    fn cleanup_env() {
        for key in [
            "GATETEST_SERVER__PORT",
            "GATETEST_DATABASE__URL",
            "GATETEST_AUTH__FAILURE_POLICY",
            "GATETEST_AUTH__LINK_EXPIRY_SECONDS",
            "GATETEST_AUTH__POST_LOGIN",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::in_memory().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.database.max_connections, 1);
        assert_eq!(settings.auth.link_expiry_seconds, 300);
        assert_eq!(settings.auth.failure_policy, FailurePolicy::Uniform);
        assert_eq!(settings.auth.post_login, PostLoginAction::Link);
        assert_eq!(settings.auth.dashboard_path, "/dashboard");
    }

    #[test]
    fn test_environment_override() {
        cleanup_env();

        env::set_var("GATETEST_SERVER__PORT", "9000");
        env::set_var("GATETEST_DATABASE__URL", "sqlite://override.db");
        env::set_var("GATETEST_AUTH__FAILURE_POLICY", "distinct");
        env::set_var("GATETEST_AUTH__LINK_EXPIRY_SECONDS", "60");
        env::set_var("GATETEST_AUTH__POST_LOGIN", "redirect");

        let settings = Settings::with_env_prefix(PREFIX).expect("Failed to load settings");
        cleanup_env();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.workers as usize, num_cpus::get());
        assert_eq!(settings.database.url, "sqlite://override.db");
        assert_eq!(settings.auth.failure_policy, FailurePolicy::Distinct);
        assert_eq!(settings.auth.link_expiry_seconds, 60);
        assert_eq!(settings.auth.post_login, PostLoginAction::Redirect);
        assert_eq!(settings.auth.pbkdf2_rounds, DEFAULT_ROUNDS);
    }

    #[test]
    fn test_invalid_policy() {
        let result = with_defaults()
            .and_then(|b| b.set_override("auth.failure_policy", "sometimes"))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize::<Settings>());

        assert!(result.is_err(), "Expected error for unknown failure policy");
    }

    #[test]
    fn test_invalid_port() {
        let result = with_defaults()
            .and_then(|b| b.set_override("server.port", "invalid"))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize::<Settings>());

        assert!(result.is_err(), "Expected error for invalid port");
    }
}
