pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use actix_web::{web, HttpResponse};
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, CredentialHasher, LinkIssuer, Pbkdf2Hasher};
pub use db::{DbOperations, User, UserRepository};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Registers every route of the service.
pub fn configure_routes(cfg: &mut web::ServiceConfig, dashboard_path: &str) {
    cfg.route("/health", web::get().to(health_check))
        .route("/auth/signup", web::post().to(auth::handlers::signup))
        .route("/auth/login", web::post().to(auth::handlers::login))
        .route(dashboard_path, web::get().to(auth::handlers::dashboard));
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db: DbOperations,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::connect(&config.database).await?;

        let auth_service = AuthService::new(
            Arc::new(db.clone()),
            Arc::new(Pbkdf2Hasher::new(config.auth.pbkdf2_rounds)),
            LinkIssuer::new(config.auth.link_secret.clone(), config.auth.link_expiry_seconds),
            config.auth.failure_policy,
        )?;

        Ok(Self {
            config: Arc::new(config),
            db,
            auth_service: Arc::new(auth_service),
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.db.close().await;
        info!("Credential store closed");
        Ok(())
    }
}
