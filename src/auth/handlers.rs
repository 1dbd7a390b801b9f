use actix_web::{http::{header, StatusCode}, web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::flow::LoginState;
use crate::auth::link::{LinkIssuer, SessionLink};
use crate::config::PostLoginAction;
use crate::db::User;
use crate::error::{AppError, AuthError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub link: String,
    pub issued_at: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub token: String,
}

pub async fn signup(
    req: web::Json<SignupRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received signup request for username: {}", req.username);

    let user = state
        .auth_service
        .create_user(&req.username, &req.email, &req.password)
        .await
        .map_err(|e| {
            warn!("Signup failed for username: {}: {}", req.username, e);
            e
        })?;

    Ok(HttpResponse::Created().json(SignupResponse {
        message: format!("Account created for {}! You can now login.", user.username),
        user,
    }))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for username: {}", req.username);
    let window = state.auth_service.links().window();

    // Infrastructure failures are not a login outcome
    let outcome = match state.auth_service.login(&req.username, &req.password).await {
        Err(e) if !matches!(e, AppError::AuthError(_)) => return Err(e),
        other => other,
    };

    let login_state = LoginState::default()
        .submit(&req.username)
        .complete(outcome, Utc::now(), window);

    match login_state {
        LoginState::LinkValid { link } => Ok(link_response(&state, &link)),
        LoginState::LinkExpired { .. } => Err(AuthError::LinkExpired.into()),
        LoginState::AwaitingInput { error } => {
            warn!("Login rejected for username: {}", req.username);
            let status = StatusCode::UNAUTHORIZED;
            Ok(HttpResponse::build(status).json(serde_json::json!({
                "error": {
                    "status": status.as_u16(),
                    "message": error.unwrap_or_else(|| AuthError::InvalidCredentials.to_string()),
                }
            })))
        }
        LoginState::Verifying { .. } => Err(AppError::InternalError("Login did not complete".into())),
    }
}

fn link_response(state: &AppState, link: &SessionLink) -> HttpResponse {
    let url = format!("{}?token={}", state.config.auth.dashboard_path, link.token);
    let body = LoginResponse {
        message: format!("Welcome, {}!", link.username),
        link: url.clone(),
        issued_at: link.issued_at.to_rfc3339(),
        expires_at: link.expires_at.to_rfc3339(),
    };

    match state.config.auth.post_login {
        PostLoginAction::Link => HttpResponse::Ok().json(body),
        PostLoginAction::Redirect => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, url))
            .json(body),
    }
}

/// Target of the post-login link.
pub async fn dashboard(
    query: web::Query<LinkQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let links = state.auth_service.links();
    let claims = links.decode(&query.token)?;
    let issued_at = LinkIssuer::issued_at(&claims)?;

    if state.auth_service.is_link_expired(issued_at) {
        info!("Expired link presented for {} (link {})", claims.sub, claims.jti);
        return Err(AuthError::LinkExpired.into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "username": claims.sub,
        "message": format!("Welcome, {}!", claims.sub),
    })))
}
