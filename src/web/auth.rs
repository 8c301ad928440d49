//! Account registration and bearer token issuance.

use crate::middleware::ClientCtx;
use crate::session::{hash_password, issue_token, revoke_token, verify_password};
use actix_web::{error, post, web, Error, HttpRequest, HttpResponse};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(register).service(login).service(logout);
}

#[derive(Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 1, max = 64))]
    name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 1000))]
    password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    name: String,
    password: String,
}

#[derive(Serialize)]
struct Registered {
    id: i32,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    user_id: i32,
    expires_at: NaiveDateTime,
}

/// POST /api/auth/register
#[post("/api/auth/register")]
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterForm>,
) -> Result<HttpResponse, Error> {
    let ip = crate::ip::client_ip_or_unknown(&req);

    if let Err(e) = crate::rate_limit::check_registration_rate_limit(&ip) {
        log::warn!("Rate limit exceeded for registration: ip={}", ip);
        return Err(error::ErrorTooManyRequests(format!(
            "Too many registration attempts. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    form.validate().map_err(|e| {
        log::debug!("User registration validation failed: {}", e);
        error::ErrorBadRequest("Invalid registration data")
    })?;

    let name = form.name.trim();
    let email = form.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(error::ErrorBadRequest("Invalid registration data"));
    }

    let taken = crate::user::is_name_or_email_taken(name, &email)
        .await
        .map_err(error::ErrorInternalServerError)?;
    if taken {
        return Err(error::ErrorConflict("Name or email is already registered."));
    }

    let password_hash = hash_password(&form.password).map_err(|e| {
        log::error!("Failed to hash password: {}", e);
        error::ErrorInternalServerError("Failed to create user")
    })?;

    let user = crate::user::insert_user(name, &email, &password_hash)
        .await
        .map_err(|e| {
            log::error!("Failed to create user: {}", e);
            error::ErrorInternalServerError("Failed to create user")
        })?;

    log::info!("New user registered: {} (user_id: {})", user.name, user.id);

    Ok(HttpResponse::Created().json(Registered {
        id: user.id,
        name: user.name,
    }))
}

/// POST /api/auth/login
#[post("/api/auth/login")]
pub async fn login(req: HttpRequest, form: web::Json<LoginForm>) -> Result<HttpResponse, Error> {
    let ip = crate::ip::client_ip_or_unknown(&req);
    let name = form.name.trim();

    if let Err(e) = crate::rate_limit::check_login_rate_limit(&ip, name) {
        log::warn!("Rate limit exceeded for login: ip={}, name={}", ip, name);
        return Err(error::ErrorTooManyRequests(format!(
            "Too many login attempts. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    let user = crate::user::find_by_name(name)
        .await
        .map_err(error::ErrorInternalServerError)?;

    let user = match user {
        Some(user) if verify_password(&form.password, &user.password) => user,
        _ => {
            log::debug!("Failed login for name={} from ip={}", name, ip);
            return Err(error::ErrorUnauthorized("Invalid name or password."));
        }
    };

    crate::rate_limit::clear_login_attempts(&ip, name);

    let issued = issue_token(user.id).await.map_err(|e| {
        log::error!("Failed to issue token: {}", e);
        error::ErrorInternalServerError("Failed to log in")
    })?;

    log::info!("User {} logged in", user.id);

    Ok(HttpResponse::Ok().json(LoginResponse {
        token: issued.token,
        user_id: issued.user_id,
        expires_at: issued.expires_at,
    }))
}

/// POST /api/auth/logout
///
/// Revokes the presented token only; other sessions stay valid.
#[post("/api/auth/logout")]
pub async fn logout(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    if let Some(token) = client.get_token() {
        revoke_token(token)
            .await
            .map_err(error::ErrorInternalServerError)?;
    }

    log::debug!("User {} logged out", user_id);
    Ok(HttpResponse::NoContent().finish())
}
