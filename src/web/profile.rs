//! The viewer's own account.

use crate::middleware::ClientCtx;
use crate::user::{self, ProfileChanges};
use actix_multipart::Multipart;
use actix_web::{error, get, patch, post, web, Error, HttpResponse};
use serde::Deserialize;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_profile)
        .service(update_profile)
        .service(upload_avatar);
}

#[derive(Deserialize, Validate)]
pub struct ProfileForm {
    #[validate(email)]
    email: Option<String>,
    #[validate(length(max = 32))]
    phone: Option<String>,
    #[validate(length(max = 5000))]
    bio: Option<String>,
}

/// GET /api/profile
#[get("/api/profile")]
pub async fn view_profile(client: ClientCtx) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let profile = client
        .get_user()
        .ok_or_else(|| error::ErrorUnauthorized("Login required"))?;

    Ok(HttpResponse::Ok().json(profile))
}

/// PATCH /api/profile
#[patch("/api/profile")]
pub async fn update_profile(
    client: ClientCtx,
    form: web::Json<ProfileForm>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    form.validate().map_err(|e| {
        log::debug!("Profile validation failed: {}", e);
        error::ErrorBadRequest("Invalid profile data")
    })?;

    let form = form.into_inner();
    if let Some(ref email) = form.email {
        let current = client.get_user().map(|p| p.email.as_str());
        let email = email.trim().to_lowercase();
        if current != Some(email.as_str())
            && user::is_email_taken(&email)
                .await
                .map_err(error::ErrorInternalServerError)?
        {
            return Err(error::ErrorConflict("Email is already registered."));
        }
    }

    let profile = user::update_profile(
        user_id,
        ProfileChanges {
            email: form.email,
            phone: form.phone,
            bio: form.bio,
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to update profile {}: {}", user_id, e);
        error::ErrorInternalServerError("Failed to update profile")
    })?;

    Ok(HttpResponse::Ok().json(profile))
}

/// POST /api/profile/avatar
#[post("/api/profile/avatar")]
pub async fn upload_avatar(client: ClientCtx, payload: Multipart) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    if let Err(e) = crate::rate_limit::check_upload_rate_limit(user_id) {
        return Err(error::ErrorTooManyRequests(format!(
            "Too many uploads. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    let upload = super::uploads::read_image_field(payload).await?;
    let key = super::uploads::store_upload(upload).await?;

    let profile = user::set_avatar(user_id, &key)
        .await
        .map_err(error::ErrorInternalServerError)?;

    log::debug!("User {} set avatar {}", user_id, key);
    Ok(HttpResponse::Ok().json(profile))
}
