//! Property listing routes and the owner dashboard.

use crate::middleware::ClientCtx;
use crate::orm::properties::{self as property_rows, ListingKind};
use crate::properties::{
    self, ImageView, NewProperty, PropertyChanges, PropertyFilter, PropertyView,
};
use actix_multipart::Multipart;
use actix_web::{delete, error, get, patch, post, web, Error, HttpResponse};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(list_properties)
        .service(view_dashboard)
        .service(create_property)
        .service(view_property)
        .service(update_property)
        .service(delete_property)
        .service(upload_image);
}

#[derive(Deserialize)]
pub struct ListQuery {
    city: Option<String>,
    kind: Option<ListingKind>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    page: Option<u64>,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PropertyForm {
    #[validate(length(min = 1, max = 200))]
    title: String,
    #[serde(default)]
    #[validate(length(max = 20000))]
    description: String,
    price_cents: i64,
    listing_kind: ListingKind,
    #[validate(length(min = 1, max = 255))]
    address: String,
    #[validate(length(min = 1, max = 100))]
    city: String,
    #[validate(range(min = 0, max = 100))]
    bedrooms: i16,
    #[validate(range(min = 0, max = 100))]
    bathrooms: i16,
    #[validate(range(min = 1))]
    area_sqm: Option<i32>,
    #[serde(default)]
    is_published: bool,
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPatch {
    #[validate(length(min = 1, max = 200))]
    title: Option<String>,
    #[validate(length(max = 20000))]
    description: Option<String>,
    price_cents: Option<i64>,
    listing_kind: Option<ListingKind>,
    #[validate(length(min = 1, max = 255))]
    address: Option<String>,
    #[validate(length(min = 1, max = 100))]
    city: Option<String>,
    #[validate(range(min = 0, max = 100))]
    bedrooms: Option<i16>,
    #[validate(range(min = 0, max = 100))]
    bathrooms: Option<i16>,
    #[serde(default, deserialize_with = "present")]
    area_sqm: Option<Option<i32>>,
    is_published: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    properties: Vec<PropertyView>,
    unread_total: i64,
}

fn invalid(e: validator::ValidationErrors) -> Error {
    log::debug!("Property validation failed: {}", e);
    error::ErrorBadRequest("Invalid listing data")
}

fn check_price(price_cents: Option<i64>) -> Result<(), Error> {
    match price_cents {
        Some(price) if price < 0 => Err(error::ErrorBadRequest("Price cannot be negative.")),
        _ => Ok(()),
    }
}

async fn load_property(id: i32) -> Result<property_rows::Model, Error> {
    properties::get_property(id)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Listing not found."))
}

/// GET /api/properties
#[get("/api/properties")]
pub async fn list_properties(query: web::Query<ListQuery>) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    let filter = PropertyFilter {
        city: query.city.filter(|c| !c.trim().is_empty()),
        kind: query.kind,
        min_price_cents: query.min_price,
        max_price_cents: query.max_price,
    };

    let listings = properties::list_published(&filter, query.page.unwrap_or(1))
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(listings))
}

/// GET /api/dashboard
///
/// The viewer's listings and their unread message total.
#[get("/api/dashboard")]
pub async fn view_dashboard(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    let properties = properties::list_by_owner(user_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let unread_total = crate::cache::get_unread_count(user_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(Dashboard {
        properties,
        unread_total,
    }))
}

/// POST /api/properties
#[post("/api/properties")]
pub async fn create_property(
    client: ClientCtx,
    form: web::Json<PropertyForm>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    form.validate().map_err(invalid)?;
    check_price(Some(form.price_cents))?;

    let form = form.into_inner();
    let property = properties::create_property(
        user_id,
        NewProperty {
            title: form.title.trim().to_owned(),
            description: form.description,
            price_cents: form.price_cents,
            listing_kind: form.listing_kind,
            address: form.address.trim().to_owned(),
            city: form.city.trim().to_owned(),
            bedrooms: form.bedrooms,
            bathrooms: form.bathrooms,
            area_sqm: form.area_sqm,
            is_published: form.is_published,
        },
    )
    .await
    .map_err(|e| {
        log::error!("Failed to create listing: {}", e);
        error::ErrorInternalServerError("Failed to create listing")
    })?;

    Ok(HttpResponse::Created().json(PropertyView::new(property, vec![])))
}

/// GET /api/properties/{id}
///
/// Drafts look missing to everyone but their owner.
#[get("/api/properties/{id}")]
pub async fn view_property(client: ClientCtx, path: web::Path<i32>) -> Result<HttpResponse, Error> {
    let property = load_property(path.into_inner()).await?;
    if !properties::is_visible_to(&property, client.get_id()) {
        return Err(error::ErrorNotFound("Listing not found."));
    }

    let images = properties::get_images(property.id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(PropertyView::new(property, images)))
}

/// PATCH /api/properties/{id}
#[patch("/api/properties/{id}")]
pub async fn update_property(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<PropertyPatch>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    form.validate().map_err(invalid)?;
    check_price(form.price_cents)?;

    let property = load_property(path.into_inner()).await?;
    client.require_ownership(property.owner_id)?;

    let form = form.into_inner();
    let updated = properties::update_property(
        property,
        PropertyChanges {
            title: form.title.map(|t| t.trim().to_owned()),
            description: form.description,
            price_cents: form.price_cents,
            listing_kind: form.listing_kind,
            address: form.address.map(|a| a.trim().to_owned()),
            city: form.city.map(|c| c.trim().to_owned()),
            bedrooms: form.bedrooms,
            bathrooms: form.bathrooms,
            area_sqm: form.area_sqm,
            is_published: form.is_published,
        },
    )
    .await
    .map_err(error::ErrorInternalServerError)?;

    let images = properties::get_images(updated.id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(PropertyView::new(updated, images)))
}

/// DELETE /api/properties/{id}
#[delete("/api/properties/{id}")]
pub async fn delete_property(client: ClientCtx, path: web::Path<i32>) -> Result<HttpResponse, Error> {
    client.require_login()?;

    let property = load_property(path.into_inner()).await?;
    client.require_ownership(property.owner_id)?;

    properties::delete_property(property.id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/properties/{id}/images
#[post("/api/properties/{id}/images")]
pub async fn upload_image(
    client: ClientCtx,
    path: web::Path<i32>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    let property = load_property(path.into_inner()).await?;
    client.require_ownership(property.owner_id)?;

    if let Err(e) = crate::rate_limit::check_upload_rate_limit(user_id) {
        return Err(error::ErrorTooManyRequests(format!(
            "Too many uploads. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    let max_images = crate::app_config::storage().max_images_per_property as u64;
    let existing = properties::count_images(property.id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    if existing >= max_images {
        return Err(error::ErrorConflict(format!(
            "A listing may have at most {} images.",
            max_images
        )));
    }

    let upload = super::uploads::read_image_field(payload).await?;
    let content_type = upload.content_type.clone();
    let key = super::uploads::store_upload(upload).await?;

    let image = properties::add_image(property.id, &key, &content_type)
        .await
        .map_err(error::ErrorInternalServerError)?;

    log::debug!("Stored image {} for listing {}", key, property.id);
    Ok(HttpResponse::Created().json(ImageView::from(image)))
}
