//! Property listings and their images.

use crate::db::get_db_pool;
use crate::orm::properties::{self, ListingKind};
use crate::orm::property_images;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;

/// Search filters for the public listing index.
#[derive(Clone, Debug, Default)]
pub struct PropertyFilter {
    pub city: Option<String>,
    pub kind: Option<ListingKind>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
}

/// Listing as returned by the API.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyView {
    pub id: i32,
    pub owner_id: i32,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub listing_kind: ListingKind,
    pub address: String,
    pub city: String,
    pub bedrooms: i16,
    pub bathrooms: i16,
    pub area_sqm: Option<i32>,
    pub is_published: bool,
    pub images: Vec<ImageView>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub id: i32,
    pub url: String,
    pub content_type: String,
    pub position: i32,
}

impl From<property_images::Model> for ImageView {
    fn from(image: property_images::Model) -> Self {
        Self {
            url: crate::web::uploads::upload_url(&image.storage_key),
            id: image.id,
            content_type: image.content_type,
            position: image.position,
        }
    }
}

impl PropertyView {
    pub fn new(property: properties::Model, images: Vec<property_images::Model>) -> Self {
        Self {
            id: property.id,
            owner_id: property.owner_id,
            title: property.title,
            description: property.description,
            price_cents: property.price_cents,
            listing_kind: property.listing_kind,
            address: property.address,
            city: property.city,
            bedrooms: property.bedrooms,
            bathrooms: property.bathrooms,
            area_sqm: property.area_sqm,
            is_published: property.is_published,
            images: images.into_iter().map(ImageView::from).collect(),
            created_at: property.created_at,
            updated_at: property.updated_at,
        }
    }
}

/// Fields for a new listing. Validated by the caller.
#[derive(Clone, Debug)]
pub struct NewProperty {
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub listing_kind: ListingKind,
    pub address: String,
    pub city: String,
    pub bedrooms: i16,
    pub bathrooms: i16,
    pub area_sqm: Option<i32>,
    pub is_published: bool,
}

/// Partial update of a listing. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct PropertyChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub listing_kind: Option<ListingKind>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub bedrooms: Option<i16>,
    pub bathrooms: Option<i16>,
    pub area_sqm: Option<Option<i32>>,
    pub is_published: Option<bool>,
}

fn filter_condition(filter: &PropertyFilter) -> Condition {
    let mut cond = Condition::all().add(properties::Column::IsPublished.eq(true));

    if let Some(ref city) = filter.city {
        cond = cond.add(Expr::cust_with_values(
            "LOWER(\"properties\".\"city\") = ?",
            vec![sea_orm::Value::from(city.trim().to_lowercase())],
        ));
    }
    if let Some(kind) = filter.kind {
        cond = cond.add(properties::Column::ListingKind.eq(kind));
    }
    if let Some(min) = filter.min_price_cents {
        cond = cond.add(properties::Column::PriceCents.gte(min));
    }
    if let Some(max) = filter.max_price_cents {
        cond = cond.add(properties::Column::PriceCents.lte(max));
    }

    cond
}

/// Published listings matching `filter`, newest first. `page` starts at 1.
pub async fn list_published(
    filter: &PropertyFilter,
    page: u64,
) -> Result<Vec<PropertyView>, DbErr> {
    let per_page = crate::app_config::limits().properties_per_page.max(1) as u64;
    let offset = page.saturating_sub(1) * per_page;

    let rows = properties::Entity::find()
        .filter(filter_condition(filter))
        .order_by_desc(properties::Column::CreatedAt)
        .order_by_desc(properties::Column::Id)
        .limit(per_page)
        .offset(offset)
        .all(get_db_pool())
        .await?;

    with_images(rows).await
}

/// Listings owned by a user, including unpublished ones.
pub async fn list_by_owner(owner_id: i32) -> Result<Vec<PropertyView>, DbErr> {
    let rows = properties::Entity::find()
        .filter(properties::Column::OwnerId.eq(owner_id))
        .order_by_desc(properties::Column::UpdatedAt)
        .all(get_db_pool())
        .await?;

    with_images(rows).await
}

async fn with_images(rows: Vec<properties::Model>) -> Result<Vec<PropertyView>, DbErr> {
    let mut views = Vec::with_capacity(rows.len());
    for property in rows {
        let images = get_images(property.id).await?;
        views.push(PropertyView::new(property, images));
    }
    Ok(views)
}

/// A single listing row.
pub async fn get_property(id: i32) -> Result<Option<properties::Model>, DbErr> {
    properties::Entity::find_by_id(id).one(get_db_pool()).await
}

/// Images of a listing in display order.
pub async fn get_images(property_id: i32) -> Result<Vec<property_images::Model>, DbErr> {
    property_images::Entity::find()
        .filter(property_images::Column::PropertyId.eq(property_id))
        .order_by_asc(property_images::Column::Position)
        .order_by_asc(property_images::Column::Id)
        .all(get_db_pool())
        .await
}

/// A listing is visible to everyone once published and always to its owner.
pub fn is_visible_to(property: &properties::Model, viewer_id: Option<i32>) -> bool {
    property.is_published || viewer_id == Some(property.owner_id)
}

pub async fn create_property(owner_id: i32, new: NewProperty) -> Result<properties::Model, DbErr> {
    let now = Utc::now().naive_utc();

    let property = properties::ActiveModel {
        owner_id: Set(owner_id),
        title: Set(new.title),
        description: Set(new.description),
        price_cents: Set(new.price_cents),
        listing_kind: Set(new.listing_kind),
        address: Set(new.address),
        city: Set(new.city),
        bedrooms: Set(new.bedrooms),
        bathrooms: Set(new.bathrooms),
        area_sqm: Set(new.area_sqm),
        is_published: Set(new.is_published),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await?;

    log::info!("User {} listed property {}", owner_id, property.id);
    Ok(property)
}

pub async fn update_property(
    property: properties::Model,
    changes: PropertyChanges,
) -> Result<properties::Model, DbErr> {
    let mut active: properties::ActiveModel = property.into();

    if let Some(v) = changes.title {
        active.title = Set(v);
    }
    if let Some(v) = changes.description {
        active.description = Set(v);
    }
    if let Some(v) = changes.price_cents {
        active.price_cents = Set(v);
    }
    if let Some(v) = changes.listing_kind {
        active.listing_kind = Set(v);
    }
    if let Some(v) = changes.address {
        active.address = Set(v);
    }
    if let Some(v) = changes.city {
        active.city = Set(v);
    }
    if let Some(v) = changes.bedrooms {
        active.bedrooms = Set(v);
    }
    if let Some(v) = changes.bathrooms {
        active.bathrooms = Set(v);
    }
    if let Some(v) = changes.area_sqm {
        active.area_sqm = Set(v);
    }
    if let Some(v) = changes.is_published {
        active.is_published = Set(v);
    }
    active.updated_at = Set(Utc::now().naive_utc());

    active.update(get_db_pool()).await
}

/// Delete a listing. Images cascade; conversations about it keep existing
/// with `property_id` cleared.
pub async fn delete_property(id: i32) -> Result<bool, DbErr> {
    let result = properties::Entity::delete_by_id(id)
        .exec(get_db_pool())
        .await?;

    Ok(result.rows_affected > 0)
}

/// Number of images attached to a listing.
pub async fn count_images(property_id: i32) -> Result<u64, DbErr> {
    let count = property_images::Entity::find()
        .filter(property_images::Column::PropertyId.eq(property_id))
        .count(get_db_pool())
        .await?;

    Ok(count as u64)
}

/// Append an image after the existing ones.
pub async fn add_image(
    property_id: i32,
    storage_key: &str,
    content_type: &str,
) -> Result<property_images::Model, DbErr> {
    let position = count_images(property_id).await?;

    property_images::ActiveModel {
        property_id: Set(property_id),
        storage_key: Set(storage_key.to_owned()),
        content_type: Set(content_type.to_owned()),
        position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await
}
