//! Test fixtures for creating test data
#![allow(dead_code)]

use chrono::Utc;
use realty::orm::properties::ListingKind;
use realty::orm::{properties, users};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr};

/// Test user fixture
pub struct TestUser {
    pub id: i32,
    pub name: String,
    pub password: String, // Plain text password for testing
}

/// Create a test user with known credentials
pub async fn create_test_user(
    db: &DatabaseConnection,
    name: &str,
    password: &str,
) -> Result<TestUser, DbErr> {
    let password_hash = realty::session::hash_password(password)
        .map_err(|e| DbErr::Custom(format!("Password hashing failed: {}", e)))?;

    let user = users::ActiveModel {
        name: Set(name.to_string()),
        email: Set(format!("{}@test.com", name.to_lowercase())),
        password: Set(password_hash),
        avatar_key: Set(None),
        phone: Set(None),
        bio: Set(None),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(TestUser {
        id: user.id,
        name: name.to_string(),
        password: password.to_string(),
    })
}

/// Create a user and issue a bearer token for them
pub async fn create_logged_in_user(
    db: &DatabaseConnection,
    name: &str,
) -> Result<(TestUser, String), DbErr> {
    let user = create_test_user(db, name, "password123").await?;
    let issued = realty::session::issue_token(user.id).await?;
    Ok((user, issued.token))
}

/// Create a listing owned by `owner_id`
pub async fn create_test_property(
    db: &DatabaseConnection,
    owner_id: i32,
    city: &str,
    listing_kind: ListingKind,
    price_cents: i64,
    is_published: bool,
) -> Result<properties::Model, DbErr> {
    let now = Utc::now().naive_utc();

    properties::ActiveModel {
        owner_id: Set(owner_id),
        title: Set(format!("Home in {}", city)),
        description: Set("Bright and quiet.".to_string()),
        price_cents: Set(price_cents),
        listing_kind: Set(listing_kind),
        address: Set("1 Test Street".to_string()),
        city: Set(city.to_string()),
        bedrooms: Set(2),
        bathrooms: Set(1),
        area_sqm: Set(Some(65)),
        is_published: Set(is_published),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// `Authorization` header value for a token
pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
