use crate::db::get_db_pool;
use crate::orm::users;
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbBackend, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Statement,
};
use serde::Serialize;

/// Public and private account details of a user, minus credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<users::Model> for Profile {
    fn from(user: users::Model) -> Self {
        Self {
            avatar: user
                .avatar_key
                .as_deref()
                .map(crate::web::uploads::upload_url),
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            bio: user.bio,
            created_at: user.created_at,
        }
    }
}

impl Profile {
    /// Returns a user profile by id.
    pub async fn get_by_id(id: i32) -> Result<Option<Self>, DbErr> {
        Ok(users::Entity::find_by_id(id)
            .one(get_db_pool())
            .await?
            .map(Self::from))
    }
}

/// Case-insensitive name lookup. Returns the full row including the password hash.
pub async fn find_by_name(name: &str) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find()
        .from_raw_sql(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"SELECT * FROM users WHERE LOWER(name) = LOWER($1) LIMIT 1"#,
            vec![name.into()],
        ))
        .one(get_db_pool())
        .await
}

/// Whether a name or email is already taken (case-insensitive on both).
pub async fn is_name_or_email_taken(name: &str, email: &str) -> Result<bool, DbErr> {
    if find_by_name(name).await?.is_some() {
        return Ok(true);
    }

    is_email_taken(email).await
}

pub async fn is_email_taken(email: &str) -> Result<bool, DbErr> {
    let emails = users::Entity::find()
        .filter(users::Column::Email.eq(email.trim().to_lowercase()))
        .count(get_db_pool())
        .await?;

    Ok(emails > 0)
}

/// Insert a new user with an already hashed password.
pub async fn insert_user(name: &str, email: &str, password_hash: &str) -> Result<users::Model, DbErr> {
    users::ActiveModel {
        name: Set(name.to_owned()),
        email: Set(email.to_lowercase()),
        password: Set(password_hash.to_owned()),
        avatar_key: Set(None),
        phone: Set(None),
        bio: Set(None),
        created_at: Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await
}

/// Editable profile fields. `None` leaves a field unchanged; an empty string clears
/// an optional field.
#[derive(Clone, Debug, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Apply profile changes and return the updated profile.
pub async fn update_profile(user_id: i32, changes: ProfileChanges) -> Result<Profile, DbErr> {
    let db = get_db_pool();
    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("user {}", user_id)))?;

    let mut active: users::ActiveModel = user.into();

    if let Some(email) = changes.email {
        active.email = Set(email.trim().to_lowercase());
    }
    if let Some(phone) = changes.phone {
        active.phone = Set(non_empty(phone));
    }
    if let Some(bio) = changes.bio {
        active.bio = Set(non_empty(bio));
    }

    Ok(Profile::from(active.update(db).await?))
}

/// Point the user's avatar at a stored upload.
pub async fn set_avatar(user_id: i32, storage_key: &str) -> Result<Profile, DbErr> {
    let db = get_db_pool();
    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("user {}", user_id)))?;

    let mut active: users::ActiveModel = user.into();
    active.avatar_key = Set(Some(storage_key.to_owned()));

    Ok(Profile::from(active.update(db).await?))
}
