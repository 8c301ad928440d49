//! Password hashing and bearer token sessions.

use crate::db::get_db_pool;
use crate::orm::{auth_tokens, users};
use crate::user::Profile;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::{NaiveDateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter,
};

/// Length of the raw bearer token handed to clients.
pub const TOKEN_LENGTH: usize = 48;

/// Argon2id with default cost parameters.
pub fn get_argon2() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    Ok(get_argon2()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

/// Check a password against a stored PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => get_argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Tokens are stored as blake3 hex digests.
pub fn hash_token(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Freshly issued credential. `token` is only ever available here.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: i32,
    pub expires_at: NaiveDateTime,
}

/// Issue a new bearer token for a user.
pub async fn issue_token(user_id: i32) -> Result<IssuedToken, DbErr> {
    let token = generate_token();
    let now = Utc::now().naive_utc();
    let lifetime = chrono::Duration::hours(crate::app_config::auth().token_lifetime_hours as i64);
    let expires_at = now + lifetime;

    auth_tokens::ActiveModel {
        token_hash: Set(hash_token(&token)),
        user_id: Set(user_id),
        created_at: Set(now),
        expires_at: Set(expires_at),
    }
    .insert(get_db_pool())
    .await?;

    log::debug!("Issued auth token for user {}", user_id);

    Ok(IssuedToken {
        token,
        user_id,
        expires_at,
    })
}

/// Resolve a bearer token to its user. Expired tokens are deleted on sight.
pub async fn authenticate_by_token(token: &str) -> Result<Option<Profile>, DbErr> {
    if token.is_empty() {
        return Ok(None);
    }

    let db = get_db_pool();
    let hash = hash_token(token);

    let found = auth_tokens::Entity::find_by_id(hash.clone())
        .find_also_related(users::Entity)
        .one(db)
        .await?;

    let (session, user) = match found {
        Some((session, Some(user))) => (session, user),
        _ => return Ok(None),
    };

    if session.expires_at <= Utc::now().naive_utc() {
        auth_tokens::Entity::delete_by_id(hash).exec(db).await?;
        return Ok(None);
    }

    Ok(Some(Profile::from(user)))
}

/// Revoke a single token. Returns whether it existed.
pub async fn revoke_token(token: &str) -> Result<bool, DbErr> {
    let result = auth_tokens::Entity::delete_by_id(hash_token(token))
        .exec(get_db_pool())
        .await?;

    Ok(result.rows_affected > 0)
}

/// Drop every expired token. Run periodically by the server.
pub async fn purge_expired_tokens() -> Result<u64, DbErr> {
    let result = auth_tokens::Entity::delete_many()
        .filter(auth_tokens::Column::ExpiresAt.lte(Utc::now().naive_utc()))
        .exec(get_db_pool())
        .await?;

    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse battery").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("correct horse", &hash));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_generated_tokens_are_alphanumeric() {
        let a = generate_token();
        let b = generate_token();

        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_hash_is_stable_hex() {
        let hash = hash_token("abc");

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, hash_token("abd"));
    }
}
