//! In-memory caching for frequently accessed data.
//! Uses moka for TTL-based caching with LRU eviction.

use moka::sync::Cache;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Cache for the server-side unread message total with a 30 second TTL.
/// Key is user_id, value is the count of unread messages across the inbox.
static UNREAD_COUNT_CACHE: Lazy<Cache<i32, i64>> = Lazy::new(|| {
    Cache::builder()
        .time_to_live(Duration::from_secs(30))
        .max_capacity(10_000)
        .build()
});

/// Get the unread total for a user, using cache if available.
/// Falls back to database query if cache miss.
pub async fn get_unread_count(user_id: i32) -> Result<i64, sea_orm::DbErr> {
    Ok(get_unread_count_with_status(user_id).await?.0)
}

/// Get the unread total for a user with cache hit status.
/// Returns (count, was_cache_hit).
pub async fn get_unread_count_with_status(user_id: i32) -> Result<(i64, bool), sea_orm::DbErr> {
    if let Some(cached) = UNREAD_COUNT_CACHE.get(&user_id) {
        return Ok((cached, true));
    }

    let count = crate::conversations::count_unread_messages(user_id).await?;
    UNREAD_COUNT_CACHE.insert(user_id, count);

    Ok((count, false))
}

/// Invalidate the unread total for a user.
/// Called whenever a message is appended to, or read in, one of their conversations.
pub fn invalidate_unread_count(user_id: i32) {
    UNREAD_COUNT_CACHE.invalidate(&user_id);
}

/// Drop every cached total (user ids are reused after a database reset).
pub fn invalidate_all() {
    UNREAD_COUNT_CACHE.invalidate_all();
}
