/// Rate limiting for login, registration, messaging and uploads
///
/// Implements sliding window rate limiting using in-memory storage (DashMap).
/// This is suitable for single-instance deployments.
///
/// Limits come from the `[rate_limit]` config section and can be swapped at
/// runtime with [`init_rate_limits`].
///
/// # Example Usage
///
/// ```rust,ignore
/// use crate::rate_limit::check_login_rate_limit;
///
/// if let Err(e) = check_login_rate_limit("192.168.1.1", "username") {
///     return Err(error::ErrorTooManyRequests(
///         format!("Too many attempts. Try again in {} seconds", e.retry_after_seconds)
///     ));
/// }
/// ```
use arc_swap::ArcSwap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global rate limiter instance
pub static RATE_LIMITER: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::new()));

/// Global rate limit configuration (hot-reloadable)
static RATE_LIMIT_CONFIG: Lazy<ArcSwap<RateLimitConfig>> =
    Lazy::new(|| ArcSwap::from_pointee(RateLimitConfig::default()));

/// Resolved rate limits
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_max: usize,
    pub login_window: Duration,
    pub registration_max: usize,
    pub registration_window: Duration,
    pub message_max: usize,
    pub message_window: Duration,
    pub upload_max: usize,
    pub upload_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from_config(&crate::app_config::RateLimitConfig::default())
    }
}

impl RateLimitConfig {
    /// Resolve limits from the `[rate_limit]` config section
    pub fn from_config(config: &crate::app_config::RateLimitConfig) -> Self {
        Self {
            login_max: config.login_max_attempts as usize,
            login_window: Duration::from_secs(config.login_window_seconds as u64),
            registration_max: config.registration_per_hour as usize,
            registration_window: Duration::from_secs(3600),
            message_max: config.messages_per_minute as usize,
            message_window: Duration::from_secs(60),
            upload_max: config.uploads_per_minute as usize,
            upload_window: Duration::from_secs(60),
        }
    }
}

/// Install limits from config (call at startup after loading config)
pub fn init_rate_limits(config: &crate::app_config::RateLimitConfig) {
    RATE_LIMIT_CONFIG.store(Arc::new(RateLimitConfig::from_config(config)));
    log::info!("Rate limit configuration initialized");
}

/// Get the current rate limit configuration
pub fn get_rate_limit_config() -> Arc<RateLimitConfig> {
    RATE_LIMIT_CONFIG.load_full()
}

/// Rate limiter using in-memory storage
pub struct RateLimiter {
    /// Map of (action_type:identifier) -> Request timestamps
    requests: DashMap<String, Vec<Instant>>,
}

/// Error returned when rate limit is exceeded
#[derive(Debug, Clone)]
pub struct RateLimitError {
    /// Number of seconds until the rate limit resets
    pub retry_after_seconds: u64,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limit exceeded, retry in {} seconds",
            self.retry_after_seconds
        )
    }
}

impl std::error::Error for RateLimitError {}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    /// Record a request for `action`/`identifier` unless `max_requests` were
    /// already made within `window`.
    pub fn check_rate_limit(
        &self,
        action: &str,
        identifier: &str,
        max_requests: usize,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let key = format!("{}:{}", action, identifier);
        let now = Instant::now();

        let mut entry = self.requests.entry(key).or_default();

        // Sliding window
        entry.retain(|&timestamp| now.duration_since(timestamp) < window);

        if entry.len() >= max_requests {
            let retry_after = match entry.first() {
                Some(&oldest) => window.saturating_sub(now.duration_since(oldest)),
                None => window,
            };

            return Err(RateLimitError {
                retry_after_seconds: retry_after.as_secs() + 1, // Round up
            });
        }

        entry.push(now);

        Ok(())
    }

    /// Drop timestamps older than `max_age` and remove keys left empty.
    pub fn cleanup_old_entries(&self, max_age: Duration) {
        let now = Instant::now();
        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&timestamp| now.duration_since(timestamp) < max_age);
            !timestamps.is_empty()
        });
    }

    /// Clear all requests for a specific action/identifier
    pub fn clear_requests(&self, action: &str, identifier: &str) {
        let key = format!("{}:{}", action, identifier);
        self.requests.remove(&key);
    }

    /// Number of tracked keys (for monitoring/debugging)
    pub fn tracked_keys_count(&self) -> usize {
        self.requests.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Login attempts per IP+username combination
pub fn check_login_rate_limit(ip: &str, username: &str) -> Result<(), RateLimitError> {
    let config = get_rate_limit_config();
    RATE_LIMITER.check_rate_limit(
        "login",
        &format!("{}:{}", ip, username.to_lowercase()),
        config.login_max,
        config.login_window,
    )
}

/// Reset the login window after a successful login
pub fn clear_login_attempts(ip: &str, username: &str) {
    RATE_LIMITER.clear_requests("login", &format!("{}:{}", ip, username.to_lowercase()));
}

/// Registrations per IP address
pub fn check_registration_rate_limit(ip: &str) -> Result<(), RateLimitError> {
    let config = get_rate_limit_config();
    RATE_LIMITER.check_rate_limit(
        "register",
        ip,
        config.registration_max,
        config.registration_window,
    )
}

/// Messages sent per user
pub fn check_message_rate_limit(user_id: i32) -> Result<(), RateLimitError> {
    let config = get_rate_limit_config();
    RATE_LIMITER.check_rate_limit(
        "message",
        &user_id.to_string(),
        config.message_max,
        config.message_window,
    )
}

/// Image uploads per user
pub fn check_upload_rate_limit(user_id: i32) -> Result<(), RateLimitError> {
    let config = get_rate_limit_config();
    RATE_LIMITER.check_rate_limit(
        "upload",
        &user_id.to_string(),
        config.upload_max,
        config.upload_window,
    )
}

/// Periodic cleanup, spawned from the server binary
pub fn cleanup_old_entries_public() {
    RATE_LIMITER.cleanup_old_entries(Duration::from_secs(3600));
}
