//! Application-wide constants
//!
//! This module contains constants used throughout the application.

use std::time::Duration;

/// How often the unread indicator re-fetches the conversation list.
/// Fixed; the first fetch happens immediately on mount.
pub const UNREAD_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

/// Largest count the badge renders as a numeral. Anything above shows as "9+".
pub const BADGE_CAP: u64 = 9;

/// How often heartbeat pings are sent on the message WebSocket
pub const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
pub const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Multipart field carrying an uploaded image
pub const UPLOAD_FIELD_NAME: &str = "image";

/// Path prefix under which stored uploads are served
pub const UPLOADS_PATH: &str = "/uploads";
