//! Message types for the message push WebSocket

use actix::prelude::*;

/// New push WebSocket connection
pub struct Connect {
    /// Channel to send frames back to this connection
    pub addr: Recipient<PushText>,
    /// User ID for this connection
    pub user_id: i32,
}

impl Message for Connect {
    /// Returns connection ID
    type Result = usize;
}

/// Disconnect message
pub struct Disconnect {
    /// Connection ID
    pub id: usize,
}

impl Message for Disconnect {
    type Result = ();
}

/// Deliver a serialized frame to every connection of the listed users
#[derive(Clone)]
pub struct Deliver {
    pub user_ids: Vec<i32>,
    pub frame: String,
}

impl Message for Deliver {
    type Result = ();
}

/// Server -> Client text frame
pub struct PushText(pub String);

impl Message for PushText {
    type Result = ();
}

/// Number of live connections (for tests and monitoring)
pub struct GetConnectionCount;

impl Message for GetConnectionCount {
    type Result = usize;
}
