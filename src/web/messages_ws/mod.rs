//! Real-time message push over WebSocket
//!
//! ## Architecture
//!
//! - `MessageServer` actor maintains user connections
//! - `MessageConnection` actor handles an individual WebSocket
//! - Message routes call `broadcast_new_message()` after a message is stored
//!
//! Clients connect to `/messages.ws` with their bearer token and receive
//! `{"type":"new_message","data":{...}}` frames for messages sent by others.

pub mod connection;
pub mod message;
pub mod server;

use crate::conversations::NewMessageEvent;
use crate::middleware::ClientCtx;
use crate::transport::PushFrame;
use actix::Addr;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use once_cell::sync::OnceCell;

pub use message::{Deliver, GetConnectionCount};
pub use server::MessageServer;

/// Global message server instance
static MESSAGE_SERVER: OnceCell<Addr<MessageServer>> = OnceCell::new();

/// Initialize the global message server. Later calls are ignored.
pub fn init_message_server(server: Addr<MessageServer>) {
    if MESSAGE_SERVER.set(server).is_err() {
        log::warn!("MessageServer already initialized");
    }
}

/// Get the global message server address
pub fn get_message_server() -> Option<&'static Addr<MessageServer>> {
    MESSAGE_SERVER.get()
}

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(messages_ws);
}

/// GET /messages.ws
///
/// Requires a bearer token.
#[get("/messages.ws")]
pub async fn messages_ws(
    req: HttpRequest,
    stream: web::Payload,
    client: ClientCtx,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let server = get_message_server()
        .ok_or_else(|| actix_web::error::ErrorServiceUnavailable("Push server is not running."))?;

    log::debug!("User {} connecting to message WebSocket", user_id);

    ws::start(
        connection::MessageConnection::new(user_id, server.clone()),
        &req,
        stream,
    )
}

/// Push a stored message to every participant except its sender.
///
/// Delivery is best effort; failures are logged and never surface to the sender.
pub async fn broadcast_new_message(event: NewMessageEvent) {
    let server = match get_message_server() {
        Some(server) => server,
        None => return,
    };

    match crate::conversations::participant_ids(event.conversation_id).await {
        Ok(participants) => route_new_message(server, event, &participants),
        Err(e) => log::warn!(
            "Unable to route push for message {}: {}",
            event.message_id,
            e
        ),
    }
}

/// Send a `new_message` frame to `participants`, skipping the sender.
pub fn route_new_message(
    server: &Addr<MessageServer>,
    event: NewMessageEvent,
    participants: &[i32],
) {
    let recipients: Vec<i32> = participants
        .iter()
        .copied()
        .filter(|id| *id != event.sender_id)
        .collect();

    if recipients.is_empty() {
        return;
    }

    match serde_json::to_string(&PushFrame::NewMessage(event)) {
        Ok(frame) => server.do_send(Deliver {
            user_ids: recipients,
            frame,
        }),
        Err(e) => log::warn!("Unable to serialize push frame: {}", e),
    }
}
