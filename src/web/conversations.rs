//! Conversation (private messaging) routes

use crate::conversations::{self, ConversationError, Message, NewMessageEvent};
use crate::middleware::ClientCtx;
use crate::web::messages_ws::broadcast_new_message;
use actix_web::{error, get, post, web, Error, HttpResponse};
use serde::{Deserialize, Serialize};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Specific routes before parameterized routes
    conf.service(view_unread_total)
        .service(list_conversations)
        .service(create_conversation)
        .service(view_messages)
        .service(send_message)
        .service(mark_read)
        .service(archive)
        .service(unarchive);
}

#[derive(Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    archived: bool,
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    limit: Option<u64>,
    #[serde(default)]
    offset: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationForm {
    recipient_id: i32,
    property_id: Option<i32>,
    content: String,
}

#[derive(Deserialize)]
pub struct MessageForm {
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Started {
    conversation_id: i32,
    message: Message,
}

/// Map a conversation error onto an HTTP status.
fn conversation_error(e: ConversationError) -> Error {
    match e {
        ConversationError::NotParticipant => {
            error::ErrorForbidden("You are not a participant in this conversation")
        }
        ConversationError::SelfConversation => {
            error::ErrorBadRequest("Cannot start a conversation with yourself")
        }
        ConversationError::InvalidContent(msg) => error::ErrorBadRequest(msg),
        ConversationError::Db(e) => {
            log::error!("Conversation database error: {}", e);
            error::ErrorInternalServerError("Database error")
        }
    }
}

fn check_message_rate(user_id: i32) -> Result<(), Error> {
    crate::rate_limit::check_message_rate_limit(user_id).map_err(|e| {
        log::warn!("Rate limit exceeded for messages: user={}", user_id);
        error::ErrorTooManyRequests(format!(
            "You are sending messages too quickly. Please wait {} seconds.",
            e.retry_after_seconds
        ))
    })
}

/// GET /api/conversations
///
/// Most recently updated first. Archived conversations only with `?archived=true`.
/// The list is never truncated: the unread badge is summed over it.
#[get("/api/conversations")]
pub async fn list_conversations(
    client: ClientCtx,
    query: web::Query<InboxQuery>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    let list = conversations::list_conversations(user_id, query.archived)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(list))
}

/// GET /api/conversations/unread
#[get("/api/conversations/unread")]
pub async fn view_unread_total(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    let total = crate::cache::get_unread_count(user_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "total": total })))
}

/// POST /api/conversations
#[post("/api/conversations")]
pub async fn create_conversation(
    client: ClientCtx,
    form: web::Json<NewConversationForm>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    check_message_rate(user_id)?;

    let recipient = crate::user::Profile::get_by_id(form.recipient_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    if recipient.is_none() {
        return Err(error::ErrorNotFound("Recipient not found."));
    }

    if let Some(property_id) = form.property_id {
        let property = crate::properties::get_property(property_id)
            .await
            .map_err(error::ErrorInternalServerError)?;
        match property {
            Some(p) if crate::properties::is_visible_to(&p, Some(user_id)) => {}
            _ => return Err(error::ErrorNotFound("Listing not found.")),
        }
    }

    let (conversation_id, message) = conversations::start_conversation(
        user_id,
        form.recipient_id,
        form.property_id,
        &form.content,
    )
    .await
    .map_err(conversation_error)?;

    broadcast_new_message(NewMessageEvent::from(&message)).await;

    Ok(HttpResponse::Created().json(Started {
        conversation_id,
        message: Message::from(message),
    }))
}

/// GET /api/conversations/{id}/messages
///
/// Oldest first. `limit` is capped at `limits.messages_per_page`.
#[get("/api/conversations/{id}/messages")]
pub async fn view_messages(
    client: ClientCtx,
    path: web::Path<i32>,
    query: web::Query<MessagesQuery>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let per_page = crate::app_config::limits().messages_per_page as u64;
    let limit = query.limit.unwrap_or(per_page).min(per_page);

    let messages = conversations::get_messages(path.into_inner(), user_id, limit, query.offset)
        .await
        .map_err(conversation_error)?;

    Ok(HttpResponse::Ok().json(messages))
}

/// POST /api/conversations/{id}/messages
#[post("/api/conversations/{id}/messages")]
pub async fn send_message(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<MessageForm>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    check_message_rate(user_id)?;

    let message = conversations::send_message(path.into_inner(), user_id, &form.content)
        .await
        .map_err(conversation_error)?;

    broadcast_new_message(NewMessageEvent::from(&message)).await;

    Ok(HttpResponse::Created().json(Message::from(message)))
}

/// POST /api/conversations/{id}/read
#[post("/api/conversations/{id}/read")]
pub async fn mark_read(client: ClientCtx, path: web::Path<i32>) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    let marked = conversations::mark_conversation_read(user_id, path.into_inner())
        .await
        .map_err(conversation_error)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "marked": marked })))
}

/// POST /api/conversations/{id}/archive
#[post("/api/conversations/{id}/archive")]
pub async fn archive(client: ClientCtx, path: web::Path<i32>) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    conversations::archive_conversation(user_id, path.into_inner())
        .await
        .map_err(conversation_error)?;

    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/conversations/{id}/unarchive
#[post("/api/conversations/{id}/unarchive")]
pub async fn unarchive(client: ClientCtx, path: web::Path<i32>) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    conversations::unarchive_conversation(user_id, path.into_inner())
        .await
        .map_err(conversation_error)?;

    Ok(HttpResponse::NoContent().finish())
}
