//! Conversation store: two-party threads with per-message read state.

pub mod types;

pub use types::{Conversation, LastMessage, Message, NewMessageEvent, Participant};

use crate::db::get_db_pool;
use crate::orm::{conversation_participants, conversations, messages, users};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};

/// Errors raised by conversation operations.
#[derive(Debug)]
pub enum ConversationError {
    /// The acting user is not a member of the conversation
    NotParticipant,
    /// Sender and recipient are the same user
    SelfConversation,
    /// Message content is empty or too long
    InvalidContent(String),
    /// Database error
    Db(DbErr),
}

impl std::fmt::Display for ConversationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationError::NotParticipant => {
                write!(f, "User is not a participant in this conversation")
            }
            ConversationError::SelfConversation => {
                write!(f, "Cannot start a conversation with yourself")
            }
            ConversationError::InvalidContent(msg) => write!(f, "Invalid message: {}", msg),
            ConversationError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for ConversationError {}

impl From<DbErr> for ConversationError {
    fn from(e: DbErr) -> Self {
        ConversationError::Db(e)
    }
}

/// Trim and bound-check message content.
pub fn validate_content(content: &str, max_length: usize) -> Result<&str, ConversationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ConversationError::InvalidContent(
            "Message cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > max_length {
        return Err(ConversationError::InvalidContent(format!(
            "Message exceeds {} characters",
            max_length
        )));
    }
    Ok(trimmed)
}

fn max_message_length() -> usize {
    crate::app_config::limits().max_message_length as usize
}

/// Send the first message between two users, optionally about a listing.
///
/// Reuses the existing two-party conversation for the same pair and listing
/// if there is one. Returns the conversation id and the stored message.
pub async fn start_conversation(
    sender_id: i32,
    recipient_id: i32,
    property_id: Option<i32>,
    content: &str,
) -> Result<(i32, messages::Model), ConversationError> {
    if sender_id == recipient_id {
        return Err(ConversationError::SelfConversation);
    }
    let content = validate_content(content, max_message_length())?;

    let db = get_db_pool();
    let txn = db.begin().await?;

    let conversation_id =
        match find_direct_conversation(&txn, sender_id, recipient_id, property_id).await? {
            Some(id) => id,
            None => {
                let now = Utc::now().naive_utc();
                let conversation = conversations::ActiveModel {
                    property_id: Set(property_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;

                for user_id in [sender_id, recipient_id] {
                    conversation_participants::ActiveModel {
                        conversation_id: Set(conversation.id),
                        user_id: Set(user_id),
                        joined_at: Set(now),
                        is_archived: Set(false),
                    }
                    .insert(&txn)
                    .await?;
                }

                log::debug!(
                    "Created conversation {} between users {} and {}",
                    conversation.id,
                    sender_id,
                    recipient_id
                );
                conversation.id
            }
        };

    let message = append_message(&txn, conversation_id, sender_id, content).await?;
    let members = member_ids(&txn, conversation_id).await?;
    txn.commit().await?;

    invalidate_unread(&members);

    Ok((conversation_id, message))
}

/// Find the two-party conversation between `a` and `b` about `property_id`.
async fn find_direct_conversation<C>(
    db: &C,
    a: i32,
    b: i32,
    property_id: Option<i32>,
) -> Result<Option<i32>, DbErr>
where
    C: ConnectionTrait,
{
    let mine: Vec<i32> = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::UserId.eq(a))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.conversation_id)
        .collect();

    if mine.is_empty() {
        return Ok(None);
    }

    let shared = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::UserId.eq(b))
        .filter(conversation_participants::Column::ConversationId.is_in(mine))
        .find_also_related(conversations::Entity)
        .order_by_asc(conversation_participants::Column::ConversationId)
        .all(db)
        .await?;

    for (_, conversation) in shared {
        let conversation = match conversation {
            Some(c) if c.property_id == property_id => c,
            _ => continue,
        };

        let members = conversation_participants::Entity::find()
            .filter(conversation_participants::Column::ConversationId.eq(conversation.id))
            .count(db)
            .await?;

        if members == 2 {
            return Ok(Some(conversation.id));
        }
    }

    Ok(None)
}

/// Send a message in an existing conversation
pub async fn send_message(
    conversation_id: i32,
    sender_id: i32,
    content: &str,
) -> Result<messages::Model, ConversationError> {
    let content = validate_content(content, max_message_length())?;

    let db = get_db_pool();
    let txn = db.begin().await?;

    verify_participant(&txn, sender_id, conversation_id).await?;
    let message = append_message(&txn, conversation_id, sender_id, content).await?;
    let members = member_ids(&txn, conversation_id).await?;

    txn.commit().await?;

    invalidate_unread(&members);

    Ok(message)
}

/// Insert an unread message, advance `updated_at`, and bring the conversation
/// back into the inbox of every other participant.
async fn append_message<C>(
    db: &C,
    conversation_id: i32,
    sender_id: i32,
    content: &str,
) -> Result<messages::Model, DbErr>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();

    let message = messages::ActiveModel {
        conversation_id: Set(conversation_id),
        sender_id: Set(sender_id),
        content: Set(content.to_owned()),
        sent_at: Set(now),
        is_read: Set(false),
        read_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    conversations::Entity::update_many()
        .col_expr(conversations::Column::UpdatedAt, Expr::value(now))
        .filter(conversations::Column::Id.eq(conversation_id))
        .exec(db)
        .await?;

    conversation_participants::Entity::update_many()
        .col_expr(conversation_participants::Column::IsArchived, Expr::value(false))
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .filter(conversation_participants::Column::UserId.ne(sender_id))
        .exec(db)
        .await?;

    Ok(message)
}

/// Verify that a user is a participant in a conversation
pub async fn verify_participant<C>(
    db: &C,
    user_id: i32,
    conversation_id: i32,
) -> Result<conversation_participants::Model, ConversationError>
where
    C: ConnectionTrait,
{
    conversation_participants::Entity::find()
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .filter(conversation_participants::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(ConversationError::NotParticipant)
}

/// User ids of everyone in a conversation.
pub async fn participant_ids(conversation_id: i32) -> Result<Vec<i32>, DbErr> {
    member_ids(get_db_pool(), conversation_id).await
}

async fn member_ids<C>(db: &C, conversation_id: i32) -> Result<Vec<i32>, DbErr>
where
    C: ConnectionTrait,
{
    Ok(conversation_participants::Entity::find()
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.user_id)
        .collect())
}

/// Drop cached unread totals. Runs after commit and cannot fail.
fn invalidate_unread(user_ids: &[i32]) {
    for user_id in user_ids {
        crate::cache::invalidate_unread_count(*user_id);
    }
}

/// Conversations visible to `viewer_id`, most recently updated first, with
/// viewer-scoped unread counts.
pub async fn list_conversations(
    viewer_id: i32,
    include_archived: bool,
) -> Result<Vec<Conversation>, DbErr> {
    let db = get_db_pool();

    let mut query = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::UserId.eq(viewer_id));

    if !include_archived {
        query = query.filter(conversation_participants::Column::IsArchived.eq(false));
    }

    let rows = query
        .find_also_related(conversations::Entity)
        .order_by_desc(conversations::Column::UpdatedAt)
        .order_by_desc(conversations::Column::Id)
        .all(db)
        .await?;

    let mut listing = Vec::with_capacity(rows.len());

    for (membership, conversation) in rows {
        let conversation = match conversation {
            Some(c) => c,
            None => continue,
        };

        let participants = get_participants(db, conversation.id, viewer_id).await?;
        let last_message = get_last_message(db, conversation.id).await?;
        let unread = count_unread_in(db, conversation.id, viewer_id).await?;

        listing.push(Conversation {
            id: conversation.id,
            participants,
            last_message: last_message.map(LastMessage::from),
            unread_count: Some(unread),
            is_archived: Some(membership.is_archived),
            property_id: conversation.property_id,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        });
    }

    Ok(listing)
}

/// Participants in join order.
async fn get_participants(
    db: &DatabaseConnection,
    conversation_id: i32,
    viewer_id: i32,
) -> Result<Vec<Participant>, DbErr> {
    let rows = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .order_by_asc(conversation_participants::Column::JoinedAt)
        .order_by_asc(conversation_participants::Column::UserId)
        .find_also_related(users::Entity)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(_, user)| user.map(|u| Participant::from_user(u, viewer_id)))
        .collect())
}

async fn get_last_message(
    db: &DatabaseConnection,
    conversation_id: i32,
) -> Result<Option<messages::Model>, DbErr> {
    messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .order_by_desc(messages::Column::SentAt)
        .order_by_desc(messages::Column::Id)
        .one(db)
        .await
}

/// Unread messages in one conversation that `viewer_id` did not send.
async fn count_unread_in(
    db: &DatabaseConnection,
    conversation_id: i32,
    viewer_id: i32,
) -> Result<u32, DbErr> {
    let count = messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .filter(messages::Column::IsRead.eq(false))
        .filter(messages::Column::SenderId.ne(viewer_id))
        .count(db)
        .await?;

    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Total unread messages across the viewer's inbox (archived excluded).
pub async fn count_unread_messages(viewer_id: i32) -> Result<i64, DbErr> {
    let db = get_db_pool();

    let conversation_ids: Vec<i32> = conversation_participants::Entity::find()
        .filter(conversation_participants::Column::UserId.eq(viewer_id))
        .filter(conversation_participants::Column::IsArchived.eq(false))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.conversation_id)
        .collect();

    if conversation_ids.is_empty() {
        return Ok(0);
    }

    let count = messages::Entity::find()
        .filter(messages::Column::ConversationId.is_in(conversation_ids))
        .filter(messages::Column::IsRead.eq(false))
        .filter(messages::Column::SenderId.ne(viewer_id))
        .count(db)
        .await?;

    Ok(i64::try_from(count).unwrap_or(i64::MAX))
}

/// Messages in a conversation, oldest first.
pub async fn get_messages(
    conversation_id: i32,
    viewer_id: i32,
    limit: u64,
    offset: u64,
) -> Result<Vec<Message>, ConversationError> {
    let db = get_db_pool();
    verify_participant(db, viewer_id, conversation_id).await?;

    let messages = messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .order_by_asc(messages::Column::SentAt)
        .order_by_asc(messages::Column::Id)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await?;

    Ok(messages.into_iter().map(Message::from).collect())
}

/// Get a single message by id
pub async fn get_message(message_id: i32) -> Result<Option<messages::Model>, DbErr> {
    messages::Entity::find_by_id(message_id)
        .one(get_db_pool())
        .await
}

/// Mark every message the viewer received in a conversation as read.
///
/// Only unread rows are touched, so `read_at` keeps the time of the first
/// read. Returns the number of messages that changed state.
pub async fn mark_conversation_read(
    viewer_id: i32,
    conversation_id: i32,
) -> Result<u64, ConversationError> {
    let db = get_db_pool();
    verify_participant(db, viewer_id, conversation_id).await?;

    let result = messages::Entity::update_many()
        .col_expr(messages::Column::IsRead, Expr::value(true))
        .col_expr(
            messages::Column::ReadAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .filter(messages::Column::SenderId.ne(viewer_id))
        .filter(messages::Column::IsRead.eq(false))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        crate::cache::invalidate_unread_count(viewer_id);
    }

    Ok(result.rows_affected)
}

/// Hide a conversation from the viewer's inbox until the next message.
pub async fn archive_conversation(
    viewer_id: i32,
    conversation_id: i32,
) -> Result<(), ConversationError> {
    set_archived(viewer_id, conversation_id, true).await
}

/// Bring an archived conversation back into the viewer's inbox.
pub async fn unarchive_conversation(
    viewer_id: i32,
    conversation_id: i32,
) -> Result<(), ConversationError> {
    set_archived(viewer_id, conversation_id, false).await
}

async fn set_archived(
    viewer_id: i32,
    conversation_id: i32,
    archived: bool,
) -> Result<(), ConversationError> {
    let db = get_db_pool();
    verify_participant(db, viewer_id, conversation_id).await?;

    conversation_participants::Entity::update_many()
        .col_expr(
            conversation_participants::Column::IsArchived,
            Expr::value(archived),
        )
        .filter(conversation_participants::Column::ConversationId.eq(conversation_id))
        .filter(conversation_participants::Column::UserId.eq(viewer_id))
        .exec(db)
        .await?;

    crate::cache::invalidate_unread_count(viewer_id);

    Ok(())
}
