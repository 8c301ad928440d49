/// Integration tests for the conversation store
/// Tests conversation creation, message sending, read tracking and archiving
mod common;
use serial_test::serial;

use common::{database::*, fixtures::*};
use realty::conversations::{self, ConversationError};
use realty::orm::messages;
use sea_orm::EntityTrait;

#[actix_rt::test]
#[serial]
async fn test_start_conversation_reuses_pair_thread() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");
    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();

    let (first, _) = conversations::start_conversation(ana.id, ben.id, None, "Hi Ben")
        .await
        .expect("Failed to start conversation");
    let (second, _) = conversations::start_conversation(ben.id, ana.id, None, "Hi Ana")
        .await
        .expect("Failed to reply");

    assert_eq!(first, second);
    assert_eq!(
        conversations::participant_ids(first).await.unwrap().len(),
        2
    );
}

#[actix_rt::test]
#[serial]
async fn test_property_scopes_conversation() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let flat = create_test_property(
        &db,
        ben.id,
        "Leeds",
        realty::orm::properties::ListingKind::Rent,
        95_000,
        true,
    )
    .await
    .unwrap();

    let (general, _) = conversations::start_conversation(ana.id, ben.id, None, "Hello")
        .await
        .unwrap();
    let (about_flat, _) =
        conversations::start_conversation(ana.id, ben.id, Some(flat.id), "Is it available?")
            .await
            .unwrap();

    assert_ne!(general, about_flat);

    let inbox = conversations::list_conversations(ben.id, false).await.unwrap();
    let listed = inbox.iter().find(|c| c.id == about_flat).unwrap();
    assert_eq!(listed.property_id, Some(flat.id));
}

#[actix_rt::test]
#[serial]
async fn test_cannot_message_self() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();

    let result = conversations::start_conversation(ana.id, ana.id, None, "Note to self").await;
    assert!(matches!(result, Err(ConversationError::SelfConversation)));
}

#[actix_rt::test]
#[serial]
async fn test_send_message_requires_participant() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let eve = create_test_user(&db, "eve", "password123").await.unwrap();

    let (conv, _) = conversations::start_conversation(ana.id, ben.id, None, "Hi")
        .await
        .unwrap();

    let result = conversations::send_message(conv, eve.id, "Let me in").await;
    assert!(matches!(result, Err(ConversationError::NotParticipant)));

    let result = conversations::get_messages(conv, eve.id, 10, 0).await;
    assert!(matches!(result, Err(ConversationError::NotParticipant)));
}

#[actix_rt::test]
#[serial]
async fn test_send_message_validates_content() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let (conv, _) = conversations::start_conversation(ana.id, ben.id, None, "Hi")
        .await
        .unwrap();

    let result = conversations::send_message(conv, ana.id, "   ").await;
    assert!(matches!(result, Err(ConversationError::InvalidContent(_))));

    let message = conversations::send_message(conv, ana.id, "  trimmed  ")
        .await
        .unwrap();
    assert_eq!(message.content, "trimmed");
    assert!(!message.is_read);
    assert_eq!(message.read_at, None);
}

#[actix_rt::test]
#[serial]
async fn test_unread_counts_are_viewer_scoped() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let cat = create_test_user(&db, "cat", "password123").await.unwrap();

    let (with_ben, _) = conversations::start_conversation(ben.id, ana.id, None, "one")
        .await
        .unwrap();
    conversations::send_message(with_ben, ben.id, "two").await.unwrap();
    conversations::send_message(with_ben, ben.id, "three").await.unwrap();
    let (with_cat, _) = conversations::start_conversation(cat.id, ana.id, None, "hey")
        .await
        .unwrap();
    // Ana's own message never counts for her.
    conversations::send_message(with_cat, ana.id, "hello cat").await.unwrap();

    let inbox = conversations::list_conversations(ana.id, false).await.unwrap();
    assert_eq!(inbox.len(), 2);
    // Most recently updated first.
    assert_eq!(inbox[0].id, with_cat);
    assert_eq!(inbox[0].unread_count, Some(1));
    assert_eq!(inbox[1].id, with_ben);
    assert_eq!(inbox[1].unread_count, Some(3));
    assert_eq!(
        inbox[0].last_message.as_ref().map(|m| m.content.as_str()),
        Some("hello cat")
    );

    assert_eq!(conversations::count_unread_messages(ana.id).await.unwrap(), 4);
    assert_eq!(conversations::count_unread_messages(ben.id).await.unwrap(), 0);
    assert_eq!(conversations::count_unread_messages(cat.id).await.unwrap(), 1);
}

#[actix_rt::test]
#[serial]
async fn test_mark_read_keeps_first_read_time() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();

    let (conv, first) = conversations::start_conversation(ben.id, ana.id, None, "one")
        .await
        .unwrap();
    conversations::send_message(conv, ana.id, "reply").await.unwrap();

    let marked = conversations::mark_conversation_read(ana.id, conv).await.unwrap();
    assert_eq!(marked, 1);

    let read = messages::Entity::find_by_id(first.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert!(read.is_read);
    let read_at = read.read_at.expect("read_at should be set");

    conversations::send_message(conv, ben.id, "two").await.unwrap();
    let marked = conversations::mark_conversation_read(ana.id, conv).await.unwrap();
    assert_eq!(marked, 1);

    let again = messages::Entity::find_by_id(first.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.read_at, Some(read_at));

    // Ana's reply is still unread for Ben.
    assert_eq!(conversations::count_unread_messages(ben.id).await.unwrap(), 1);
    assert_eq!(conversations::count_unread_messages(ana.id).await.unwrap(), 0);
}

#[actix_rt::test]
#[serial]
async fn test_archive_hides_until_next_message() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let (conv, _) = conversations::start_conversation(ben.id, ana.id, None, "one")
        .await
        .unwrap();

    conversations::archive_conversation(ana.id, conv).await.unwrap();
    assert!(conversations::list_conversations(ana.id, false)
        .await
        .unwrap()
        .is_empty());
    let archived = conversations::list_conversations(ana.id, true).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].is_archived, Some(true));

    // A new message from Ben brings it back.
    conversations::send_message(conv, ben.id, "still there?").await.unwrap();
    let inbox = conversations::list_conversations(ana.id, false).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].is_archived, Some(false));

    conversations::archive_conversation(ana.id, conv).await.unwrap();
    conversations::unarchive_conversation(ana.id, conv).await.unwrap();
    assert_eq!(
        conversations::list_conversations(ana.id, false)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[actix_rt::test]
#[serial]
async fn test_get_messages_oldest_first_with_paging() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let (conv, _) = conversations::start_conversation(ana.id, ben.id, None, "m0")
        .await
        .unwrap();
    for i in 1..5 {
        conversations::send_message(conv, ana.id, &format!("m{}", i))
            .await
            .unwrap();
    }

    let page = conversations::get_messages(conv, ben.id, 2, 1).await.unwrap();
    let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m1", "m2"]);
}

#[actix_rt::test]
#[serial]
async fn test_inbox_lists_every_conversation() {
    use realty::orm::users;
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};

    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();

    // More senders than any page size the inbox ever used.
    let senders = 201;
    for n in 0..senders {
        let sender = users::ActiveModel {
            name: Set(format!("sender{}", n)),
            email: Set(format!("sender{}@test.com", n)),
            password: Set("unused".to_string()),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        conversations::start_conversation(sender.id, ana.id, None, "Is it still available?")
            .await
            .unwrap();
    }

    let inbox = conversations::list_conversations(ana.id, false).await.unwrap();
    assert_eq!(inbox.len(), senders);

    let summed = realty::unread::total_unread(&inbox);
    let aggregate = conversations::count_unread_messages(ana.id).await.unwrap();
    assert_eq!(summed, senders as u64);
    assert_eq!(summed as i64, aggregate);
}

#[actix_rt::test]
#[serial]
async fn test_sending_refreshes_cached_unread_totals() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();

    let ana = create_test_user(&db, "ana", "password123").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();

    let (conversation_id, _) = conversations::start_conversation(ana.id, ben.id, None, "Hello")
        .await
        .unwrap();

    // Warm the cache for both participants.
    assert_eq!(realty::cache::get_unread_count(ben.id).await.unwrap(), 1);
    assert_eq!(realty::cache::get_unread_count(ana.id).await.unwrap(), 0);
    assert!(realty::cache::get_unread_count_with_status(ben.id).await.unwrap().1);

    conversations::send_message(conversation_id, ana.id, "Are pets allowed?")
        .await
        .unwrap();

    // The send itself succeeded and dropped both cached totals.
    assert_eq!(
        realty::cache::get_unread_count_with_status(ben.id).await.unwrap(),
        (2, false)
    );
    assert_eq!(
        realty::cache::get_unread_count_with_status(ana.id).await.unwrap(),
        (0, false)
    );
}
