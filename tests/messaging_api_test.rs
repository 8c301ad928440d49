/// Integration tests for the conversation HTTP API
mod common;
use serial_test::serial;

use actix_web::{http::StatusCode, test, App};
use common::{database::*, fixtures::*};
use realty::orm::properties::ListingKind;
use serde_json::{json, Value};

macro_rules! app {
    () => {
        test::init_service(App::new().configure(realty::web::configure)).await
    };
}

#[actix_rt::test]
#[serial]
async fn test_start_conversation_and_reply() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();
    let (buyer, buyer_token) = create_logged_in_user(&db, "ana").await.unwrap();
    let (seller, seller_token) = create_logged_in_user(&db, "ben").await.unwrap();
    let listing = create_test_property(&db, seller.id, "Leeds", ListingKind::Rent, 90_000, true)
        .await
        .unwrap();
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&buyer_token))
        .set_json(json!({"recipientId": seller.id, "propertyId": listing.id, "content": "  Still available?  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let conversation_id = body["conversationId"].as_i64().unwrap();
    assert_eq!(body["message"]["content"], "Still available?");
    assert_eq!(body["message"]["senderId"].as_i64(), Some(buyer.id as i64));
    assert_eq!(body["message"]["isRead"], false);

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .insert_header(bearer(&seller_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let inbox = body.as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["id"].as_i64(), Some(conversation_id));
    assert_eq!(inbox[0]["unreadCount"], 1);
    assert_eq!(inbox[0]["propertyId"].as_i64(), Some(listing.id as i64));
    assert_eq!(inbox[0]["lastMessage"]["content"], "Still available?");
    assert_eq!(inbox[0]["participants"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/messages", conversation_id))
        .insert_header(bearer(&seller_token))
        .set_json(json!({"content": "Yes, viewings on Saturday."}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}/messages", conversation_id))
        .insert_header(bearer(&buyer_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "Still available?");
    assert_eq!(messages[1]["senderId"].as_i64(), Some(seller.id as i64));
}

#[actix_rt::test]
#[serial]
async fn test_unread_total_follows_reads() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();
    let (_, buyer_token) = create_logged_in_user(&db, "ana").await.unwrap();
    let (seller, seller_token) = create_logged_in_user(&db, "ben").await.unwrap();
    let app = app!();

    let unread = |token: String| {
        test::TestRequest::get()
            .uri("/api/conversations/unread")
            .insert_header(bearer(&token))
            .to_request()
    };

    let body: Value = test::call_and_read_body_json(&app, unread(seller_token.clone())).await;
    assert_eq!(body["total"], 0);

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&buyer_token))
        .set_json(json!({"recipientId": seller.id, "content": "Hello"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let conversation_id = body["conversationId"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/messages", conversation_id))
        .insert_header(bearer(&buyer_token))
        .set_json(json!({"content": "Are pets allowed?"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    // The cached zero above is dropped when a message lands.
    let body: Value = test::call_and_read_body_json(&app, unread(seller_token.clone())).await;
    assert_eq!(body["total"], 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/read", conversation_id))
        .insert_header(bearer(&seller_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["marked"], 2);

    let body: Value = test::call_and_read_body_json(&app, unread(seller_token.clone())).await;
    assert_eq!(body["total"], 0);

    // Reading again marks nothing.
    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/read", conversation_id))
        .insert_header(bearer(&seller_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["marked"], 0);
}

#[actix_rt::test]
#[serial]
async fn test_conversation_access_rules() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();
    let (ana, ana_token) = create_logged_in_user(&db, "ana").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let (_, cat_token) = create_logged_in_user(&db, "cat").await.unwrap();
    let draft = create_test_property(&db, ben.id, "Hull", ListingKind::Sale, 1, false)
        .await
        .unwrap();
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .set_json(json!({"recipientId": ana.id, "content": "Note to self"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .set_json(json!({"recipientId": 9999, "content": "Hello?"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .set_json(json!({"recipientId": ben.id, "propertyId": draft.id, "content": "Hello"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .set_json(json!({"recipientId": ben.id, "content": "   "}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .set_json(json!({"recipientId": ben.id, "content": "Hello"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let conversation_id = body["conversationId"].as_i64().unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}/messages", conversation_id))
        .insert_header(bearer(&cat_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/messages", conversation_id))
        .insert_header(bearer(&cat_token))
        .set_json(json!({"content": "Butting in"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
#[serial]
async fn test_archive_hides_from_inbox() {
    let db = setup_test_database().await.unwrap();
    cleanup_test_data(&db).await.unwrap();
    let (_, ana_token) = create_logged_in_user(&db, "ana").await.unwrap();
    let ben = create_test_user(&db, "ben", "password123").await.unwrap();
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .set_json(json!({"recipientId": ben.id, "content": "Hello"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let conversation_id = body["conversationId"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/archive", conversation_id))
        .insert_header(bearer(&ana_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body.as_array().unwrap().is_empty());

    let req = test::TestRequest::get()
        .uri("/api/conversations?archived=true")
        .insert_header(bearer(&ana_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["isArchived"], true);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{}/unarchive", conversation_id))
        .insert_header(bearer(&ana_token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .insert_header(bearer(&ana_token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
