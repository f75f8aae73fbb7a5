mod support;

use chat_service::error::AppError;
use chat_service::models::{DeliveryStatus, MessageType};
use chat_service::services::message_service::OutgoingMessage;
use chat_service::storage::ChatStore;
use support::TestEnv;

#[tokio::test]
async fn offline_send_stays_sent_and_attempts_push() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user_with_tokens("bob", &["bob-device-token"]).await;

    let view = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap();

    // No live connection for bob: message persists as sent.
    assert_eq!(view.status, DeliveryStatus::Sent);
    let stored = env.store.get_message(view.id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Sent);
    assert!(stored.delivered_at.is_none());

    // Stored content is ciphertext, not the plaintext.
    assert_ne!(stored.content.as_deref(), Some("hi"));

    // Push path was attempted with the plaintext body.
    let pushes = env.push.records();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].tokens, vec!["bob-device-token".to_string()]);
    assert_eq!(pushes[0].body, "hi");
    assert_eq!(pushes[0].data["type"], "new_message");

    // When bob fetches later, the message arrives decrypted, still unread.
    let conversation = env.messages.get_conversation(bob, alice, None, None).await.unwrap();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].content.as_deref(), Some("hi"));
    assert_eq!(conversation[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn online_receiver_gets_event_on_every_device() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let mut bob_phone = env.connect(bob).await;
    let mut bob_laptop = env.connect(bob).await;

    let view = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hello"))
        .await
        .unwrap();

    assert_eq!(view.status, DeliveryStatus::Delivered);
    let stored = env.store.get_message(view.id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Delivered);
    assert!(stored.delivered_at.is_some());

    for client in [&mut bob_phone, &mut bob_laptop] {
        let event = client.next_event();
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["content"], "hello");
        assert_eq!(event["message"]["sender_id"], alice.to_string());
        client.assert_no_events();
    }
}

#[tokio::test]
async fn read_receipt_reaches_every_sender_device_once() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let mut alice_phone = env.connect(alice).await;
    let mut alice_laptop = env.connect(alice).await;

    let view = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap();

    let updated = env.messages.mark_read(bob, &[view.id]).await.unwrap();
    assert_eq!(updated, 1);

    for client in [&mut alice_phone, &mut alice_laptop] {
        let event = client.next_event();
        assert_eq!(event["type"], "messages_read");
        assert_eq!(event["by"], bob.to_string());
        assert_eq!(event["message_ids"][0], view.id.to_string());
        client.assert_no_events();
    }

    // Idempotent: a second call changes nothing and emits nothing.
    let updated = env.messages.mark_read(bob, &[view.id]).await.unwrap();
    assert_eq!(updated, 0);
    alice_phone.assert_no_events();
    alice_laptop.assert_no_events();
}

#[tokio::test]
async fn mark_read_skips_messages_not_addressed_to_reader() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    let charlie = env.add_user("charlie").await;

    let view = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap();

    // Unknown id and a message charlie never received: both no-ops.
    let updated = env
        .messages
        .mark_read(charlie, &[view.id, uuid::Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(updated, 0);
    let stored = env.store.get_message(view.id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn status_never_regresses() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let view = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap();

    env.messages.mark_read(bob, &[view.id]).await.unwrap();
    let read_at = env.store.get_message(view.id).await.unwrap().read_at;

    // A late delivered-mark after read must not move the status backward.
    env.store.mark_delivered(&[view.id]).await.unwrap();
    let stored = env.store.get_message(view.id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Read);
    assert!(stored.delivered_at.is_none());
    assert_eq!(stored.read_at, read_at);
}

#[tokio::test]
async fn blocked_relationships_forbid_direct_sends() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    env.store.block(alice, bob).await;
    let err = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    env.store.block(bob, alice).await;
    let err = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn send_to_unknown_or_self_is_rejected() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;

    let err = env
        .messages
        .send_direct(
            alice,
            uuid::Uuid::new_v4(),
            MessageType::Text,
            OutgoingMessage::text("hi"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = env
        .messages
        .send_direct(alice, alice, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn sender_counter_and_unread_counts_track_sends() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let first = env
        .messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("one"))
        .await
        .unwrap();
    env.messages
        .send_direct(alice, bob, MessageType::Text, OutgoingMessage::text("two"))
        .await
        .unwrap();

    assert_eq!(env.store.get_user(alice).await.unwrap().messages_sent, 2);

    let unread = env.messages.unread_counts(bob).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].sender_id, alice);
    assert_eq!(unread[0].count, 2);

    env.messages.mark_read(bob, &[first.id]).await.unwrap();
    let unread = env.messages.unread_counts(bob).await.unwrap();
    assert_eq!(unread[0].count, 1);
}
