mod support;

use chat_service::error::AppError;
use chat_service::models::{MessageType, PresenceStatus};
use chat_service::services::message_service::OutgoingMessage;
use chat_service::storage::ChatStore;
use chat_service::websocket::events::CallType;
use support::TestEnv;

#[tokio::test]
async fn presence_fires_only_on_connection_count_edges() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    env.store.befriend(alice, bob).await;

    let mut bob_client = env.connect(bob).await;
    bob_client.drain();

    // First device: 0 -> 1, friends are told.
    let alice_phone = env.connect(alice).await;
    let event = bob_client.next_event();
    assert_eq!(event["type"], "friend_online");
    assert_eq!(event["user_id"], alice.to_string());
    assert_eq!(
        env.store.get_user(alice).await.unwrap().status,
        PresenceStatus::Online
    );

    // Second device: no edge, no event.
    let alice_laptop = env.connect(alice).await;
    bob_client.assert_no_events();

    // First disconnect: still online, no event.
    env.disconnect(&alice_phone).await;
    bob_client.assert_no_events();
    assert!(env.registry.is_online(alice));

    // Last disconnect: 1 -> 0, lastSeen persisted and fanned out.
    env.disconnect(&alice_laptop).await;
    let event = bob_client.next_event();
    assert_eq!(event["type"], "friend_offline");
    assert_eq!(event["user_id"], alice.to_string());
    assert!(event["last_seen"].is_string());

    let stored = env.store.get_user(alice).await.unwrap();
    assert_eq!(stored.status, PresenceStatus::Offline);
    assert!(stored.last_seen.is_some());
}

#[tokio::test]
async fn presence_events_go_to_accepted_friends_only() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    let charlie = env.add_user("charlie").await;
    env.store.befriend(alice, bob).await;

    let mut bob_client = env.connect(bob).await;
    let mut charlie_client = env.connect(charlie).await;
    bob_client.drain();
    charlie_client.drain();

    let _alice_client = env.connect(alice).await;
    assert_eq!(bob_client.next_event()["type"], "friend_online");
    charlie_client.assert_no_events();
}

#[tokio::test]
async fn group_posting_rights_and_fanout() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    let charlie = env.add_user("charlie").await;
    let dave = env.add_user("dave").await;
    let group = env.add_group(&[alice, bob, charlie], &[alice], true).await;

    let mut alice_client = env.connect(alice).await;
    let mut bob_client = env.connect(bob).await;
    let mut charlie_client = env.connect(charlie).await;
    env.registry.join_room(&alice_client.handle, group);
    env.registry.join_room(&bob_client.handle, group);
    env.registry.join_room(&charlie_client.handle, group);

    // Restricted group: member-but-not-admin is refused.
    let err = env
        .messages
        .send_group(bob, group, MessageType::Text, OutgoingMessage::text("hi all"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Non-member is refused regardless of settings.
    let err = env
        .messages
        .send_group(dave, group, MessageType::Text, OutgoingMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Admin posts; each member connection hears it once, sender excluded.
    let view = env
        .messages
        .send_group(alice, group, MessageType::Text, OutgoingMessage::text("meeting at 5"))
        .await
        .unwrap();

    for client in [&mut bob_client, &mut charlie_client] {
        let event = client.next_event();
        assert_eq!(event["type"], "group_message");
        assert_eq!(event["group_id"], group.to_string());
        assert_eq!(event["message"]["content"], "meeting at 5");
        client.assert_no_events();
    }
    alice_client.assert_no_events();

    // Stored group content is encrypted like direct text.
    let stored = env.store.get_message(view.id).await.unwrap();
    assert_ne!(stored.content.as_deref(), Some("meeting at 5"));
}

#[tokio::test]
async fn leaving_the_room_stops_group_fanout() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    let group = env.add_group(&[alice, bob], &[alice], false).await;

    let mut bob_client = env.connect(bob).await;
    env.registry.join_room(&bob_client.handle, group);
    env.registry.leave_room(&bob_client.handle, group);

    env.messages
        .send_group(alice, group, MessageType::Text, OutgoingMessage::text("anyone?"))
        .await
        .unwrap();
    bob_client.assert_no_events();
}

#[tokio::test]
async fn typing_indicator_is_relayed_and_dropped_when_offline() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let mut bob_client = env.connect(bob).await;
    bob_client.drain();

    assert_eq!(env.relay.typing(alice, bob, true), 1);
    let event = bob_client.next_event();
    assert_eq!(event["type"], "typing");
    assert_eq!(event["user_id"], alice.to_string());
    assert_eq!(event["is_typing"], true);

    // Offline peer: dropped, not queued anywhere.
    assert_eq!(env.relay.typing(alice, uuid::Uuid::new_v4(), true), 0);
}

#[tokio::test]
async fn call_signals_are_forwarded_verbatim_with_origin() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let mut bob_phone = env.connect(bob).await;
    let mut bob_laptop = env.connect(bob).await;

    let offer = serde_json::json!({"sdp": "v=0 o=- 46117", "ice": ["candidate:1"]});
    let reached = env
        .relay
        .call_request(alice, bob, CallType::Video, offer.clone());
    assert_eq!(reached, 2);

    for client in [&mut bob_phone, &mut bob_laptop] {
        let event = client.next_event();
        assert_eq!(event["type"], "incoming_call");
        assert_eq!(event["caller_id"], alice.to_string());
        assert_eq!(event["call_type"], "video");
        assert_eq!(event["signal_data"], offer);
    }

    env.disconnect(&bob_phone).await;
    env.disconnect(&bob_laptop).await;

    // Peer gone: call signals are dropped silently.
    assert_eq!(env.relay.call_accepted(bob, alice, offer.clone()), 0);
    assert_eq!(env.relay.call_rejected(bob, alice), 0);
    assert_eq!(env.relay.call_ended(bob, alice), 0);
}

#[tokio::test]
async fn call_answer_signals_reach_the_caller() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;

    let mut alice_client = env.connect(alice).await;
    alice_client.drain();

    let answer = serde_json::json!({"sdp": "answer"});
    env.relay.call_accepted(bob, alice, answer.clone());
    let event = alice_client.next_event();
    assert_eq!(event["type"], "call_accepted");
    assert_eq!(event["by"], bob.to_string());
    assert_eq!(event["signal_data"], answer);

    env.relay.call_rejected(bob, alice);
    assert_eq!(alice_client.next_event()["type"], "call_rejected");

    env.relay.call_ended(bob, alice);
    assert_eq!(alice_client.next_event()["type"], "call_ended");
}

#[tokio::test]
async fn status_announcements_fan_out_to_friends_devices() {
    let env = TestEnv::new();
    let alice = env.add_user("alice").await;
    let bob = env.add_user("bob").await;
    let charlie = env.add_user("charlie").await;
    env.store.befriend(alice, bob).await;

    let mut bob_phone = env.connect(bob).await;
    let mut bob_laptop = env.connect(bob).await;
    let mut charlie_client = env.connect(charlie).await;
    bob_phone.drain();
    bob_laptop.drain();
    charlie_client.drain();

    let status_id = uuid::Uuid::new_v4();
    let reached = env.messages.announce_status(alice, status_id).await.unwrap();
    assert_eq!(reached, 2);

    for client in [&mut bob_phone, &mut bob_laptop] {
        let event = client.next_event();
        assert_eq!(event["type"], "new_status");
        assert_eq!(event["user_id"], alice.to_string());
        assert_eq!(event["status_id"], status_id.to_string());
    }
    charlie_client.assert_no_events();
}
