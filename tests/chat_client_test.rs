//! Conversation client integration tests
//!
//! Exercises `ChatClient` end to end over a scripted channel, checking the
//! conversation state and the events the store emits along the way.

mod common;

use agentchat::channel::{ChannelError, FakeChannel, ScriptedResponse};
use agentchat::conversation::{Sender, StreamState};
use agentchat::{AgentChatError, ErrorKind, StoreEvent};

use common::{delta, fake_client};

fn drain(events: &mut tokio::sync::broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_whitespace_message_never_reaches_channel() {
    let channel = FakeChannel::new();
    let mut client = fake_client(&channel);

    let summary = client.send_message(" \n\t ").await.unwrap();

    assert!(!summary.success);
    assert_eq!(channel.open_count(), 0);
    let error = summary.error.expect("validation error");
    assert_eq!(error.kind, ErrorKind::Validation);
    assert!(!error.retryable);
    assert!(client.store().messages().is_empty());
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_delivered_text() {
    let channel = FakeChannel::with_script(vec![ScriptedResponse::fail_after(
        &[delta("partial answer")],
        ChannelError::Read("connection reset by peer".into()),
    )]);
    let mut client = fake_client(&channel);
    let mut events = client.subscribe();

    let summary = client.send_message("tell me").await.unwrap();

    assert!(!summary.success);
    assert_eq!(channel.open_count(), 1);
    assert_eq!(summary.error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));

    let messages = client.store().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].sender, Sender::Agent);
    assert_eq!(messages[1].content, "partial answer");
    assert!(messages[1].is_complete);
    assert!(!messages[1].is_streaming);

    let appended = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, StoreEvent::MessageAppended { .. }))
        .count();
    assert_eq!(appended, 1);
}

#[tokio::test]
async fn test_event_order_for_successful_exchange() {
    let channel = FakeChannel::with_script(vec![ScriptedResponse::fragments(&[
        delta("Hel"),
        delta("lo"),
    ])]);
    let mut client = fake_client(&channel);
    let mut events = client.subscribe();

    client.send_message("hi").await.unwrap();

    let seen = drain(&mut events);
    let user_added = seen
        .iter()
        .position(|e| matches!(e, StoreEvent::MessageAdded(m) if m.sender == Sender::User))
        .expect("user message added");
    let agent_added = seen
        .iter()
        .position(|e| matches!(e, StoreEvent::MessageAdded(m) if m.sender == Sender::Agent))
        .expect("placeholder added");
    let completed = seen
        .iter()
        .position(|e| matches!(e, StoreEvent::MessageCompleted(_)))
        .expect("reply completed");
    assert!(user_added < agent_added);
    assert!(agent_added < completed);

    let fragments: Vec<&str> = seen
        .iter()
        .filter_map(|e| match e {
            StoreEvent::MessageAppended { fragment, .. } => Some(fragment.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fragments, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn test_failed_exchange_then_retry_succeeds() {
    let channel = FakeChannel::with_script(vec![
        ScriptedResponse::OpenError(ChannelError::Status {
            status: 401,
            body: "expired token".into(),
        }),
        ScriptedResponse::fragments(&[delta("welcome back")]),
    ]);
    let mut client = fake_client(&channel);

    let failed = client.send_message("hello").await.unwrap();
    assert!(!failed.success);
    assert_eq!(channel.open_count(), 1);
    assert_eq!(
        client.store().error().map(|e| e.kind),
        Some(ErrorKind::Authentication)
    );
    assert_eq!(client.store().messages().len(), 1);

    let retried = client
        .retry_last_message()
        .await
        .unwrap()
        .expect("retry ran");
    assert!(retried.success);
    assert!(client.store().error().is_none());

    let messages = client.store().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].content, "welcome back");
    assert_eq!(channel.requests()[1].prompt, "hello");
}

#[tokio::test]
async fn test_transient_failure_is_retried_automatically() {
    let channel = FakeChannel::with_script(vec![
        ScriptedResponse::OpenError(ChannelError::Status {
            status: 503,
            body: "busy".into(),
        }),
        ScriptedResponse::fragments(&[delta("ok")]),
    ]);
    let mut client = fake_client(&channel);

    let summary = client.send_message("hi").await.unwrap();

    assert!(summary.success);
    assert_eq!(channel.open_count(), 2);
    assert_eq!(client.store().messages().len(), 2);
    assert_eq!(client.store().status().state, StreamState::Idle);
}

#[tokio::test]
async fn test_only_one_reply_streams_at_a_time() {
    let channel = FakeChannel::with_script(vec![
        ScriptedResponse::fragments(&[delta("first")]),
        ScriptedResponse::fragments(&[delta("second")]),
    ]);
    let mut client = fake_client(&channel);
    let mut events = client.subscribe();

    client.send_message("one").await.unwrap();
    client.send_message("two").await.unwrap();

    let mut streaming = 0i32;
    for event in drain(&mut events) {
        match event {
            StoreEvent::MessageAdded(m) if m.is_streaming => {
                streaming += 1;
                assert_eq!(streaming, 1, "two replies streaming at once");
            }
            StoreEvent::MessageCompleted(m) if m.sender == Sender::Agent => streaming -= 1,
            StoreEvent::MessageRemoved(_) => streaming -= 1,
            _ => {}
        }
    }
    assert_eq!(streaming, 0);
    assert_eq!(client.store().messages().len(), 4);
}

#[tokio::test]
async fn test_new_session_clears_conversation() {
    let channel = FakeChannel::with_script(vec![
        ScriptedResponse::fragments(&[delta("a")]),
        ScriptedResponse::fragments(&[delta("b")]),
    ]);
    let mut client = fake_client(&channel);

    client.send_message("first").await.unwrap();
    let old_session = client.store().session().id.clone();

    let new_session = client.start_new_session();
    assert_ne!(new_session, old_session);
    assert!(client.store().messages().is_empty());

    client.send_message("second").await.unwrap();
    assert_eq!(channel.requests()[1].session_id, new_session);
}

#[tokio::test]
async fn test_send_after_end_session_is_rejected() {
    let channel = FakeChannel::new();
    let mut client = fake_client(&channel);
    client.end_session();

    let err = client.send_message("hello").await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<AgentChatError>(),
        Some(AgentChatError::NoActiveSession)
    ));
    assert_eq!(channel.open_count(), 0);
}

#[tokio::test]
async fn test_large_buffered_reply_is_stored_whole() {
    let body: String = (0..400).map(|_| delta("ab")).collect();
    let channel = FakeChannel::with_script(vec![ScriptedResponse::Buffered(body)]);
    let mut client = fake_client(&channel);
    let mut events = client.subscribe();

    let summary = client.send_message("long please").await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.fragments, 400);
    assert_eq!(client.store().messages()[1].content, "ab".repeat(400));
    // More events than the notification buffer holds.
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_))
    ));
}
