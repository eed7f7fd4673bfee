// Chat session polling on a paused clock

mod common;

use agri_deals::{
    ChatSession, ChatStore, DealEvent, DealsBackend, DealsError, EventSink, SendOutcome,
    SessionState,
};
use common::{drain, init_tracing, settle, CountingBackend};
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(2);

async fn seed_message(backend: &CountingBackend, sender: &str, receiver: &str, text: &str) {
    let msg = ChatStore::compose(sender, receiver, text).unwrap();
    backend.inner().send_message(&msg).await.unwrap();
}

fn open(backend: &Arc<CountingBackend>, self_id: &str, partner_id: &str) -> ChatSession {
    ChatSession::open(
        ChatStore::new(backend.clone()),
        self_id,
        partner_id,
        INTERVAL,
        EventSink::disabled(),
    )
    .expect("Failed to open session")
}

#[tokio::test(start_paused = true)]
async fn test_open_fetches_immediately_then_on_interval() {
    let backend = Arc::new(CountingBackend::new());
    seed_message(&backend, "S001", "F001", "Namaste").await;

    let session = open(&backend, "F001", "S001");
    settle().await;

    assert_eq!(backend.calls("history"), 1);
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.state(), SessionState::Idle);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(backend.calls("history"), 2);

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(backend.calls("history"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_no_calls_after_close() {
    let backend = Arc::new(CountingBackend::new());
    let mut session = open(&backend, "F001", "S001");
    settle().await;

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    let before = backend.total_calls();

    tokio::time::sleep(INTERVAL * 10).await;
    assert_eq!(backend.total_calls(), before);

    let err = session.send_and_refresh("still there?").await.unwrap_err();
    assert!(matches!(err, DealsError::Validation(_)));
    assert_eq!(backend.calls("send"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_shows_up_in_transcript() {
    let backend = Arc::new(CountingBackend::new());
    let session = open(&backend, "F001", "S001");
    settle().await;
    let mut updates = session.subscribe();

    let outcome = session.send_and_refresh("2000 per quintal").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Persisted(_)));

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].text, "2000 per quintal");
    assert_eq!(transcript[0].sender, "F001");
    assert_eq!(backend.calls("history"), 2);

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_send_is_refetched() {
    let backend = Arc::new(CountingBackend::acknowledging());
    let session = open(&backend, "F001", "S001");
    settle().await;

    let outcome = session.send_and_refresh("hello").await.unwrap();
    assert_eq!(outcome, SendOutcome::Acknowledged);
    assert_eq!(session.transcript().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_send_is_local() {
    let backend = Arc::new(CountingBackend::new());
    let session = open(&backend, "F001", "S001");
    settle().await;

    let err = session.send_and_refresh("  ").await.unwrap_err();
    assert!(err.is_local());
    assert_eq!(backend.calls("send"), 0);
    assert!(session.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_switch_partner_rebinds_room() {
    let backend = Arc::new(CountingBackend::new());
    seed_message(&backend, "F001", "S001", "first deal").await;

    let (events, mut rx) = EventSink::channel();
    let mut session = ChatSession::open(
        ChatStore::new(backend.clone()),
        "F001",
        "S001",
        INTERVAL,
        events,
    )
    .unwrap();
    settle().await;
    assert_eq!(session.transcript().len(), 1);
    let old_room = session.room();

    session.switch_partner("S002").unwrap();
    assert_eq!(session.room().as_str(), "f001_s002");
    assert_eq!(session.partner_id(), "S002");
    assert!(session.transcript().is_empty());

    settle().await;
    assert!(session.transcript().is_empty());

    let events = drain(&mut rx);
    assert!(events.contains(&DealEvent::ChatClosed { room: old_room }));

    // Only the new room is polled from now on
    seed_message(&backend, "F001", "S002", "second deal").await;
    tokio::time::sleep(INTERVAL).await;
    let transcript = session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].text, "second deal");
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_empty_partner_closes() {
    let backend = Arc::new(CountingBackend::new());
    let mut session = open(&backend, "F001", "S001");
    settle().await;

    let err = session.switch_partner("  ").unwrap_err();
    assert!(matches!(err, DealsError::InvalidParticipant(_)));
    assert_eq!(session.state(), SessionState::Closed);

    let before = backend.calls("history");
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(backend.calls("history"), before);
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_cannot_switch() {
    let backend = Arc::new(CountingBackend::new());
    let (events, mut rx) = EventSink::channel();
    let mut session = ChatSession::open(
        ChatStore::new(backend.clone()),
        "F001",
        "S001",
        INTERVAL,
        events,
    )
    .unwrap();
    settle().await;

    session.close();
    let err = session.switch_partner("S002").unwrap_err();
    assert!(matches!(err, DealsError::Validation(_)));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.room().as_str(), "f001_s001");

    let closed = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DealEvent::ChatClosed { .. }))
        .count();
    assert_eq!(closed, 1);

    let before = backend.calls("history");
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(backend.calls("history"), before);
}

#[tokio::test(start_paused = true)]
async fn test_closer_stops_session_from_another_task() {
    let backend = Arc::new(CountingBackend::new());
    let (events, mut rx) = EventSink::channel();
    let mut session = ChatSession::open(
        ChatStore::new(backend.clone()),
        "F001",
        "S001",
        INTERVAL,
        events,
    )
    .unwrap();
    settle().await;

    let closer = session.closer();
    tokio::spawn(async move { closer.close() })
        .await
        .expect("Failed to join closer task");
    assert_eq!(session.state(), SessionState::Closed);

    let before = backend.calls("history");
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(backend.calls("history"), before);

    // Closing again through the owner announces nothing new
    session.close();
    let closed = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DealEvent::ChatClosed { .. }))
        .count();
    assert_eq!(closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_discarded() {
    init_tracing();
    let backend = Arc::new(CountingBackend::new());

    // The scheduled fetch reads an empty room and answers late
    backend.push_history_delay(Duration::from_millis(500));
    let session = ChatSession::open(
        ChatStore::new(backend.clone()),
        "F001",
        "S001",
        Duration::from_secs(3600),
        EventSink::disabled(),
    )
    .unwrap();
    settle().await;
    assert_eq!(backend.calls("history"), 1);
    assert_eq!(session.state(), SessionState::Polling);

    seed_message(&backend, "S001", "F001", "offer accepted").await;
    session.refresh().await;
    assert_eq!(session.transcript().len(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_transport_errors_are_not_fatal() {
    let backend = Arc::new(CountingBackend::new());
    backend.set_fail_history(true);

    let (events, mut rx) = EventSink::channel();
    let session = ChatSession::open(
        ChatStore::new(backend.clone()),
        "F001",
        "S001",
        INTERVAL,
        events,
    )
    .unwrap();
    settle().await;

    assert!(session.is_open());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DealEvent::Error { .. })));

    seed_message(&backend, "S001", "F001", "back online").await;
    backend.set_fail_history(false);
    tokio::time::sleep(INTERVAL).await;

    assert_eq!(session.transcript().len(), 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, DealEvent::TranscriptUpdated { messages: 1, .. })));
}

#[tokio::test]
async fn test_open_rejects_missing_participant() {
    let backend = Arc::new(CountingBackend::new());
    let result = ChatSession::open(
        ChatStore::new(backend.clone()),
        "F001",
        "undefined",
        INTERVAL,
        EventSink::disabled(),
    );

    assert!(matches!(result, Err(DealsError::InvalidParticipant(_))));
    assert_eq!(backend.total_calls(), 0);
}
