//! End-to-end tests of the session runtime
//!
//! Every test builds a `SessionRuntime` over a scripted text source and
//! drives it purely through `dispatch`, observing results through the
//! read-model selectors and the event log.

use folio_engine::config::{Config, StreamProvider};
use folio_engine::llm::scripted::ScriptedSource;
use folio_engine::llm::{StreamItem, CANCELLED_REASON};
use folio_engine::runtime::{RuntimeSlot, SessionRuntime};
use sdk::command::Command;
use sdk::errors::RuntimeError;
use sdk::event::{EventPayload, EventType};
use sdk::types::{MessageStatus, Role, SessionId};
use std::sync::Arc;
use std::time::Duration;

fn config() -> Config {
    let mut config = Config::default();
    config.stream.provider = StreamProvider::Scripted;
    config
}

fn runtime_with(source: ScriptedSource) -> SessionRuntime {
    SessionRuntime::new(&config(), Arc::new(source))
}

async fn created(runtime: &SessionRuntime, id: &str) {
    runtime
        .dispatch(Command::create_session(Some(SessionId::from(id)), "T"))
        .await
        .unwrap();
}

async fn settle(runtime: &SessionRuntime, id: &str) {
    tokio::time::timeout(Duration::from_secs(5), runtime.wait_idle(&SessionId::from(id)))
        .await
        .expect("session did not become idle");
}

async fn count(runtime: &SessionRuntime, event_type: EventType) -> usize {
    runtime
        .events()
        .await
        .iter()
        .filter(|e| e.event_type() == event_type)
        .count()
}

#[tokio::test]
async fn scenario_a_create_session() {
    let runtime = runtime_with(ScriptedSource::echo());
    created(&runtime, "S1").await;

    let sessions = runtime.get_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id.as_str(), "S1");
    assert_eq!(sessions[0].title, "T");
}

#[tokio::test]
async fn scenario_b_streamed_answer_is_concatenated() {
    let runtime = runtime_with(ScriptedSource::deltas(["He", "llo"]));
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "hello"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let messages = runtime.get_messages(&SessionId::from("S1"));
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].status, MessageStatus::Done);
    assert_eq!(messages[1].content, "Hello");
}

#[tokio::test]
async fn scenario_c_duplicate_command_id_adds_one_message() {
    let source = Arc::new(ScriptedSource::deltas(["ok"]));
    let runtime = SessionRuntime::new(&config(), Arc::clone(&source) as _);
    created(&runtime, "S1").await;

    let send = Command::send_message("S1", "x").with_id("C9");
    runtime.dispatch(send.clone()).await.unwrap();
    runtime.dispatch(send).await.unwrap();
    settle(&runtime, "S1").await;

    let users = runtime
        .get_messages(&SessionId::from("S1"))
        .into_iter()
        .filter(|m| m.role == Role::User)
        .count();
    assert_eq!(users, 1);
    assert_eq!(count(&runtime, EventType::UserMessageAdded).await, 1);
    assert_eq!(source.streams_opened(), 1);
}

#[tokio::test]
async fn scenario_d_stop_before_done_aborts() {
    let source = ScriptedSource::deltas(["a", "b", "c"]).with_delay(Duration::from_millis(200));
    let runtime = runtime_with(source);
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "hello"))
        .await
        .unwrap();
    runtime
        .dispatch(Command::stop_streaming("S1"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let messages = runtime.get_messages(&SessionId::from("S1"));
    let assistant = messages.iter().find(|m| m.role == Role::Assistant).unwrap();
    assert_eq!(assistant.status, MessageStatus::Aborted);
    assert_eq!(assistant.error.as_deref(), Some(CANCELLED_REASON));
    assert_eq!(count(&runtime, EventType::AssistantMessageAborted).await, 1);
    assert_eq!(count(&runtime, EventType::AssistantMessageCompleted).await, 0);
}

#[tokio::test]
async fn single_flight_rejects_second_run() {
    let source = ScriptedSource::deltas(["one", "two"]).with_delay(Duration::from_millis(50));
    let runtime = runtime_with(source);
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "first"))
        .await
        .unwrap();
    assert!(runtime.is_running(&SessionId::from("S1")));

    runtime
        .dispatch(Command::send_message("S1", "second"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    assert_eq!(count(&runtime, EventType::UserMessageAdded).await, 2);
    assert_eq!(count(&runtime, EventType::AssistantMessageStarted).await, 1);

    let assistant: Vec<_> = runtime
        .get_messages(&SessionId::from("S1"))
        .into_iter()
        .filter(|m| m.role == Role::Assistant)
        .collect();
    assert_eq!(assistant.len(), 1);
    assert_eq!(assistant[0].content, "onetwo");
    assert_eq!(assistant[0].status, MessageStatus::Done);
}

#[tokio::test]
async fn sessions_stream_independently() {
    let source = ScriptedSource::deltas(["x"]).with_delay(Duration::from_millis(30));
    let runtime = runtime_with(source);
    created(&runtime, "S1").await;
    created(&runtime, "S2").await;

    runtime
        .dispatch(Command::send_message("S1", "a"))
        .await
        .unwrap();
    runtime
        .dispatch(Command::send_message("S2", "b"))
        .await
        .unwrap();
    assert!(runtime.is_running(&SessionId::from("S1")));
    assert!(runtime.is_running(&SessionId::from("S2")));

    settle(&runtime, "S1").await;
    settle(&runtime, "S2").await;
    assert_eq!(count(&runtime, EventType::AssistantMessageCompleted).await, 2);
}

#[tokio::test]
async fn cancellation_releases_the_slot() {
    let source = ScriptedSource::deltas(["slow"]).with_delay(Duration::from_millis(100));
    let runtime = runtime_with(source);
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "first"))
        .await
        .unwrap();
    runtime
        .dispatch(Command::stop_streaming("S1"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;
    assert!(!runtime.is_running(&SessionId::from("S1")));

    runtime
        .dispatch(Command::send_message("S1", "second"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let statuses: Vec<MessageStatus> = runtime
        .get_messages(&SessionId::from("S1"))
        .into_iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.status)
        .collect();
    assert_eq!(statuses, vec![MessageStatus::Aborted, MessageStatus::Done]);
}

#[tokio::test]
async fn new_run_can_start_from_terminal_event() {
    let runtime = runtime_with(ScriptedSource::deltas(["ok"]));
    created(&runtime, "S1").await;
    let mut completed = runtime.subscribe(EventType::AssistantMessageCompleted).await;

    runtime
        .dispatch(Command::send_message("S1", "first"))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), completed.recv())
        .await
        .unwrap()
        .unwrap();

    runtime
        .dispatch(Command::send_message("S1", "second"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;
    assert_eq!(count(&runtime, EventType::AssistantMessageStarted).await, 2);
}

#[tokio::test]
async fn stream_failure_frees_the_slot() {
    let source = ScriptedSource::new(vec![
        StreamItem::delta("Partial"),
        StreamItem::Error {
            message: "model crashed".to_string(),
        },
    ]);
    let runtime = runtime_with(source);
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "q"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let messages = runtime.get_messages(&SessionId::from("S1"));
    let assistant = &messages[1];
    assert_eq!(assistant.status, MessageStatus::Failed);
    assert_eq!(assistant.content, "Partial");
    assert_eq!(assistant.error.as_deref(), Some("model crashed"));
    assert!(!runtime.is_running(&SessionId::from("S1")));

    runtime
        .dispatch(Command::send_message("S1", "retry"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;
    assert_eq!(count(&runtime, EventType::AssistantMessageStarted).await, 2);
}

#[tokio::test]
async fn open_failure_becomes_failed_message() {
    let runtime = runtime_with(ScriptedSource::failing_open("connection refused"));
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "q"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let messages = runtime.get_messages(&SessionId::from("S1"));
    assert_eq!(messages[1].status, MessageStatus::Failed);
    assert!(messages[1]
        .error
        .as_deref()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn event_order_for_one_message() {
    let runtime = runtime_with(ScriptedSource::deltas(["Re", "tri", "eval"]));
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "define retrieval"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let events = runtime.events_for(&SessionId::from("S1")).await;
    let types: Vec<EventType> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        vec![
            EventType::SessionCreated,
            EventType::UserMessageAdded,
            EventType::AssistantMessageStarted,
            EventType::AssistantMessageDelta,
            EventType::AssistantMessageDelta,
            EventType::AssistantMessageDelta,
            EventType::AssistantMessageCompleted,
        ]
    );

    let streamed: String = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::AssistantMessageDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    let messages = runtime.get_messages(&SessionId::from("S1"));
    assert_eq!(streamed, messages[1].content);
    assert_eq!(streamed, "Retrieval");
}

#[tokio::test]
async fn subscribers_see_publish_order() {
    let runtime = runtime_with(ScriptedSource::deltas(["a", "b"]));
    let mut all = runtime.subscribe(EventType::All).await;
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "q"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let logged = runtime.events().await;
    let mut received = Vec::new();
    while let Ok(event) = all.try_recv() {
        received.push(event.id);
    }
    let expected: Vec<_> = logged.iter().map(|e| e.id).collect();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn context_includes_direction_and_history() {
    let source = Arc::new(ScriptedSource::deltas(["answer"]));
    let mut config = config();
    config.session.system_prompt = "System.".to_string();
    let runtime = SessionRuntime::new(&config, Arc::clone(&source) as _);
    created(&runtime, "S1").await;

    runtime
        .dispatch(Command::send_message("S1", "first question"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    runtime
        .dispatch(Command::confirm_research_direction("S1", "protein folding"))
        .await
        .unwrap();
    runtime
        .dispatch(Command::send_message("S1", "second question"))
        .await
        .unwrap();
    settle(&runtime, "S1").await;

    let prompt = source.last_prompt().unwrap();
    let contents: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();
    assert!(contents[0].contains("Confirmed research direction: protein folding"));
    assert_eq!(&contents[1..], &["first question", "answer", "second question"]);
}

#[tokio::test]
async fn missing_session_id_is_an_error() {
    let runtime = runtime_with(ScriptedSource::echo());
    let result = runtime
        .dispatch_json(r#"{"id":"C1","type":"RenameSession","ts":"2024-05-01T10:00:00Z","params":{"title":"x"}}"#)
        .await;
    assert!(matches!(result, Err(RuntimeError::MissingSessionId { .. })));
    assert!(runtime.events().await.is_empty());
}

#[tokio::test]
async fn ensure_initialized_reuses_runtime_state() {
    static SLOT: RuntimeSlot = RuntimeSlot::new();

    let first = SLOT.ensure_initialized(&config(), Arc::new(ScriptedSource::echo()));
    first
        .dispatch(Command::create_session(Some(SessionId::from("S1")), "T"))
        .await
        .unwrap();

    let second = SLOT.ensure_initialized(&config(), Arc::new(ScriptedSource::echo()));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.get_sessions().len(), 1);

    let send = Command::send_message("S1", "once").with_id("C1");
    first.dispatch(send.clone()).await.unwrap();
    second.dispatch(send).await.unwrap();
    second.wait_idle(&SessionId::from("S1")).await;
    assert_eq!(count(&second, EventType::UserMessageAdded).await, 1);
}
