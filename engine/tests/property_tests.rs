use folio_engine::config::Config;
use folio_engine::projection::ReadModel;
use proptest::prelude::*;
use sdk::event::{Event, EventPayload};
use sdk::types::{MessageId, MessageStatus, SessionId};

// Configuration survives a TOML round-trip and stays valid
proptest! {
    #[test]
    fn test_config_parsing_round_trip(
        log_level in "error|warn|info|debug|trace",
        provider in "ollama|scripted",
        context_window in 1..=64usize,
        temperature in 0.0..=2.0f32,
        buffer in 1..=1024usize,
    ) {
        let toml_src = format!(
            r#"
[core]
log_level = "{log_level}"

[session]
context_window = {context_window}

[stream]
provider = "{provider}"
temperature = {temperature}

[bus]
subscriber_buffer = {buffer}
"#
        );

        let config = Config::from_toml_str(&toml_src).expect("generated config should be valid");
        let rendered = toml::to_string(&config).expect("Failed to serialize Config to string");
        let parsed = Config::from_toml_str(&rendered).expect("Failed to parse rendered config");

        prop_assert_eq!(&config.core.log_level, &parsed.core.log_level);
        prop_assert_eq!(config.session.context_window, parsed.session.context_window);
        prop_assert_eq!(config.stream.provider, parsed.stream.provider);
        prop_assert_eq!(config.stream.temperature, parsed.stream.temperature);
        prop_assert_eq!(config.bus.subscriber_buffer, parsed.bus.subscriber_buffer);
    }
}

fn session_strategy() -> impl Strategy<Value = SessionId> {
    prop_oneof![Just("S1"), Just("S2")].prop_map(SessionId::from)
}

fn message_strategy() -> impl Strategy<Value = MessageId> {
    prop_oneof![Just("M1"), Just("M2"), Just("M3")].prop_map(MessageId::from)
}

fn payload_strategy() -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        "[a-z ]{0,12}".prop_map(|title| EventPayload::SessionCreated { title }),
        "[a-z ]{0,12}".prop_map(|title| EventPayload::SessionRenamed { title }),
        any::<bool>().prop_map(|enabled| EventPayload::DeepResearchModeChanged { enabled }),
        "[a-z ]{0,12}".prop_map(|direction| EventPayload::ResearchDirectionConfirmed { direction }),
        (message_strategy(), "[a-z]{0,8}")
            .prop_map(|(message_id, text)| EventPayload::UserMessageAdded { message_id, text }),
        message_strategy().prop_map(|message_id| EventPayload::AssistantMessageStarted { message_id }),
        (message_strategy(), "[a-z]{1,4}").prop_map(|(message_id, delta)| {
            EventPayload::AssistantMessageDelta { message_id, delta }
        }),
        message_strategy().prop_map(|message_id| EventPayload::AssistantMessageCompleted { message_id }),
        (message_strategy(), "[a-z]{1,6}").prop_map(|(message_id, reason)| {
            EventPayload::AssistantMessageAborted { message_id, reason }
        }),
        (message_strategy(), "[a-z]{1,6}").prop_map(|(message_id, error)| {
            EventPayload::AssistantMessageFailed { message_id, error }
        }),
    ]
}

fn event_log_strategy() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec((session_strategy(), payload_strategy()), 0..60).prop_map(|items| {
        items
            .into_iter()
            .map(|(session_id, payload)| Event::new(session_id, payload))
            .collect()
    })
}

// Replaying the same log always yields the same read model
proptest! {
    #[test]
    fn test_projection_is_deterministic(events in event_log_strategy()) {
        let first = ReadModel::replay(&events);
        let second = ReadModel::replay(&events);
        prop_assert_eq!(&first, &second);

        // Applying one by one matches bulk replay
        let mut incremental = ReadModel::new();
        for event in &events {
            incremental.apply(event);
        }
        prop_assert_eq!(&first, &incremental);
    }

    #[test]
    fn test_terminal_status_never_changes(events in event_log_strategy()) {
        let mut model = ReadModel::new();
        let mut terminal: Vec<(SessionId, MessageId, MessageStatus, String)> = Vec::new();

        for event in &events {
            model.apply(event);

            for (session_id, message_id, status, content) in &terminal {
                let message = model
                    .session(session_id)
                    .and_then(|s| s.messages.iter().find(|m| &m.id == message_id))
                    .expect("terminal message disappeared");
                prop_assert_eq!(message.status, *status);
                prop_assert_eq!(&message.content, content);
            }

            for session in model.sessions() {
                for message in &session.messages {
                    let known = terminal
                        .iter()
                        .any(|(s, m, _, _)| s == &session.id && m == &message.id);
                    if message.status.is_terminal() && !known {
                        terminal.push((
                            session.id.clone(),
                            message.id.clone(),
                            message.status,
                            message.content.clone(),
                        ));
                    }
                }
            }
        }
    }

    #[test]
    fn test_deltas_concatenate_in_order(deltas in prop::collection::vec("[a-zA-Z ]{1,6}", 0..20)) {
        let session = SessionId::from("S1");
        let message = MessageId::from("A1");

        let mut events = vec![
            Event::new(session.clone(), EventPayload::SessionCreated { title: "T".to_string() }),
            Event::new(
                session.clone(),
                EventPayload::AssistantMessageStarted { message_id: message.clone() },
            ),
        ];
        events.extend(deltas.iter().map(|delta| {
            Event::new(
                session.clone(),
                EventPayload::AssistantMessageDelta {
                    message_id: message.clone(),
                    delta: delta.clone(),
                },
            )
        }));
        events.push(Event::new(
            session.clone(),
            EventPayload::AssistantMessageCompleted { message_id: message.clone() },
        ));

        let model = ReadModel::replay(&events);
        let projected = &model.session(&session).unwrap().messages[0];

        prop_assert_eq!(&projected.content, &deltas.concat());
        prop_assert_eq!(projected.status, MessageStatus::Done);
    }
}
