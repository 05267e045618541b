#![allow(clippy::unwrap_used, clippy::expect_used)]

use maestro_core::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// 1. Chat message list keeps order through serialization
// ---------------------------------------------------------------------------

#[test]
fn chat_messages_preserve_order() {
    let messages = vec![
        ChatMessage::system("You are the Coder agent."),
        ChatMessage::user("Implement a parser"),
        ChatMessage::assistant("fn parse() {}"),
    ];

    let json = serde_json::to_string(&messages).unwrap();
    let parsed: Vec<ChatMessage> = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, messages);
    assert_eq!(parsed[0].role, ChatRole::System);
}

// ---------------------------------------------------------------------------
// 2. Error variants render the ids callers passed in
// ---------------------------------------------------------------------------

#[test]
fn not_found_errors_carry_ids() {
    let id = Uuid::new_v4();
    assert!(MaestroError::TaskNotFound(id).to_string().contains(&id.to_string()));
    assert!(MaestroError::AgentNotFound("bug-hunter".into())
        .to_string()
        .contains("bug-hunter"));
}

#[test]
fn timeout_errors_are_distinct() {
    let id = Uuid::new_v4();
    let collab = MaestroError::CollaborationTimeout(id).to_string();
    let nego = MaestroError::NegotiationTimeout(id).to_string();
    assert!(collab.starts_with("Collaboration"));
    assert!(nego.starts_with("Negotiation"));
}

// ---------------------------------------------------------------------------
// 3. JSON errors convert through `?`
// ---------------------------------------------------------------------------

fn parse(raw: &str) -> MaestroResult<serde_json::Value> {
    Ok(serde_json::from_str(raw)?)
}

#[test]
fn json_error_converts() {
    let err = parse("{not json").unwrap_err();
    assert!(matches!(err, MaestroError::Json(_)));
}
