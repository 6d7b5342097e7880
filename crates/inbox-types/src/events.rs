//! Wire types for the realtime channel.
//!
//! Outbound frames are `{"type": ..., "payload": ...}` envelopes. The only
//! inbound frame the server understands is `{"action": "ping"}`.

use serde::{Deserialize, Serialize};

use crate::ContextSnapshot;

/// Server-initiated message pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BroadcastMessage {
    /// Full refresh of everything the client should know
    #[serde(rename = "context:update")]
    ContextUpdate(ContextSnapshot),
    /// A single item created outside the polling cycle
    #[serde(rename = "item:new")]
    ItemNew(serde_json::Value),
    #[serde(rename = "pong")]
    Pong,
}

impl BroadcastMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            BroadcastMessage::ContextUpdate(_) => "context:update",
            BroadcastMessage::ItemNew(_) => "item:new",
            BroadcastMessage::Pong => "pong",
        }
    }
}

/// Client-initiated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientAction {
    Ping,
}

impl ClientAction {
    /// Parse an inbound text frame. Anything unrecognised yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pong_has_no_payload() {
        let json = serde_json::to_value(BroadcastMessage::Pong).unwrap();
        assert_eq!(json, json!({"type": "pong"}));
    }

    #[test]
    fn test_item_new_envelope() {
        let msg = BroadcastMessage::ItemNew(json!({"title": "Problem set 4"}));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "item:new");
        assert_eq!(json["payload"]["title"], "Problem set 4");
        assert_eq!(msg.type_name(), "item:new");
    }

    #[test]
    fn test_context_update_envelope() {
        let msg = BroadcastMessage::ContextUpdate(ContextSnapshot::default());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "context:update");
        assert!(json["payload"]["courses"].as_array().unwrap().is_empty());

        let parsed: BroadcastMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(ClientAction::parse(r#"{"action":"ping"}"#), Some(ClientAction::Ping));
    }

    #[test]
    fn test_parse_ignores_unknown_shapes() {
        assert_eq!(ClientAction::parse(r#"{"action":"subscribe"}"#), None);
        assert_eq!(ClientAction::parse(r#"{"hello":"world"}"#), None);
        assert_eq!(ClientAction::parse("[1, 2, 3]"), None);
        assert_eq!(ClientAction::parse("not json at all"), None);
        assert_eq!(ClientAction::parse(""), None);
    }
}
