use serde::{Deserialize, Serialize};

use crate::core::game::Card;

/// Body of a long-poll response. Absent fields are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub briscola: Option<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_required: Option<bool>,
}

impl PlayEvent {
    /// Informational notification
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::default()
        }
    }

    /// Dealt hand with the briscola card
    pub fn hand(cards: Vec<Card>, briscola: Card, action_required: bool) -> Self {
        Self {
            message: None,
            cards: Some(cards),
            briscola: Some(briscola),
            action_required: Some(action_required),
        }
    }
}

/// An event addressed to one feed
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub feed: String,
    pub payload: PlayEvent,
}

impl Event {
    pub fn new(feed: impl Into<String>, payload: PlayEvent) -> Self {
        Self {
            feed: feed.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::Suit;

    #[test]
    fn test_message_event_omits_empty_fields() {
        let json = serde_json::to_value(PlayEvent::message("hello")).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "hello" }));
    }

    #[test]
    fn test_hand_event_uses_camel_case() {
        let event = PlayEvent::hand(vec![Card::new(Suit::Cups, 3)], Card::new(Suit::Swords, 1), true);
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["actionRequired"], true);
        assert_eq!(json["briscola"]["suit"], "swords");
        assert_eq!(json["cards"][0]["value"], 3);
        assert!(json.get("message").is_none());
    }
}
