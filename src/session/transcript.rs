use crate::provider::{Message, Role};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One utterance in the conversation. Fields are private so a turn cannot
/// change once it is in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: TurnRole,
    content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Provider message carrying this turn.
    pub fn to_message(&self) -> Message {
        let role = match self.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        Message::text(role, self.content.clone())
    }
}

/// Append-only record of one session's conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript seeded with an assistant greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::assistant(greeting)],
        }
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_seed() {
        let transcript = Transcript::with_greeting("Hi, ask me anything.");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.turns()[0].role(), TurnRole::Assistant);
        assert!(Transcript::new().is_empty());
    }

    #[test]
    fn test_turn_to_message() {
        let msg = Turn::user("2+2").to_message();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text_content(), "2+2");

        let msg = Turn::assistant("4").to_message();
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_serializes_as_list() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::user("2+2"));
        transcript.push(Turn::assistant("4"));
        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "user", "content": "2+2"},
                {"role": "assistant", "content": "4"}
            ])
        );
    }
}
