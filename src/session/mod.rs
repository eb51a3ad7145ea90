mod credential;
mod error;
mod transcript;

pub use credential::Credential;
pub use error::SessionError;
pub use transcript::{Transcript, Turn, TurnRole};

use crate::agent::AgentEvent;
use crate::provider::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Produces the reply sequence for one submission.
///
/// `history` is the conversation so far, oldest first, ending with the new
/// user message. The last returned message is taken as the answer; anything
/// before it (tool calls, tool results) is intermediate.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(
        &self,
        session_id: &str,
        history: Vec<Message>,
        credential: &Credential,
        observer: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<Vec<Message>, SessionError>;
}

/// How much of the transcript is forwarded with each submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Every turn so far, greeting included.
    #[default]
    Full,
    /// Only the newest user turn.
    Latest,
}

impl std::str::FromStr for HistoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "latest" => Ok(Self::Latest),
            other => Err(format!("unknown history mode '{other}' (expected full or latest)")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Seeded assistant turn, if any.
    pub greeting: Option<String>,
    pub history: HistoryMode,
}

pub struct Session {
    pub id: String,
    transcript: Transcript,
    answerer: Arc<dyn Answerer>,
    history: HistoryMode,
}

impl Session {
    pub fn new(config: SessionConfig, answerer: Arc<dyn Answerer>) -> Self {
        let transcript = match config.greeting {
            Some(greeting) if !greeting.trim().is_empty() => Transcript::with_greeting(greeting),
            _ => Transcript::new(),
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transcript,
            answerer,
            history: config.history,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send one user utterance and return the assistant's answer.
    ///
    /// Without a credential nothing is recorded and the answerer is not
    /// called. Once the user turn is appended it stays, even if the call
    /// fails; the assistant turn is appended only on success.
    pub async fn submit(
        &mut self,
        user_text: &str,
        credential: Option<&Credential>,
        observer: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<String, SessionError> {
        let credential = credential.ok_or(SessionError::MissingCredential)?;

        self.transcript.push(Turn::user(user_text));
        let history = self.history_messages();
        debug!(
            session = %self.id,
            turns = self.transcript.len(),
            messages = history.len(),
            "Submitting user turn"
        );

        let replies = self
            .answerer
            .answer(&self.id, history, credential, observer)
            .await?;
        let answer = final_answer(&replies)?;

        self.transcript.push(Turn::assistant(answer.clone()));
        Ok(answer)
    }

    fn history_messages(&self) -> Vec<Message> {
        match self.history {
            HistoryMode::Full => self.transcript.turns().iter().map(Turn::to_message).collect(),
            HistoryMode::Latest => self
                .transcript
                .last()
                .map(Turn::to_message)
                .into_iter()
                .collect(),
        }
    }
}

/// Text of the last reply, which must be a non-empty assistant message.
fn final_answer(replies: &[Message]) -> Result<String, SessionError> {
    let last = replies
        .last()
        .ok_or_else(|| SessionError::MalformedResponse("empty reply".to_string()))?;

    if last.role != Role::Assistant {
        return Err(SessionError::MalformedResponse(format!(
            "last reply came from {:?}, not the assistant",
            last.role
        )));
    }

    let text = last.text_content();
    if text.trim().is_empty() {
        return Err(SessionError::MalformedResponse(
            "assistant reply has no text".to_string(),
        ));
    }
    Ok(text)
}
