//! # Provider Module
//!
//! The hosted model that listens to the recording, reasons about it and
//! speaks the answer is an external service. This module is the seam to it:
//! [`ChatProvider`] is what the assistant talks to, and
//! [`openai::OpenAiProvider`] is the production implementation.

pub mod openai;

use crate::conversation::{Media, Turn};
use async_trait::async_trait;

pub use openai::OpenAiProvider;

/// Everything sent to the model for one exchange.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system_prompt: &'a str,
    /// Prior turns in order, followed by the new user turn.
    pub messages: Vec<&'a Turn>,
}

/// The model's complete answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub media: Vec<Media>,
}

/// A reply classified by whether it carries audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    WithAudio { text: String, audio: Media },
    WithoutAudio { text: String },
}

impl ChatReply {
    /// Keep the first media item as the spoken reply.
    pub fn into_outcome(self) -> ReplyOutcome {
        match self.media.into_iter().next() {
            Some(audio) => ReplyOutcome::WithAudio {
                text: self.text,
                audio,
            },
            None => ReplyOutcome::WithoutAudio { text: self.text },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name for logs and health output.
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Submit the conversation and wait for the complete reply.
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_outcome_keeps_first_media() {
        let reply = ChatReply {
            text: "I am listening.".into(),
            media: vec![Media::wav(vec![1]), Media::wav(vec![2])],
        };
        assert_eq!(
            reply.into_outcome(),
            ReplyOutcome::WithAudio {
                text: "I am listening.".into(),
                audio: Media::wav(vec![1]),
            }
        );
    }

    #[test]
    fn test_reply_outcome_without_media() {
        let reply = ChatReply {
            text: "Text only".into(),
            media: vec![],
        };
        assert_eq!(
            reply.into_outcome(),
            ReplyOutcome::WithoutAudio {
                text: "Text only".into()
            }
        );
    }
}
