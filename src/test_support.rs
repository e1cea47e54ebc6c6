//! Shared fixtures for unit tests: a scripted provider that records every
//! request, and helpers to build application state and multipart uploads.

use crate::config::AppConfig;
use crate::conversation::{Media, SystemPrompt, Turn};
use crate::provider::{ChatProvider, ChatReply, ChatRequest, ProviderError};
use crate::state::AppState;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BOUNDARY: &str = "----voice-assistant-test-boundary";

enum Scripted {
    Reply(ChatReply),
    Fail { status: u16, message: String },
}

/// What the provider was asked, with turns copied out of the borrowed request.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub messages: Vec<Turn>,
}

pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn replying(replies: Vec<ChatReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(Scripted::Reply).collect()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Scripted::Fail {
                status,
                message: message.to_string(),
            }])),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A reply with text and one audio item derived from the text.
    pub fn spoken(text: &str) -> ChatReply {
        ChatReply {
            text: text.to_string(),
            media: vec![Media::wav(format!("audio:{}", text).into_bytes())],
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-audio-model"
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatReply, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: request.system_prompt.to_string(),
            messages: request.messages.iter().map(|turn| (*turn).clone()).collect(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail { status, message }) => {
                Err(ProviderError::Status { status, message })
            }
            None => Err(ProviderError::InvalidResponse("no scripted reply left".to_string())),
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.provider.api_key = "sk-test".to_string();
    config
}

pub fn test_state(config: AppConfig, provider: Arc<MockProvider>) -> AppState {
    AppState::new(config, SystemPrompt::from_text("You are Marvin."), provider)
}

/// A `multipart/form-data` body with one file part.
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
