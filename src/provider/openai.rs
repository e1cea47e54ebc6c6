//! OpenAI-compatible chat completions with audio input and audio output.
//!
//! The recording travels as an `input_audio` content part, and the reply is
//! requested with `modalities: ["text", "audio"]`. The spoken answer comes
//! back base64 encoded in `message.audio.data`, with the text of what was
//! said in `message.audio.transcript`.

use super::{ChatProvider, ChatReply, ChatRequest, ProviderError};
use crate::config::ProviderConfig;
use crate::conversation::{Media, Role, Turn};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    modalities: [&'static str; 2],
    audio: AudioOptions<'a>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AudioOptions<'a> {
    voice: &'a str,
    format: &'a str,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    InputAudio { input_audio: InputAudio<'a> },
}

#[derive(Debug, Serialize)]
struct InputAudio<'a> {
    data: String,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    audio: Option<AudioOutput>,
}

#[derive(Debug, Deserialize)]
struct AudioOutput {
    data: String,
    transcript: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    audio_format: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), COMPLETIONS_PATH),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            audio_format: config.audio_format.clone(),
        })
    }

    fn build_request<'a>(&'a self, request: &ChatRequest<'a>) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: WireContent::Text(request.system_prompt),
        });
        messages.extend(request.messages.iter().map(|turn| wire_message(*turn)));

        CompletionRequest {
            model: &self.model,
            modalities: ["text", "audio"],
            audio: AudioOptions {
                voice: &self.voice,
                format: &self.audio_format,
            },
            messages,
        }
    }

    fn parse_reply(&self, response: CompletionResponse) -> Result<ChatReply, ProviderError> {
        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?;

        let content = message.content.filter(|text| !text.is_empty());

        match message.audio {
            Some(audio) => {
                let data = STANDARD.decode(audio.data.as_bytes()).map_err(|e| {
                    ProviderError::InvalidResponse(format!("audio data is not valid base64: {}", e))
                })?;
                Ok(ChatReply {
                    text: content.or(audio.transcript).unwrap_or_default(),
                    media: vec![Media::new(format!("audio/{}", self.audio_format), data)],
                })
            }
            None => Ok(ChatReply {
                text: content.unwrap_or_default(),
                media: Vec::new(),
            }),
        }
    }
}

/// User turns carry their audio; assistant turns are replayed as text.
fn wire_message(turn: &Turn) -> WireMessage<'_> {
    match turn.role {
        Role::User => {
            let mut parts = vec![ContentPart::Text { text: &turn.text }];
            parts.extend(turn.media.iter().map(|media| ContentPart::InputAudio {
                input_audio: InputAudio {
                    data: STANDARD.encode(&media.data),
                    format: media.format(),
                },
            }));
            WireMessage {
                role: Role::User.as_str(),
                content: WireContent::Parts(parts),
            }
        }
        Role::Assistant => WireMessage {
            role: Role::Assistant.as_str(),
            content: WireContent::Text(&turn.text),
        },
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatReply, ProviderError> {
        let body = self.build_request(&request);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        self.parse_reply(completion)
    }
}
