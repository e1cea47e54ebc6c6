//! # Voice Assistant
//!
//! One exchange with the model:
//! 1. Wrap the uploaded recording in a user turn with the fixed instruction
//! 2. Lock the caller's session and replay its history after the system prompt
//! 3. Wait for the complete reply
//! 4. Keep the reply text and the first audio item
//! 5. Append the user turn and the assistant turn, then trim the history
//!
//! `provider.timeout_secs` bounds the whole exchange, including time spent
//! queued behind another exchange on the same session. A failed exchange
//! leaves the history exactly as it was.

use crate::config::AppConfig;
use crate::conversation::{ConversationSession, Media, Role, SystemPrompt, Turn};
use crate::error::{AppError, AppResult};
use crate::provider::{ChatProvider, ChatRequest, ReplyOutcome};
use crate::state::ProviderMetric;
use std::iter;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// The assistant's answer to one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    pub audio: Media,
}

pub struct VoiceAssistant {
    provider: Arc<dyn ChatProvider>,
    system_prompt: SystemPrompt,
    timeout: Duration,
    max_history_messages: usize,
    provider_stats: RwLock<ProviderMetric>,
}

impl VoiceAssistant {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        system_prompt: SystemPrompt,
        timeout: Duration,
        max_history_messages: usize,
    ) -> Self {
        Self {
            provider,
            system_prompt,
            timeout,
            max_history_messages,
            provider_stats: RwLock::new(ProviderMetric::default()),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn ChatProvider>,
        system_prompt: SystemPrompt,
    ) -> Self {
        Self::new(
            provider,
            system_prompt,
            Duration::from_secs(config.provider.timeout_secs),
            config.session.max_history_messages,
        )
    }

    pub fn provider(&self) -> &dyn ChatProvider {
        self.provider.as_ref()
    }

    pub fn system_prompt(&self) -> &SystemPrompt {
        &self.system_prompt
    }

    /// Calls made to the provider, timed from request to reply.
    pub fn provider_stats(&self) -> ProviderMetric {
        self.provider_stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Answer the questions in `audio` within the context of `session`.
    pub async fn ask(
        &self,
        session: &ConversationSession,
        audio: Vec<u8>,
    ) -> AppResult<AssistantReply> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let user_turn = Turn::user_audio(audio);

        // Held until the exchange is committed; concurrent requests on this
        // session queue here.
        let mut history = match tokio::time::timeout_at(deadline, session.lock_history()).await {
            Ok(history) => history,
            Err(_) => {
                warn!(
                    session_id = %session.session_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Timed out waiting for the previous exchange on this session"
                );
                return Err(self.timeout_error());
            }
        };
        let window = history_window(&history, self.max_history_messages);

        let request = ChatRequest {
            system_prompt: self.system_prompt.text(),
            messages: window.iter().chain(iter::once(&user_turn)).collect(),
        };
        let message_count = request.messages.len();

        info!(
            session_id = %session.session_id,
            history_turns = history.len(),
            messages = message_count,
            provider = %self.provider.name(),
            "Submitting exchange to provider"
        );

        let started = Instant::now();
        let result = tokio::time::timeout_at(deadline, self.provider.complete(request)).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        self.record_provider_call(duration_ms, matches!(result, Ok(Ok(_))));

        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(
                    session_id = %session.session_id,
                    duration_ms,
                    error = %e,
                    "Provider call failed"
                );
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    session_id = %session.session_id,
                    duration_ms,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Provider call timed out"
                );
                return Err(self.timeout_error());
            }
        };

        let (text, audio) = match reply.into_outcome() {
            ReplyOutcome::WithAudio { text, audio } => (text, audio),
            ReplyOutcome::WithoutAudio { text } => {
                warn!(
                    session_id = %session.session_id,
                    reply_chars = text.len(),
                    "Provider reply contained no audio media"
                );
                return Err(AppError::MissingAudio(
                    "Provider reply contained no audio media".to_string(),
                ));
            }
        };

        // Replies are replayed as text, so their audio is not kept
        history.push(user_turn);
        history.push(Turn::assistant(text.clone(), Vec::new()));
        let dropped = window_start(&history, self.max_history_messages);
        history.drain(..dropped);
        session.touch();

        info!(
            session_id = %session.session_id,
            history_turns = history.len(),
            dropped_turns = dropped,
            reply_audio_bytes = audio.data.len(),
            duration_ms,
            "Exchange completed"
        );

        Ok(AssistantReply { text, audio })
    }

    fn timeout_error(&self) -> AppError {
        AppError::Timeout(format!(
            "No reply from provider within {}s",
            self.timeout.as_secs_f64()
        ))
    }

    fn record_provider_call(&self, duration_ms: u64, succeeded: bool) {
        let mut stats = self
            .provider_stats
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        stats.call_count += 1;
        stats.total_duration_ms += duration_ms;
        if !succeeded {
            stats.failure_count += 1;
        }
    }
}

/// The most recent `max` turns, never opening on an assistant reply.
fn history_window(history: &[Turn], max: usize) -> &[Turn] {
    &history[window_start(history, max)..]
}

fn window_start(history: &[Turn], max: usize) -> usize {
    let mut start = history.len().saturating_sub(max);
    while start < history.len() && history[start].role == Role::Assistant {
        start += 1;
    }
    start
}
