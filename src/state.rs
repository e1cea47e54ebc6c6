//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data`.
//!
//! ## What lives here:
//! - **config**: read once at startup, immutable afterwards (plain `Arc`)
//! - **assistant**: the voice assistant, wrapping the provider and system prompt
//! - **sessions**: per-caller conversation histories
//! - **metrics**: request and provider counters, updated on every request
//!
//! `AppState` is cheap to clone: every field is reference counted, so each
//! actix worker gets its own handle to the same underlying data.

use crate::assistant::VoiceAssistant;
use crate::config::AppConfig;
use crate::conversation::{SessionStore, SystemPrompt};
use crate::provider::ChatProvider;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub assistant: Arc<VoiceAssistant>,
    pub sessions: Arc<SessionStore>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Per-endpoint statistics, keyed by "METHOD /route/pattern"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Calls made to the upstream model, excluding time queued on a session
    pub provider: ProviderMetric,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

#[derive(Debug, Default, Clone)]
pub struct ProviderMetric {
    pub call_count: u64,
    pub failure_count: u64,
    pub total_duration_ms: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        system_prompt: SystemPrompt,
        provider: Arc<dyn ChatProvider>,
    ) -> Self {
        let sessions = SessionStore::new(config.session.max_sessions);
        let assistant = VoiceAssistant::from_config(&config, provider, system_prompt);

        Self {
            config: Arc::new(config),
            assistant: Arc::new(assistant),
            sessions: Arc::new(sessions),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record the outcome of one request against its route pattern.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the request counters, plus the provider call statistics
    /// kept by the assistant.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let mut snapshot = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.provider = self.assistant.provider_stats();
        snapshot
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn write_metrics(&self) -> std::sync::RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl ProviderMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.call_count > 0 {
            self.total_duration_ms as f64 / self.call_count as f64
        } else {
            0.0
        }
    }
}
