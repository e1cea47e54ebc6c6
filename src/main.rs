//! # Voice Assistant Backend - Main Application Entry Point
//!
//! An Actix-web server that answers spoken questions. A caller uploads a
//! recording to `POST /ask`; the recording, the caller's earlier turns and a
//! system prompt are sent to an audio-capable model, and the transcript plus
//! the spoken reply come back as JSON.
//!
//! ## Application Architecture:
//! - **config**: Handles application configuration (TOML files + environment variables)
//! - **conversation**: Turns, per-caller sessions and the system prompt
//! - **provider**: The seam to the hosted model (OpenAI chat completions)
//! - **assistant**: One question/answer exchange against a session
//! - **audio**: Light inspection of uploaded recordings
//! - **state**: Manages shared application state and metrics
//! - **health**: Provides system health monitoring endpoints
//! - **middleware**: Custom request processing logic (logging, metrics)
//! - **handlers**: HTTP request handlers for API endpoints
//! - **error**: Custom error types and HTTP error responses

mod assistant;
mod audio;
mod config;
mod conversation;
mod error;
mod handlers;
mod health;
mod middleware;
mod provider;
mod state;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{middleware::from_fn, middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use conversation::SystemPrompt;
use provider::{ChatProvider, OpenAiProvider};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Loads the system prompt** and builds the provider client
/// 3. **Starts the session reaper** that expires idle conversations
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
///
/// A missing API key or an unreadable prompt stops the process here, before
/// the port is bound.
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    info!("Starting voice-assistant-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}", config.bind_address());

    let system_prompt = SystemPrompt::load(&config.chatbot.prompt)
        .with_context(|| format!("Failed to load system prompt '{}'", config.chatbot.prompt))?;
    info!(
        source = %system_prompt.source(),
        chars = system_prompt.text().chars().count(),
        "System prompt loaded"
    );

    let provider: Arc<dyn ChatProvider> = Arc::new(
        OpenAiProvider::new(&config.provider).context("Failed to build provider client")?,
    );
    info!(
        provider = provider.name(),
        model = provider.model(),
        voice = %config.provider.voice,
        "Provider ready"
    );

    let app_state = AppState::new(config.clone(), system_prompt, provider);
    let bind_addr = config.bind_address();

    let reaper = Arc::clone(&app_state.sessions).spawn_reaper(
        Duration::from_secs(config.session.idle_timeout_secs),
        Duration::from_secs(config.session.cleanup_interval_secs),
    );

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        // Browsers must be able to read the session id to continue a conversation
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_headers([handlers::SESSION_HEADER])
            .max_age(3600);

        // Middleware executes in reverse order for responses
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(from_fn(middleware::record_metrics))
            .wrap(from_fn(middleware::request_logging))
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Whichever finishes first wins
    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            // In-flight exchanges are allowed to finish
            server_handle.stop(true).await;
        }
    }

    reaper.abort();
    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "voice_assistant_backend=trace")
/// - If not set, defaults to "voice_assistant_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_assistant_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
///
/// A handler that cannot be installed is logged and never fires, so the
/// server keeps running on the other one.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
