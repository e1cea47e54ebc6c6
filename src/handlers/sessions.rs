//! Session inspection and deletion.
//!
//! - `GET /api/v1/sessions/{session_id}`
//! - `DELETE /api/v1/sessions/{session_id}`

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

pub async fn get_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let session_id = path.into_inner();
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session '{}' not found", session_id)))?;

    // A busy session reports without waiting for the exchange to finish
    let busy = session.is_busy();
    let turns = if busy {
        None
    } else {
        Some(session.turn_count().await)
    };

    Ok(HttpResponse::Ok().json(json!({
        "session_id": session.session_id,
        "turns": turns,
        "busy": busy,
        "created_at": session.created_at.to_rfc3339(),
        "last_active_at": session.last_active_at().to_rfc3339()
    })))
}

pub async fn delete_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let session_id = path.into_inner();
    if !state.sessions.remove(&session_id) {
        return Err(AppError::NotFound(format!("Session '{}' not found", session_id)));
    }

    info!(session_id = %session_id, "Session deleted");
    Ok(HttpResponse::NoContent().finish())
}
