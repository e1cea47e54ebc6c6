use crate::state::AppState;
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, Error,
};
use std::time::Instant;

/// Count requests and latency per route.
///
/// Endpoints are keyed by their route pattern (`/api/v1/sessions/{session_id}`)
/// rather than the raw path, so per-session URLs share one entry.
pub async fn record_metrics(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.path().to_string();
    let state = req.app_data::<web::Data<AppState>>().cloned();

    if let Some(state) = &state {
        state.increment_request_count();
    }

    let result = next.call(req).await;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    if let Some(state) = &state {
        let (endpoint, is_error) = match &result {
            Ok(response) => {
                let route = response.request().match_pattern().unwrap_or(path);
                let status = response.status();
                (
                    format!("{} {}", method, route),
                    status.is_client_error() || status.is_server_error(),
                )
            }
            Err(_) => (format!("{} {}", method, path), true),
        };

        state.record_endpoint_request(&endpoint, duration_ms, is_error);
        if is_error {
            state.increment_error_count();
        }
    }

    result
}
