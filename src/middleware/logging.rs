use crate::handlers::SESSION_HEADER;
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    Error,
};
use std::time::Instant;
use tracing::{error, info, warn};

pub async fn request_logging(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let remote_addr = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    let session_id = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    info!(
        method = %method,
        uri = %uri,
        remote_addr = %remote_addr,
        session_id = %session_id,
        "Request started"
    );

    let result = next.call(req).await;
    let duration_ms = start_time.elapsed().as_millis();

    match &result {
        Ok(response) => {
            let status = response.status();
            // New sessions are only known once the handler has run
            let session_id = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(session_id.as_str());

            if status.is_server_error() {
                warn!(
                    method = %method,
                    uri = %uri,
                    session_id = %session_id,
                    status = status.as_u16(),
                    duration_ms = %duration_ms,
                    "Request completed with server error"
                );
            } else {
                info!(
                    method = %method,
                    uri = %uri,
                    session_id = %session_id,
                    status = status.as_u16(),
                    duration_ms = %duration_ms,
                    "Request completed"
                );
            }
        }
        Err(err) => {
            error!(
                method = %method,
                uri = %uri,
                remote_addr = %remote_addr,
                duration_ms = %duration_ms,
                error = %err,
                "Request failed"
            );
        }
    }

    result
}
