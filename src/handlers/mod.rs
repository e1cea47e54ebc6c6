pub mod ask;
pub mod sessions;

pub use ask::*;
pub use sessions::*;

use crate::health;
use actix_web::web;

/// Register every route. Shared by the server and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ask", web::post().to(handle_audio_upload))
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics))
                .route("/sessions/{session_id}", web::get().to(get_session))
                .route("/sessions/{session_id}", web::delete().to(delete_session)),
        );
}
