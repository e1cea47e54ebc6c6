//! # Voice Question Handler
//!
//! ## Endpoint: `POST /ask`
//!
//! ## Request:
//! Multipart form data with the recording in a field named `file`, and an
//! optional `X-Session-Id` header naming the conversation to continue.
//!
//! ## Response:
//! ```json
//! {
//!   "text": "I am listening.",
//!   "audioBase64": "UklGRg=="
//! }
//! ```
//! The `X-Session-Id` response header carries the session the exchange was
//! recorded in; send it back to continue the conversation. Error responses
//! carry it too, unless the failed exchange was the first one of a new
//! session, which is then discarded.

use crate::audio::WavInfo;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::stream::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

pub const SESSION_HEADER: &str = "x-session-id";

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioResponse {
    pub text: String,
    pub audio_base64: String,
}

impl AudioResponse {
    pub fn new(text: String, audio: &[u8]) -> Self {
        Self {
            text,
            audio_base64: STANDARD.encode(audio),
        }
    }
}

struct Upload {
    filename: Option<String>,
    bytes: Vec<u8>,
}

pub async fn handle_audio_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let requested_session = session_id_header(&req)?;
    let upload = read_file_field(payload, state.config.upload.max_file_size_bytes).await?;

    match WavInfo::probe(&upload.bytes) {
        Some(info) => debug!(
            filename = ?upload.filename,
            size_bytes = upload.bytes.len(),
            channels = info.channels,
            sample_rate = info.sample_rate,
            bits_per_sample = info.bits_per_sample,
            duration_secs = info.duration_secs(),
            "Received audio upload"
        ),
        None => warn!(
            filename = ?upload.filename,
            size_bytes = upload.bytes.len(),
            "Upload is not a recognizable WAV file, forwarding as-is"
        ),
    }

    let (session, created) = state.sessions.get_or_create(requested_session.as_deref())?;

    let reply = match state.assistant.ask(&session, upload.bytes).await {
        Ok(reply) => reply,
        Err(err) => {
            // A session the client never heard about must not hold a slot
            if created && state.sessions.discard_if_unused(&session) {
                debug!(session_id = %session.session_id, "Discarded session from failed exchange");
                return Err(err);
            }
            let mut response = err.error_response();
            if let Ok(value) = HeaderValue::from_str(&session.session_id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(SESSION_HEADER), value);
            }
            return Ok(response);
        }
    };

    Ok(HttpResponse::Ok()
        .insert_header((SESSION_HEADER, session.session_id.as_str()))
        .json(AudioResponse::new(reply.text, &reply.audio.data)))
}

fn session_id_header(req: &HttpRequest) -> AppResult<Option<String>> {
    req.headers()
        .get(SESSION_HEADER)
        .map(|value| {
            value
                .to_str()
                .map(|id| id.trim().to_string())
                .map_err(|_| AppError::ValidationError("X-Session-Id must be ASCII".to_string()))
        })
        .transpose()
}

/// Read the `file` part fully into memory, skipping any other parts.
async fn read_file_field(mut payload: Multipart, max_size: usize) -> AppResult<Upload> {
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field = item?;

        let is_file = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map_or(false, |name| name == FILE_FIELD);

        if !is_file {
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > max_size {
                return Err(AppError::PayloadTooLarge(format!(
                    "Upload exceeds {} bytes",
                    max_size
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(Upload { filename, bytes });
    }

    upload.ok_or_else(|| AppError::BadRequest(format!("Missing multipart field '{}'", FILE_FIELD)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::pcm16_wav;
    use crate::conversation::Media;
    use crate::handlers;
    use crate::provider::ChatReply;
    use crate::test_support::{
        multipart_body, multipart_content_type, test_config, test_state, MockProvider,
    };
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn ask_request(body: Vec<u8>, session: Option<&str>) -> test::TestRequest {
        let mut req = test::TestRequest::post()
            .uri("/ask")
            .insert_header(("content-type", multipart_content_type()))
            .set_payload(body);
        if let Some(id) = session {
            req = req.insert_header((SESSION_HEADER, id));
        }
        req
    }

    #[actix_web::test]
    async fn test_ask_returns_text_and_base64_audio() {
        let provider = Arc::new(MockProvider::replying(vec![ChatReply {
            text: "I am listening.".into(),
            media: vec![Media::wav(vec![0x52, 0x49, 0x46, 0x46])],
        }]));
        let state = test_state(test_config(), provider.clone());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(handlers::configure),
        )
        .await;

        let hello = pcm16_wav(16_000, 1, &[0; 4]);
        let req = ask_request(multipart_body("file", "hello.wav", &hello), None).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(SESSION_HEADER));
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            serde_json::json!({"text": "I am listening.", "audioBase64": "UklGRg=="})
        );

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system_prompt, "You are Marvin.");
        assert_eq!(calls[0].messages[0].media[0].data, hello);
    }

    #[actix_web::test]
    async fn test_same_session_accumulates_history() {
        let provider = Arc::new(MockProvider::replying(vec![
            MockProvider::spoken("Here I am, brain the size of a planet."),
            MockProvider::spoken("I think you ought to know I'm feeling very depressed."),
        ]));
        let state = test_state(test_config(), provider.clone());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(handlers::configure),
        )
        .await;

        let first = test::call_service(
            &app,
            ask_request(multipart_body("file", "a.wav", b"first"), None).to_request(),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);
        let session_id = first
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let second = test::call_service(
            &app,
            ask_request(multipart_body("file", "b.wav", b"second"), Some(&session_id)).to_request(),
        )
        .await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(
            second.headers().get(SESSION_HEADER).unwrap().to_str().unwrap(),
            session_id
        );

        let calls = provider.calls();
        assert_eq!(calls[1].messages.len() - calls[0].messages.len(), 2);
    }

    #[actix_web::test]
    async fn test_sessions_do_not_share_history() {
        let provider = Arc::new(MockProvider::replying(vec![
            MockProvider::spoken("one"),
            MockProvider::spoken("two"),
        ]));
        let state = test_state(test_config(), provider.clone());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(handlers::configure),
        )
        .await;

        for caller in ["alice", "bob"] {
            let resp = test::call_service(
                &app,
                ask_request(multipart_body("file", "q.wav", b"q"), Some(caller)).to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let sizes: Vec<usize> = provider.calls().iter().map(|c| c.messages.len()).collect();
        assert_eq!(sizes, vec![1, 1]);
    }

    #[actix_web::test]
    async fn test_missing_audio_returns_bad_gateway() {
        let provider = Arc::new(MockProvider::replying(vec![ChatReply {
            text: "Text only".into(),
            media: vec![],
        }]));
        let state = test_state(test_config(), provider);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(handlers::configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            ask_request(multipart_body("file", "q.wav", b"q"), None).to_request(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "missing_audio");
    }

    #[actix_web::test]
    async fn test_upload_validation() {
        let mut config = test_config();
        config.upload.max_file_size_bytes = 8;
        let provider = Arc::new(MockProvider::replying(vec![]));
        let state = test_state(config, provider.clone());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(handlers::configure),
        )
        .await;

        let too_big = test::call_service(
            &app,
            ask_request(multipart_body("file", "big.wav", &[0u8; 64]), None).to_request(),
        )
        .await;
        assert_eq!(too_big.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_field = test::call_service(
            &app,
            ask_request(multipart_body("audio", "q.wav", b"q"), None).to_request(),
        )
        .await;
        assert_eq!(wrong_field.status(), StatusCode::BAD_REQUEST);

        let bad_session = test::call_service(
            &app,
            ask_request(multipart_body("file", "q.wav", b"q"), Some("not a valid id!")).to_request(),
        )
        .await;
        assert_eq!(bad_session.status(), StatusCode::BAD_REQUEST);

        assert!(provider.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_failed_first_exchange_releases_the_session() {
        let mut config = test_config();
        config.session.max_sessions = 2;
        let provider = Arc::new(MockProvider::failing(500, "upstream exploded"));
        let state = test_state(config, provider);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(handlers::configure),
        )
        .await;

        // The mock fails once, then has nothing scripted and keeps failing
        for _ in 0..3 {
            let resp = test::call_service(
                &app,
                ask_request(multipart_body("file", "q.wav", b"q"), None).to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
            assert!(!resp.headers().contains_key(SESSION_HEADER));
            assert_eq!(state.sessions.len(), 0);
        }
    }

    #[actix_web::test]
    async fn test_failed_exchange_keeps_existing_session() {
        let provider = Arc::new(MockProvider::replying(vec![MockProvider::spoken("first")]));
        let state = test_state(test_config(), provider);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(handlers::configure),
        )
        .await;

        let ok = test::call_service(
            &app,
            ask_request(multipart_body("file", "q.wav", b"q"), Some("regular")).to_request(),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::OK);

        let failed = test::call_service(
            &app,
            ask_request(multipart_body("file", "q.wav", b"q"), Some("regular")).to_request(),
        )
        .await;
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            failed.headers().get(SESSION_HEADER).unwrap().to_str().unwrap(),
            "regular"
        );
        let body: serde_json::Value = test::read_body_json(failed).await;
        assert_eq!(body["error"]["type"], "provider_error");

        let session = state.sessions.get("regular").unwrap();
        assert_eq!(session.turn_count().await, 2);
    }

    #[actix_web::test]
    async fn test_session_capacity_returns_service_unavailable() {
        let mut config = test_config();
        config.session.max_sessions = 1;
        let provider = Arc::new(MockProvider::replying(vec![MockProvider::spoken("hi")]));
        let state = test_state(config, provider);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(handlers::configure),
        )
        .await;

        let first = test::call_service(
            &app,
            ask_request(multipart_body("file", "q.wav", b"q"), Some("one")).to_request(),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = test::call_service(
            &app,
            ask_request(multipart_body("file", "q.wav", b"q"), Some("two")).to_request(),
        )
        .await;
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
