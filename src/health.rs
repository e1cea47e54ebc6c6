use crate::conversation::session::SessionStoreSummary;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let sessions = state.sessions.summary();
    let assistant = &state.assistant;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count)
        },
        "provider": {
            "name": assistant.provider().name(),
            "model": assistant.provider().model(),
            "timeout_secs": state.config.provider.timeout_secs
        },
        "prompt": {
            "source": assistant.system_prompt().source(),
            "length_chars": assistant.system_prompt().text().chars().count()
        },
        "sessions": session_status(&sessions)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "provider": {
            "call_count": metrics.provider.call_count,
            "failure_count": metrics.provider.failure_count,
            "failure_rate": ratio(metrics.provider.failure_count, metrics.provider.call_count),
            "average_duration_ms": metrics.provider.average_duration_ms()
        },
        "sessions": session_status(&state.sessions.summary())
    }))
}

fn ratio(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

fn session_status(summary: &SessionStoreSummary) -> serde_json::Value {
    let usage = if summary.max_sessions > 0 {
        summary.total_sessions as f64 / summary.max_sessions as f64
    } else {
        0.0
    };

    let status = if usage > 0.9 {
        "high_load"
    } else if usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "usage_percent": (usage * 100.0).round(),
        "active": summary.total_sessions,
        "busy": summary.busy_sessions,
        "max": summary.max_sessions,
        "load_warnings": if usage > 0.8 {
            vec!["High session usage - consider increasing session.max_sessions or lowering session.idle_timeout_secs"]
        } else {
            vec![]
        }
    })
}
