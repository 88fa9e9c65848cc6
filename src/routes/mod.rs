//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static frontend from `./static` with index fallback
/// - CORS (any origin; the server only binds to loopback)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Wizard
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/wizard", get(http::http_wizard_view))
        .route("/api/v1/wizard/fields", put(http::http_wizard_fields))
        .route("/api/v1/wizard/next", post(http::http_wizard_next))
        .route("/api/v1/wizard/back", post(http::http_wizard_back))
        .route("/api/v1/wizard/goto", post(http::http_wizard_goto))
        .route("/api/v1/wizard/reset", post(http::http_wizard_reset))
        .route("/api/v1/wizard/restore", post(http::http_wizard_restore))
        .route("/api/v1/generate", post(http::http_generate))
        .route("/api/v1/conversation/start", post(http::http_conversation_start))
        .route("/api/v1/conversation/message", post(http::http_conversation_message))
        .route("/api/v1/export", post(http::http_export))
        // Settings
        .route(
            "/api/v1/settings",
            get(http::http_settings_get).put(http::http_settings_put),
        )
        .route("/api/v1/settings/test", post(http::http_settings_test))
        // Dashboard
        .route(
            "/api/v1/assignments",
            get(http::http_assignments_list).post(http::http_assignments_save),
        )
        .route(
            "/api/v1/assignments/:id",
            get(http::http_assignment_get).delete(http::http_assignment_delete),
        )
        .route("/api/v1/assignments/:id/reflections", put(http::http_assignment_reflections))
        .route("/api/v1/assignments/:id/name", put(http::http_assignment_rename))
        .route("/api/v1/assignments/:id/load", post(http::http_assignment_load))
        .route("/api/v1/assignments/:id/export", post(http::http_assignment_export))
        // Templates
        .route(
            "/api/v1/templates",
            get(http::http_templates_list).post(http::http_templates_save),
        )
        .route("/api/v1/templates/:name", axum::routing::delete(http::http_template_delete))
        .route("/api/v1/templates/:name/apply", post(http::http_template_apply))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorOut;
    use crate::state::tests::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let app = build_router(Arc::new(state));
        let (status, body) = call(app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn next_without_objective_is_unprocessable() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let app = build_router(Arc::new(state));
        let (status, body) = call(app, "POST", "/api/v1/wizard/next", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorOut = serde_json::from_value(body).unwrap();
        assert_eq!(err.error, "validation");
        assert!(err.message.contains("learning objective"));
    }

    #[tokio::test]
    async fn fields_then_next_moves_to_step_two() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let state = Arc::new(state);
        let fields = json!({ "fields": { "learning_objective": "fractions", "grade_level": "4" } });
        let (status, view) = call(build_router(state.clone()), "PUT", "/api/v1/wizard/fields", Some(fields)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["form"]["grade_level"], "4");

        let (status, view) = call(build_router(state), "POST", "/api/v1/wizard/next", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["step"], "needs");
        assert_eq!(view["step_number"], 2);
    }

    #[tokio::test]
    async fn generation_with_server_down_is_service_unavailable() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let state = Arc::new(state);
        let fields = json!({ "fields": {
            "learning_objective": "fractions", "grade_level": "4", "student_needs": "reading support"
        }});
        call(build_router(state.clone()), "PUT", "/api/v1/wizard/fields", Some(fields)).await;

        let (status, body) = call(build_router(state.clone()), "POST", "/api/v1/generate", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "connection");

        let (status, body) = call(build_router(state), "GET", "/api/v1/assignments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn dashboard_save_requires_results_and_unknown_ids_are_404() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let state = Arc::new(state);
        let (status, body) = call(build_router(state.clone()), "POST", "/api/v1/assignments", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "missing_results");

        let uri = format!("/api/v1/assignments/{}", uuid::Uuid::new_v4());
        let (status, _) = call(build_router(state), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let (_dir, state) = test_state("http://127.0.0.1:1");
        let state = Arc::new(state);
        let (_, mut prefs) = call(build_router(state.clone()), "GET", "/api/v1/settings", None).await;
        prefs["ollama_model"] = json!("mistral");
        prefs["default_grade_level"] = json!("K-2");
        let (status, saved) = call(build_router(state.clone()), "PUT", "/api/v1/settings", Some(prefs)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["ollama_model"], "mistral");
        assert_eq!(state.client().await.model, "mistral");

        let (_, view) = call(build_router(state), "POST", "/api/v1/wizard/reset", None).await;
        assert_eq!(view["form"]["grade_level"], "K-2");
    }
}
