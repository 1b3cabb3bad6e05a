//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - health at `/health` and `/api/v1/health`
/// - scenario, response and evaluation endpoints under `/api/v1/...`
/// - CORS from `ALLOWED_ORIGINS` (any origin when unset)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        .route("/health", get(http::http_health))
        .route("/api/v1/health", get(http::http_health))
        // Scenarios
        .route("/api/v1/scenarios/generate", post(http::http_generate_scenario))
        .route("/api/v1/scenarios/categories", get(http::http_list_categories))
        .route("/api/v1/scenarios/:id", get(http::http_get_scenario))
        .route("/api/v1/scenarios/:id/responses", get(http::http_list_scenario_responses))
        // Responses + evaluations
        .route("/api/v1/responses", post(http::http_submit_response))
        .route("/api/v1/responses/:id", get(http::http_get_response))
        .route("/api/v1/responses/:id/evaluate", post(http::http_evaluate_response))
        .route("/api/v1/responses/:id/evaluation", get(http::http_get_evaluation))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "carecomm_backend", origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::{Prompts, Settings};
    use crate::db::Store;
    use crate::services::testing::*;

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn create_scenario(app: &Router) -> String {
        let (status, body) = send(
            app,
            post_json("/api/v1/scenarios/generate", json!({"category": "general", "difficulty": "beginner"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_database_and_model() {
        let app = build_router(offline_state());
        for uri in ["/health", "/api/v1/health"] {
            let (status, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["database"], "ok");
            assert_eq!(body["model"], "disabled");
        }
    }

    #[tokio::test]
    async fn generated_scenario_can_be_fetched() {
        let model = ScriptedModel::replying(&[SCENARIO_REPLY]);
        let app = build_router(scripted_state(&model));

        let id = create_scenario(&app).await;
        let (status, body) = send(&app, get_req(&format!("/api/v1/scenarios/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Explaining a delayed discharge");
        assert_eq!(body["category"], "general");
        assert_eq!(body["difficulty"], "beginner");
        assert_eq!(body["source"], "generated");
    }

    #[tokio::test]
    async fn unknown_ids_are_404_with_error_body() {
        let app = build_router(offline_state());
        for uri in ["/api/v1/scenarios/nope", "/api/v1/responses/nope", "/api/v1/responses/nope/evaluation"] {
            let (status, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"]["code"], "NOT_FOUND");
        }
        let (status, _) = send(&app, post_empty("/api/v1/responses/nope/evaluate")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_input_is_422() {
        let app = build_router(offline_state());
        let (status, body) = send(
            &app,
            post_json("/api/v1/scenarios/generate", json!({"category": "general", "difficulty": "expert"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let id = create_scenario(&app).await;
        let (status, _) = send(&app, post_json("/api/v1/responses", json!({"scenario_id": id, "response_text": "ok"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, get_req(&format!("/api/v1/scenarios/{id}/responses?limit=0"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn submit_evaluate_and_list() {
        let model = ScriptedModel::replying(&[SCENARIO_REPLY, EVALUATION_REPLY]);
        let app = build_router(scripted_state(&model));
        let scenario_id = create_scenario(&app).await;

        let (status, body) = send(
            &app,
            post_json("/api/v1/responses", json!({"scenario_id": scenario_id, "response_text": ANSWER})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["score"], 8.5);
        let response_id = body["id"].as_str().unwrap().to_string();

        // Already scored on submit; evaluate returns the stored result.
        let (status, eval) = send(&app, post_empty(&format!("/api/v1/responses/{response_id}/evaluate"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(eval["overall_score"], 8.5);
        assert_eq!(eval["source"], "model");
        assert_eq!(model.calls(), 2);

        let (status, stored) = send(&app, get_req(&format!("/api/v1/responses/{response_id}/evaluation"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored, eval);

        let (status, list) = send(&app, get_req(&format!("/api/v1/scenarios/{scenario_id}/responses"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], response_id.as_str());
    }

    #[tokio::test]
    async fn offline_submit_gets_fallback_evaluation() {
        let app = build_router(offline_state());
        let scenario_id = create_scenario(&app).await;
        let (status, body) = send(
            &app,
            post_json("/api/v1/responses", json!({"scenario_id": scenario_id, "response_text": ANSWER})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["score"], 7.0);
        assert_eq!(body["evaluation"]["source"], "fallback");
    }

    #[tokio::test]
    async fn categories_lists_builtins_and_levels() {
        let app = build_router(offline_state());
        let (status, body) = send(&app, get_req("/api/v1/scenarios/categories")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["categories"], json!(["emergency", "general", "routine"]));
        assert_eq!(body["difficulty_levels"], json!(["beginner", "intermediate", "advanced"]));
    }

    fn state_with_origins(origins: &[&str]) -> Arc<AppState> {
        let settings = Settings {
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
            ..Settings::default()
        };
        Arc::new(AppState::new(Store::open_in_memory().unwrap(), None, Prompts::default(), settings))
    }

    async fn allow_origin_for(app: &Router, origin: &str) -> Option<String> {
        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .header("origin", origin)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn cors_allows_any_origin_when_unconfigured() {
        let app = build_router(offline_state());
        assert_eq!(allow_origin_for(&app, "http://anywhere.example").await.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn cors_echoes_only_configured_origins() {
        let app = build_router(state_with_origins(&["http://localhost:8501", "bad\norigin"]));
        assert_eq!(
            allow_origin_for(&app, "http://localhost:8501").await.as_deref(),
            Some("http://localhost:8501")
        );
        assert_eq!(allow_origin_for(&app, "http://evil.example").await, None);
    }
}
