//! API routes

pub mod health;
pub mod stream;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::middleware::{logging_middleware, require_bearer};
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stream", post(stream::stream_completion))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .route("/health", get(health::health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use futures::StreamExt;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use streamgate_core::{GatewayConfig, Usage};
    use streamgate_llm::testing::{ScriptedAdapter, Step};
    use streamgate_llm::{OpenAIAdapter, ProviderRegistry};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.api_token = TOKEN.to_string();
        config
    }

    fn app_with_openai(openai: ScriptedAdapter) -> Router {
        let registry = ProviderRegistry::new(
            Arc::new(ScriptedAdapter::new("anthropic", vec![])),
            Arc::new(openai),
            Arc::new(ScriptedAdapter::new("google", vec![])),
        );
        create_router(AppState::with_registry(config(), registry))
    }

    fn stream_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/stream")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_without_token() {
        let app = app_with_openai(ScriptedAdapter::new("openai", vec![]));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let app = app_with_openai(ScriptedAdapter::new("openai", vec![]));
        let request = Request::post("/stream")
            .body(Body::from(r#"{"prompt":"hi"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Token is missing!");
    }

    #[tokio::test]
    async fn test_wrong_token_rejected() {
        let app = app_with_openai(ScriptedAdapter::new("openai", vec![]));
        let request = Request::post("/stream")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::from(r#"{"prompt":"hi"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Invalid token!");
    }

    #[tokio::test]
    async fn test_blank_configured_token_rejects_everything() {
        let mut config = config();
        config.auth.api_token = String::new();
        let registry = ProviderRegistry::new(
            Arc::new(ScriptedAdapter::new("anthropic", vec![])),
            Arc::new(ScriptedAdapter::new("openai", vec![Step::Done(None)])),
            Arc::new(ScriptedAdapter::new("google", vec![])),
        );
        let app = create_router(AppState::with_registry(config, registry));

        for header_value in ["Bearer default_token", "Bearer x"] {
            let request = Request::post("/stream")
                .header(header::AUTHORIZATION, header_value)
                .body(Body::from(r#"{"prompt":"hi"}"#))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(response).await["message"], "Invalid token!");
        }
    }

    #[tokio::test]
    async fn test_missing_prompt_is_bad_request() {
        for body in [r#"{"model":"gpt-4o"}"#, r#"{"model":"gpt-4o","prompt":""}"#] {
            let adapter = ScriptedAdapter::new("openai", vec![Step::delta("x")]);
            let calls = adapter.call_counter();
            let response = app_with_openai(adapter)
                .oneshot(stream_request(body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["error"], "No prompt provided");
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_unknown_model_is_bad_request() {
        let app = app_with_openai(ScriptedAdapter::new("openai", vec![]));
        let response = app
            .oneshot(stream_request(r#"{"model":"unknown-model-v1","prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Unsupported model: unknown-model-v1"
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let app = app_with_openai(ScriptedAdapter::new("openai", vec![]));
        let response = app.oneshot(stream_request("not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Invalid request body:"));
    }

    #[tokio::test]
    async fn test_default_model_streams_frames() {
        let adapter = ScriptedAdapter::new(
            "openai",
            vec![
                Step::delta("Hel"),
                Step::delta("lo"),
                Step::Done(Some(Usage::new(3, 5))),
            ],
        );
        let last_model = adapter.last_model();
        let response = app_with_openai(adapter)
            .oneshot(stream_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers["x-accel-buffering"], "no");

        assert_eq!(
            body_text(response).await,
            concat!(
                "data: {\"type\":\"delta\",\"text\":\"Hel\"}\n\n",
                "data: {\"type\":\"delta\",\"text\":\"lo\"}\n\n",
                "data: {\"type\":\"done\",\"usage\":{\"input\":3,\"output\":5}}\n\n",
            )
        );
        assert_eq!(last_model.lock().unwrap().as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_error_frame() {
        let adapter = ScriptedAdapter::new(
            "openai",
            vec![
                Step::delta("a"),
                Step::delta("b"),
                Step::fail("connection reset"),
                Step::delta("never"),
            ],
        );
        let response = app_with_openai(adapter)
            .oneshot(stream_request(r#"{"model":"gpt-4o","prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            concat!(
                "data: {\"type\":\"delta\",\"text\":\"a\"}\n\n",
                "data: {\"type\":\"delta\",\"text\":\"b\"}\n\n",
                "data: {\"type\":\"error\",\"error\":\"Provider error: connection reset\"}\n\n",
            )
        );
    }

    #[tokio::test]
    async fn test_client_disconnect_drops_adapter() {
        let adapter = ScriptedAdapter::new("openai", vec![Step::delta("first"), Step::Pending]);
        let dropped = adapter.dropped_flag();
        let response = app_with_openai(adapter)
            .oneshot(stream_request(r#"{"prompt":"hi"}"#))
            .await
            .unwrap();

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"type\":\"delta\",\"text\":\"first\"}\n\n");
        assert!(!dropped.load(Ordering::SeqCst));

        drop(body);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_credential_reported_in_stream() {
        let registry = ProviderRegistry::new(
            Arc::new(ScriptedAdapter::new("anthropic", vec![])),
            Arc::new(OpenAIAdapter::new(None)),
            Arc::new(ScriptedAdapter::new("google", vec![])),
        );
        let app = create_router(AppState::with_registry(config(), registry));
        let response = app
            .oneshot(stream_request(r#"{"model":"gpt-4o","prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert_eq!(text.matches("data: ").count(), 1);
        assert!(text.starts_with("data: {\"type\":\"error\",\"error\":\"Configuration error"));
    }
}
