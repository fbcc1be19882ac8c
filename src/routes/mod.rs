//! HTTP route handlers.
//!
//! Each sub-module corresponds to an endpoint group. Only the settings routes
//! sit behind [`crate::auth::require_admin_key`].

pub mod callback;
pub mod health;
pub mod settings;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::AppState;

/// Build the full router for the relay.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_key,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/callback", post(callback::callback))
        .route("/callback/{device_id}", post(callback::device_callback))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::PlatformClient;
    use crate::settings::Settings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state(server: &MockServer, settings: Settings, api_key: Option<&str>) -> AppState {
        let mut config = Config::default();
        config.platform.user = "alice".into();
        config.platform.token = "tok".into();
        config.server.api_key = api_key.map(String::from);
        let platform = PlatformClient::with_http(
            reqwest::Client::new(),
            server.uri(),
            "alice".into(),
            "sigfox".into(),
            "tok".into(),
        );
        AppState::new(config, platform, settings)
    }

    fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn first_contact_is_provisioned_end_to_end() {
        let server = MockServer::start().await;
        let forward = "/v3/users/alice/devices/sig-1A2B3C/callback";
        Mock::given(method("POST"))
            .and(path(forward))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(forward))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/users/alice/devices"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/users/alice/buckets"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(forward))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let settings =
            Settings::from(json!({"device_id_prefix": "sig-", "auto_provision_resources": true}));
        let state = state(&server, settings, None);
        let (status, body) = send(
            &state,
            json_request("POST", "/callback/1A2B3C", &json!({"data": "0102"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "forwarded");
        assert_eq!(body["device_id"], "sig-1A2B3C");
        assert_eq!(body["attempts"], 2);

        let requests = server.received_requests().await.unwrap();
        let bucket: Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(bucket["bucket"], "sig-1A2B3C");
    }

    #[tokio::test]
    async fn body_form_reads_device_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/users/alice/devices/ABCDEF/callback"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let state = state(&server, Settings::default(), None);
        let (status, body) = send(
            &state,
            json_request("POST", "/callback", &json!({"device": "ABCDEF", "data": "00"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["attempts"], 1);
    }

    #[tokio::test]
    async fn body_form_requires_hex_device() {
        let server = MockServer::start().await;
        let state = state(&server, Settings::default(), None);

        for payload in [json!({"data": "00"}), json!({"device": "not-hex"}), json!({"device": 12})] {
            let (status, body) = send(&state, json_request("POST", "/callback", &payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "INVALID_DEVICE");
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_hex_path_is_not_found() {
        let server = MockServer::start().await;
        let state = state(&server, Settings::default(), None);

        let (status, _) = send(&state, json_request("POST", "/callback/xyz-1", &json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suppressed_uplink_still_answers_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let state = state(&server, Settings::default(), None);
        let (status, body) =
            send(&state, json_request("POST", "/callback/1a2b", &json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "suppressed");
        assert_eq!(body["platform_status"], 404);
    }

    #[tokio::test]
    async fn provisioning_failure_is_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/users/alice/devices/1A2B/callback"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/users/alice/devices"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let state = state(&server, Settings::bootstrap_fallback(), None);
        let (status, body) =
            send(&state, json_request("POST", "/callback/1A2B", &json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "PROVISIONING_FAILED");
    }

    #[tokio::test]
    async fn put_settings_replaces_whole_document() {
        let server = MockServer::start().await;
        let initial =
            Settings::from(json!({"device_id_prefix": "sig-", "auto_provision_resources": true}));
        let state = state(&server, initial, None);

        let (status, _) = send(
            &state,
            json_request("PUT", "/settings", &json!({"bucket_id_prefix": "b-", "note": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &state,
            Request::builder().uri("/settings").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"bucket_id_prefix": "b-", "note": "x"}));

        let current = state.settings.snapshot().await;
        assert_eq!(current.device_id("AB"), "AB");
        assert!(!current.auto_provision());
    }

    #[tokio::test]
    async fn put_settings_stores_loosely_typed_values() {
        let server = MockServer::start().await;
        for doc in [
            json!({"device_connection_timeout": "30", "auto_provision_resources": true}),
            json!({"device_connection_timeout": 10.0, "auto_provision_resources": true}),
            json!({"auto_provision_resources": "true"}),
        ] {
            let state = state(&server, Settings::default(), None);
            let (status, body) = send(&state, json_request("PUT", "/settings", &doc)).await;
            assert_eq!(status, StatusCode::OK, "{doc}");
            assert_eq!(body, json!({"status": "ok"}));

            let current = state.settings.snapshot().await;
            assert!(current.auto_provision(), "{doc}");
            assert_eq!(current.as_value(), &doc);
        }

        let state = state(&server, Settings::default(), None);
        let doc = json!({"device_connection_timeout": "30", "auto_provision_resources": 1});
        let (status, _) = send(&state, json_request("PUT", "/settings", &doc)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.settings.snapshot().await.timeout_secs(), 30);

        let (status, body) = send(
            &state,
            Request::builder().uri("/settings").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, doc);
    }

    #[tokio::test]
    async fn put_settings_rejects_malformed_json() {
        let server = MockServer::start().await;
        let state = state(&server, Settings::bootstrap_fallback(), None);

        let request = Request::builder()
            .method("PUT")
            .uri("/settings")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert!(status.is_client_error());
        assert!(state.settings.snapshot().await.auto_provision());
    }

    #[tokio::test]
    async fn admin_key_guards_settings_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let state = state(&server, Settings::default(), Some("admin"));

        let (status, _) = send(&state, json_request("PUT", "/settings", &json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut wrong = json_request("PUT", "/settings", &json!({}));
        wrong
            .headers_mut()
            .insert("authorization", "Bearer nope".parse().unwrap());
        let (status, _) = send(&state, wrong).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut right = json_request("PUT", "/settings", &json!({}));
        right
            .headers_mut()
            .insert("authorization", "Bearer admin".parse().unwrap());
        let (status, _) = send(&state, right).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&state, json_request("POST", "/callback/AB", &json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let server = MockServer::start().await;
        let state = state(&server, Settings::bootstrap_fallback(), Some("admin"));

        let (status, body) = send(
            &state,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["auto_provision"], true);
    }
}
