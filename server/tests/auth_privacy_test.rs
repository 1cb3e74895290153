//! Privacy tests for authentication data in logs.
//!
//! Passwords, password hashes, product keys and session tokens must never
//! appear in log output, even at TRACE level.
//!
//! # Test Approach
//!
//! 1. Use a custom tracing subscriber Layer to capture all log messages
//! 2. Drive signup, signin, product key and home routes through the router
//! 3. Verify that sensitive values do NOT appear in captured logs

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use realty_server::config::Config;
use realty_server::routes::{create_router, AppState};
use realty_server::store::Repository;

const PASSWORD: &str = "hunter-secret-22";

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

/// A buffer for capturing log output during tests.
#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn new() -> Self {
        Self::default()
    }

    /// Returns all captured log messages joined into a single string.
    fn get_logs(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that captures log events for inspection.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        event.record(&mut visitor);

        let message = format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.parts.join(" ")
        );

        self.capture.logs.lock().unwrap().push(message);
    }
}

/// A visitor that collects all event fields into strings.
#[derive(Default)]
struct StringVisitor {
    parts: Vec<String>,
}

impl tracing::field::Visit for StringVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

/// Runs an async test body with log capture at TRACE level.
///
/// Returns the captured logs for assertion.
async fn with_log_capture_async<F, Fut>(test_fn: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let capture = LogCapture::new();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));

    let _guard = tracing::subscriber::set_default(subscriber);
    test_fn().await;

    capture.get_logs()
}

// ============================================================================
// Helpers
// ============================================================================

fn test_state() -> AppState {
    AppState::with_memory_store(Config {
        port: 0,
        database_url: None,
        db_max_connections: 1,
        jwt_secret: "privacy-test-jwt-secret".to_string(),
        product_key_secret: "privacy-test-product-secret".to_string(),
        token_ttl_secs: 3600,
        bcrypt_cost: 4,
    })
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Asserts that the given sensitive value does not appear in logs.
fn assert_sensitive_not_in_logs(logs: &str, value: &str, value_name: &str) {
    assert!(
        !logs.contains(value),
        "{value_name} found in logs!\nValue: {value}\nLogs:\n{logs}"
    );
}

/// Asserts that no JWT prefix (eyJ) appears in the logs.
fn assert_no_jwt_in_logs(logs: &str) {
    assert!(
        !logs.contains("eyJ"),
        "JWT prefix 'eyJ' found in logs!\nLogs:\n{logs}"
    );
}

// ============================================================================
// Test Cases
// ============================================================================

#[tokio::test]
async fn full_auth_flow_does_not_leak_secrets() {
    let state = test_state();
    let app = create_router(state.clone());
    let secrets = Arc::new(Mutex::new(Vec::<(String, &'static str)>::new()));

    let logs = with_log_capture_async(|| {
        let secrets = secrets.clone();
        let app = app.clone();
        let state = state.clone();
        async move {
            let (status, key) = call(
                &app,
                "POST",
                "/auth/key",
                None,
                json!({ "email": "agent@example.com", "type": "REALTOR" }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let product_key = key["productKey"].as_str().unwrap().to_string();

            let (status, signup) = call(
                &app,
                "POST",
                "/auth/signup/realtor",
                None,
                json!({
                    "name": "Agent",
                    "phone": "555 0100",
                    "email": "agent@example.com",
                    "password": PASSWORD,
                    "productKey": product_key,
                }),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            let signup_token = signup["token"].as_str().unwrap().to_string();

            let (status, signin) = call(
                &app,
                "POST",
                "/auth/signin",
                None,
                json!({ "email": "agent@example.com", "password": PASSWORD }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let signin_token = signin["token"].as_str().unwrap().to_string();

            let (status, _) = call(
                &app,
                "POST",
                "/home",
                Some(&signin_token),
                json!({
                    "address": "1 Main St",
                    "numberOfBedrooms": 2,
                    "numberOfBathrooms": 1,
                    "city": "Toronto",
                    "landSize": 300,
                    "propertyType": "CONDO",
                }),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);

            let hash = state
                .store
                .find_user_by_email("agent@example.com")
                .await
                .unwrap()
                .unwrap()
                .password_hash;

            let mut secrets = secrets.lock().unwrap();
            secrets.push((product_key, "Product key"));
            secrets.push((signup_token, "Signup token"));
            secrets.push((signin_token, "Signin token"));
            secrets.push((hash, "Password hash"));
        }
    })
    .await;

    assert!(!logs.is_empty(), "expected some log output to inspect");
    assert_sensitive_not_in_logs(&logs, PASSWORD, "Password");
    assert_no_jwt_in_logs(&logs);
    for (value, name) in secrets.lock().unwrap().iter() {
        assert_sensitive_not_in_logs(&logs, value, name);
    }
}

#[tokio::test]
async fn failed_signin_does_not_leak_password() {
    let state = test_state();
    let app = create_router(state);

    let logs = with_log_capture_async(|| async {
        let (status, body) = call(
            &app,
            "POST",
            "/auth/signin",
            None,
            json!({ "email": "ghost@example.com", "password": PASSWORD }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid Credentials");
    })
    .await;

    assert_sensitive_not_in_logs(&logs, PASSWORD, "Password");
}

#[tokio::test]
async fn rejected_token_is_not_logged() {
    let state = test_state();
    let app = create_router(state.clone());
    let forged = format!(
        "{}tampered",
        state.keys.issue_token("Mallory", 1).unwrap()
    );

    let logs = with_log_capture_async(|| async {
        let (status, _) = call(&app, "GET", "/auth/me", Some(&forged), Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    })
    .await;

    assert!(logs.contains("Rejected bearer token"));
    assert_no_jwt_in_logs(&logs);
    assert_sensitive_not_in_logs(&logs, &forged, "Forged token");
}

#[test]
fn state_debug_does_not_leak_secrets() {
    let debug = format!("{:?}", test_state());
    assert!(!debug.contains("privacy-test-jwt-secret"));
    assert!(!debug.contains("privacy-test-product-secret"));
}
