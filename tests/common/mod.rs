//! Shared test utilities and fixtures
//!
//! A wiremock backend speaking the catalog routes, plus a gateway and
//! session options tuned for fast real-time tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_config::{Overrides, Settings};
use catalog_core::SessionOptions;
use catalog_gateway::{GatewayOptions, HttpGateway, RetryConfig};

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound for anything a test waits on.
pub const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// App JSON as the backend serialises it.
pub fn app_json(name: &str, state: Option<&str>) -> Value {
    match state {
        Some(state) => json!({
            "name": name,
            "description": format!("{name} demo"),
            "url": format!("https://{name}.example.com"),
            "active_deployment": { "status": { "state": state } }
        }),
        None => json!({ "name": name, "description": format!("{name} demo") }),
    }
}

pub async fn mount_apps(server: &MockServer, apps: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/databricks/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "apps": apps })))
        .mount(server)
        .await;
}

/// Answer status polls for `name` with `state`, at most `times` times when
/// given. Earlier mounts win while they still have answers left.
pub async fn mount_status(server: &MockServer, name: &str, state: &str, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(format!("/databricks/apps/{name}/status")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "app": app_json(name, Some(state)) })),
        );
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

pub async fn mount_start(server: &MockServer, name: &str, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(format!("/databricks/apps/{name}/start")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Resolve settings against the mock server the way the CLI does.
pub fn settings_for(server: &MockServer, token: Option<&str>) -> Settings {
    Settings::resolve(
        None,
        Overrides {
            backend_url: Some(server.uri()),
            token: token.map(str::to_string),
        },
    )
    .unwrap()
}

pub fn gateway(server: &MockServer, token: Option<&str>) -> Arc<HttpGateway> {
    let settings = settings_for(server, token);
    let options = GatewayOptions {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        },
    };
    Arc::new(HttpGateway::new(settings.backend_url, settings.token, options).unwrap())
}

pub fn fast_session() -> SessionOptions {
    SessionOptions {
        poll_interval: POLL_INTERVAL,
        load_on_start: true,
    }
}
