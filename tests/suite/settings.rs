//! Config file to live gateway: the settings the CLI resolves actually
//! reach the backend.

use std::fs;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_config::{CatalogConfig, ConfigError, Overrides, Settings};
use catalog_gateway::{Gateway, GatewayOptions, HttpGateway};

use crate::common::app_json;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

fn gateway_from(settings: Settings) -> HttpGateway {
    HttpGateway::new(settings.backend_url, settings.token, GatewayOptions::default()).unwrap()
}

async fn mount_apps_requiring(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/databricks/apps"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "apps": [app_json("alpha", None)] })),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn config_file_drives_the_gateway() {
    let server = MockServer::start().await;
    mount_apps_requiring(&server, "file-token").await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!(
            r#"
            [backend]
            url = "{}"
            token = "file-token"

            [polling]
            interval_ms = 250
            "#,
            server.uri()
        ),
    );

    let config = CatalogConfig::load_from(&path).unwrap();
    let settings = Settings::resolve(config.as_ref(), Overrides::default()).unwrap();
    assert_eq!(settings.poll_interval, Duration::from_millis(250));

    let apps = gateway_from(settings).list_apps().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name, "alpha");
}

#[tokio::test]
async fn flags_beat_the_config_file() {
    let server = MockServer::start().await;
    mount_apps_requiring(&server, "flag-token").await;

    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [backend]
        url = "http://127.0.0.1:9"
        token = "file-token"
        "#,
    );

    let config = CatalogConfig::load_from(&path).unwrap();
    let settings = Settings::resolve(config.as_ref(), Overrides {
        backend_url: Some(server.uri()),
        token: Some("flag-token".to_string()),
    })
    .unwrap();

    gateway_from(settings).list_apps().await.unwrap();
}

#[test]
fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = CatalogConfig::load_from(&dir.path().join("absent.toml")).unwrap();
    assert!(config.is_none());

    let err = Settings::resolve(config.as_ref(), Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingBackendUrl));
}

#[test]
fn zero_poll_interval_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [backend]
        url = "http://localhost:8000"

        [polling]
        interval_ms = 0
        "#,
    );

    let config = CatalogConfig::load_from(&path).unwrap();
    let err = Settings::resolve(config.as_ref(), Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPollInterval));
}

#[test]
fn malformed_file_names_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[backend\nurl = ");

    let err = CatalogConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert_eq!(err.path(), Some(path.as_path()));
}
