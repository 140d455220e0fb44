//! End-to-end lifecycle tests: wiremock backend, HTTP gateway, live session.

use serde_json::json;
use tokio::time::{sleep, timeout};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalog_core::{CatalogHandle, CatalogView, SessionError, spawn_session};
use catalog_types::AppState;

use crate::common::{
    POLL_INTERVAL, WAIT_LIMIT, app_json, fast_session, gateway, mount_apps, mount_start,
    mount_status,
};

async fn loaded(handle: &CatalogHandle) -> CatalogView {
    timeout(WAIT_LIMIT, handle.wait_until(|view| view.loaded))
        .await
        .expect("initial load timed out")
        .unwrap()
}

async fn status_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path().ends_with("/status"))
        .count()
}

#[tokio::test]
async fn started_app_is_polled_until_running() {
    let server = MockServer::start().await;
    mount_apps(&server, vec![
        app_json("alpha", None),
        app_json("beta", Some("SUCCEEDED")),
    ])
    .await;
    mount_start(&server, "alpha", 200, json!({ "success": true, "message": "Starting alpha" }))
        .await;
    mount_status(&server, "alpha", "PENDING", Some(1)).await;
    mount_status(&server, "alpha", "RUNNING", Some(1)).await;
    mount_status(&server, "alpha", "SUCCEEDED", None).await;

    let (handle, _task) = spawn_session(gateway(&server, None), fast_session());
    let view = loaded(&handle).await;
    assert_eq!(view.state("alpha"), Some(AppState::Off));
    assert_eq!(view.state("beta"), Some(AppState::On));
    assert!(!view.polling);

    let ack = handle.start("alpha").await.unwrap();
    assert_eq!(ack.message.as_deref(), Some("Starting alpha"));
    let view = handle.view();
    assert_eq!(view.state("alpha"), Some(AppState::Loading));
    assert!(view.polling);

    let view = timeout(
        WAIT_LIMIT,
        handle.wait_until(|view| view.state("alpha") == Some(AppState::On)),
    )
    .await
    .expect("alpha never came up")
    .unwrap();
    assert!(!view.polling);
    assert_eq!(
        view.get("alpha").unwrap().launch_url(),
        Some("https://alpha.example.com")
    );
    assert!(status_requests(&server).await >= 3);

    let settled = status_requests(&server).await;
    sleep(POLL_INTERVAL * 5).await;
    assert_eq!(status_requests(&server).await, settled);

    handle.shutdown().await;
}

#[tokio::test]
async fn apps_loading_at_startup_are_polled_without_a_start() {
    let server = MockServer::start().await;
    mount_apps(&server, vec![app_json("alpha", Some("RUNNING"))]).await;
    mount_status(&server, "alpha", "SUCCEEDED", None).await;

    let (handle, _task) = spawn_session(gateway(&server, None), fast_session());
    let view = loaded(&handle).await;
    assert_eq!(view.state("alpha"), Some(AppState::Loading));
    assert!(view.polling);

    let view = timeout(WAIT_LIMIT, handle.wait_until(|view| !view.polling))
        .await
        .expect("polling never stopped")
        .unwrap();
    assert_eq!(view.state("alpha"), Some(AppState::On));
}

#[tokio::test]
async fn unauthorized_load_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/databricks/apps"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let (handle, _task) = spawn_session(gateway(&server, None), fast_session());
    let view = loaded(&handle).await;

    assert!(view.entries.is_empty());
    let err = view.load_error.unwrap();
    assert_eq!(err.status, Some(401));
    assert!(err.is_auth());
}

#[tokio::test]
async fn token_reaches_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/databricks/apps"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "apps": [app_json("alpha", None)] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (handle, _task) = spawn_session(gateway(&server, Some("s3cret")), fast_session());
    let view = loaded(&handle).await;
    assert!(view.load_error.is_none());
    assert_eq!(view.entries.len(), 1);
}

#[tokio::test]
async fn rejected_start_leaves_catalog_alone() {
    let server = MockServer::start().await;
    mount_apps(&server, vec![app_json("alpha", None)]).await;
    mount_start(
        &server,
        "alpha",
        500,
        json!({ "detail": "Failed to start app: quota exceeded" }),
    )
    .await;

    let (handle, _task) = spawn_session(gateway(&server, None), fast_session());
    let before = loaded(&handle).await;

    match handle.start("alpha").await {
        Err(SessionError::Start(err)) => {
            assert_eq!(err.message, "Failed to start app: quota exceeded");
            assert_eq!(err.status, Some(500));
        }
        other => panic!("expected a start rejection, got {other:?}"),
    }
    assert_eq!(handle.view(), before);
    assert_eq!(status_requests(&server).await, 0);
}

#[tokio::test]
async fn names_with_reserved_characters_round_trip() {
    let server = MockServer::start().await;
    mount_apps(&server, vec![app_json("my app/v2", None)]).await;
    Mock::given(method("POST"))
        .and(path("/databricks/apps/my%20app%2Fv2/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/databricks/apps/my%20app%2Fv2/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "app": app_json("my app/v2", Some("SUCCEEDED")) })),
        )
        .mount(&server)
        .await;

    let (handle, _task) = spawn_session(gateway(&server, None), fast_session());
    loaded(&handle).await;
    handle.start("my app/v2").await.unwrap();

    timeout(
        WAIT_LIMIT,
        handle.wait_until(|view| view.state("my app/v2") == Some(AppState::On)),
    )
    .await
    .expect("app never came up")
    .unwrap();
}

#[tokio::test]
async fn reload_picks_up_new_apps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/databricks/apps"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "apps": [app_json("alpha", None)] })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_apps(&server, vec![
        app_json("alpha", None),
        app_json("beta", Some("SUCCEEDED")),
    ])
    .await;

    let (handle, _task) = spawn_session(gateway(&server, None), fast_session());
    assert_eq!(loaded(&handle).await.entries.len(), 1);

    assert_eq!(handle.reload().await.unwrap(), 2);
    assert_eq!(handle.view().state("beta"), Some(AppState::On));
}
