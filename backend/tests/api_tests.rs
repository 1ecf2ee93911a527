//! Integration tests for the sqpatch API.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqpatch::config::Config;
use sqpatch::mixer::{DeviceCommandError, MixerClient, MixerTarget};
use sqpatch::protocol::PreampCommand;
use sqpatch::state::AppState;
use sqpatch_types::{PreampBus, PreampSocket};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

/// Mixer double: records every command, fails on chosen sockets.
#[derive(Default)]
struct TestMixer {
    sent: Mutex<Vec<(PreampSocket, PreampCommand)>>,
    failing: Mutex<HashSet<PreampSocket>>,
    delay: Duration,
}

impl TestMixer {
    fn sent(&self) -> Vec<(PreampSocket, PreampCommand)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MixerClient for TestMixer {
    async fn send(
        &self,
        target: &MixerTarget,
        socket: PreampSocket,
        command: PreampCommand,
    ) -> Result<(), DeviceCommandError> {
        command.encode(socket)?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.sent.lock().unwrap().push((socket, command));
        if self.failing.lock().unwrap().contains(&socket) {
            return Err(DeviceCommandError::Connect {
                target: target.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

struct TestApp {
    app: Router,
    mixer: Arc<TestMixer>,
    dir: TempDir,
}

/// Helper to create a test app instance.
async fn create_test_app_with(sq_ip: Option<&str>, mixer: TestMixer) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config {
        settings_path: dir.path().join("config.json"),
        data_dir: dir.path().join("data"),
        ..Default::default()
    };
    config.mixer.ip = sq_ip.map(str::to_string);
    config.mixer.pace = Duration::ZERO;
    config.mixer.gain_debounce = Duration::from_millis(20);

    let mixer = Arc::new(mixer);
    let state = AppState::new(config, mixer.clone()).await.unwrap();
    TestApp {
        app: sqpatch::create_app(state),
        mixer,
        dir,
    }
}

async fn create_test_app() -> TestApp {
    create_test_app_with(Some("10.0.0.1"), TestMixer::default()).await
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn add_channel(app: &Router, name: &str, bus: &str) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/channels",
        Some(json!({"name": name, "bus": bus})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["channel"].clone()
}

async fn wait_for_sync(app: &Router) -> Value {
    for _ in 0..200 {
        let (_, status) = call(app, "GET", "/api/sync/status", None).await;
        if status["status"] == "idle" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sync did not finish");
}

#[tokio::test]
async fn test_health_check() {
    let t = create_test_app().await;

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_state_empty() {
    let t = create_test_app().await;
    let (status, body) = call(&t.app, "GET", "/api/state", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channels"], json!([]));
    assert_eq!(body["sq_ip"], "10.0.0.1");
    assert_eq!(body["line_preamp_ids"], json!([18, 19, 20, 21]));
    assert_eq!(body["layout"]["local_max"], 21);
}

#[tokio::test]
async fn test_add_channels_take_lowest_free_socket() {
    let t = create_test_app().await;
    let a = add_channel(&t.app, "Kick", "local").await;
    let b = add_channel(&t.app, "Snare", "local").await;
    let c = add_channel(&t.app, "Keys", "slink").await;

    assert_eq!(a["preampId"], 1);
    assert_eq!(b["preampId"], 2);
    assert_eq!(c["preampBus"], "slink");
    assert_eq!(c["preampId"], 1);
    assert_eq!(a["preampIdR"], 0);
}

#[tokio::test]
async fn test_patch_conflict_and_bounds() {
    let t = create_test_app().await;
    let a = add_channel(&t.app, "A", "local").await;
    let b = add_channel(&t.app, "B", "local").await;
    let b_uri = format!("/api/channels/{}", b["id"]);

    let (status, body) = call(&t.app, "PATCH", &b_uri, Some(json!({"preampId": a["preampId"]}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already used"));

    let (status, _) = call(&t.app, "PATCH", &b_uri, Some(json!({"preampId": 22}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&t.app, "PATCH", &b_uri, Some(json!({"preampId": 5, "preampIdR": 5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &t.app,
        "PATCH",
        &b_uri,
        Some(json!({"name": "Overheads", "preampId": 5, "preampIdR": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channel"]["name"], "Overheads");
    assert_eq!(body["channel"]["preampIdR"], 6);

    let (status, _) = call(&t.app, "PATCH", "/api/channels/999", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_change_bus_clamps() {
    let t = create_test_app().await;
    let c = add_channel(&t.app, "Spare", "slink").await;
    let uri = format!("/api/channels/{}", c["id"]);
    call(&t.app, "PATCH", &uri, Some(json!({"preampId": 35}))).await;

    let (status, body) = call(&t.app, "PATCH", &uri, Some(json!({"preampBus": "local"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channel"]["preampBus"], "local");
    assert_eq!(body["channel"]["preampId"], 21);
}

#[tokio::test]
async fn test_available_ids() {
    let t = create_test_app().await;
    add_channel(&t.app, "A", "local").await;
    let b = add_channel(&t.app, "B", "local").await;

    let uri = format!("/api/channels/{}/available", b["id"]);
    let (status, body) = call(&t.app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids = body["ids"].as_array().unwrap();
    assert!(!ids.contains(&json!(1)));
    assert!(ids.contains(&json!(2)));
    assert_eq!(ids.len(), 20);

    let (_, body) = call(&t.app, "GET", &format!("{}?bus=slink", uri), None).await;
    assert_eq!(body["ids"].as_array().unwrap().len(), 40);
}

#[tokio::test]
async fn test_replace_state_rejects_collision() {
    let t = create_test_app().await;
    add_channel(&t.app, "keep", "local").await;

    let (status, _) = call(
        &t.app,
        "POST",
        "/api/state",
        Some(json!({"channels": [
            {"preampBus": "local", "preampId": 3},
            {"preampBus": "local", "preampId": 4, "preampIdR": 3}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, state) = call(&t.app, "GET", "/api/state", None).await;
    assert_eq!(state["channels"][0]["name"], "keep");

    let (status, state) = call(
        &t.app,
        "POST",
        "/api/state",
        Some(json!({
            "channels": [{"name": "Vox", "preampBus": "slink", "preampId": 9, "gain": 30}],
            "current_show": "gig"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["channels"].as_array().unwrap().len(), 1);
    assert_eq!(state["current_show"], "gig");
}

#[tokio::test]
async fn test_phantom_toggle_sends_command() {
    let t = create_test_app().await;
    let c = add_channel(&t.app, "Condenser", "local").await;

    let uri = format!("/api/channels/{}/phantom?on=1", c["id"]);
    let (status, body) = call(&t.app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channel"]["phantom"], true);
    assert!(body.get("warnings").is_none());
    assert_eq!(
        t.mixer.sent(),
        vec![(
            PreampSocket::new(PreampBus::Local, 1),
            PreampCommand::Phantom(true)
        )]
    );

    let uri = format!("/api/channels/{}/phantom?on=yes", c["id"]);
    let (_, body) = call(&t.app, "POST", &uri, None).await;
    assert_eq!(body["channel"]["phantom"], false);
}

#[tokio::test]
async fn test_gain_is_clamped_and_debounced() {
    let t = create_test_app().await;
    let c = add_channel(&t.app, "Vox", "local").await;
    let uri = format!("/api/channels/{}/gain", c["id"]);

    let (_, body) = call(&t.app, "PUT", &uri, Some(json!({"db": 12}))).await;
    assert_eq!(body["channel"]["gain"], 12);
    let (_, body) = call(&t.app, "PUT", &uri, Some(json!({"db": 75}))).await;
    assert_eq!(body["channel"]["gain"], 60);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        t.mixer.sent(),
        vec![(
            PreampSocket::new(PreampBus::Local, 1),
            PreampCommand::Gain(60)
        )]
    );
}

#[tokio::test]
async fn test_sync_single_flight() {
    let mixer = TestMixer {
        delay: Duration::from_millis(30),
        ..Default::default()
    };
    let t = create_test_app_with(Some("10.0.0.1"), mixer).await;
    add_channel(&t.app, "A", "local").await;
    add_channel(&t.app, "B", "slink").await;
    let line = add_channel(&t.app, "Line", "local").await;
    call(
        &t.app,
        "PATCH",
        &format!("/api/channels/{}", line["id"]),
        Some(json!({"preampId": 18})),
    )
    .await;

    let (status, body) = call(&t.app, "POST", "/api/sync", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["started"], true);
    assert_eq!(body["total"], 2);

    let (status, _) = call(&t.app, "POST", "/api/sync", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let status = wait_for_sync(&t.app).await;
    assert_eq!(status["last_result"]["synced"], 2);
    assert!(status["last_result"].get("error").is_none());
    assert_eq!(t.mixer.sent().len(), 6);
}

#[tokio::test]
async fn test_sync_without_address() {
    let t = create_test_app_with(None, TestMixer::default()).await;
    let (status, body) = call(&t.app, "POST", "/api/sync", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SQ IP not set");
}

#[tokio::test]
async fn test_show_lifecycle() {
    let t = create_test_app().await;
    add_channel(&t.app, "Kick", "local").await;

    let (status, body) = call(&t.app, "POST", "/api/shows", Some(json!({"name": "Sunday AM"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Sunday_AM");

    let (_, list) = call(&t.app, "GET", "/api/shows", None).await;
    assert_eq!(list["shows"], json!(["Sunday_AM"]));
    assert_eq!(list["current_show"], "Sunday_AM");

    let (status, _) = call(&t.app, "DELETE", "/api/shows/Sunday_AM", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, show) = call(&t.app, "GET", "/api/shows/Sunday_AM", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(show["show"]["channels"][0]["name"], "Kick");

    call(&t.app, "POST", "/api/state/reset", None).await;
    let (status, loaded) = call(&t.app, "POST", "/api/shows/Sunday_AM/load", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["sync_started"], true);
    assert_eq!(loaded["channels"][0]["name"], "Kick");
    wait_for_sync(&t.app).await;

    let (status, _) = call(&t.app, "GET", "/api/shows/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    call(&t.app, "POST", "/api/shows", Some(json!({"name": "spare", "set_current": false}))).await;
    let (status, _) = call(&t.app, "DELETE", "/api/shows/spare", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_import_and_export() {
    let t = create_test_app().await;

    let (status, _) = call(
        &t.app,
        "POST",
        "/api/state/import",
        Some(json!({"channels": [{"preampId": 2}, {"channel": 2}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &t.app,
        "POST",
        "/api/state/import",
        Some(json!({"name": "old", "cubes": [{"channel": 5, "phantom": true}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "old");
    assert_eq!(body["channels"][0]["preampId"], 5);
    assert_eq!(body["channels"][0]["phantom"], true);
    assert!(t.mixer.sent().is_empty());

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/state/export?name=My%20Set")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"My_Set.json\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let show: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(show["version"], 1);
    assert_eq!(show["channels"][0]["preampId"], 5);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let t = create_test_app_with(None, TestMixer::default()).await;
    let (_, settings) = call(&t.app, "GET", "/api/config", None).await;
    assert_eq!(settings["sq_ip"], "");

    let (status, settings) = call(
        &t.app,
        "POST",
        "/api/config",
        Some(json!({"sq_ip": " 192.168.0.20 ", "data_dir": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["sq_ip"], "192.168.0.20");

    let (_, state) = call(&t.app, "GET", "/api/state", None).await;
    assert_eq!(state["sq_ip"], "192.168.0.20");
}

#[tokio::test]
async fn test_preamp_direct_commands() {
    let t = create_test_app().await;
    let c = add_channel(&t.app, "Vox", "local").await;

    let (status, body) = call(&t.app, "POST", "/preamp/local/1/gain?db=24", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gain_db"], 24.0);
    let (_, state) = call(&t.app, "GET", "/api/state", None).await;
    assert_eq!(state["channels"][0]["id"], c["id"]);
    assert_eq!(state["channels"][0]["gain"], 24);

    let (status, _) = call(&t.app, "POST", "/preamp/local/1/gain", Some(json!({"db": 61}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&t.app, "POST", "/preamp/aes/1/pad?on=true", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&t.app, "POST", "/preamp/slink/41/pad?on=true", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Line inputs accept and ignore
    let sent_before = t.mixer.sent().len();
    let (status, _) = call(&t.app, "POST", "/preamp/local/19/phantom?on=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.mixer.sent().len(), sent_before);

    t.mixer
        .failing
        .lock()
        .unwrap()
        .insert(PreampSocket::new(PreampBus::Slink, 3));
    let (status, _) = call(&t.app, "POST", "/preamp/slink/3/phantom?on=true", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_preamp_without_address() {
    let t = create_test_app_with(None, TestMixer::default()).await;
    let (status, body) = call(&t.app, "POST", "/preamp/local/3/phantom?on=true", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SQ IP not set");
}

#[tokio::test]
async fn test_delete_channel_frees_socket() {
    let t = create_test_app().await;
    let a = add_channel(&t.app, "A", "local").await;
    add_channel(&t.app, "B", "local").await;

    let (status, _) = call(&t.app, "DELETE", &format!("/api/channels/{}", a["id"]), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&t.app, "DELETE", &format!("/api/channels/{}", a["id"]), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let c = add_channel(&t.app, "C", "local").await;
    assert_eq!(c["preampId"], 1);
    assert_ne!(c["id"], a["id"]);
}

#[tokio::test]
async fn test_unusable_data_dir_keeps_settings() {
    let t = create_test_app().await;
    add_channel(&t.app, "Kick", "local").await;
    let (_, before) = call(&t.app, "GET", "/api/config", None).await;

    let blocker = t.dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let bad_dir = blocker.join("sub");

    let (status, _) = call(
        &t.app,
        "POST",
        "/api/config",
        Some(json!({"data_dir": bad_dir.to_string_lossy()})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, after) = call(&t.app, "GET", "/api/config", None).await;
    assert_eq!(after, before);
    let on_disk: Value =
        serde_json::from_slice(&std::fs::read(t.dir.path().join("config.json")).unwrap())
            .unwrap();
    assert_eq!(on_disk["data_dir"], before["data_dir"]);

    // Storage still points at the old directory
    add_channel(&t.app, "Snare", "local").await;
    let saved: Value = serde_json::from_slice(
        &std::fs::read(t.dir.path().join("data").join("state.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["channels"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_replace_state_rejects_id_at_limit() {
    let t = create_test_app().await;
    add_channel(&t.app, "Kick", "local").await;

    let (status, body) = call(
        &t.app,
        "POST",
        "/api/state",
        Some(json!({"channels": [{"id": 4294967295u64, "preampId": 1}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("id"));

    let (_, state) = call(&t.app, "GET", "/api/state", None).await;
    assert_eq!(state["channels"][0]["name"], "Kick");
}
