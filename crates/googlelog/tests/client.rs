//! Exercises the Google Logging client against a mock of the token, metadata and logging endpoints.

use pretty_assertions::assert_eq;
use serde_json::json;
use slog_google::client::Client;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY: &str = include_str!("fixtures/test_key.pem");

fn write_key_file(dir: &tempfile::TempDir, token_uri: &str) -> std::path::PathBuf {
    let key = json!({
        "type": "service_account",
        "project_id": "test-project",
        "private_key_id": "abc123",
        "private_key": TEST_KEY,
        "client_email": "logger@test-project.iam.gserviceaccount.com",
        "token_uri": token_uri,
    });
    let path = dir.path().join("sa_key_lg.json");
    std::fs::write(&path, key.to_string()).unwrap();
    path
}

async fn mount_token(server: &MockServer, route: &str, token: &str) {
    Mock::given(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn service_account_writes_text_entries() {
    let server = MockServer::start().await;
    mount_token(&server, "/token", "sa-token").await;
    Mock::given(method("POST"))
        .and(path("/v2/entries:write"))
        .and(header("authorization", "Bearer sa-token"))
        .and(body_partial_json(json!({
            "logName": "projects/test-project/logs/demo-log",
            "entries": [{"textPayload": "disk full", "severity": "ERROR"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let key_file = write_key_file(&dir, &format!("{}/token", server.uri()));
    let client = Client::from_service_account_json(&key_file)
        .unwrap()
        .with_api_base(server.uri());
    assert_eq!(client.project(), "test-project");

    let logger = client.logger("demo-log");
    logger.log_text("disk full", "ERROR").await.unwrap();
    // second write reuses the cached token
    logger.log_text("disk full", "ERROR").await.unwrap();
}

#[tokio::test]
async fn broken_private_key_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(
        &path,
        json!({
            "type": "service_account",
            "project_id": "test-project",
            "private_key": "not a key",
            "client_email": "logger@test-project.iam.gserviceaccount.com",
        })
        .to_string(),
    )
    .unwrap();

    let err = Client::from_service_account_json(&path).unwrap_err();
    assert_eq!(err.kind(), "PrivateKeyError");
}

#[tokio::test]
async fn metadata_server_provides_project_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/project/project-id"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_string("meta-project"))
        .mount(&server)
        .await;
    mount_token(
        &server,
        "/computeMetadata/v1/instance/service-accounts/default/token",
        "meta-token",
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v2/entries:write"))
        .and(header("authorization", "Bearer meta-token"))
        .and(body_partial_json(json!({
            "logName": "projects/meta-project/logs/demo-log",
            "entries": [{
                "jsonPayload": {"url": "http://test.example.com", "code": 403},
                "severity": "ERROR"
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_metadata_server(&server.uri())
        .await
        .unwrap()
        .with_api_base(server.uri());
    assert_eq!(client.project(), "meta-project");

    client
        .logger("demo-log")
        .log_struct(
            json!({"url": "http://test.example.com", "data": "Test error", "code": 403}),
            "ERROR",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_write_is_reported() {
    let server = MockServer::start().await;
    Mock::given(path("/computeMetadata/v1/project/project-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("meta-project"))
        .mount(&server)
        .await;
    mount_token(
        &server,
        "/computeMetadata/v1/instance/service-accounts/default/token",
        "meta-token",
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v2/entries:write"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let client = Client::from_metadata_server(&server.uri())
        .await
        .unwrap()
        .with_api_base(server.uri());
    let err = client
        .logger("demo-log")
        .log_text("hello", "INFO")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "HttpResponseError");
    assert!(err.to_string().contains("403"));
}

#[tokio::test]
async fn metadata_server_without_project() {
    let server = MockServer::start().await;
    Mock::given(path("/computeMetadata/v1/project/project-id"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = Client::from_metadata_server(&server.uri()).await.unwrap_err();
    assert_eq!(err.kind(), "HttpResponseError");
}

#[cfg(feature = "shipper")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_ships_slog_records() {
    use slog::{o, Drain};
    use std::time::Duration;

    let server = MockServer::start().await;
    Mock::given(path("/computeMetadata/v1/project/project-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("meta-project"))
        .mount(&server)
        .await;
    mount_token(
        &server,
        "/computeMetadata/v1/instance/service-accounts/default/token",
        "meta-token",
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v2/entries:write"))
        .and(body_partial_json(json!({
            "logName": "projects/meta-project/logs/demo-log",
            "entries": [{"textPayload": "demo:starting up", "severity": "INFO"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_metadata_server(&server.uri())
        .await
        .unwrap()
        .with_api_base(server.uri());
    let drain = client.handler("demo-log").unwrap();
    let log = slog::Logger::root(std::sync::Mutex::new(drain).fuse(), o!());

    slog::info!(log, "demo:starting up");

    let mut shipped = false;
    for _ in 0..50 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests
            .iter()
            .any(|r| r.url.path() == "/v2/entries:write")
        {
            shipped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(shipped, "log entry was not shipped");
}
