//! Client tests against a mock DLHub service and search index
//!
//! A single wiremock server plays both roles: the service API lives under
//! `/api/v1` and the search index under `/v1/index/dlhub/search`.

use dlhub_sdk::auth::{AccessTokenAuthorizer, NullAuthorizer};
use dlhub_sdk::models::{ArgumentBlock, PythonClassMethodModel, ServableModel};
use dlhub_sdk::search::GlobusSearchBackend;
use dlhub_sdk::{ClientConfig, DlhubClient, DlhubError, InputEncoding, TaskState};
use serde_json::{Map, Value, json};
use serial_test::serial;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const SEARCH_PATH: &str = "/v1/index/dlhub/search";

/// Matches request bodies containing every needle, binary parts included
struct BodyContainsAll(Vec<&'static str>);

impl Match for BodyContainsAll {
    fn matches(&self, request: &Request) -> bool {
        self.0.iter().all(|needle| {
            request
                .body
                .windows(needle.len())
                .any(|w| w == needle.as_bytes())
        })
    }
}

async fn setup() -> (MockServer, DlhubClient) {
    let server = MockServer::start().await;

    let config = ClientConfig {
        service_address: format!("{}/api/v1", server.uri()),
        search_address: server.uri(),
        poll_interval_ms: 10,
        ..Default::default()
    };
    let search =
        GlobusSearchBackend::new(&server.uri(), "dlhub", Arc::new(NullAuthorizer), None).unwrap();
    let client = DlhubClient::new(
        &config,
        Arc::new(AccessTokenAuthorizer::new("test-token")),
        Arc::new(search),
    )
    .unwrap();

    (server, client)
}

/// Search reply wrapping each record as one gmeta entry
fn gmeta(records: &[Value], total: u64) -> Value {
    json!({
        "gmeta": records
            .iter()
            .map(|r| json!({"subject": "x", "entries": [{"content": r}]}))
            .collect::<Vec<_>>(),
        "total": total
    })
}

fn servable(owner: &str, name: &str, date: &str) -> Value {
    json!({
        "dlhub": {
            "owner": owner,
            "name": name,
            "shorthand_name": format!("{}/{}", owner, name),
            "publication_date": date
        },
        "servable": {
            "methods": {
                "run": {
                    "input": {"type": "list", "item_type": {"type": "float"}},
                    "output": {"type": "float"}
                }
            }
        }
    })
}

async fn mount_search(server: &MockServer, records: &[Value], total: u64) {
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmeta(records, total)))
        .mount(server)
        .await;
}

fn archives_in_temp_dir() -> usize {
    std::fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("dlhub-servable-"))
        .count()
}

fn publishable_model(dir: &std::path::Path) -> ServableModel {
    let source = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/model.pkl");
    let pickle = dir.join("model.pkl");
    std::fs::copy(source, &pickle).unwrap();

    let mut model = PythonClassMethodModel::create_model(&pickle, "predict", Map::new()).unwrap();
    model.set_name("iris_svm").set_title("Iris SVM");
    model
        .set_inputs(ArgumentBlock::ndarray("Features", vec![None, Some(4)]))
        .unwrap()
        .set_outputs(ArgumentBlock::ndarray("Labels", vec![None]))
        .unwrap();
    model
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_get_servables_keeps_latest_versions() {
    let (server, client) = setup().await;
    let records = vec![
        servable("ward", "sqrt", "1540000000000"),
        servable("ward", "sqrt", "1530000000000"),
        servable("chard", "max", "1535000000000"),
    ];

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({
            "q": "dlhub.type:\"servable\"",
            "advanced": true,
            "limit": 10000,
            "sort": [
                {"field_name": "dlhub.owner", "order": "asc"},
                {"field_name": "dlhub.name", "order": "desc"},
                {"field_name": "dlhub.publication_date", "order": "desc"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmeta(&records, 3)))
        .expect(2)
        .mount(&server)
        .await;

    let latest = client.get_servables(true).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0]["dlhub"]["publication_date"], "1540000000000");

    let all = client.get_servables(false).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_list_servables() {
    let (server, client) = setup().await;
    mount_search(
        &server,
        &[
            servable("ward", "sqrt", "2"),
            servable("ward", "sqrt", "1"),
            servable("chard", "max", "1"),
        ],
        3,
    )
    .await;

    assert_eq!(
        client.list_servables().await.unwrap(),
        vec!["ward/sqrt".to_string(), "chard/max".to_string()]
    );
}

#[tokio::test]
async fn test_get_servables_too_many_results() {
    let (server, client) = setup().await;
    mount_search(&server, &[servable("ward", "sqrt", "1")], 10_001).await;

    assert!(matches!(
        client.get_servables(true).await,
        Err(DlhubError::TooManyResults { total: 10_001, .. })
    ));
}

#[tokio::test]
async fn test_describe_servable() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({
            "q": "dlhub.name:\"sqrt\" AND dlhub.owner:\"ward\"",
            "limit": 1
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gmeta(&[servable("ward", "sqrt", "1")], 1)),
        )
        .mount(&server)
        .await;

    let record = client.describe_servable("ward", "sqrt").await.unwrap();
    assert_eq!(record["dlhub"]["shorthand_name"], "ward/sqrt");

    let methods = client.describe_methods("ward", "sqrt", None).await.unwrap();
    assert!(methods.get("run").is_some());

    let run = client
        .describe_methods("ward", "sqrt", Some("run"))
        .await
        .unwrap();
    assert_eq!(run["output"]["type"], "float");
}

#[tokio::test]
async fn test_describe_missing_servable() {
    let (server, client) = setup().await;
    mount_search(&server, &[], 0).await;

    match client.describe_servable("ward", "nothing").await {
        Err(DlhubError::NotFound(msg)) => assert!(msg.contains("ward/nothing")),
        other => panic!("expected not found, got {:?}", other),
    }
}

#[tokio::test]
async fn test_search_by_servable_keeps_newest_per_owner_and_name() {
    let (server, client) = setup().await;
    // Unsorted on purpose: the older version arrives first
    mount_search(
        &server,
        &[
            servable("ward", "sqrt", "1530000000000"),
            servable("ward", "sqrt", "1540000000000"),
            servable("chard", "sqrt", "1520000000000"),
        ],
        3,
    )
    .await;

    let latest = client
        .search_by_servable(Some("sqrt"), None, None, true, None)
        .await
        .unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0]["dlhub"]["publication_date"], "1540000000000");

    let all = client
        .search_by_servable(Some("sqrt"), None, None, false, Some(10))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_search_by_servable_requires_identifier() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmeta(&[], 0)))
        .expect(0)
        .mount(&server)
        .await;

    assert!(matches!(
        client.search_by_servable(None, None, None, true, None).await,
        Err(DlhubError::InvalidArgument(_))
    ));
    assert!(matches!(
        client
            .search_by_servable(Some(""), Some(""), Some(""), true, None)
            .await,
        Err(DlhubError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_search_by_authors() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({
            "q": "(datacite.creators.creatorName:\"Ward, Logan\" AND datacite.creators.creatorName:\"Chard, Ryan\")",
            "limit": 5
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gmeta(&[servable("ward", "sqrt", "1")], 1)),
        )
        .mount(&server)
        .await;

    let results = client
        .search_by_authors(&["Ward, Logan", "Chard, Ryan"], true, Some(5))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_search_error_surfaces_status() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("index offline"))
        .mount(&server)
        .await;

    match client.get_servables(true).await {
        Err(e @ DlhubError::Remote { status: 503, .. }) => assert!(e.is_transient()),
        other => panic!("expected remote error, got {:?}", other),
    }
}

// =============================================================================
// Execution
// =============================================================================

#[tokio::test]
async fn test_run_json_inputs() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/servables/ward/sqrt/run"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({"data": [1.0, 4.0]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1.0, 2.0])))
        .mount(&server)
        .await;

    let result = client
        .run("ward/sqrt", &json!([1.0, 4.0]), InputEncoding::Json)
        .await
        .unwrap();
    assert_eq!(result, json!([1.0, 2.0]));
}

#[tokio::test]
async fn test_run_python_inputs() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/servables/ward/sqrt/run"))
        .and(body_json(json!({"python": "[9.0]"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([3.0])))
        .mount(&server)
        .await;

    let result = client
        .run("ward/sqrt", &json!([9.0]), InputEncoding::Python)
        .await
        .unwrap();
    assert_eq!(result, json!([3.0]));
}

#[tokio::test]
async fn test_run_files_makes_no_request() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert!(matches!(
        client
            .run("ward/sqrt", &json!(["/tmp/a.png"]), InputEncoding::Files)
            .await,
        Err(DlhubError::Unimplemented(_))
    ));
}

#[tokio::test]
async fn test_run_failure_returns_body() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/servables/ward/sqrt/run"))
        .respond_with(ResponseTemplate::new(400).set_body_string("math domain error"))
        .mount(&server)
        .await;

    match client
        .run("ward/sqrt", &json!([-1.0]), InputEncoding::Json)
        .await
    {
        Err(DlhubError::Remote { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "math domain error");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_task_status() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/task-9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "RUNNING"})))
        .mount(&server)
        .await;

    let status = client.get_task_status("task-9").await.unwrap();
    assert_eq!(status["status"], "RUNNING");
}

#[tokio::test]
async fn test_run_async_completes() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/servables/ward/sqrt/run"))
        .and(body_json(json!({"data": [16.0], "asynchronous": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/task-1/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETED", "result": [4.0]})),
        )
        .mount(&server)
        .await;

    let future = client
        .run_async("ward/sqrt", &json!([16.0]), InputEncoding::Json)
        .await
        .unwrap();
    assert_eq!(future.task_id(), "task-1");

    let result = future.wait(Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(result, json!([4.0]));
}

#[tokio::test]
async fn test_watch_task_failure() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/task-2/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "FAILED", "reason": "servable crashed"})),
        )
        .mount(&server)
        .await;

    let future = client.watch_task("task-2");
    assert!(matches!(
        future.wait(Some(Duration::from_secs(5))).await,
        Err(DlhubError::TaskFailed { .. })
    ));
    assert_eq!(
        future.state(),
        TaskState::Failed("servable crashed".to_string())
    );
}

#[tokio::test]
async fn test_watch_task_cancel() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/task-3/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "RUNNING"})))
        .mount(&server)
        .await;

    let future = client.watch_task("task-3");
    tokio::time::sleep(Duration::from_millis(50)).await;
    future.cancel();

    assert!(matches!(
        future.wait(Some(Duration::from_secs(5))).await,
        Err(DlhubError::TaskCancelled(_))
    ));
}

// =============================================================================
// Publication
// =============================================================================

#[tokio::test]
#[serial]
async fn test_publish_servable() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/publish"))
        .and(header("authorization", "Bearer test-token"))
        .and(BodyContainsAll(vec![
            "dlhub.json",
            "servable.zip",
            "\"transfer_method\":{\"POST\":\"file\"}",
        ]))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "pub-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let model = publishable_model(dir.path());

    let before = archives_in_temp_dir();
    assert_eq!(client.publish_servable(&model).await.unwrap(), "pub-1");
    assert_eq!(archives_in_temp_dir(), before);
}

#[tokio::test]
#[serial]
async fn test_publish_failure_removes_archive() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/publish"))
        .respond_with(ResponseTemplate::new(500).set_body_string("storage unavailable"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let model = publishable_model(dir.path());

    let before = archives_in_temp_dir();
    assert!(matches!(
        client.publish_servable(&model).await,
        Err(DlhubError::Remote { status: 500, .. })
    ));
    assert_eq!(archives_in_temp_dir(), before);
}

#[tokio::test]
#[serial]
async fn test_publish_rejects_invalid_description() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut model = publishable_model(dir.path());
    model.set_name("not a valid name");

    assert!(matches!(
        client.publish_servable(&model).await,
        Err(DlhubError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_publish_repository() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/publish_repo"))
        .and(body_json(json!({"repository": "https://github.com/example/servable"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "repo-1"})))
        .mount(&server)
        .await;

    assert_eq!(
        client
            .publish_repository("https://github.com/example/servable")
            .await
            .unwrap(),
        "repo-1"
    );
}
