use assert_json_diff::assert_json_include;
use pcde_server::{AppConfig, HandlerKind, RuleConfig, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&cfg);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

/// Task is forwarded to the mock resource server, Communication is echoed.
fn config_for(upstream: &MockServer) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.server.base_url = Some(format!("{}/fhir", upstream.uri()));
    cfg.upstream.url = Some(upstream.uri());
    cfg.interception.rules = vec![
        RuleConfig {
            resource_type: "Task".into(),
            marker: "PCDE".into(),
            marker_offset: 1,
            handler: HandlerKind::Forward,
        },
        RuleConfig {
            resource_type: "Communication".into(),
            marker: "PCDE".into(),
            marker_offset: 1,
            handler: HandlerKind::Echo,
        },
    ];
    cfg
}

#[tokio::test]
async fn intercepted_task_gets_assigned_id() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fhir/Task"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"resourceType": "Task", "id": "T-42", "status": "requested"})),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let (base, shutdown_tx, handle) = start_server(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/fhir/PCDE/Task"))
        .header("content-type", "application/fhir+json")
        .body(r#"{"resourceType":"Task","status":"requested"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(
        resp.headers()["content-type"],
        "application/json; charset=UTF-8"
    );
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"resourceType":"Task","status":"requested","id":"T-42"}"#
    );

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn echo_rule_returns_document_unchanged() {
    let upstream = MockServer::start().await;
    let (base, shutdown_tx, handle) = start_server(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    let body = r#"{"resourceType":"Communication","status":"completed","payload":[{"contentString":"hi"}]}"#;
    let resp = client
        .post(format!("{base}/PCDE/Communication"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.text().await.unwrap(), body);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn declined_requests_reach_upstream_unchanged() {
    let upstream = MockServer::start().await;
    let task = r#"{"resourceType":"Task","status":"requested"}"#;
    let malformed = r#"{"resourceType":"Task""#;

    // Marker mismatch
    Mock::given(method("POST"))
        .and(path("/fhir/OTHER/Task"))
        .and(body_string(task))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"resourceType": "Task", "id": "up-1"})))
        .expect(1)
        .mount(&upstream)
        .await;
    // Malformed body on a matching path
    Mock::given(method("POST"))
        .and(path("/fhir/PCDE/Task"))
        .and(body_string(malformed))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"resourceType": "OperationOutcome"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let (base, shutdown_tx, handle) = start_server(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/fhir/OTHER/Task"))
        .body(task)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "up-1");

    let resp = client
        .post(format!("{base}/fhir/PCDE/Task"))
        .body(malformed)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["resourceType"], "OperationOutcome");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn oversized_body_reaches_upstream_intact() {
    let upstream = MockServer::start().await;
    let large = format!(
        r#"{{"resourceType":"Task","note":[{{"text":"{}"}}]}}"#,
        "x".repeat(256 * 1024)
    );
    Mock::given(method("POST"))
        .and(path("/fhir/PCDE/Task"))
        .and(body_string(large.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"resourceType": "Task", "id": "up-2"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut cfg = config_for(&upstream);
    cfg.server.body_limit_bytes = 1024;
    let (base, shutdown_tx, handle) = start_server(cfg).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/fhir/PCDE/Task"))
        .body(large)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "up-2");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn handler_failure_falls_back_to_upstream() {
    let upstream = MockServer::start().await;
    // The forward handler's create fails...
    Mock::given(method("POST"))
        .and(path("/fhir/Task"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&upstream)
        .await;
    // ...so the original request is passed through.
    Mock::given(method("POST"))
        .and(path("/PCDE/Task"))
        .respond_with(ResponseTemplate::new(200).set_body_string("passed through"))
        .expect(1)
        .mount(&upstream)
        .await;

    let (base, shutdown_tx, handle) = start_server(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/PCDE/Task"))
        .body(r#"{"resourceType":"Task"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "passed through");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn no_upstream_yields_operation_outcome() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/Patient/1")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["resourceType"], "OperationOutcome");
    assert_eq!(body["issue"][0]["code"], "not-found");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn operational_endpoints_work() {
    let upstream = MockServer::start().await;
    let (base, shutdown_tx, handle) = start_server(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");

    // One echoed request so the counters move
    let resp = client
        .post(format!("{base}/PCDE/Communication"))
        .body(r#"{"resourceType":"Communication"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .get(format!("{base}/_interception/stats"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_json_include!(
        actual: body.clone(),
        expected: json!({"stats": {"seen": 1, "matched": 1, "responded": 1, "declined": 0}})
    );
    assert_eq!(body["rules"][0]["name"], "PCDE/Task");
    assert_eq!(body["rules"][1]["handler"], "echo");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
