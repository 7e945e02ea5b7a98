// tests/http_api.rs

mod common;
use crate::common::{
    ConfigFileBuilder, FakeBackend, FakeScript, RunConfigBuilder, eventually, init_tracing,
    with_timeout,
};

use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use runherd::exec::ProcessSignal;
use runherd::orchestrator::Orchestrator;
use runherd::server;
use runherd::types::ReplacePolicy;

type TestResult = Result<(), Box<dyn Error>>;

struct TestServer {
    addr: SocketAddr,
    orchestrator: Orchestrator<FakeBackend>,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn backend() -> FakeBackend {
    FakeBackend::new()
        .with_script(
            "lister",
            FakeScript::new()
                .stdout("  ✓ links resolve\n")
                .stderr("1 skipped\n")
                .exit(0),
        )
        .with_script("forever", FakeScript::new().stdout("listening\n").never_exits())
        .with_script(
            "stubborn",
            FakeScript::new()
                .stdout("listening\n")
                .ignores_terminate()
                .never_exits(),
        )
}

async fn start_server(backend: &FakeBackend, policy: ReplacePolicy) -> Result<TestServer, Box<dyn Error>> {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .with_kill_grace("300ms")
        .with_heartbeat("100ms")
        .with_replace_policy(policy)
        .with_run("links.spec.js", RunConfigBuilder::new("lister").build())
        .with_run("dev-server", RunConfigBuilder::new("forever").build())
        .with_run("broken", RunConfigBuilder::new("missing-binary").build())
        .with_run("stubborn-server", RunConfigBuilder::new("stubborn").build())
        .build();
    let orchestrator = Orchestrator::from_config(backend.clone(), &cfg);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(server::serve(listener, orchestrator.clone(), async move {
        let _ = shutdown_rx.await;
    }));

    Ok(TestServer {
        addr,
        orchestrator,
        _shutdown: shutdown_tx,
    })
}

/// Accumulate the response body until it contains `needle`.
async fn read_until(resp: &mut reqwest::Response, needle: &str) -> Result<String, Box<dyn Error>> {
    let mut body = String::new();
    while !body.contains(needle) {
        match resp.chunk().await? {
            Some(chunk) => body.push_str(&String::from_utf8_lossy(&chunk)),
            None => break,
        }
    }
    Ok(body)
}

#[tokio::test]
async fn lists_catalog_names() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let names: Vec<String> = reqwest::get(server.url("/api/runs")).await?.json().await?;
    assert_eq!(names, vec!["broken", "dev-server", "links.spec.js", "stubborn-server"]);

    let active: Vec<String> = reqwest::get(server.url("/api/runs/active")).await?.json().await?;
    assert!(active.is_empty());
    Ok(())
}

#[tokio::test]
async fn streams_lines_then_exit_marker() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let resp = reqwest::get(server.url("/api/stream/links.spec.js")).await?;
    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");

    let body = with_timeout(resp.text()).await?;
    assert!(body.contains("id: 1\ndata:   ✓ links resolve\n"), "{body}");
    assert!(body.contains("id: 2\ndata: 1 skipped\n"), "{body}");
    assert!(
        body.contains("event: exit\ndata: {\"state\":\"completed\",\"code\":0}\n"),
        "{body}"
    );
    assert!(
        body.trim_end().ends_with("{\"state\":\"completed\",\"code\":0}"),
        "marker must be last: {body}"
    );
    Ok(())
}

#[tokio::test]
async fn spawn_failure_streams_error_marker() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let resp = reqwest::get(server.url("/api/stream/broken")).await?;
    assert_eq!(resp.status(), 200);
    let body = with_timeout(resp.text()).await?;
    assert!(body.contains("event: error\n"), "{body}");
    assert!(body.contains("missing-binary"), "{body}");
    Ok(())
}

#[tokio::test]
async fn unknown_run_is_404() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let resp = reqwest::get(server.url("/api/stream/nope.spec.js")).await?;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await?;
    assert_eq!(body["ok"], json!(false));
    assert!(body["error"].as_str().unwrap_or_default().contains("nope.spec.js"));
    Ok(())
}

#[tokio::test]
async fn bad_timeout_is_400() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    for timeout in ["soon", "0s"] {
        let url = server.url(&format!("/api/stream/links.spec.js?timeout={timeout}"));
        let resp = reqwest::get(url).await?;
        assert_eq!(resp.status(), 400, "timeout={timeout}");
    }
    Ok(())
}

#[tokio::test]
async fn timeout_query_is_applied() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let resp = reqwest::get(server.url("/api/stream/dev-server?timeout=200ms")).await?;
    let body = with_timeout(resp.text()).await?;
    assert!(body.contains("data: listening\n"), "{body}");
    assert!(body.contains("event: timeout\ndata: {\"state\":\"timed_out\"}\n"), "{body}");
    Ok(())
}

#[tokio::test]
async fn abort_endpoint_ends_the_stream() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let mut resp = reqwest::get(server.url("/api/stream/dev-server")).await?;
    with_timeout(read_until(&mut resp, "data: listening")).await?;

    let active: Vec<String> = reqwest::get(server.url("/api/runs/active")).await?.json().await?;
    assert_eq!(active, vec!["dev-server"]);

    let client = reqwest::Client::new();
    let ack: Value = client
        .post(server.url("/api/abort/dev-server"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(ack, json!({"ok": true, "was_active": true}));

    let rest = with_timeout(read_until(&mut resp, "event: aborted")).await?;
    assert!(rest.contains("event: aborted\ndata: {\"state\":\"aborted\"}\n"), "{rest}");

    let again: Value = client
        .post(server.url("/api/abort/dev-server"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(again, json!({"ok": true, "was_active": false}));
    Ok(())
}

#[tokio::test]
async fn reset_endpoint_aborts_all_streams() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let mut first = reqwest::get(server.url("/api/stream/dev-server")).await?;
    with_timeout(read_until(&mut first, "data: listening")).await?;

    let ack: Value = reqwest::Client::new()
        .post(server.url("/api/reset"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(ack, json!({"ok": true, "aborted": 1}));

    let rest = with_timeout(read_until(&mut first, "event: aborted")).await?;
    assert!(rest.contains("event: aborted"), "{rest}");
    assert!(server.orchestrator.list_active_runs().is_empty());
    Ok(())
}

#[tokio::test]
async fn busy_run_is_409_under_reject() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Reject).await?;

    let mut first = reqwest::get(server.url("/api/stream/dev-server")).await?;
    with_timeout(read_until(&mut first, "data: listening")).await?;

    let second = reqwest::get(server.url("/api/stream/dev-server")).await?;
    assert_eq!(second.status(), 409);
    Ok(())
}

#[tokio::test]
async fn second_stream_replaces_the_first() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let mut first = reqwest::get(server.url("/api/stream/dev-server")).await?;
    with_timeout(read_until(&mut first, "data: listening")).await?;

    let mut second = reqwest::get(server.url("/api/stream/dev-server")).await?;
    let old_rest = with_timeout(read_until(&mut first, "event: aborted")).await?;
    assert!(old_rest.contains("event: aborted"), "{old_rest}");

    with_timeout(read_until(&mut second, "data: listening")).await?;
    Ok(())
}

#[tokio::test]
async fn client_disconnect_stops_the_run() -> TestResult {
    let backend = backend();
    let server = start_server(&backend, ReplacePolicy::Replace).await?;

    let mut resp = reqwest::get(server.url("/api/stream/dev-server")).await?;
    with_timeout(read_until(&mut resp, "data: listening")).await?;
    drop(resp);

    // Heartbeats make the server notice the closed connection.
    let orchestrator = server.orchestrator.clone();
    assert!(
        eventually(Duration::from_secs(5), || orchestrator.list_active_runs().is_empty()).await
    );
    assert!(backend.signals().contains(&("forever".to_string(), ProcessSignal::Terminate)));
    Ok(())
}

#[tokio::test]
async fn huge_timeout_query_still_streams() -> TestResult {
    let server = start_server(&backend(), ReplacePolicy::Replace).await?;

    let mut resp =
        reqwest::get(server.url("/api/stream/dev-server?timeout=18446744073709551615s")).await?;
    assert_eq!(resp.status(), 200);
    with_timeout(read_until(&mut resp, "data: listening")).await?;

    let ack: Value = reqwest::Client::new()
        .post(server.url("/api/abort/dev-server"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(ack, json!({"ok": true, "was_active": true}));
    let rest = with_timeout(read_until(&mut resp, "event: aborted")).await?;
    assert!(rest.contains("event: aborted"), "{rest}");

    let overflow =
        reqwest::get(server.url("/api/stream/dev-server?timeout=18446744073709551615h")).await?;
    assert_eq!(overflow.status(), 400);
    Ok(())
}

#[tokio::test]
async fn abandoned_replacing_request_leaves_nothing_registered() -> TestResult {
    let backend = backend();
    let server = start_server(&backend, ReplacePolicy::Replace).await?;

    let mut first = reqwest::get(server.url("/api/stream/stubborn-server")).await?;
    with_timeout(read_until(&mut first, "data: listening")).await?;

    // The client gives up while the server waits out the stubborn run.
    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(20))
        .build()?;
    let replacing = impatient
        .get(server.url("/api/stream/stubborn-server"))
        .send()
        .await;
    assert!(replacing.is_err());

    let rest = with_timeout(read_until(&mut first, "event: aborted")).await?;
    assert!(rest.contains("event: aborted"), "{rest}");

    let orchestrator = server.orchestrator.clone();
    assert!(
        eventually(Duration::from_secs(5), || orchestrator.list_active_runs().is_empty()).await
    );
    let active: Vec<String> = reqwest::get(server.url("/api/runs/active")).await?.json().await?;
    assert!(active.is_empty());
    Ok(())
}
