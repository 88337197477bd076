//! End-to-end tests of the HTTP control plane against a real directory.

use diskbusy::prelude::*;
use diskbusy::server;
use serde_json::{json, Value};
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    registry: Arc<WorkloadRegistry>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(dir: &TempDir) -> Self {
        let mut config = RegistryConfig::new(format!("{}/*", dir.path().display()));
        config.block_size = 4096;
        let registry = Arc::new(WorkloadRegistry::new(config, Arc::new(UuidProvider)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::serve(listener, Arc::clone(&registry), async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            registry,
            stop: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
        self.registry.shutdown().await;
    }
}

fn populated_dir() -> TempDir {
    let dir = tempdir().unwrap();
    for i in 0..4 {
        fs::write(dir.path().join(format!("blob-{i}")), vec![0xAB; 32 * 1024]).unwrap();
    }
    dir
}

#[tokio::test]
async fn start_list_and_stop_a_job() {
    let dir = populated_dir();
    let server = TestServer::start(&dir).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/busy"))
        .json(&json!({ "n": 3, "rate_limit": "1MB" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let job: Value = client
        .get(server.url(&format!("/busy/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(job["parallelism"], 3);
    assert_eq!(job["rate_limit"], 1_000_000);
    assert_eq!(job["status"], "running");

    let all: Vec<Value> = client
        .get(server.url("/busy"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 1);

    let resp = client
        .delete(server.url(&format!("/busy/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    // A second delete of the same id is a plain not-found.
    let resp = client
        .delete(server.url(&format!("/busy/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let dir = populated_dir();
    let server = TestServer::start(&dir).await;
    let client = reqwest::Client::new();

    let resp = client
        .delete(server.url("/busy/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    let resp = client
        .get(server.url("/busy/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let dir = populated_dir();
    let server = TestServer::start(&dir).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "n": 2, "rate_limit": "ten megabytes" }),
        json!({ "n": 0, "rate_limit": "1MB" }),
        json!({ "n": 1, "rate_limit": "0" }),
    ] {
        let resp = client
            .post(server.url("/busy"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST, "{body}");
    }

    assert!(server.registry.jobs().await.is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = populated_dir();
    let server = TestServer::start(&dir).await;

    let body: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "diskbusy");

    server.shutdown().await;
}
