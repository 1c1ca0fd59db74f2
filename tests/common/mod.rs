//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use analysis_gateway::audit::{MemoryAuditStore, MemoryRowSink};
use analysis_gateway::auth::{SharedDirectory, User, UserDirectory};
use analysis_gateway::config::{BackendVersionConfig, GatewayConfig};
use analysis_gateway::http::GatewayServer;
use analysis_gateway::lifecycle::Shutdown;

/// Raw requests received by a mock backend.
#[derive(Clone, Default)]
pub struct Received(Arc<Mutex<Vec<String>>>);

impl Received {
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<String> {
        self.0.lock().unwrap().last().cloned()
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// The whole request is read before `f` is asked for `(status, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Received)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Received::default();
    let recorder = received.clone();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                recorder.0.lock().unwrap().push(request);

                let (status, body) = f().await;
                let response = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nX-Backend: mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    (addr, received)
}

/// Mock backend that always answers with the same status and body.
pub async fn start_mock_backend(status: u16, body: &'static str) -> (SocketAddr, Received) {
    start_programmable_backend(move || async move { (status, body.to_string()) }).await
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = find(&buf, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let body_len = buf.len() - header_end - 4;

        if let Some(length) = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            if body_len >= length {
                break;
            }
        } else if head.contains("transfer-encoding: chunked") {
            if buf.ends_with(b"0\r\n\r\n") {
                break;
            }
        } else {
            break;
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn backend(addr: SocketAddr) -> BackendVersionConfig {
    BackendVersionConfig {
        endpoint: format!("http://{}/analyze", addr),
        method: "POST".into(),
        credential_header: "X-Api-Key".into(),
        credential: Some("backend-secret".into()),
        timeout_secs: Some(5),
        fields: [("score".to_string(), 0), ("label".to_string(), 1)]
            .into_iter()
            .collect(),
        path_labels: vec!["pages".into()],
        tabular_destination: None,
    }
}

pub fn base_config(staging: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.uploads.staging_dir = staging.to_path_buf();
    config.timeouts.connect_secs = 2;
    config.observability.metrics_enabled = false;
    config
}

pub fn user(id: &str, token: &str) -> User {
    User {
        token: token.into(),
        ..User::new(id)
    }
}

/// A gateway running on an ephemeral port with in-memory collaborators.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub audit: Arc<MemoryAuditStore>,
    pub rows: Arc<MemoryRowSink>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig, users: Vec<User>) -> Self {
        let audit = Arc::new(MemoryAuditStore::new());
        let rows = Arc::new(MemoryRowSink::new());
        let directory = SharedDirectory::new(UserDirectory::from_users(users));

        let server =
            GatewayServer::new(config, directory, audit.clone(), rows.clone()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.subscribe();

        tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        Self {
            addr,
            audit,
            rows,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn pdf_part(name: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(b"%PDF-1.4 test document".to_vec())
        .file_name(name.to_string())
        .mime_str("application/pdf")
        .unwrap()
}

pub fn staging_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
