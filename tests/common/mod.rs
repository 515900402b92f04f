//! Shared utilities for integration tests.
//!
//! Mock backends are raw TCP servers speaking just enough HTTP/1.1:
//! they read one request, record it, answer, and close the connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use llm_pool_proxy::config::{BackendConfig, CallerConfig, ProviderConfig};
use llm_pool_proxy::ProxyConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const CALLER_TOKEN: &str = "caller-token-1234";

/// One request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// What a mock backend answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Buffered JSON body with a status.
    Json(u16, String),
    /// Event stream written chunk by chunk, then closed.
    Sse(Vec<String>),
}

/// Handle to a running mock backend.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<Captured>>>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Captured> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// Start a mock backend whose answer is computed per request.
pub async fn start_backend<F>(reply: F) -> MockBackend
where
    F: Fn(&Captured) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);

    let (h, r) = (hits.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let (hits, requests, reply) = (h.clone(), r.clone(), reply.clone());
            tokio::spawn(async move {
                let mut socket = socket;
                let Some(captured) = read_request(&mut socket).await else {
                    return;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                let answer = reply(&captured);
                requests.lock().unwrap().push(captured);
                write_reply(&mut socket, answer).await;
            });
        }
    });

    MockBackend { addr, hits, requests }
}

/// Mock backend that always answers with the same status and body.
pub async fn start_fixed_backend(status: u16, body: &'static str) -> MockBackend {
    start_backend(move |_| Reply::Json(status, body.to_string())).await
}

async fn read_request(socket: &mut TcpStream) -> Option<Captured> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Captured { method, path, headers, body })
}

async fn write_reply(socket: &mut TcpStream, reply: Reply) {
    match reply {
        Reply::Json(status, body) => {
            let response = format!(
                "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
        Reply::Sse(chunks) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }
    let _ = socket.shutdown().await;
}

/// Backend entry with a fixed model list and an inline key.
pub fn backend(name: &str, base_url: &str, models: &[&str]) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        api_key: Some(format!("key-{name}")),
        api_key_env: None,
        models: Some(models.iter().map(|m| m.to_string()).collect()),
        balance_path: None,
    }
}

pub fn caller(id: &str, token: &str) -> CallerConfig {
    CallerConfig {
        id: id.to_string(),
        token: token.to_string(),
        enabled: true,
        sign_timeout_secs: 0,
        allowed_models: Vec::new(),
        allowed_endpoints: Vec::new(),
    }
}

/// Config with one provider over `backends` and one unrestricted caller.
pub fn config_with(backends: Vec<BackendConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.providers.push(ProviderConfig {
        name: "test".to_string(),
        backends,
    });
    config.callers.push(caller("tester", CALLER_TOKEN));
    config.health_check.enabled = false;
    config.observability.metrics_enabled = false;
    config.timeouts.request_secs = 5;
    config.timeouts.stream_secs = 5;
    config
}
