//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use service_registry::{CallReport, HealthProbe, ProbeReport, ServiceCaller};

/// Start a programmable HTTP/1.1 backend on an ephemeral port.
///
/// `f` decides the status and body of every response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Drain the request head so closing doesn't reset the connection.
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Backend that always answers with `status` and `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (status, body.to_string()) }).await
}

/// HTTP client that ignores proxy environment variables.
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Probe whose answer per URL is set by the test. Unknown URLs are unhealthy.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    health: Arc<Mutex<HashMap<String, bool>>>,
    probes: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn set(&self, url: &str, healthy: bool) {
        self.health.lock().unwrap().insert(url.to_string(), healthy);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str) -> ProbeReport {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let healthy = self.health.lock().unwrap().get(url).copied().unwrap_or(false);
        ProbeReport {
            healthy,
            elapsed: Duration::from_millis(1),
        }
    }
}

/// Caller that fails or succeeds without touching the network.
pub struct StubCaller {
    pub succeed: bool,
}

impl ServiceCaller for StubCaller {
    type Response = &'static str;
    type Error = String;

    async fn call(&self, url: &str) -> CallReport<&'static str, String> {
        CallReport {
            elapsed: Duration::from_millis(3),
            result: if self.succeed {
                Ok("ok")
            } else {
                Err(format!("{url} refused the connection"))
            },
        }
    }
}

/// Caller whose request never completes.
pub struct HangingCaller;

impl ServiceCaller for HangingCaller {
    type Response = ();
    type Error = String;

    async fn call(&self, _url: &str) -> CallReport<(), String> {
        std::future::pending().await
    }
}
