//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use resilient_gateway::config::GatewayConfig;
use resilient_gateway::http::GatewayServer;
use resilient_gateway::lifecycle::Shutdown;
use resilient_gateway::resilience::BreakerRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A programmable upstream that counts hits and records the correlation
/// header of every request it receives.
#[allow(dead_code)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicU32>,
    pub correlation_ids: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockUpstream {
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn correlation_ids(&self) -> Vec<String> {
        self.correlation_ids.lock().unwrap().clone()
    }
}

/// Start a mock upstream. `f` receives the zero-based hit number and returns
/// the status and body to answer with.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockUpstream
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let correlation_ids = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (hits_task, ids_task) = (hits.clone(), correlation_ids.clone());
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let hits = hits_task.clone();
                    let ids = ids_task.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        if let Some(id) = header_value(&head, "x-correlation-id") {
                            ids.lock().unwrap().push(id);
                        }
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        let (status, body) = f(n).await;
                        let reason = StatusCode::from_u16(status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("Unknown");

                        let response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream {
        addr,
        hits,
        correlation_ids,
    }
}

/// Start a mock upstream that reads each request and closes the socket
/// without answering.
#[allow(dead_code)]
pub async fn start_dropping_backend() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let correlation_ids = Arc::new(Mutex::new(Vec::new()));

    let (hits_task, ids_task) = (hits.clone(), correlation_ids.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let head = read_head(&mut socket).await;
            if let Some(id) = header_value(&head, "x-correlation-id") {
                ids_task.lock().unwrap().push(id);
            }
            hits_task.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });

    MockUpstream {
        addr,
        hits,
        correlation_ids,
    }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Config pointing at `upstream` with test-friendly timings.
#[allow(dead_code)]
pub fn test_config(upstream: &MockUpstream) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = upstream.base_url();
    config.upstream.path = "status".into();
    config.upstream.timeout_secs = 1;
    config.retries.base_delay_ms = 20;
    config.retries.max_delay_ms = 200;
    config
}

/// Start the gateway on an ephemeral port.
#[allow(dead_code)]
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let (addr, shutdown, _) = start_gateway_with_breakers(config).await;
    (addr, shutdown)
}

/// Like [`start_gateway`], also handing back the breaker registry.
pub async fn start_gateway_with_breakers(
    config: GatewayConfig,
) -> (SocketAddr, Shutdown, Arc<BreakerRegistry>) {
    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config).unwrap();
    let breakers = server.breakers().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown, breakers)
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
