//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use resilience_engine::config::{BackoffConfig, EngineConfig, UpstreamConfig};
use resilience_engine::http::HttpServer;
use resilience_engine::resilience::PolicyRegistry;

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` is called once per request and returns the status and body.
#[allow(dead_code)]
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
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let response_str = format!(
                            "HTTP/1.1 {} Mock\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// Gateway config with one upstream named `name` and fast retries.
#[allow(dead_code)]
pub fn gateway_config(name: &str, backend: SocketAddr) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.server.bind_address = "127.0.0.1:0".into();
    config.server.sweep_interval_secs = 0;
    config.defaults.retry.backoff = BackoffConfig::Fixed { delay_ms: 10 };
    config.upstreams.push(UpstreamConfig {
        name: name.into(),
        base_url: format!("http://{backend}"),
        policy: None,
    });
    config
}

/// Start the gateway on an ephemeral port and return its address.
#[allow(dead_code)]
pub async fn start_gateway(config: EngineConfig) -> SocketAddr {
    let registry = Arc::new(PolicyRegistry::from_config(&config));
    let server = HttpServer::from_parts(config, registry, client());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending()).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    addr
}

/// HTTP client that never goes through an environment proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
