use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::get, Router};
use reqwest::Url;

use rust_http_bench::load_generator::RequestSender;
use rust_http_bench::probe::ResourceProbe;
use rust_http_bench::{ProbeError, SendError};

/// Serve `GET /small` on an ephemeral port, answering 200 after `delay`.
pub async fn spawn_target(delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/small",
        get(move || async move {
            tokio::time::sleep(delay).await;
            "ok"
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("target server");
    });
    addr
}

/// Shared "is the target still up" switch.
#[derive(Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Real HTTP until the switch trips, refused connections afterwards.
pub struct SwitchedSender {
    pub client: reqwest::Client,
    pub switch: Switch,
}

#[async_trait]
impl RequestSender for SwitchedSender {
    async fn send(&self, url: &Url) -> Result<u16, SendError> {
        if self.switch.is_down() {
            return Err(SendError::Connect("connection refused".into()));
        }
        self.client.send(url).await
    }
}

/// A target that lives for `lifetime` queries, then exits and trips the switch.
pub struct DyingTarget {
    pub queries: AtomicUsize,
    pub lifetime: usize,
    pub switch: Switch,
}

#[async_trait]
impl ResourceProbe for DyingTarget {
    async fn query_mb(&self) -> Result<f64, ProbeError> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        if n >= self.lifetime {
            self.switch.kill();
            return Err(ProbeError::NotFound("container exited".into()));
        }
        Ok(100.0 + n as f64)
    }

    fn target(&self) -> String {
        "container:dying".into()
    }
}
