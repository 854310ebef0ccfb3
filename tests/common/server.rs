//! Test server management.
//!
//! Spawns a cap endpoint on 127.0.0.1:0 with a caller-supplied registry.

use revcaps::caps::{CapServer, Codec, HandlerRegistry, KeyMaterial, SealMode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running test server.
pub struct TestServer {
    pub caps: Arc<CapServer>,
    addr: SocketAddr,
    task: JoinHandle<()>,
    client: reqwest::Client,
}

#[allow(dead_code)]
impl TestServer {
    /// Spawn a server with a fresh 128-bit key.
    pub async fn spawn(registry: HandlerRegistry) -> anyhow::Result<Self> {
        let key = KeyMaterial::generate(16)?;
        Self::spawn_with(key, SealMode::Randomized, registry).await
    }

    /// Spawn a server with the given key and seal mode.
    pub async fn spawn_with(
        key: KeyMaterial,
        mode: SealMode,
        registry: HandlerRegistry,
    ) -> anyhow::Result<Self> {
        let codec = Codec::new(&key, mode)?;
        let caps = Arc::new(CapServer::new("/caps/", codec, registry)?);
        Self::spawn_server(caps).await
    }

    /// Serve an already-built capability server.
    pub async fn spawn_server(caps: Arc<CapServer>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = revcaps::http::router(Arc::clone(&caps), false);
        let task = tokio::spawn(async move {
            let _ = revcaps::http::serve(listener, app).await;
        });
        Ok(Self {
            caps,
            addr,
            task,
            client: reqwest::Client::new(),
        })
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Grant a capability and return its absolute URL.
    pub fn grant(&self, key: &str, value: &str) -> String {
        let path = self.caps.grant(key, value).expect("grant failed");
        self.url(&path)
    }

    pub async fn get(&self, url: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self.client.get(url).send().await?)
    }

    pub async fn post(&self, url: &str, body: &str) -> anyhow::Result<reqwest::Response> {
        Ok(self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
