//! HTTP surface: the cap endpoint and the Prometheus `/metrics` endpoint.
//!
//! Every request under the base path, whatever its method, goes to
//! [`CapServer::dispatch`]. Handlers see the remote address because the
//! listener records [`ConnectInfo`](axum::extract::ConnectInfo).

use crate::caps::CapServer;
use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::{any, get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::Instrument;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Handler for everything under the base path.
async fn cap_endpoint(State(server): State<Arc<CapServer>>, request: Request) -> Response {
    server.dispatch(request).await
}

/// Router serving capability URLs under the server's base path.
pub fn cap_router(server: Arc<CapServer>) -> Router {
    let base = server.base_path().to_string();
    Router::new()
        // the bare base path has an empty token, which dispatch rejects
        .route(&base, any(cap_endpoint))
        .route(&format!("{base}*token"), any(cap_endpoint))
        .with_state(server)
}

/// Router serving capability URLs and, optionally, `/metrics`.
///
/// A base path of `/` swallows every path, so metrics are not mounted then.
pub fn router(server: Arc<CapServer>, metrics: bool) -> Router {
    let mount_metrics = metrics && server.base_path() != "/";
    if metrics && !mount_metrics {
        tracing::warn!("Base path is '/', not mounting /metrics");
    }
    let app = cap_router(server);
    if mount_metrics {
        app.route("/metrics", get(metrics_handler))
    } else {
        app
    }
}

/// Serve `app` on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

/// Bind `addr` and serve `app`.
///
/// This is a long-running task; it returns only on bind or accept failure.
pub async fn run_http_server(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return Err(e);
        }
    };
    let local = listener.local_addr()?;
    tracing::info!("Capability HTTP server listening on {}", local);

    let result = serve(listener, app)
        .instrument(crate::telemetry::spans::listener(&local.to_string()))
        .await;
    if let Err(ref e) = result {
        tracing::error!("HTTP server error: {}", e);
    }
    result
}
