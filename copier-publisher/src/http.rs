//! Single-endpoint, loopback-only HTTP output for the master state
//! publisher (§4.3). Any of `{"", "state", "master_state.json"}` returns
//! the current snapshot as `application/json`; everything else 404s.
//! Access logging is suppressed, matching the Python prototype's
//! `log_message` override in `examples/original_source/master_feed.py`.

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use std::net::SocketAddr;
use tokio::sync::watch;

#[derive(Clone)]
struct AppState {
    snapshot: watch::Receiver<String>,
}

async fn serve_snapshot(uri: Uri, State(state): State<AppState>) -> axum::response::Response {
    let path = uri.path().trim_matches('/');
    if matches!(path, "" | "state" | "master_state.json") {
        let body = state.snapshot.borrow().clone();
        (
            StatusCode::OK,
            [("content-type", "application/json")],
            body,
        )
            .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Serves `snapshot` (the latest compact JSON) on `127.0.0.1:port`. The
/// snapshot is swapped atomically by the caller via `watch::Sender`, never
/// mutated in place (§5).
pub async fn serve(port: u16, snapshot: watch::Receiver<String>) -> anyhow::Result<()> {
    let app = Router::new()
        .fallback(serve_snapshot)
        .with_state(AppState { snapshot });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "master state publisher HTTP endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
