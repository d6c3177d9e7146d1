//! Axum control server: the set/clear command surface plus read-only
//! status, route lookup and stats endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::lifecycle::ProxyController;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub controller: &'static ProxyController,
}

/// Body of `PUT /api/proxy`. Missing fields read as blank host / port 0,
/// which clears the proxy.
#[derive(Debug, Default, Deserialize)]
pub struct SetProxyRequest {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    #[serde(default)]
    pub uri: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/proxy",
            get(handle_get_proxy)
                .put(handle_set_proxy)
                .delete(handle_clear_proxy),
        )
        .route("/api/route", get(handle_route))
        .route("/api/stats", get(handle_get_stats))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind the listener and serve until Ctrl+C.
pub async fn run(listen_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, "egress-router control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("egress-router shut down gracefully");
    Ok(())
}

/// PUT /api/proxy: install an upstream proxy (or clear on invalid input).
///
/// The body is parsed as JSON regardless of `Content-Type`. An empty body
/// reads as missing fields; a body that is not valid JSON is rejected.
async fn handle_set_proxy(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_set_proxy(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed set-proxy body");
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({
                    "error": "invalid_request",
                    "message": e.to_string(),
                })),
            )
                .into_response();
        }
    };
    let host = request.host.unwrap_or_default();
    let port = request.port.unwrap_or(0);

    match state.controller.set_proxy(&host, port) {
        Ok(ok) => axum::Json(serde_json::json!({ "ok": ok })).into_response(),
        Err(e) => command_failed("set_http_proxy_failed", &e),
    }
}

fn parse_set_proxy(body: &[u8]) -> Result<SetProxyRequest, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SetProxyRequest::default());
    }
    serde_json::from_slice(body)
}

/// DELETE /api/proxy: restore the policy that preceded the first set.
async fn handle_clear_proxy(State(state): State<Arc<AppState>>) -> Response {
    match state.controller.clear_proxy() {
        Ok(ok) => axum::Json(serde_json::json!({ "ok": ok })).into_response(),
        Err(e) => command_failed("clear_http_proxy_failed", &e),
    }
}

/// GET /api/proxy: what the slot currently holds.
async fn handle_get_proxy(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.controller.status()).into_response()
}

/// GET /api/route?uri=...: the decision the installed policy makes for `uri`.
async fn handle_route(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RouteQuery>,
) -> Response {
    let span = egress_tracing::route_lookup_span!(&query.uri);
    let _enter = span.enter();
    let decision = state.controller.decide(&query.uri);
    span.record("decision", tracing::field::debug(&decision));
    axum::Json(decision).into_response()
}

/// GET /api/stats: routing counters.
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.controller.stats().snapshot()).into_response()
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn command_failed(code: &str, err: &crate::error::RouteError) -> Response {
    tracing::error!(error = %err, code = code, "Proxy command failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({ "error": code, "message": err.to_string() })),
    )
        .into_response()
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
