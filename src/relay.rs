//! CORS Relay
//!
//! Information Hiding:
//! - Forwards every request to the model server unchanged (method, path, query, body)
//! - Cross-origin headers added on the way back; preflight answered locally
//! - Upstream connection failures become a plain-text 500

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::fmt::Display;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
struct RelayState {
    client: reqwest::Client,
    target: String,
}

/// Router forwarding everything to `target_url`
pub fn router(target_url: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .fallback(forward)
        .layer(cors)
        .with_state(RelayState {
            client: reqwest::Client::new(),
            target: target_url.trim_end_matches('/').to_string(),
        })
}

/// Listen on `port` until the process is stopped
pub async fn serve(port: u16, target_url: &str) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind relay port {}", port))?;

    tracing::info!("[Relay] Listening on {} -> {}", addr, target_url);
    axum::serve(listener, router(target_url))
        .await
        .context("Relay server stopped")?;
    Ok(())
}

async fn forward(State(state): State<RelayState>, request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.target, path);

    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return proxy_error(e),
    };

    let mut headers = parts.headers;
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    tracing::debug!("[Relay] {} {}", parts.method, url);
    let upstream = match state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return proxy_error(e),
    };

    let status = upstream.status();
    let mut headers: HeaderMap = upstream.headers().clone();
    for name in [header::TRANSFER_ENCODING, header::CONNECTION, header::CONTENT_LENGTH] {
        headers.remove(name);
    }

    match upstream.bytes().await {
        Ok(bytes) => (status, headers, Body::from(bytes)).into_response(),
        Err(e) => proxy_error(e),
    }
}

fn proxy_error(e: impl Display) -> Response {
    tracing::error!("[Relay] Proxy error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Proxy error: {}", e)).into_response()
}
