/// Minimal hyper-to-tungstenite WebSocket upgrade, since hyper 0.14 has no
/// upgrade helper of its own: validate the handshake headers, answer 101,
/// then hand the upgraded connection to the caller once hyper releases it.
use base64::Engine;
use hyper::header::{CONNECTION, UPGRADE};
use hyper::upgrade::Upgraded;
use hyper::{Body, HeaderMap, Request, Response, StatusCode};
use sha1::{Digest, Sha1};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let has = |name: &hyper::header::HeaderName, value: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains(value))
            .unwrap_or(false)
    };
    has(&CONNECTION, "upgrade") && has(&UPGRADE, "websocket")
}

fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Builds the `101 Switching Protocols` response and spawns a task that
/// drives `on_connected` once hyper completes the upgrade.
pub fn upgrade<F, Fut>(req: Request<Body>, on_connected: F) -> Result<Response<Body>, String>
where
    F: FnOnce(WebSocketStream<Upgraded>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let key = req
        .headers()
        .get("sec-websocket-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing Sec-WebSocket-Key header".to_string())?
        .to_string();

    let response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "upgrade")
        .header(UPGRADE, "websocket")
        .header("sec-websocket-accept", accept_key(&key))
        .body(Body::empty())
        .map_err(|e| e.to_string())?;

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(upgraded, Role::Server, None).await;
                on_connected(ws).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "websocket upgrade failed");
            }
        }
    });

    Ok(response)
}
